//! Feature tree
//!
//! The read-only tree a [`Builder`](crate::Builder) produces: features hold
//! backgrounds and scenarios, which hold steps. Nothing here is mutated while
//! a scenario runs; per-run bookkeeping lives in
//! [`ScenarioRunContext`](crate::ScenarioRunContext).

use std::fmt;
use serde::{Deserialize, Serialize};

/// A named collection of backgrounds and scenarios
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default)]
    pub backgrounds: Vec<Background>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Feature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn background(mut self, background: Background) -> Self {
        self.backgrounds.push(background);
        self
    }

    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Background steps in file order, across all backgrounds
    pub fn background_steps(&self) -> impl Iterator<Item = &Step> {
        self.backgrounds.iter().flat_map(|b| b.steps.iter())
    }
}

/// Steps run before every scenario of a feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub line: usize,
}

impl Background {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps, line: 0 }
    }
}

/// One test case: a named, ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Step keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyword {
    #[serde(alias = "given")]
    Given,
    #[serde(alias = "when")]
    When,
    #[serde(alias = "then")]
    Then,
    #[serde(alias = "and")]
    And,
    #[serde(alias = "but")]
    But,
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Keyword::Given => "Given",
            Keyword::When => "When",
            Keyword::Then => "Then",
            Keyword::And => "And",
            Keyword::But => "But",
        };
        f.write_str(s)
    }
}

/// One keyworded line of a scenario or background
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub keyword: Keyword,
    pub description: String,
    #[serde(default)]
    pub line: usize,
    /// Trailing data table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    /// Trailing doc string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
}

impl Step {
    pub fn new(keyword: Keyword, description: impl Into<String>) -> Self {
        Self {
            keyword,
            description: description.into(),
            line: 0,
            table: None,
            doc_string: None,
        }
    }

    pub fn given(description: impl Into<String>) -> Self {
        Self::new(Keyword::Given, description)
    }

    pub fn when(description: impl Into<String>) -> Self {
        Self::new(Keyword::When, description)
    }

    pub fn then(description: impl Into<String>) -> Self {
        Self::new(Keyword::Then, description)
    }

    pub fn and(description: impl Into<String>) -> Self {
        Self::new(Keyword::And, description)
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_doc_string(mut self, doc: impl Into<String>) -> Self {
        self.doc_string = Some(doc.into());
        self
    }

    /// Arguments appended after the bound placeholder values
    pub fn extra_args(&self) -> Vec<Arg> {
        let mut args = Vec::new();
        if let Some(ref doc) = self.doc_string {
            args.push(Arg::DocString(doc.clone()));
        }
        if let Some(ref table) = self.table {
            args.push(Arg::Table(table.clone()));
        }
        args
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.keyword, self.description)
    }
}

/// A data table attached to a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// First row
    pub fn headers(&self) -> &[String] {
        self.rows.first().map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Remaining rows as header → cell pairs
    pub fn hashes(&self) -> Vec<Vec<(&str, &str)>> {
        let headers = self.headers();
        self.rows
            .iter()
            .skip(1)
            .map(|row| {
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, c)| (h.as_str(), c.as_str()))
                    .collect()
            })
            .collect()
    }
}

/// An argument passed to a step body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// A value bound from a pattern placeholder
    Text(String),
    /// The step's data table
    Table(Table),
    /// The step's doc string
    DocString(String),
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Text(s) | Arg::DocString(s) => Some(s),
            Arg::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Arg::Table(t) => Some(t),
            _ => None,
        }
    }
}
