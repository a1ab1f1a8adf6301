//! Machine-readable JSON formatter

use std::io::{self, Write};
use serde::Serialize;
use crate::reporter::{Example, Reporter, Summary};

/// Collects a record per visible example and writes one JSON document on close
pub struct JsonFormatter {
    out: Box<dyn Write>,
    examples: Vec<Example>,
    summary: Option<Summary>,
    missing_steps: Vec<String>,
}

#[derive(Serialize)]
struct Document<'a> {
    examples: &'a [Example],
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_line: Option<String>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    missing_steps: &'a [String],
}

impl JsonFormatter {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out,
            examples: Vec::new(),
            summary: None,
            missing_steps: Vec::new(),
        }
    }
}

impl Reporter for JsonFormatter {
    fn example_passed(&mut self, example: &Example) -> io::Result<()> {
        self.examples.push(example.clone());
        Ok(())
    }

    fn example_pending(&mut self, example: &Example) -> io::Result<()> {
        self.examples.push(example.clone());
        Ok(())
    }

    fn example_failed(&mut self, example: &Example) -> io::Result<()> {
        self.examples.push(example.clone());
        Ok(())
    }

    fn dump_summary(&mut self, summary: &Summary) -> io::Result<()> {
        self.summary = Some(*summary);
        Ok(())
    }

    fn dump_stubs(&mut self, stubs: &[String]) -> io::Result<()> {
        self.missing_steps = stubs.to_vec();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let document = Document {
            examples: &self.examples,
            summary: self.summary.as_ref(),
            summary_line: self.summary.map(|s| s.line()),
            missing_steps: &self.missing_steps,
        };
        serde_json::to_writer_pretty(&mut self.out, &document)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}
