//! Standalone HTML page formatter
//!
//! Examples are collected per feature and scenario while the run goes on;
//! the page is rendered from a template on close. The template's `.html`
//! name turns on HTML auto-escaping for every interpolated value.

use std::io::{self, Write};
use minijinja::{context, Environment};
use serde::Serialize;
use crate::model::{Feature, Scenario};
use crate::reporter::{Example, Reporter, Status, Summary};

const TEMPLATE_NAME: &str = "report.html";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Scenarios</title>
<style>
.passed { color: green; }
.pending { color: goldenrod; }
.failed { color: red; }
</style>
</head>
<body>
{% for feature in features %}
<div class="feature">
  <h2>{{ feature.name }}</h2>
  {% if feature.examples %}
  <ul class="hooks">
    {% for example in feature.examples %}
    <li class="{{ example.status }}">{{ example.description }}{% if example.message %} <span class="message">{{ example.message }}</span>{% endif %}</li>
    {% endfor %}
  </ul>
  {% endif %}
  {% for scenario in feature.scenarios %}
  <div class="scenario">
    <h3>{{ scenario.name }}</h3>
    <ul>
    {% for example in scenario.examples %}
    <li class="{{ example.status }}">{{ example.description }}{% if example.message %} <span class="message">{{ example.message }}</span>{% endif %}</li>
    {% endfor %}
    </ul>
  </div>
  {% endfor %}
</div>
{% endfor %}
{% if summary %}
<p id="summary">{{ summary }}</p>
{% endif %}
{% if missing_steps %}
<h2>Missing Steps</h2>
<pre id="missing-steps">{{ missing_steps }}</pre>
{% endif %}
</body>
</html>
"#;

#[derive(Debug, Serialize)]
struct ExampleView {
    status: Status,
    description: String,
    message: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct ScenarioView {
    name: String,
    examples: Vec<ExampleView>,
}

#[derive(Debug, Default, Serialize)]
struct FeatureView {
    name: String,
    /// Feature-level hook failures
    examples: Vec<ExampleView>,
    scenarios: Vec<ScenarioView>,
}

/// Collects the page contents and writes the whole document on close
pub struct HtmlFormatter {
    out: Box<dyn Write>,
    features: Vec<FeatureView>,
    summary: Option<String>,
    missing_steps: Option<String>,
}

impl HtmlFormatter {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out,
            features: Vec::new(),
            summary: None,
            missing_steps: None,
        }
    }

    fn current_feature(&mut self) -> &mut FeatureView {
        if self.features.is_empty() {
            self.features.push(FeatureView::default());
        }
        let last = self.features.len() - 1;
        &mut self.features[last]
    }

    fn example(&mut self, example: &Example) {
        let view = ExampleView {
            status: example.status,
            description: example.description().to_string(),
            message: example.message().map(str::to_string),
        };
        let feature = self.current_feature();
        match feature.scenarios.last_mut() {
            Some(scenario) if !example.unit.scenario.is_empty() => scenario.examples.push(view),
            _ => feature.examples.push(view),
        }
    }

    fn render(&self) -> Result<String, minijinja::Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template(TEMPLATE_NAME, TEMPLATE)?;
        env.get_template(TEMPLATE_NAME)?.render(context! {
            features => &self.features,
            summary => &self.summary,
            missing_steps => &self.missing_steps,
        })
    }
}

impl Reporter for HtmlFormatter {
    fn feature_started(&mut self, feature: &Feature) -> io::Result<()> {
        self.features.push(FeatureView {
            name: feature.name.clone(),
            ..Default::default()
        });
        Ok(())
    }

    fn scenario_started(&mut self, _feature: &Feature, scenario: &Scenario) -> io::Result<()> {
        self.current_feature().scenarios.push(ScenarioView {
            name: scenario.name.clone(),
            examples: Vec::new(),
        });
        Ok(())
    }

    fn example_passed(&mut self, example: &Example) -> io::Result<()> {
        self.example(example);
        Ok(())
    }

    fn example_pending(&mut self, example: &Example) -> io::Result<()> {
        self.example(example);
        Ok(())
    }

    fn example_failed(&mut self, example: &Example) -> io::Result<()> {
        self.example(example);
        Ok(())
    }

    fn dump_summary(&mut self, summary: &Summary) -> io::Result<()> {
        self.summary = Some(summary.line());
        Ok(())
    }

    fn dump_stubs(&mut self, stubs: &[String]) -> io::Result<()> {
        self.missing_steps = Some(stubs.join("\n"));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let page = self
            .render()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.out.write_all(page.as_bytes())?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::formatters::SharedBuffer;
    use crate::reporter::{Failure, Unit, UnitKind};
    use crate::error::ErrorKind;

    fn unit(description: &str) -> Unit {
        Unit {
            kind: UnitKind::Step,
            description: description.to_string(),
            full_description: description.to_string(),
            feature: "f".into(),
            scenario: "s".into(),
            file_path: "f.feature".into(),
            line: 3,
            caller: "f.feature:3".into(),
        }
    }

    #[test]
    fn test_values_are_escaped() {
        let buffer = SharedBuffer::new();
        let mut html = HtmlFormatter::new(Box::new(buffer.clone()));
        let feature = Feature::new("<script>alert(1)</script>");
        html.feature_started(&feature).unwrap();
        html.scenario_started(&feature, &Scenario::new("Tom & \"Jerry\"")).unwrap();
        html.close().unwrap();

        let page = buffer.contents();
        assert!(!page.contains("<script>"));
        assert!(page.contains("<h2>&lt;script&gt;alert(1)&lt;"));
        assert!(page.contains("<h3>Tom &amp; &quot;Jerry&quot;</h3>"));
    }

    #[test]
    fn test_document_layout() {
        let buffer = SharedBuffer::new();
        let mut html = HtmlFormatter::new(Box::new(buffer.clone()));
        let feature = Feature::new("Checkout");
        let scenario = Scenario::new("pay <now>");

        html.feature_started(&feature).unwrap();
        html.scenario_started(&feature, &scenario).unwrap();
        html.example_passed(&Example::passed(unit("-> Given a cart"), Duration::ZERO)).unwrap();
        html.example_pending(&Example::pending(
            unit("-> When I pay"),
            "step does not exist",
            ErrorKind::Undefined,
            Duration::ZERO,
        ))
        .unwrap();
        html.dump_summary(&Summary { examples: 2, pending: 1, ..Default::default() }).unwrap();
        html.dump_stubs(&["registry.step(\"I pay\")".to_string()]).unwrap();
        html.close().unwrap();

        let page = buffer.contents();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<h3>pay &lt;now&gt;</h3>"));
        assert!(page.contains("<li class=\"passed\">-&gt; Given a cart</li>"));
        assert!(page.contains("<li class=\"pending\">-&gt; When I pay <span class=\"message\">step does not exist</span></li>"));
        let summary = page.find("<p id=\"summary\">2 examples, 0 failures, 1 pending</p>").unwrap();
        let stubs = page.find("<pre id=\"missing-steps\">registry.step(&quot;I pay&quot;)</pre>").unwrap();
        assert!(summary < stubs);
        assert!(page.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_feature_hook_failure_is_listed_under_the_feature() {
        let buffer = SharedBuffer::new();
        let mut html = HtmlFormatter::new(Box::new(buffer.clone()));
        let feature = Feature::new("Checkout");
        let mut hook = unit("in `before all' hook for feature Checkout");
        hook.kind = UnitKind::Hook;
        hook.scenario = String::new();

        html.feature_started(&feature).unwrap();
        html.example_failed(&Example::failed(
            hook,
            Failure { message: "no database".into(), backtrace: vec![] },
            ErrorKind::HookFailed,
            Duration::ZERO,
        ))
        .unwrap();
        html.close().unwrap();

        let page = buffer.contents();
        assert!(page.contains("<ul class=\"hooks\">"));
        assert!(page.contains("<span class=\"message\">no database</span>"));
        assert!(!page.contains("<p id=\"summary\">"));
        assert!(!page.contains("Missing Steps"));
    }
}
