//! Reporting
//!
//! Every executed unit (a step, a scenario's execution pass, a failing hook)
//! produces one [`Example`]: the invocation record. Reporters receive
//! `started/passed/pending/failed` notifications through a [`ReporterHub`],
//! which drops notifications and skips counting while the current
//! visibility mode is `silence`.

use std::io;
use std::rc::Rc;
use std::time::Duration;
use serde::Serialize;
use crate::engine::ScenarioReport;
use crate::error::ErrorKind;
use crate::model::{Feature, Scenario};
use crate::visibility::{OutputStack, StubBuffer};

/// Outcome of an executed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Pending,
    Failed,
}

impl Status {
    /// Wording used in dependency messages ("... which failed")
    pub fn result_text(self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Pending => "is pending",
            Status::Failed => "failed",
        }
    }
}

/// What kind of unit an example stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// A single background or scenario step
    Step,
    /// A scenario's execution pass
    Scenario,
    /// A before/after hook
    Hook,
}

/// Identity of a unit, known before it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub kind: UnitKind,
    /// Short description, e.g. `-> Given a step`
    pub description: String,
    /// Feature and scenario names followed by the description
    pub full_description: String,
    pub feature: String,
    pub scenario: String,
    pub file_path: String,
    pub line: usize,
    /// `file:line in step `text'`
    pub caller: String,
}

/// Failure payload of a failed example
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub message: String,
    pub backtrace: Vec<String>,
}

/// Invocation record: one per executed unit, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct Example {
    #[serde(flatten)]
    pub unit: Unit,
    pub status: Status,
    #[serde(serialize_with = "serialize_secs")]
    pub run_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// Why the unit did not pass
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl Example {
    pub fn passed(unit: Unit, run_time: Duration) -> Self {
        Self {
            unit,
            status: Status::Passed,
            run_time,
            pending_message: None,
            failure: None,
            error_kind: None,
        }
    }

    pub fn pending(unit: Unit, message: impl Into<String>, kind: ErrorKind, run_time: Duration) -> Self {
        Self {
            unit,
            status: Status::Pending,
            run_time,
            pending_message: Some(message.into()),
            failure: None,
            error_kind: Some(kind),
        }
    }

    pub fn failed(unit: Unit, failure: Failure, kind: ErrorKind, run_time: Duration) -> Self {
        Self {
            unit,
            status: Status::Failed,
            run_time,
            pending_message: None,
            failure: Some(failure),
            error_kind: Some(kind),
        }
    }

    pub fn description(&self) -> &str {
        &self.unit.description
    }

    /// Pending reason or failure message
    pub fn message(&self) -> Option<&str> {
        self.pending_message
            .as_deref()
            .or_else(|| self.failure.as_ref().map(|f| f.message.as_str()))
    }

    /// Whether this example was never attempted because an earlier step stalled
    pub fn is_dependency_pending(&self) -> bool {
        self.error_kind.map_or(false, |k| k.is_dependency())
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Counts of visible examples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub examples: usize,
    pub failures: usize,
    pub pending: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl Summary {
    /// e.g. `14 examples, 1 failure, 6 pending`
    pub fn line(&self) -> String {
        let mut line = format!(
            "{} {}, {} {}",
            self.examples,
            plural(self.examples, "example"),
            self.failures,
            plural(self.failures, "failure"),
        );
        if self.pending > 0 {
            line.push_str(&format!(", {} pending", self.pending));
        }
        line
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

/// Host reporter capability.
///
/// Formatters implement this; only visible units reach it.
pub trait Reporter {
    fn feature_started(&mut self, _feature: &Feature) -> io::Result<()> {
        Ok(())
    }

    fn scenario_started(&mut self, _feature: &Feature, _scenario: &Scenario) -> io::Result<()> {
        Ok(())
    }

    fn example_started(&mut self, _unit: &Unit) -> io::Result<()> {
        Ok(())
    }

    fn example_passed(&mut self, example: &Example) -> io::Result<()>;

    fn example_pending(&mut self, example: &Example) -> io::Result<()>;

    fn example_failed(&mut self, example: &Example) -> io::Result<()>;

    /// Scenario-level outcome, reported once per scenario
    fn scenario_finished(&mut self, _report: &ScenarioReport) -> io::Result<()> {
        Ok(())
    }

    fn dump_summary(&mut self, summary: &Summary) -> io::Result<()>;

    /// Step stubs for undefined steps; called after `dump_summary`, only when non-empty
    fn dump_stubs(&mut self, _stubs: &[String]) -> io::Result<()> {
        Ok(())
    }

    /// Called last; document formatters write their output here
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Whether this reporter honours silent units
    fn supports_visibility(&self) -> bool {
        true
    }
}

/// Fans notifications out to reporters, honouring the visibility stack
pub struct ReporterHub {
    reporters: Vec<Box<dyn Reporter>>,
    stack: Rc<OutputStack>,
    stubs: StubBuffer,
    summary: Summary,
}

impl ReporterHub {
    pub fn new(reporters: Vec<Box<dyn Reporter>>, generate_step_stubs: bool) -> Self {
        let stack = if reporters.iter().all(|r| r.supports_visibility()) {
            OutputStack::new()
        } else {
            tracing::debug!("reporter without visibility support; every unit is visible");
            OutputStack::always_visible()
        };
        Self {
            reporters,
            stack: Rc::new(stack),
            stubs: StubBuffer::new(generate_step_stubs),
            summary: Summary::default(),
        }
    }

    /// A hub with no reporters; still counts and buffers stubs
    pub fn silent(generate_step_stubs: bool) -> Self {
        Self::new(Vec::new(), generate_step_stubs)
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) {
        if !reporter.supports_visibility() {
            self.stack = Rc::new(OutputStack::always_visible());
        }
        self.reporters.push(reporter);
    }

    /// The run's visibility stack
    pub fn visibility(&self) -> Rc<OutputStack> {
        Rc::clone(&self.stack)
    }

    pub fn currently_visible(&self) -> bool {
        self.stack.currently_visible()
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn stubs(&self) -> &StubBuffer {
        &self.stubs
    }

    pub fn record_stub(&mut self, description: &str) {
        self.stubs.record(description);
    }

    fn each(&mut self, what: &str, mut f: impl FnMut(&mut Box<dyn Reporter>) -> io::Result<()>) {
        for reporter in &mut self.reporters {
            if let Err(e) = f(reporter) {
                tracing::warn!(notification = what, error = %e, "reporter failed to write");
            }
        }
    }

    // Group headers are not units; they are always forwarded.
    pub fn feature_started(&mut self, feature: &Feature) {
        self.each("feature_started", |r| r.feature_started(feature));
    }

    pub fn scenario_started(&mut self, feature: &Feature, scenario: &Scenario) {
        self.each("scenario_started", |r| r.scenario_started(feature, scenario));
    }

    pub fn scenario_finished(&mut self, report: &ScenarioReport) {
        self.each("scenario_finished", |r| r.scenario_finished(report));
    }

    pub fn example_started(&mut self, unit: &Unit) {
        if self.currently_visible() {
            self.each("example_started", |r| r.example_started(unit));
        }
    }

    /// Report a finished example according to its status
    pub fn example_finished(&mut self, example: &Example) {
        if !self.currently_visible() {
            return;
        }
        self.summary.examples += 1;
        match example.status {
            Status::Passed => self.each("example_passed", |r| r.example_passed(example)),
            Status::Pending => {
                self.summary.pending += 1;
                self.each("example_pending", |r| r.example_pending(example));
            }
            Status::Failed => {
                self.summary.failures += 1;
                self.each("example_failed", |r| r.example_failed(example));
            }
        }
    }

    /// Summary first, then buffered stubs, then close every reporter
    pub fn finish(&mut self, duration: Duration) -> Summary {
        self.summary.duration = duration;
        let summary = self.summary;
        self.each("dump_summary", |r| r.dump_summary(&summary));
        if let Some(stubs) = self.stubs.flush() {
            self.each("dump_stubs", |r| r.dump_stubs(&stubs));
        }
        self.each("close", |r| r.close());
        summary
    }
}
