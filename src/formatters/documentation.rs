//! Plain-text documentation formatter

use std::io::{self, Write};
use crate::model::{Feature, Scenario};
use crate::reporter::{Example, Reporter, Summary};
use crate::visibility::render_stubs;

/// Prints a feature / scenario / step tree, then pending and failure
/// details, the summary line and any missing steps.
pub struct DocumentationFormatter {
    out: Box<dyn Write>,
    pending: Vec<Example>,
    failures: Vec<Example>,
}

impl DocumentationFormatter {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out,
            pending: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl Reporter for DocumentationFormatter {
    fn feature_started(&mut self, feature: &Feature) -> io::Result<()> {
        writeln!(self.out, "\n{}", feature.name)
    }

    fn scenario_started(&mut self, _feature: &Feature, scenario: &Scenario) -> io::Result<()> {
        writeln!(self.out, "  {}", scenario.name)
    }

    fn example_passed(&mut self, example: &Example) -> io::Result<()> {
        writeln!(self.out, "    {}", example.description())
    }

    fn example_pending(&mut self, example: &Example) -> io::Result<()> {
        writeln!(
            self.out,
            "    {} (PENDING: {})",
            example.description(),
            example.message().unwrap_or_default()
        )?;
        self.pending.push(example.clone());
        Ok(())
    }

    fn example_failed(&mut self, example: &Example) -> io::Result<()> {
        self.failures.push(example.clone());
        writeln!(
            self.out,
            "    {} (FAILED - {})",
            example.description(),
            self.failures.len()
        )
    }

    fn dump_summary(&mut self, summary: &Summary) -> io::Result<()> {
        if !self.pending.is_empty() {
            writeln!(self.out, "\nPending:")?;
            for example in &self.pending {
                writeln!(self.out, "  {}", example.unit.full_description)?;
                writeln!(self.out, "    # {}", example.message().unwrap_or_default())?;
                writeln!(self.out, "    # {}:{}", example.unit.file_path, example.unit.line)?;
            }
        }

        if !self.failures.is_empty() {
            writeln!(self.out, "\nFailures:\n")?;
            for (i, example) in self.failures.iter().enumerate() {
                writeln!(self.out, "  {}) {}", i + 1, example.unit.full_description)?;
                if let Some(ref failure) = example.failure {
                    for line in failure.message.lines() {
                        writeln!(self.out, "     {}", line)?;
                    }
                    for line in &failure.backtrace {
                        writeln!(self.out, "     # {}", line)?;
                    }
                }
                writeln!(self.out)?;
            }
        }

        writeln!(
            self.out,
            "\nFinished in {:.5} seconds\n{}",
            summary.duration.as_secs_f64(),
            summary.line()
        )
    }

    fn dump_stubs(&mut self, stubs: &[String]) -> io::Result<()> {
        writeln!(self.out, "{}", render_stubs(stubs))
    }

    fn close(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
