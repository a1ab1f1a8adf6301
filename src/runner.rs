//! Feature runner
//!
//! Discovers `*.feature.json` trees in a directory, builds them, runs every
//! scenario with a fresh world and collects the results.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use crate::builder::{Builder, JsonBuilder};
use crate::engine::{Engine, ScenarioReport};
use crate::error::LoadError;
use crate::formatters::{self, Format};
use crate::model::Feature;
use crate::reporter::{ReporterHub, Status, Summary};

/// Environment variable that turns on step stub generation
pub const STUBS_ENV: &str = "STUBS";

/// Environment variable that makes [`run_and_assert`] list every step
pub const VERBOSE_ENV: &str = "STEPSPEC_VERBOSE";

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory containing feature trees, or a single feature tree file
    pub dir: PathBuf,
    /// Optional filter: only run files whose name contains this string
    pub filter: Option<String>,
    /// File name suffixes to scan (default: [".feature.json"])
    pub extensions: Vec<String>,
    /// Print a step definition skeleton for every undefined step
    pub generate_step_stubs: bool,
    /// Report each step as its own example
    pub granular_steps: bool,
    /// Output format for `run_to`
    pub format: Format,
    /// [`Runner::report`] lists every step, not only failures
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("features"),
            filter: None,
            extensions: vec![".feature.json".into()],
            generate_step_stubs: std::env::var_os(STUBS_ENV).is_some(),
            granular_steps: true,
            format: Format::Doc,
            verbose: false,
        }
    }
}

/// Result of running all features
#[derive(Debug)]
pub struct RunResult {
    /// Scenario reports, in run order
    pub scenarios: Vec<ScenarioReport>,
    /// Counts of visible examples
    pub summary: Summary,
    /// Stubs for undefined steps, when stub generation is on
    pub missing_steps: Vec<String>,
    /// Number of feature tree files loaded
    pub files: usize,
    /// Total duration
    pub duration: Duration,
}

impl RunResult {
    /// True when no scenario failed and no feature-level hook failed;
    /// pending scenarios do not count as failures
    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0 && self.summary.failures == 0
    }

    pub fn passed_count(&self) -> usize {
        self.count(Status::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(Status::Failed)
    }

    pub fn pending_count(&self) -> usize {
        self.count(Status::Pending)
    }

    fn count(&self, status: Status) -> usize {
        self.scenarios.iter().filter(|s| s.status == status).count()
    }

    /// Format a summary line
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} pending ({}ms)",
            self.passed_count(),
            self.failed_count(),
            self.pending_count(),
            self.duration.as_millis(),
        )
    }
}

/// The feature runner. `W` is the per-scenario world.
pub struct Runner<W> {
    engine: Engine<W>,
    config: RunConfig,
}

impl<W: Default> Runner<W> {
    /// Create a new runner with an empty step registry
    pub fn new(config: RunConfig) -> Self {
        Self::with_engine(Engine::new(), config)
    }

    /// Create a new runner around an engine with steps already registered
    pub fn with_engine(mut engine: Engine<W>, config: RunConfig) -> Self {
        engine.granular_steps = config.granular_steps;
        Self { engine, config }
    }

    /// Get mutable reference to the engine (for registering steps and hooks)
    pub fn engine_mut(&mut self) -> &mut Engine<W> {
        &mut self.engine
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Discover feature tree files in the configured directory
    pub fn discover(&self) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();
        let dir = &self.config.dir;

        if !dir.exists() {
            return Err(LoadError::NotFound(dir.clone()));
        }

        if dir.is_file() {
            files.push(dir.clone());
            return Ok(files);
        }

        self.scan_dir(dir, &mut files)?;

        files.sort();
        Ok(files)
    }

    fn scan_dir(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), LoadError> {
        let io_err = |source: std::io::Error| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        };
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();

            if path.is_dir() {
                self.scan_dir(&path, files)?;
            } else if self.is_feature_file(&path) {
                if let Some(ref filter) = self.config.filter {
                    let name = path.file_name()
                        .and_then(|s| s.to_str())
                        .unwrap_or("");
                    if !name.contains(filter.as_str()) {
                        continue;
                    }
                }
                files.push(path);
            }
        }
        Ok(())
    }

    fn is_feature_file(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            self.config.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
        } else {
            false
        }
    }

    /// Build every discovered file, in discovery order
    pub fn load(&self) -> Result<Vec<(PathBuf, Vec<Feature>)>, LoadError> {
        self.discover()?
            .into_iter()
            .map(|file| {
                let features = JsonBuilder::new(&file).build()?;
                Ok((file, features))
            })
            .collect()
    }

    /// Count the scenarios that would be run
    pub fn count_scenarios(&self) -> Result<usize, LoadError> {
        Ok(self
            .load()?
            .iter()
            .flat_map(|(_, features)| features.iter())
            .map(|f| f.scenarios.len())
            .sum())
    }

    /// Run everything without formatter output
    pub fn run_all(&self) -> Result<RunResult, LoadError> {
        self.run_with(ReporterHub::silent(self.config.generate_step_stubs))
    }

    /// Run everything, writing the configured format to `out`
    pub fn run_to(&self, out: Box<dyn Write>) -> Result<RunResult, LoadError> {
        let reporter = formatters::formatter(self.config.format, out);
        self.run_with(ReporterHub::new(vec![reporter], self.config.generate_step_stubs))
    }

    /// Write one line per scenario to `out`, followed by its failed steps
    /// and hook failures, or by every step when `verbose` is set
    pub fn report(&self, result: &RunResult, out: &mut dyn Write) -> std::io::Result<()> {
        for scenario in &result.scenarios {
            let name = format!("{} {}", scenario.feature, scenario.scenario);
            match scenario.status {
                Status::Passed => writeln!(out, "PASS     {}", name)?,
                Status::Pending => writeln!(out, "PENDING  {}", name)?,
                Status::Failed => writeln!(out, "FAIL     {}", name)?,
            }
            for example in scenario.hook_failures.iter().chain(&scenario.steps) {
                let show = self.config.verbose
                    || (example.status == Status::Failed && !example.is_dependency_pending());
                if !show {
                    continue;
                }
                writeln!(out, "  {} ({:?})", example.description(), example.status)?;
                if let Some(message) = example.message() {
                    writeln!(out, "    {}", message)?;
                }
                if let Some(ref failure) = example.failure {
                    for line in &failure.backtrace {
                        writeln!(out, "    # {}", line)?;
                    }
                }
            }
        }

        if !result.missing_steps.is_empty() {
            writeln!(out, "{}", crate::visibility::render_stubs(&result.missing_steps))?;
        }
        writeln!(out, "\n{}", result.summary())
    }

    /// Run everything through a caller-supplied hub
    pub fn run_with(&self, mut hub: ReporterHub) -> Result<RunResult, LoadError> {
        let start = Instant::now();
        let loaded = self.load()?;

        let mut scenarios = Vec::new();
        for (file, features) in &loaded {
            let file_path = file.display().to_string();
            tracing::debug!(file = %file_path, features = features.len(), "running feature file");
            scenarios.extend(self.run_features(&mut hub, &file_path, features));
        }

        let missing_steps = hub.stubs().iter().map(str::to_string).collect();
        let duration = start.elapsed();
        let summary = hub.finish(duration);

        Ok(RunResult {
            scenarios,
            summary,
            missing_steps,
            files: loaded.len(),
            duration,
        })
    }

    /// Run already-built features from one file, in order
    pub fn run_features(
        &self,
        hub: &mut ReporterHub,
        file_path: &str,
        features: &[Feature],
    ) -> Vec<ScenarioReport> {
        features
            .iter()
            .flat_map(|feature| self.engine.run_feature(hub, file_path, feature, W::default))
            .collect()
    }
}

/// Builder API for convenient runner construction
pub struct RunnerBuilder<W> {
    config: RunConfig,
    engine: Option<Engine<W>>,
}

impl<W: Default> RunnerBuilder<W> {
    /// Start building a runner for the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            config: RunConfig {
                dir: dir.into(),
                ..Default::default()
            },
            engine: None,
        }
    }

    /// Set the file name filter
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// Set file name suffixes to scan
    pub fn extensions(mut self, exts: Vec<String>) -> Self {
        self.config.extensions = exts;
        self
    }

    pub fn generate_step_stubs(mut self, enabled: bool) -> Self {
        self.config.generate_step_stubs = enabled;
        self
    }

    pub fn granular_steps(mut self, enabled: bool) -> Self {
        self.config.granular_steps = enabled;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Use an engine with steps already registered
    pub fn engine(mut self, engine: Engine<W>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build and return the runner
    pub fn build(self) -> Runner<W> {
        match self.engine {
            Some(engine) => Runner::with_engine(engine, self.config),
            None => Runner::new(self.config),
        }
    }

    /// Build and run all features
    pub fn run(self) -> Result<RunResult, LoadError> {
        self.build().run_all()
    }
}

/// Convenience function: create a runner builder for a directory
pub fn run<W: Default>(dir: impl Into<PathBuf>) -> RunnerBuilder<W> {
    RunnerBuilder::new(dir)
}

/// Run feature trees and integrate with `#[test]` by panicking on failure.
///
/// Usage in cargo tests:
/// ```rust,ignore
/// #[test]
/// fn features() {
///     emx_stepspec::run_and_assert::<Cart>("tests/features", |engine| {
///         engine.registry.step("an empty cart", |cart, _| { cart.clear(); Ok(()) }).unwrap();
///     });
/// }
/// ```
pub fn run_and_assert<W: Default>(dir: impl Into<PathBuf>, register: impl FnOnce(&mut Engine<W>)) {
    let mut engine = Engine::new();
    register(&mut engine);

    let config = RunConfig {
        dir: dir.into(),
        verbose: std::env::var_os(VERBOSE_ENV).is_some(),
        ..Default::default()
    };

    let runner = Runner::with_engine(engine, config);
    let result = match runner.run_all() {
        Ok(r) => r,
        Err(e) => panic!("failed to load features: {}", e),
    };

    if let Err(e) = runner.report(&result, &mut std::io::stderr()) {
        tracing::warn!(error = %e, "failed to write run report");
    }

    if !result.all_passed() {
        panic!("{} scenario(s) failed ({})", result.failed_count(), result.summary.line());
    }
}
