//! Scenario engine
//!
//! Runs one scenario at a time in two passes over a single [`StepCursor`]:
//!
//! 1. The execution pass runs before hooks, the feature's background, then
//!    the scenario's steps, until the cursor is exhausted or a step stalls
//!    (is undefined, ambiguous, pending or fails).
//! 2. The replay pass drains whatever the execution pass left on the cursor
//!    and records each remaining step as pending, naming the step that
//!    stalled. No step body runs during replay.
//!
//! Both passes share one [`ScenarioRunContext`], which remembers the stalling
//! step and is discarded when the scenario is done.
//!
//! [`Engine::run_feature`] wraps a feature's scenarios in its `All` hooks.
//! A failing `before all` hook blocks every scenario of the feature: none of
//! their hooks or steps run, and every step is replayed as pending on it.
//!
//! ```text
//! Idle -> RunningBackground -> RunningScenario -> Done
//!                 \                  |
//!                  `-------------> Stalled -> ReplayingPending -> Done
//! ```

use std::time::{Duration, Instant};
use serde::Serialize;
use crate::error::{ErrorKind, StepError, STEP_DOES_NOT_EXIST};
use crate::hooks::{HookKind, HookScope, Hooks};
use crate::model::{Feature, Scenario, Step};
use crate::registry::{Match, Registry};
use crate::reporter::{Example, Failure, ReporterHub, Status, Unit, UnitKind};
use crate::sequencer::StepCursor;
use crate::visibility::Mode;

/// Where a scenario run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    RunningBackground,
    RunningScenario,
    Stalled,
    ReplayingPending,
    Done,
}

/// What stopped the scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallOrigin {
    Step(Step),
    Hook(HookKind, HookScope),
}

/// The first non-passing unit of a scenario run
#[derive(Debug, Clone)]
pub struct Stall {
    pub origin: StallOrigin,
    pub status: Status,
    pub kind: ErrorKind,
    pub message: String,
    pub backtrace: Vec<String>,
}

impl Stall {
    fn from_example(origin: StallOrigin, example: &Example) -> Self {
        Self {
            origin,
            status: example.status,
            kind: example.error_kind.unwrap_or(ErrorKind::StepFailed),
            message: example.message().unwrap_or_default().to_string(),
            backtrace: example
                .failure
                .as_ref()
                .map(|f| f.backtrace.clone())
                .unwrap_or_default(),
        }
    }

    /// Pending reason given to every step that was never attempted
    pub fn dependency_message(&self) -> String {
        match &self.origin {
            StallOrigin::Step(step) => format!(
                "Depends on step `{} {}' which {}",
                step.keyword,
                step.description,
                self.status.result_text()
            ),
            StallOrigin::Hook(kind, scope) => format!(
                "Depends on `{}' hook which {}",
                scope.label(*kind),
                self.status.result_text()
            ),
        }
    }

    fn dependency_kind(&self) -> ErrorKind {
        if self.status == Status::Failed {
            ErrorKind::DependencyFailed
        } else {
            ErrorKind::DependencyPending
        }
    }
}

/// A step that did not pass, with its invocation record
#[derive(Debug, thiserror::Error)]
#[error("{}: {error}", .example.unit.caller)]
pub struct StepException {
    pub example: Example,
    pub error: StepError,
}

/// Per-run state shared by the execution and replay passes
pub struct ScenarioRunContext<'a> {
    pub feature_file: &'a str,
    pub feature: &'a Feature,
    pub scenario: &'a Scenario,
    /// Feature tags followed by scenario tags
    pub tags: Vec<String>,
    phase: Phase,
    pending_step: Option<Stall>,
    steps: Vec<Example>,
    hook_failures: Vec<Example>,
}

impl<'a> ScenarioRunContext<'a> {
    pub fn new(feature_file: &'a str, feature: &'a Feature, scenario: &'a Scenario) -> Self {
        let tags = feature.tags.iter().chain(scenario.tags.iter()).cloned().collect();
        Self {
            feature_file,
            feature,
            scenario,
            tags,
            phase: Phase::Idle,
            pending_step: None,
            steps: Vec::new(),
            hook_failures: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_step(&self) -> Option<&Stall> {
        self.pending_step.as_ref()
    }

    pub fn is_stalled(&self) -> bool {
        self.pending_step.is_some()
    }

    /// Records collected so far, in file order
    pub fn steps(&self) -> &[Example] {
        &self.steps
    }

    fn transition(&mut self, phase: Phase) {
        tracing::debug!(scenario = %self.scenario.name, from = ?self.phase, to = ?phase, "scenario phase");
        self.phase = phase;
    }

    /// Remember the first stall. Later calls are ignored and return false.
    fn stall(&mut self, origin: StallOrigin, example: &Example) -> bool {
        if self.pending_step.is_some() {
            return false;
        }
        self.pending_step = Some(Stall::from_example(origin, example));
        self.transition(Phase::Stalled);
        true
    }

    /// Scenario-level outcome
    pub fn outcome(&self) -> Status {
        if !self.hook_failures.is_empty() {
            return Status::Failed;
        }
        self.pending_step.as_ref().map_or(Status::Passed, |s| s.status)
    }

    fn unit(&self, kind: UnitKind, description: String, line: usize, caller: String) -> Unit {
        Unit {
            kind,
            full_description: format!(
                "{} {} {}",
                self.feature.name, self.scenario.name, description
            ),
            description,
            feature: self.feature.name.clone(),
            scenario: self.scenario.name.clone(),
            file_path: self.feature_file.to_string(),
            line,
            caller,
        }
    }

    fn step_unit(&self, step: &Step) -> Unit {
        self.unit(
            UnitKind::Step,
            format!("-> {}", step),
            step.line,
            format!("{}:{} in step `{}'", self.feature_file, step.line, step.description),
        )
    }

    fn scenario_unit(&self) -> Unit {
        let mut unit = self.unit(
            UnitKind::Scenario,
            self.scenario.name.clone(),
            self.scenario.line,
            format!("{}:{}", self.feature_file, self.scenario.line),
        );
        unit.full_description = format!("{} {}", self.feature.name, self.scenario.name);
        unit
    }

    fn hook_unit(&self, kind: HookKind) -> Unit {
        let description = format!("in `{}' hook for scenario {}", kind, self.scenario.name);
        let mut unit = self.unit(
            UnitKind::Hook,
            description.clone(),
            self.scenario.line,
            format!("{}:{}", self.feature_file, self.scenario.line),
        );
        unit.full_description = description;
        unit
    }

    fn into_report(self) -> ScenarioReport {
        let status = self.outcome();
        let stalled_at = self.pending_step.as_ref().map(|s| match &s.origin {
            StallOrigin::Step(step) => step.to_string(),
            StallOrigin::Hook(kind, scope) => format!("{} hook", scope.label(*kind)),
        });
        ScenarioReport {
            feature: self.feature.name.clone(),
            scenario: self.scenario.name.clone(),
            file_path: self.feature_file.to_string(),
            line: self.scenario.line,
            status,
            steps: self.steps,
            hook_failures: self.hook_failures,
            stalled_at,
        }
    }
}

/// Scenario-level result of one run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub feature: String,
    pub scenario: String,
    pub file_path: String,
    pub line: usize,
    pub status: Status,
    /// Background and scenario steps in file order, replayed ones included
    pub steps: Vec<Example>,
    pub hook_failures: Vec<Example>,
    /// The stalling step (or hook), if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stalled_at: Option<String>,
}

impl ScenarioReport {
    pub fn statuses(&self) -> Vec<Status> {
        self.steps.iter().map(|e| e.status).collect()
    }
}

/// The scenario engine: step registry, hooks and reporting granularity
pub struct Engine<W> {
    pub registry: Registry<W>,
    pub hooks: Hooks<W>,
    /// Report every step as its own example (scenario unit silent).
    /// When false, steps are silent and each scenario counts once.
    pub granular_steps: bool,
}

impl<W> Engine<W> {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry<W>) -> Self {
        Self {
            registry,
            hooks: Hooks::new(),
            granular_steps: true,
        }
    }

    /// Run every scenario of a feature, each with a fresh world, between
    /// the feature's `before all` and `after all` hooks
    pub fn run_feature<F>(
        &self,
        hub: &mut ReporterHub,
        feature_file: &str,
        feature: &Feature,
        mut new_world: F,
    ) -> Vec<ScenarioReport>
    where
        F: FnMut() -> W,
    {
        hub.feature_started(feature);

        let blocker = match self.hooks.run_group(HookKind::Before, feature) {
            Ok(()) => None,
            Err(e) => Some(self.report_group_hook_failure(hub, feature_file, feature, HookKind::Before, &e)),
        };

        let reports: Vec<ScenarioReport> = feature
            .scenarios
            .iter()
            .map(|scenario| {
                let mut world = new_world();
                self.run_scenario_within(hub, feature_file, feature, scenario, &mut world, blocker.as_ref())
            })
            .collect();

        if let Err(e) = self.hooks.run_group(HookKind::After, feature) {
            self.report_group_hook_failure(hub, feature_file, feature, HookKind::After, &e);
        }
        reports
    }

    /// Run one scenario: hooks, background, steps, then the pending replay
    pub fn run_scenario(
        &self,
        hub: &mut ReporterHub,
        feature_file: &str,
        feature: &Feature,
        scenario: &Scenario,
        world: &mut W,
    ) -> ScenarioReport {
        self.run_scenario_within(hub, feature_file, feature, scenario, world, None)
    }

    /// Run one scenario, or only replay it when a `before all` hook failed
    fn run_scenario_within(
        &self,
        hub: &mut ReporterHub,
        feature_file: &str,
        feature: &Feature,
        scenario: &Scenario,
        world: &mut W,
        blocker: Option<&Example>,
    ) -> ScenarioReport {
        let mut ctx = ScenarioRunContext::new(feature_file, feature, scenario);
        hub.scenario_started(feature, scenario);

        let background_steps: Vec<Step> = feature.background_steps().cloned().collect();
        let mut background = StepCursor::new(&background_steps);
        let mut steps = StepCursor::new(&scenario.steps);

        if let Some(failure) = blocker {
            ctx.stall(StallOrigin::Hook(HookKind::Before, HookScope::All), failure);
            self.replay_pending(hub, &mut ctx, &mut background, &mut steps);
        } else {
            if let Err(e) = self.hooks.run(HookKind::Before, world, &ctx.tags) {
                self.report_hook_failure(hub, &mut ctx, HookKind::Before, &e);
            }

            if !ctx.is_stalled() {
                self.execute(hub, &mut ctx, &mut background, &mut steps, world);
            }
            if ctx.is_stalled() {
                self.replay_pending(hub, &mut ctx, &mut background, &mut steps);
            }

            if let Err(e) = self.hooks.run(HookKind::After, world, &ctx.tags) {
                self.report_hook_failure(hub, &mut ctx, HookKind::After, &e);
            }
        }

        ctx.transition(Phase::Done);
        let report = ctx.into_report();
        tracing::info!(
            feature = %report.feature,
            scenario = %report.scenario,
            status = ?report.status,
            "scenario finished"
        );
        hub.scenario_finished(&report);
        report
    }

    /// Execution pass, wrapped in the scenario unit
    fn execute(
        &self,
        hub: &mut ReporterHub,
        ctx: &mut ScenarioRunContext<'_>,
        background: &mut StepCursor<'_>,
        steps: &mut StepCursor<'_>,
        world: &mut W,
    ) {
        let stack = hub.visibility();
        let _scenario_unit = stack.enter(Mode::for_unit(self.granular_steps));
        let unit = ctx.scenario_unit();
        hub.example_started(&unit);
        let start = Instant::now();

        let mut clear = true;
        if !background.is_exhausted() {
            ctx.transition(Phase::RunningBackground);
            let _background_unit = stack.enter(Mode::Silence);
            clear = self.drive(hub, ctx, background, world);
        }
        if clear {
            ctx.transition(Phase::RunningScenario);
            self.drive(hub, ctx, steps, world);
        }

        let example = scenario_example(unit, ctx.pending_step(), start.elapsed());
        hub.example_finished(&example);
    }

    /// Pull steps until the cursor is exhausted or one stalls.
    /// Returns false on stall; the rest of the cursor is left for replay.
    fn drive(
        &self,
        hub: &mut ReporterHub,
        ctx: &mut ScenarioRunContext<'_>,
        cursor: &mut StepCursor<'_>,
        world: &mut W,
    ) -> bool {
        while let Some(step) = cursor.next() {
            match self.run_step(hub, ctx, step, world) {
                Ok(example) => ctx.steps.push(example),
                Err(exception) => {
                    tracing::debug!(error = %exception, "step stalled the scenario");
                    ctx.stall(StallOrigin::Step(step.clone()), &exception.example);
                    ctx.steps.push(exception.example);
                    return false;
                }
            }
        }
        true
    }

    /// Resolve and invoke one step as its own unit.
    ///
    /// A non-passing step is returned as a [`StepException`] after it has
    /// been reported, with the step's caller appended to its backtrace.
    pub fn run_step(
        &self,
        hub: &mut ReporterHub,
        ctx: &ScenarioRunContext<'_>,
        step: &Step,
        world: &mut W,
    ) -> Result<Example, StepException> {
        let unit = ctx.step_unit(step);
        let stack = hub.visibility();
        let _step_unit = stack.enter(Mode::for_unit(!self.granular_steps));
        hub.example_started(&unit);

        let start = Instant::now();
        let matched = self.registry.resolve_tagged(&step.description, &ctx.tags);
        let result = match &matched {
            Match::Undefined => Err(StepError::undefined(step.description.as_str())),
            Match::Ambiguous(_) => Err(StepError::ambiguous(
                matched.ambiguity_message().unwrap_or_default(),
            )),
            Match::Single { .. } => {
                self.registry
                    .invoke_tagged(&matched, world, &ctx.tags, &step.extra_args())
            }
        };
        let run_time = start.elapsed();

        let error = match result {
            Ok(()) => {
                let example = Example::passed(unit, run_time);
                hub.example_finished(&example);
                return Ok(example);
            }
            Err(e) => e.with_trace(unit.caller.clone()),
        };

        let example = match error.kind {
            // The message names the undefined step, which may be one this
            // step called through its context
            ErrorKind::Undefined => {
                hub.record_stub(&error.message);
                Example::pending(unit, STEP_DOES_NOT_EXIST, error.kind, run_time)
            }
            kind if kind.is_pending() => Example::pending(unit, error.message.clone(), kind, run_time),
            kind => Example::failed(
                unit,
                Failure {
                    message: error.message.clone(),
                    backtrace: error.backtrace.clone(),
                },
                kind,
                run_time,
            ),
        };
        hub.example_finished(&example);
        Err(StepException { example, error })
    }

    /// Replay pass: record every step left on the cursors as pending
    fn replay_pending<'s>(
        &self,
        hub: &mut ReporterHub,
        ctx: &mut ScenarioRunContext<'_>,
        background: &mut StepCursor<'s>,
        steps: &mut StepCursor<'s>,
    ) {
        let Some(stall) = ctx.pending_step().cloned() else {
            return;
        };
        ctx.transition(Phase::ReplayingPending);
        let stack = hub.visibility();
        let _replay_unit = stack.enter(Mode::Silence);

        for step in background.by_ref().chain(steps.by_ref()) {
            let example = self.replay_step(hub, ctx, step, &stall);
            ctx.steps.push(example);
        }
    }

    /// Record a never-attempted step as pending on `stall`
    fn replay_step(
        &self,
        hub: &mut ReporterHub,
        ctx: &ScenarioRunContext<'_>,
        step: &Step,
        stall: &Stall,
    ) -> Example {
        let unit = ctx.step_unit(step);
        let stack = hub.visibility();
        let _step_unit = stack.enter(Mode::for_unit(!self.granular_steps));
        hub.example_started(&unit);
        let example = Example::pending(
            unit,
            stall.dependency_message(),
            stall.dependency_kind(),
            Duration::ZERO,
        );
        hub.example_finished(&example);
        example
    }

    /// Hook failures are always visible
    fn report_hook_failure(
        &self,
        hub: &mut ReporterHub,
        ctx: &mut ScenarioRunContext<'_>,
        kind: HookKind,
        error: &StepError,
    ) {
        let unit = ctx.hook_unit(kind);
        let stack = hub.visibility();
        let _hook_unit = stack.enter(Mode::Speak);
        hub.example_started(&unit);

        let mut backtrace = error.backtrace.clone();
        backtrace.push(unit.caller.clone());
        let example = Example::failed(
            unit,
            Failure {
                message: error.message.clone(),
                backtrace,
            },
            ErrorKind::HookFailed,
            Duration::ZERO,
        );
        hub.example_finished(&example);
        if kind == HookKind::Before {
            ctx.stall(StallOrigin::Hook(kind, HookScope::Each), &example);
        }
        ctx.hook_failures.push(example);
    }

    /// Report a failing `All` hook as a visible example of its own
    fn report_group_hook_failure(
        &self,
        hub: &mut ReporterHub,
        feature_file: &str,
        feature: &Feature,
        kind: HookKind,
        error: &StepError,
    ) -> Example {
        let description = format!("in `{}' hook for feature {}", HookScope::All.label(kind), feature.name);
        let unit = Unit {
            kind: UnitKind::Hook,
            full_description: description.clone(),
            description,
            feature: feature.name.clone(),
            scenario: String::new(),
            file_path: feature_file.to_string(),
            line: feature.line,
            caller: format!("{}:{}", feature_file, feature.line),
        };
        let stack = hub.visibility();
        let _hook_unit = stack.enter(Mode::Speak);
        hub.example_started(&unit);

        let mut backtrace = error.backtrace.clone();
        backtrace.push(unit.caller.clone());
        let example = Example::failed(
            unit,
            Failure {
                message: error.message.clone(),
                backtrace,
            },
            ErrorKind::HookFailed,
            Duration::ZERO,
        );
        hub.example_finished(&example);
        example
    }
}

impl<W> Default for Engine<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// The scenario unit's record: passed, or carrying the stall's outcome with
/// the stalling step in its full description
fn scenario_example(mut unit: Unit, stall: Option<&Stall>, run_time: Duration) -> Example {
    let Some(stall) = stall else {
        return Example::passed(unit, run_time);
    };
    if let StallOrigin::Step(ref step) = stall.origin {
        unit.full_description = format!("{} -> {}", unit.full_description, step);
    }
    match stall.status {
        Status::Failed => Example::failed(
            unit,
            Failure {
                message: stall.message.clone(),
                backtrace: stall.backtrace.clone(),
            },
            stall.kind,
            run_time,
        ),
        _ => Example::pending(unit, stall.message.clone(), stall.kind, run_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{pending_with, StepError};
    use crate::model::Background;

    #[derive(Default)]
    struct World {
        log: Vec<String>,
    }

    fn engine() -> Engine<World> {
        let mut engine: Engine<World> = Engine::new();
        engine
            .registry
            .step("a step", |w, _| {
                w.log.push("a".into());
                Ok(())
            })
            .unwrap()
            .step("b step", |w, _| {
                w.log.push("b".into());
                Ok(())
            })
            .unwrap()
            .step("it fails", |w, _| {
                w.log.push("fail".into());
                Err(StepError::failed("it broke"))
            })
            .unwrap()
            .step("it is not ready", |w, _| {
                w.log.push("wip".into());
                pending_with("waiting on the API")
            })
            .unwrap();
        engine
    }

    fn run(engine: &Engine<World>, feature: &Feature) -> (ScenarioReport, World, ReporterHub) {
        let mut hub = ReporterHub::silent(false);
        let mut world = World::default();
        let report = engine.run_scenario(&mut hub, "test.feature", feature, &feature.scenarios[0], &mut world);
        (report, world, hub)
    }

    fn feature(steps: Vec<Step>) -> Feature {
        let mut scenario = Scenario::new("s").at_line(2);
        scenario.steps = steps;
        Feature::new("f").scenario(scenario)
    }

    #[test]
    fn test_all_passing() {
        let engine = engine();
        let f = feature(vec![Step::given("a step"), Step::then("b step")]);
        let (report, world, _) = run(&engine, &f);
        assert_eq!(report.status, Status::Passed);
        assert_eq!(report.statuses(), vec![Status::Passed, Status::Passed]);
        assert_eq!(world.log, vec!["a", "b"]);
        assert!(report.stalled_at.is_none());
    }

    #[test]
    fn test_failure_blocks_later_steps() {
        let engine = engine();
        let f = feature(vec![
            Step::given("a step"),
            Step::when("it fails").at_line(4),
            Step::then("b step"),
        ]);
        let (report, world, _) = run(&engine, &f);

        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.statuses(), vec![Status::Passed, Status::Failed, Status::Pending]);
        // b step never ran
        assert_eq!(world.log, vec!["a", "fail"]);

        let failed = &report.steps[1];
        let failure = failed.failure.as_ref().unwrap();
        assert_eq!(failure.message, "it broke");
        assert_eq!(failure.backtrace.last().unwrap(), "test.feature:4 in step `it fails'");

        let blocked = &report.steps[2];
        assert_eq!(blocked.error_kind, Some(ErrorKind::DependencyFailed));
        assert_eq!(
            blocked.pending_message.as_deref(),
            Some("Depends on step `When it fails' which failed")
        );
        assert_eq!(report.stalled_at.as_deref(), Some("When it fails"));
    }

    #[test]
    fn test_undefined_step_is_pending() {
        let engine = engine();
        let f = feature(vec![Step::given("a step"), Step::when("missing"), Step::then("b step")]);
        let (report, _, _) = run(&engine, &f);

        assert_eq!(report.status, Status::Pending);
        assert_eq!(report.steps[1].pending_message.as_deref(), Some(STEP_DOES_NOT_EXIST));
        assert_eq!(report.steps[1].error_kind, Some(ErrorKind::Undefined));
        assert_eq!(report.steps[2].error_kind, Some(ErrorKind::DependencyPending));
        assert_eq!(
            report.steps[2].pending_message.as_deref(),
            Some("Depends on step `When missing' which is pending")
        );
    }

    #[test]
    fn test_declared_pending_keeps_message() {
        let engine = engine();
        let f = feature(vec![Step::given("it is not ready"), Step::then("b step")]);
        let (report, world, _) = run(&engine, &f);
        assert_eq!(report.status, Status::Pending);
        assert_eq!(report.steps[0].pending_message.as_deref(), Some("waiting on the API"));
        assert_eq!(report.steps[0].error_kind, Some(ErrorKind::PendingDeclared));
        assert_eq!(world.log, vec!["wip"]);
    }

    #[test]
    fn test_ambiguous_step_fails_with_traces() {
        let mut engine = engine();
        engine.registry.step("a {word}", |_, _| Ok(())).unwrap();
        let f = feature(vec![Step::given("a step"), Step::then("b step")]);
        let (report, world, _) = run(&engine, &f);

        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.steps[0].error_kind, Some(ErrorKind::Ambiguous));
        let message = &report.steps[0].failure.as_ref().unwrap().message;
        assert!(message.starts_with("Ambiguous step definitions\n"));
        assert!(message.contains("`a step' defined at"));
        assert!(message.contains("`a {word}' defined at"));
        assert!(world.log.is_empty());
    }

    #[test]
    fn test_background_runs_first_and_failure_stalls_scenario() {
        let engine = engine();
        let mut f = feature(vec![Step::given("a step"), Step::then("b step")]);
        f.backgrounds.push(Background::new(vec![Step::given("it fails")]));
        let (report, world, _) = run(&engine, &f);

        assert_eq!(world.log, vec!["fail"]);
        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.statuses(), vec![Status::Failed, Status::Pending, Status::Pending]);
    }

    #[test]
    fn test_background_steps_precede_scenario_steps() {
        let engine = engine();
        let mut f = feature(vec![Step::then("b step")]);
        f.backgrounds.push(Background::new(vec![Step::given("a step")]));
        let (report, world, _) = run(&engine, &f);
        assert_eq!(world.log, vec!["a", "b"]);
        assert_eq!(report.steps.len(), 2);
    }

    #[test]
    fn test_pending_step_set_once() {
        let feature = feature(vec![Step::given("a step")]);
        let mut ctx = ScenarioRunContext::new("x.feature", &feature, &feature.scenarios[0]);
        let unit = ctx.step_unit(&feature.scenarios[0].steps[0]);
        let first = Example::pending(unit.clone(), "one", ErrorKind::Undefined, Duration::ZERO);
        let second = Example::failed(
            unit,
            Failure { message: "two".into(), backtrace: vec![] },
            ErrorKind::StepFailed,
            Duration::ZERO,
        );

        assert!(ctx.stall(StallOrigin::Step(Step::given("one")), &first));
        assert!(!ctx.stall(StallOrigin::Step(Step::given("two")), &second));
        assert_eq!(ctx.pending_step().unwrap().message, "one");
        assert_eq!(ctx.outcome(), Status::Pending);
        assert_eq!(ctx.phase(), Phase::Stalled);
    }

    #[test]
    fn test_before_hook_failure_blocks_steps() {
        let mut engine = engine();
        engine.hooks.before_each(|_| Err(StepError::failed("no database")));
        let f = feature(vec![Step::given("a step")]);
        let (report, world, hub) = run(&engine, &f);

        assert!(world.log.is_empty());
        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.hook_failures.len(), 1);
        assert_eq!(report.hook_failures[0].description(), "in `before' hook for scenario s");
        assert_eq!(
            report.steps[0].pending_message.as_deref(),
            Some("Depends on `before' hook which failed")
        );
        // the hook failure and the replayed step are both visible
        assert_eq!(hub.summary().failures, 1);
        assert_eq!(hub.summary().examples, 2);
    }

    #[test]
    fn test_after_hook_runs_after_stall_and_fails_scenario() {
        let mut engine = engine();
        engine.hooks.after("cleanup", |w: &mut World| {
            w.log.push("after".into());
            Err(StepError::failed("cleanup broke"))
        });
        let mut f = feature(vec![Step::given("missing"), Step::then("b step")]);
        f.scenarios[0].tags.push("cleanup".into());
        let (report, world, _) = run(&engine, &f);

        assert_eq!(world.log, vec!["after"]);
        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.stalled_at.as_deref(), Some("Given missing"));
    }

    #[test]
    fn test_granular_counts_steps() {
        let engine = engine();
        let f = feature(vec![Step::given("a step"), Step::when("it fails"), Step::then("b step")]);
        let (_, _, hub) = run(&engine, &f);
        let summary = hub.summary();
        assert_eq!(summary.examples, 3);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.pending, 1);
    }

    #[test]
    fn test_non_granular_counts_scenario_once() {
        let mut engine = engine();
        engine.granular_steps = false;
        let f = feature(vec![Step::given("a step"), Step::when("it fails"), Step::then("b step")]);
        let (report, _, hub) = run(&engine, &f);

        // step records are still collected
        assert_eq!(report.statuses(), vec![Status::Passed, Status::Failed, Status::Pending]);
        let summary = hub.summary();
        assert_eq!(summary.examples, 1);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.pending, 0);
    }

    #[test]
    fn test_tag_scoped_steps_follow_feature_tags() {
        let mut engine = engine();
        engine.registry.steps_for("admin").step("I am root", |_, _| Ok(())).unwrap();

        let f = feature(vec![Step::given("I am root")]);
        let (report, _, _) = run(&engine, &f);
        assert_eq!(report.status, Status::Pending);

        let f = feature(vec![Step::given("I am root")]).tag("admin");
        let (report, _, _) = run(&engine, &f);
        assert_eq!(report.status, Status::Passed);
    }

    #[test]
    fn test_step_calls_tag_scoped_step_of_its_scenario() {
        let mut engine = engine();
        engine.registry.steps_for("admin").step("I am root", |w, _| {
            w.log.push("root".into());
            Ok(())
        }).unwrap();
        engine.registry.step("I sign in", |ctx, _| ctx.step("I am root", &[])).unwrap();

        let f = feature(vec![Step::given("I sign in"), Step::then("b step")]).tag("admin");
        let (report, world, _) = run(&engine, &f);
        assert_eq!(report.status, Status::Passed);
        assert_eq!(world.log, vec!["root", "b"]);

        // untagged, the nested step is undefined and gets the stub
        let f = feature(vec![Step::given("I sign in")]);
        let mut hub = ReporterHub::silent(true);
        let mut world = World::default();
        let report = engine.run_scenario(&mut hub, "x.feature", &f, &f.scenarios[0], &mut world);
        assert_eq!(report.status, Status::Pending);
        assert_eq!(report.steps[0].pending_message.as_deref(), Some(STEP_DOES_NOT_EXIST));
        assert_eq!(hub.stubs().len(), 1);
        assert!(hub.stubs().iter().all(|stub| stub.contains("\"I am root\"")));
    }

    #[test]
    fn test_undefined_step_records_stub() {
        let engine = engine();
        let f = feature(vec![Step::given("there is an unimplemented step")]);
        let mut hub = ReporterHub::silent(true);
        let mut world = World::default();
        engine.run_scenario(&mut hub, "x.feature", &f, &f.scenarios[0], &mut world);
        assert_eq!(hub.stubs().len(), 1);
    }

    #[test]
    fn test_run_feature_uses_fresh_world_per_scenario() {
        let engine = engine();
        let f = Feature::new("f")
            .scenario(Scenario::new("one").step(Step::given("a step")))
            .scenario(Scenario::new("two").step(Step::given("b step")));
        let mut hub = ReporterHub::silent(false);
        let mut worlds = 0;
        let reports = engine.run_feature(&mut hub, "x.feature", &f, || {
            worlds += 1;
            World::default()
        });
        assert_eq!(worlds, 2);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == Status::Passed));
    }

    fn two_scenarios() -> Feature {
        Feature::new("f")
            .scenario(Scenario::new("one").step(Step::given("a step")))
            .scenario(Scenario::new("two").step(Step::given("b step")))
    }

    #[test]
    fn test_all_hooks_run_once_per_feature() {
        use std::sync::{Arc, Mutex};

        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine();
        let log = Arc::clone(&calls);
        engine.hooks.before_feature(move |feature| {
            log.lock().unwrap().push(format!("before all {}", feature.name));
            Ok(())
        });
        let log = Arc::clone(&calls);
        engine.hooks.after_feature(move |_| {
            log.lock().unwrap().push("after all".to_string());
            Ok(())
        });
        let log = Arc::clone(&calls);
        engine.hooks.before_each(move |_: &mut World| {
            log.lock().unwrap().push("before".to_string());
            Ok(())
        });

        let f = two_scenarios();
        let mut hub = ReporterHub::silent(false);
        let reports = engine.run_feature(&mut hub, "x.feature", &f, World::default);

        assert!(reports.iter().all(|r| r.status == Status::Passed));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["before all f", "before", "before", "after all"]
        );
    }

    #[test]
    fn test_before_all_failure_blocks_every_scenario() {
        let mut engine = engine();
        engine.hooks.before_all("db", |_| Err(StepError::failed("no database")));
        engine.hooks.before_each(|w: &mut World| {
            w.log.push("before".into());
            Ok(())
        });

        let f = two_scenarios().tag("db");
        let mut hub = ReporterHub::silent(false);
        let reports = engine.run_feature(&mut hub, "x.feature", &f, World::default);

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert_eq!(report.status, Status::Failed);
            assert_eq!(report.stalled_at.as_deref(), Some("before all hook"));
            assert_eq!(report.steps[0].error_kind, Some(ErrorKind::DependencyFailed));
            assert_eq!(
                report.steps[0].pending_message.as_deref(),
                Some("Depends on `before all' hook which failed")
            );
        }
        // one visible hook failure plus one replayed step per scenario
        assert_eq!(hub.summary().failures, 1);
        assert_eq!(hub.summary().examples, 3);
    }

    #[test]
    fn test_after_all_failure_is_reported_once() {
        let mut engine = engine();
        engine.granular_steps = false;
        engine.hooks.after_feature(|_| Err(StepError::failed("teardown broke")));

        let f = two_scenarios();
        let mut hub = ReporterHub::silent(false);
        let reports = engine.run_feature(&mut hub, "x.feature", &f, World::default);

        assert!(reports.iter().all(|r| r.status == Status::Passed));
        assert_eq!(hub.summary().examples, 3);
        assert_eq!(hub.summary().failures, 1);
    }
}
