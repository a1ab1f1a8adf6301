//! emx-stepspec: A step-driven scenario engine
//!
//! Inspired by turnip-style Gherkin runners.
//!
//! # Overview
//!
//! Features are trees of scenarios and steps, handed to the engine already
//! built (see [`Builder`]; [`JsonBuilder`] reads `*.feature.json` trees).
//! Each step's text is matched against a [`Registry`] of step definitions,
//! the matching body runs against a per-scenario world, and every step is
//! reported as its own example.
//!
//! Once a step is undefined, ambiguous, pending or fails, the scenario
//! stalls: the remaining steps are not run but are still reported, as
//! pending, with a message naming the step they depend on.
//!
//! # Step patterns
//!
//! ```text
//! there is a monster
//! the monster has {int} hit points
//! I attack it with {word}
//! I say {string}
//! ```
//!
//! | Placeholder | Matches |
//! |-------------|---------|
//! | `{word}` | one non-space token |
//! | `{int}` | an optionally signed integer |
//! | `{float}` | a signed decimal number |
//! | `{string}` | a quoted string, passed without its quotes |
//! | `{name}` (other) | a quoted string or a single token |
//!
//! # Outcomes
//!
//! | Step | Reported as |
//! |------|-------------|
//! | matched, body returns `Ok` | passed |
//! | matched, body returns `Err` or panics | failed |
//! | matched, body returns [`pending()`] | pending with the body's reason |
//! | no definition matches | pending, `step does not exist` |
//! | several definitions match | failed, `Ambiguous step definitions` |
//! | after a stall | pending, ``Depends on step `...' which failed`` |

mod builder;
mod engine;
mod error;
mod hooks;
mod model;
mod registry;
mod runner;
mod sequencer;
mod visibility;
pub mod formatters;
pub mod reporter;

pub use builder::{Builder, JsonBuilder};
pub use engine::{Engine, Phase, ScenarioReport, ScenarioRunContext, Stall, StallOrigin, StepException};
pub use error::{pending, pending_with, ErrorKind, LoadError, StepError, StepResult, NO_REASON_GIVEN, STEP_DOES_NOT_EXIST};
pub use hooks::{GroupHookFn, HookFn, HookKind, HookScope, Hooks};
pub use model::{Arg, Background, Feature, Keyword, Scenario, Step, Table};
pub use registry::{Candidate, Match, Registry, StepBody, StepContext, StepDefinition, TaggedSteps};
pub use reporter::{Example, Reporter, ReporterHub, Status, Summary, Unit, UnitKind};
pub use runner::{RunConfig, RunResult, Runner, RunnerBuilder, STUBS_ENV, VERBOSE_ENV};
pub use sequencer::{CursorState, StepCursor};
pub use visibility::{render_stubs, stub_for, Mode, OutputStack, StubBuffer, VisibilityGuard};

// Convenience functions for cargo test integration
pub use runner::{run, run_and_assert};
