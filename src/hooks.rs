//! Scenario hooks
//!
//! `Each` hooks run around every scenario whose tags (or whose feature's
//! tags) include the hook's tag, against that scenario's world. `All` hooks
//! run once around a feature's scenarios when the feature or any of its
//! scenarios carries the tag; they see the feature, not a world.
//! Untagged hooks always apply.
//!
//! Before hooks run in registration order and stop at the first failure;
//! after hooks run in reverse registration order and all of them run.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use crate::error::{ErrorKind, StepError, StepResult};
use crate::model::Feature;

/// A per-scenario hook body
pub type HookFn<W> = Box<dyn Fn(&mut W) -> StepResult + Send + Sync>;

/// A once-per-feature hook body
pub type GroupHookFn = Box<dyn Fn(&Feature) -> StepResult + Send + Sync>;

/// When a hook runs relative to the scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Before,
    After,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Before => f.write_str("before"),
            HookKind::After => f.write_str("after"),
        }
    }
}

/// How often a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookScope {
    /// Around every scenario
    Each,
    /// Once around all of a feature's scenarios
    All,
}

impl HookScope {
    /// Name used in reports: `before`, `after all`
    pub fn label(self, kind: HookKind) -> String {
        match self {
            HookScope::Each => kind.to_string(),
            HookScope::All => format!("{} all", kind),
        }
    }
}

enum HookBody<W> {
    Scenario(HookFn<W>),
    Group(GroupHookFn),
}

struct Hook<W> {
    kind: HookKind,
    tag: Option<String>,
    body: HookBody<W>,
}

impl<W> Hook<W> {
    fn scope(&self) -> HookScope {
        match self.body {
            HookBody::Scenario(_) => HookScope::Each,
            HookBody::Group(_) => HookScope::All,
        }
    }

    fn applies_to(&self, tags: &[String]) -> bool {
        self.tag.as_ref().map_or(true, |t| tags.contains(t))
    }
}

/// Tag-keyed before/after hook registry
pub struct Hooks<W> {
    hooks: Vec<Hook<W>>,
}

impl<W> Hooks<W> {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Run `body` before each scenario tagged `tag`
    pub fn before<F>(&mut self, tag: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&mut W) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::Before, Some(tag.into()), HookBody::Scenario(Box::new(body)))
    }

    /// Run `body` after each scenario tagged `tag`
    pub fn after<F>(&mut self, tag: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&mut W) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::After, Some(tag.into()), HookBody::Scenario(Box::new(body)))
    }

    /// Run `body` before every scenario
    pub fn before_each<F>(&mut self, body: F) -> &mut Self
    where
        F: Fn(&mut W) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::Before, None, HookBody::Scenario(Box::new(body)))
    }

    /// Run `body` after every scenario
    pub fn after_each<F>(&mut self, body: F) -> &mut Self
    where
        F: Fn(&mut W) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::After, None, HookBody::Scenario(Box::new(body)))
    }

    /// Run `body` once before the scenarios of a feature tagged `tag`,
    /// or of a feature with any scenario tagged `tag`
    pub fn before_all<F>(&mut self, tag: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&Feature) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::Before, Some(tag.into()), HookBody::Group(Box::new(body)))
    }

    /// Run `body` once after the scenarios of a feature tagged `tag`,
    /// or of a feature with any scenario tagged `tag`
    pub fn after_all<F>(&mut self, tag: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&Feature) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::After, Some(tag.into()), HookBody::Group(Box::new(body)))
    }

    /// Run `body` once before every feature's scenarios
    pub fn before_feature<F>(&mut self, body: F) -> &mut Self
    where
        F: Fn(&Feature) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::Before, None, HookBody::Group(Box::new(body)))
    }

    /// Run `body` once after every feature's scenarios
    pub fn after_feature<F>(&mut self, body: F) -> &mut Self
    where
        F: Fn(&Feature) -> StepResult + Send + Sync + 'static,
    {
        self.push(HookKind::After, None, HookBody::Group(Box::new(body)))
    }

    fn push(&mut self, kind: HookKind, tag: Option<String>, body: HookBody<W>) -> &mut Self {
        self.hooks.push(Hook { kind, tag, body });
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every `Each` hook of `kind` that applies to `tags`.
    ///
    /// Returns the first failure as a `HookFailed` error.
    pub fn run(&self, kind: HookKind, world: &mut W, tags: &[String]) -> StepResult {
        self.run_scoped(kind, HookScope::Each, tags, |body| match body {
            HookBody::Scenario(f) => f(world),
            HookBody::Group(_) => Ok(()),
        })
    }

    /// Run every `All` hook of `kind` that applies to the feature or to any
    /// of its scenarios
    pub fn run_group(&self, kind: HookKind, feature: &Feature) -> StepResult {
        let tags = group_tags(feature);
        self.run_scoped(kind, HookScope::All, &tags, |body| match body {
            HookBody::Group(f) => f(feature),
            HookBody::Scenario(_) => Ok(()),
        })
    }

    fn run_scoped<F>(&self, kind: HookKind, scope: HookScope, tags: &[String], mut call: F) -> StepResult
    where
        F: FnMut(&HookBody<W>) -> StepResult,
    {
        let mut selected: Vec<&Hook<W>> = self
            .hooks
            .iter()
            .filter(|h| h.kind == kind && h.scope() == scope && h.applies_to(tags))
            .collect();
        if kind == HookKind::After {
            selected.reverse();
        }

        let mut first_error = None;
        for hook in selected {
            let result = panic::catch_unwind(AssertUnwindSafe(|| call(&hook.body)))
                .unwrap_or_else(|payload| {
                    Err(StepError::failed(crate::registry::panic_message(payload.as_ref())))
                });
            if let Err(e) = result {
                tracing::warn!(hook = %scope.label(kind), tag = ?hook.tag, error = %e, "hook failed");
                let e = StepError {
                    kind: ErrorKind::HookFailed,
                    ..e
                };
                if kind == HookKind::Before {
                    return Err(e);
                }
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Feature tags followed by every scenario's tags
fn group_tags(feature: &Feature) -> Vec<String> {
    feature
        .tags
        .iter()
        .chain(feature.scenarios.iter().flat_map(|s| s.tags.iter()))
        .cloned()
        .collect()
}

impl<W> Default for Hooks<W> {
    fn default() -> Self {
        Self::new()
    }
}
