//! Reporting visibility
//!
//! Internal bookkeeping units (the background pass, the pending-replay pass,
//! hidden step units) run fully instrumented but must not reach formatters or
//! summary counts. [`OutputStack`] tracks a stack of speak/silence modes;
//! entering a mode returns a guard that pops it again on every exit path,
//! panics included.
//!
//! [`StubBuffer`] collects step-definition skeletons for undefined steps.

use std::cell::RefCell;
use indexmap::IndexSet;
use serde::Serialize;

/// Whether units run in this mode are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Speak,
    Silence,
}

impl Mode {
    /// `Silence` for silent units, `Speak` otherwise
    pub fn for_unit(silent: bool) -> Self {
        if silent {
            Mode::Silence
        } else {
            Mode::Speak
        }
    }
}

/// Stack of visibility modes for one run. Starts as `[Speak]`.
#[derive(Debug)]
pub struct OutputStack {
    modes: RefCell<Vec<Mode>>,
    /// False when the reporter cannot honour visibility; everything speaks
    enabled: bool,
}

impl OutputStack {
    pub fn new() -> Self {
        Self {
            modes: RefCell::new(vec![Mode::Speak]),
            enabled: true,
        }
    }

    /// A stack that ignores `enter` and always speaks
    pub fn always_visible() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Push `mode` until the returned guard is dropped
    pub fn enter(&self, mode: Mode) -> VisibilityGuard<'_> {
        if self.enabled {
            self.modes.borrow_mut().push(mode);
        }
        VisibilityGuard {
            stack: self,
            pushed: self.enabled,
        }
    }

    fn exit(&self) {
        let mut modes = self.modes.borrow_mut();
        // The base `Speak` is never popped
        if modes.len() > 1 {
            modes.pop();
        }
    }

    pub fn current(&self) -> Mode {
        self.modes.borrow().last().copied().unwrap_or(Mode::Speak)
    }

    pub fn currently_visible(&self) -> bool {
        self.current() == Mode::Speak
    }

    /// Number of modes on the stack, including the base
    pub fn depth(&self) -> usize {
        self.modes.borrow().len()
    }
}

impl Default for OutputStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope of an entered mode; pops it when dropped
#[must_use = "the mode is popped as soon as the guard is dropped"]
pub struct VisibilityGuard<'a> {
    stack: &'a OutputStack,
    pushed: bool,
}

impl VisibilityGuard<'_> {
    /// Leave the mode now rather than at end of scope
    pub fn exit(self) {}
}

impl Drop for VisibilityGuard<'_> {
    fn drop(&mut self) {
        if self.pushed {
            self.stack.exit();
        }
    }
}

/// De-duplicated, insertion-ordered step stubs for undefined steps
#[derive(Debug, Default)]
pub struct StubBuffer {
    enabled: bool,
    stubs: IndexSet<String>,
}

impl StubBuffer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            stubs: IndexSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Add a ready-to-paste skeleton for `description`. No-op when disabled.
    pub fn record(&mut self, description: &str) {
        if self.enabled {
            self.stubs.insert(stub_for(description));
        }
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.stubs.iter().map(|s| s.as_str())
    }

    /// Drain the buffer. Returns `None` when there is nothing to show,
    /// so a second flush is empty.
    pub fn flush(&mut self) -> Option<Vec<String>> {
        if self.stubs.is_empty() {
            return None;
        }
        Some(self.stubs.drain(..).collect())
    }
}

/// Stubs under a `Missing Steps:` heading, as plain text
pub fn render_stubs(stubs: &[String]) -> String {
    format!("\nMissing Steps:\n\n{}", stubs.join("\n"))
}

/// Skeleton step definition for a description
pub fn stub_for(description: &str) -> String {
    format!(
        "registry.step({:?}, |world, args| {{\n    pending()\n}})?;\n",
        description
    )
}
