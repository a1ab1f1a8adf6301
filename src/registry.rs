//! Step registry and matcher
//!
//! The registry holds step definitions in registration order. Resolving a
//! description is a linear scan over every definition in scope; the number of
//! hits decides the [`Match`] variant. Overlapping patterns are allowed at
//! registration time; they only surface as [`Match::Ambiguous`] when a
//! description actually hits more than one of them.
//!
//! # Pattern syntax
//!
//! | Placeholder | Matches |
//! |-------------|---------|
//! | `{word}` | one non-space token |
//! | `{int}` | a signed integer |
//! | `{float}` | a signed decimal number |
//! | `{string}` | `"double"` or `'single'` quoted text, bound without quotes |
//! | `{anything_else}` | a quoted string or one non-space token |
//!
//! Custom placeholders are declared with [`Registry::placeholder`].
//!
//! Bodies receive a [`StepContext`], which dereferences to the scenario
//! world and can run other steps by description with [`StepContext::step`].

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe, Location};
use regex::Regex;
use crate::error::{StepError, StepResult};
use crate::model::Arg;

/// A step body: receives the step context and its arguments
pub type StepBody<W> = Box<dyn Fn(&mut StepContext<'_, W>, &[Arg]) -> StepResult + Send + Sync>;

/// What a step body runs against: the scenario world, plus the registry and
/// the scenario's tags for calling other steps
pub struct StepContext<'a, W> {
    world: &'a mut W,
    registry: &'a Registry<W>,
    tags: &'a [String],
}

impl<'a, W> StepContext<'a, W> {
    pub fn world(&mut self) -> &mut W {
        &mut *self.world
    }

    /// Feature tags followed by scenario tags
    pub fn tags(&self) -> &[String] {
        self.tags
    }

    /// Run another step by description, resolved the way the scenario's own
    /// steps are, including definitions scoped to its tags.
    ///
    /// An undefined step comes back as an `Undefined` error carrying the
    /// description.
    pub fn step(&mut self, description: &str, extra_args: &[Arg]) -> StepResult {
        let registry = self.registry;
        let matched = registry.resolve_tagged(description, self.tags);
        if matched.is_undefined() {
            return Err(StepError::undefined(description));
        }
        registry.invoke_tagged(&matched, &mut *self.world, self.tags, extra_args)
    }
}

impl<W> Deref for StepContext<'_, W> {
    type Target = W;

    fn deref(&self) -> &W {
        &*self.world
    }
}

impl<W> DerefMut for StepContext<'_, W> {
    fn deref_mut(&mut self) -> &mut W {
        &mut *self.world
    }
}

/// Regex used for placeholder names that were never declared
const DEFAULT_PLACEHOLDER: &str = r#""[^"]*"|'[^']*'|[^\s]+"#;

/// A placeholder usable as `{name}` in step patterns
#[derive(Debug, Clone)]
struct Placeholder {
    regex: String,
    /// Strip surrounding quotes from the bound value
    unquote: bool,
}

/// A registered step definition
pub struct StepDefinition<W> {
    pattern: String,
    regex: Regex,
    /// Per-placeholder unquote flags, in capture order
    unquote: Vec<bool>,
    /// Only matches scenarios carrying this tag
    tag: Option<String>,
    location: &'static Location<'static>,
    body: StepBody<W>,
}

impl<W> StepDefinition<W> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Where the definition was registered, as `file:line`
    pub fn location(&self) -> String {
        format!("{}:{}", self.location.file(), self.location.line())
    }

    /// Human-readable line used in ambiguity reports
    pub fn trace(&self) -> String {
        format!("`{}' defined at {}", self.pattern, self.location())
    }

    /// Match the description, returning bound placeholder values
    fn captures(&self, description: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(description)?;
        let params = self
            .unquote
            .iter()
            .enumerate()
            .map(|(i, &unquote)| {
                let value = caps
                    .name(&format!("p{}", i))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                if unquote {
                    strip_quotes(value).to_string()
                } else {
                    value.to_string()
                }
            })
            .collect();
        Some(params)
    }
}

impl<W> std::fmt::Debug for StepDefinition<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDefinition")
            .field("pattern", &self.pattern)
            .field("tag", &self.tag)
            .field("location", &self.location())
            .finish()
    }
}

/// One competing definition of an ambiguous match
#[derive(Debug)]
pub struct Candidate<'r, W> {
    pub definition: &'r StepDefinition<W>,
    pub trace: String,
}

/// Result of resolving a description against the registry
#[derive(Debug)]
pub enum Match<'r, W> {
    /// No definition matches
    Undefined,
    /// Exactly one definition matches
    Single {
        definition: &'r StepDefinition<W>,
        params: Vec<String>,
    },
    /// More than one definition matches
    Ambiguous(Vec<Candidate<'r, W>>),
}

impl<'r, W> Match<'r, W> {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Match::Undefined)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Match::Ambiguous(_))
    }

    /// Failure message listing every competing definition, one per line
    pub fn ambiguity_message(&self) -> Option<String> {
        match self {
            Match::Ambiguous(candidates) => {
                let mut lines = vec!["Ambiguous step definitions".to_string()];
                lines.extend(candidates.iter().map(|c| c.trace.clone()));
                Some(lines.join("\n"))
            }
            _ => None,
        }
    }
}

/// Ordered list of step definitions plus the placeholder table
pub struct Registry<W> {
    definitions: Vec<StepDefinition<W>>,
    placeholders: HashMap<String, Placeholder>,
}

impl<W> Registry<W> {
    /// Create a registry with the built-in placeholders
    pub fn new() -> Self {
        let mut placeholders = HashMap::new();
        let builtin = [
            ("word", r"[^\s]+", false),
            ("int", r"-?\d+", false),
            ("float", r"-?\d+(?:\.\d+)?", false),
            ("string", r#""[^"]*"|'[^']*'"#, true),
        ];
        for (name, regex, unquote) in builtin {
            placeholders.insert(
                name.to_string(),
                Placeholder { regex: regex.to_string(), unquote },
            );
        }
        Self {
            definitions: Vec::new(),
            placeholders,
        }
    }

    /// Declare a custom placeholder. Only definitions registered afterwards see it.
    pub fn placeholder(&mut self, name: impl Into<String>, regex: &str) -> Result<&mut Self, regex::Error> {
        // Validate on its own so a bad placeholder is reported here,
        // not at the first definition that uses it.
        Regex::new(regex)?;
        self.placeholders.insert(
            name.into(),
            Placeholder { regex: regex.to_string(), unquote: false },
        );
        Ok(self)
    }

    /// Register a global step definition
    #[track_caller]
    pub fn step<F>(&mut self, pattern: &str, body: F) -> Result<&mut Self, regex::Error>
    where
        F: Fn(&mut StepContext<'_, W>, &[Arg]) -> StepResult + Send + Sync + 'static,
    {
        let location = Location::caller();
        self.add(pattern, None, location, Box::new(body))?;
        Ok(self)
    }

    /// Open a tag scope: definitions registered through it only match
    /// scenarios carrying `tag`
    pub fn steps_for(&mut self, tag: impl Into<String>) -> TaggedSteps<'_, W> {
        TaggedSteps {
            registry: self,
            tag: tag.into(),
        }
    }

    fn add(
        &mut self,
        pattern: &str,
        tag: Option<String>,
        location: &'static Location<'static>,
        body: StepBody<W>,
    ) -> Result<(), regex::Error> {
        let (regex, unquote) = self.compile(pattern)?;
        tracing::debug!(pattern, tag = ?tag, "registered step definition");
        self.definitions.push(StepDefinition {
            pattern: pattern.to_string(),
            regex,
            unquote,
            tag,
            location,
            body,
        });
        Ok(())
    }

    /// Translate a pattern into an anchored regex with one named group per placeholder
    fn compile(&self, pattern: &str) -> Result<(Regex, Vec<bool>), regex::Error> {
        let mut source = String::from("^");
        let mut unquote = Vec::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            let name = &rest[open + 1..close];
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                // Not a placeholder; keep the brace literally
                source.push_str(&regex::escape(&rest[..=open]));
                rest = &rest[open + 1..];
                continue;
            }
            source.push_str(&regex::escape(&rest[..open]));
            let (regex, strip) = match self.placeholders.get(name) {
                Some(p) => (p.regex.as_str(), p.unquote),
                None => (DEFAULT_PLACEHOLDER, true),
            };
            source.push_str(&format!("(?P<p{}>{})", unquote.len(), regex));
            unquote.push(strip);
            rest = &rest[close + 1..];
        }
        source.push_str(&regex::escape(rest));
        source.push('$');

        Ok((Regex::new(&source)?, unquote))
    }

    /// Number of registered definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Resolve against global definitions only
    pub fn resolve(&self, description: &str) -> Match<'_, W> {
        self.resolve_tagged(description, &[])
    }

    /// Resolve against global definitions and those scoped to any of `tags`
    pub fn resolve_tagged(&self, description: &str, tags: &[String]) -> Match<'_, W> {
        let mut hits: Vec<(&StepDefinition<W>, Vec<String>)> = self
            .definitions
            .iter()
            .filter(|d| d.tag.as_ref().map_or(true, |t| tags.contains(t)))
            .filter_map(|d| d.captures(description).map(|params| (d, params)))
            .collect();

        match hits.len() {
            0 => {
                tracing::debug!(description, "no step definition matches");
                Match::Undefined
            }
            1 => {
                let (definition, params) = hits.remove(0);
                Match::Single { definition, params }
            }
            n => {
                tracing::debug!(description, candidates = n, "ambiguous step");
                Match::Ambiguous(
                    hits.into_iter()
                        .map(|(definition, _)| Candidate {
                            definition,
                            trace: definition.trace(),
                        })
                        .collect(),
                )
            }
        }
    }

    /// Call the matched body with bound params followed by `extra_args`.
    ///
    /// Errors returned by the body come back unchanged; a panic inside the
    /// body becomes a `StepFailed` error carrying the panic message.
    pub fn invoke(&self, matched: &Match<'_, W>, world: &mut W, extra_args: &[Arg]) -> StepResult {
        self.invoke_tagged(matched, world, &[], extra_args)
    }

    /// Like [`invoke`](Self::invoke); steps the body runs through its
    /// context also see definitions scoped to `tags`
    pub fn invoke_tagged(
        &self,
        matched: &Match<'_, W>,
        world: &mut W,
        tags: &[String],
        extra_args: &[Arg],
    ) -> StepResult {
        match matched {
            Match::Undefined => Err(StepError::undefined(crate::error::STEP_DOES_NOT_EXIST)),
            Match::Ambiguous(_) => Err(StepError::ambiguous(
                matched.ambiguity_message().unwrap_or_default(),
            )),
            Match::Single { definition, params } => {
                let mut args: Vec<Arg> = params.iter().cloned().map(Arg::Text).collect();
                args.extend_from_slice(extra_args);
                let mut ctx = StepContext {
                    world,
                    registry: self,
                    tags,
                };
                match panic::catch_unwind(AssertUnwindSafe(|| (definition.body)(&mut ctx, &args))) {
                    Ok(result) => result,
                    Err(payload) => Err(StepError::failed(panic_message(payload.as_ref()))
                        .with_trace(definition.location())),
                }
            }
        }
    }
}

impl<W> Default for Registry<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle for a tag-scoped step set
pub struct TaggedSteps<'a, W> {
    registry: &'a mut Registry<W>,
    tag: String,
}

impl<'a, W> TaggedSteps<'a, W> {
    #[track_caller]
    pub fn step<F>(&mut self, pattern: &str, body: F) -> Result<&mut Self, regex::Error>
    where
        F: Fn(&mut StepContext<'_, W>, &[Arg]) -> StepResult + Send + Sync + 'static,
    {
        let location = Location::caller();
        self.registry
            .add(pattern, Some(self.tag.clone()), location, Box::new(body))?;
        Ok(self)
    }
}

fn strip_quotes(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "step panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Table;

    fn noop(_: &mut StepContext<'_, Vec<String>>, _: &[Arg]) -> StepResult {
        Ok(())
    }

    fn record(world: &mut StepContext<'_, Vec<String>>, args: &[Arg]) -> StepResult {
        for arg in args {
            match arg {
                Arg::Text(s) => world.push(s.clone()),
                Arg::Table(t) => world.push(format!("table:{}", t.rows.len())),
                Arg::DocString(d) => world.push(format!("doc:{}", d)),
            }
        }
        Ok(())
    }

    #[test]
    fn test_resolve_empty_registry() {
        let registry: Registry<Vec<String>> = Registry::new();
        assert!(registry.resolve("anything at all").is_undefined());
    }

    #[test]
    fn test_resolve_non_matching() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.step("a step", noop).unwrap();
        assert!(registry.resolve("a step with more").is_undefined());
        assert!(registry.resolve("not a step").is_undefined());
    }

    #[test]
    fn test_resolve_single_with_params() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.step("there are {int} monsters called {word}", noop).unwrap();
        match registry.resolve("there are 3 monsters called Bob") {
            Match::Single { params, definition } => {
                assert_eq!(params, vec!["3", "Bob"]);
                assert_eq!(definition.pattern(), "there are {int} monsters called {word}");
            }
            other => panic!("expected single match, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_ambiguous_lists_every_definition() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.step("a {word} thing", noop).unwrap();
        registry.step("a red thing", noop).unwrap();

        let matched = registry.resolve("a red thing");
        match &matched {
            Match::Ambiguous(candidates) => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates[0].trace.contains("a {word} thing"));
                assert!(candidates[1].trace.contains("a red thing"));
                assert!(candidates[0].trace.contains("registry.rs"));
            }
            other => panic!("expected ambiguous match, got {:?}", other),
        }
        let message = matched.ambiguity_message().unwrap();
        assert_eq!(message.lines().count(), 3);
        assert!(message.starts_with("Ambiguous step definitions"));

        // Only the placeholder pattern matches other colours
        assert!(matches!(registry.resolve("a blue thing"), Match::Single { .. }));
    }

    #[test]
    fn test_quoted_placeholders_unquote() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.step("I say {string}", noop).unwrap();
        registry.step("the name is {name}", noop).unwrap();

        match registry.resolve("I say 'hello world'") {
            Match::Single { params, .. } => assert_eq!(params, vec!["hello world"]),
            other => panic!("unexpected {:?}", other),
        }
        match registry.resolve(r#"the name is "Jo Smith""#) {
            Match::Single { params, .. } => assert_eq!(params, vec!["Jo Smith"]),
            other => panic!("unexpected {:?}", other),
        }
        match registry.resolve("the name is Jo") {
            Match::Single { params, .. } => assert_eq!(params, vec!["Jo"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_literal_text_is_escaped() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.step("it costs $5 (really?)", noop).unwrap();
        assert!(matches!(registry.resolve("it costs $5 (really?)"), Match::Single { .. }));
        assert!(registry.resolve("it costs 5 really").is_undefined());
    }

    #[test]
    fn test_custom_placeholder() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.placeholder("color", "red|green|blue").unwrap();
        registry.step("a {color} ball", noop).unwrap();
        assert!(matches!(registry.resolve("a green ball"), Match::Single { .. }));
        assert!(registry.resolve("a purple ball").is_undefined());
    }

    #[test]
    fn test_invalid_placeholder_rejected() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        assert!(registry.placeholder("broken", "(unclosed").is_err());
    }

    #[test]
    fn test_tagged_steps_scope() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.steps_for("admin").step("I am logged in", noop).unwrap();

        assert!(registry.resolve("I am logged in").is_undefined());
        let tags = vec!["admin".to_string()];
        assert!(matches!(registry.resolve_tagged("I am logged in", &tags), Match::Single { .. }));
        let tag = registry.resolve_tagged("I am logged in", &tags);
        if let Match::Single { definition, .. } = tag {
            assert_eq!(definition.tag(), Some("admin"));
        }
    }

    #[test]
    fn test_invoke_passes_params_then_extra_args() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.step("a {word} with {int}", record).unwrap();

        let mut world = Vec::new();
        let matched = registry.resolve("a box with 4");
        let extra = vec![
            Arg::DocString("text".into()),
            Arg::Table(Table::new(vec![vec!["x".into()]])),
        ];
        registry.invoke(&matched, &mut world, &extra).unwrap();
        assert_eq!(world, vec!["box", "4", "doc:text", "table:1"]);
    }

    #[test]
    fn test_invoke_propagates_body_error_unchanged() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry
            .step("it breaks", |_, _| Err(StepError::failed("broken on purpose")))
            .unwrap();
        registry.step("it waits", |_, _| crate::error::pending_with("soon")).unwrap();

        let mut world = Vec::new();
        let err = registry.invoke(&registry.resolve("it breaks"), &mut world, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StepFailed);
        assert_eq!(err.message, "broken on purpose");

        let err = registry.invoke(&registry.resolve("it waits"), &mut world, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PendingDeclared);
    }

    #[test]
    fn test_invoke_catches_panics() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry
            .step("it panics", |_, _| panic!("assertion went wrong"))
            .unwrap();

        let mut world = Vec::new();
        let err = registry.invoke(&registry.resolve("it panics"), &mut world, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StepFailed);
        assert_eq!(err.message, "assertion went wrong");
        assert_eq!(err.backtrace.len(), 1);
    }

    #[test]
    fn test_body_calls_tagged_step_through_context() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.steps_for("admin").step("I am root", |world, _| {
            world.push("root".into());
            Ok(())
        }).unwrap();
        registry
            .step("I log in as an admin", |ctx, _| {
                ctx.step("I am root", &[])?;
                ctx.push("logged in".into());
                Ok(())
            })
            .unwrap();

        let tags = vec!["admin".to_string()];
        let matched = registry.resolve_tagged("I log in as an admin", &tags);
        let mut world = Vec::new();
        registry.invoke_tagged(&matched, &mut world, &tags, &[]).unwrap();
        assert_eq!(world, vec!["root", "logged in"]);

        // without the tag the inner step does not exist
        let mut world = Vec::new();
        let err = registry
            .invoke(&registry.resolve("I log in as an admin"), &mut world, &[])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Undefined);
        assert_eq!(err.message, "I am root");
        assert!(world.is_empty());
    }

    #[test]
    fn test_nested_step_receives_extra_args() {
        let mut registry: Registry<Vec<String>> = Registry::new();
        registry.step("a {word} with {int}", record).unwrap();
        registry
            .step("a parcel", |ctx, _| {
                ctx.step("a box with 2", &[Arg::DocString("fragile".into())])
            })
            .unwrap();

        let mut world = Vec::new();
        registry.invoke(&registry.resolve("a parcel"), &mut world, &[]).unwrap();
        assert_eq!(world, vec!["box", "2", "doc:fragile"]);
    }
}
