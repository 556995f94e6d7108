//! Sequence-aware shortcut lookup
//!
//! Every configured sequence is indexed under each of its prefixes, keyed by
//! the space-joined shortcut signatures. A lookup appends the new shortcut's
//! signature to the previous partial match and probes the application scope
//! first, then the global scope.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::model::{KeyShortcut, Workflow};

/// Scope key for workflows that are not bound to an application
const GLOBAL_SCOPE: &str = "*";
const SEPARATOR: char = ' ';

/// Raw value of the rest state
pub const DEFAULT_PARTIAL_MATCH: &str = ".";

/// How far into a multi-key sequence the user is
#[derive(Debug, Clone)]
pub struct PartialMatch {
    /// Accumulated prefix signature
    pub raw_value: String,
    pub workflow: Option<Arc<Workflow>>,
}

impl PartialMatch {
    pub fn default_match() -> Self {
        Self {
            raw_value: DEFAULT_PARTIAL_MATCH.to_string(),
            workflow: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.raw_value == DEFAULT_PARTIAL_MATCH
    }
}

impl Default for PartialMatch {
    fn default() -> Self {
        Self::default_match()
    }
}

impl PartialEq for PartialMatch {
    fn eq(&self, other: &Self) -> bool {
        self.raw_value == other.raw_value
            && self.workflow.as_ref().map(|w| &w.id) == other.workflow.as_ref().map(|w| &w.id)
    }
}

#[derive(Debug, Clone)]
pub enum LookupResult {
    /// The full sequence was consumed
    Exact(Arc<Workflow>),
    /// Strict prefix of at least one sequence
    PartialMatch(PartialMatch),
    None,
}

impl LookupResult {
    pub fn is_none(&self) -> bool {
        matches!(self, LookupResult::None)
    }
}

#[derive(Debug)]
struct Entry {
    workflow: Arc<Workflow>,
    /// The prefix is the whole sequence
    complete: bool,
}

/// Prefix table over `(scope, sequence prefix)`
#[derive(Debug, Default)]
pub struct ShortcutResolver {
    table: HashMap<String, HashMap<String, Vec<Entry>>>,
    workflow_count: usize,
}

impl ShortcutResolver {
    pub fn new(workflows: &[Workflow]) -> Self {
        let mut resolver = Self::default();

        for workflow in workflows.iter().filter(|w| !w.is_disabled) {
            let Some(trigger) = workflow.keyboard_trigger() else {
                continue;
            };
            if trigger.shortcuts.is_empty() {
                continue;
            }

            let shared = Arc::new(workflow.clone());
            let scopes: Vec<&str> = if workflow.bundle_identifiers.is_empty() {
                vec![GLOBAL_SCOPE]
            } else {
                workflow.bundle_identifiers.iter().map(String::as_str).collect()
            };

            let last = trigger.shortcuts.len() - 1;
            let mut prefix = String::new();
            for (index, shortcut) in trigger.shortcuts.iter().enumerate() {
                if index > 0 {
                    prefix.push(SEPARATOR);
                }
                prefix.push_str(&shortcut.signature());

                for scope in &scopes {
                    resolver
                        .table
                        .entry(scope.to_string())
                        .or_default()
                        .entry(prefix.clone())
                        .or_default()
                        .push(Entry {
                            workflow: Arc::clone(&shared),
                            complete: index == last,
                        });
                }
            }
            resolver.workflow_count += 1;
        }

        debug!(workflows = resolver.workflow_count, "shortcut table built");
        resolver
    }

    /// Number of indexed workflows
    pub fn len(&self) -> usize {
        self.workflow_count
    }

    pub fn is_empty(&self) -> bool {
        self.workflow_count == 0
    }

    pub fn lookup(
        &self,
        shortcut: &KeyShortcut,
        bundle_identifier: &str,
        user_modes: &HashSet<String>,
        previous: &PartialMatch,
    ) -> LookupResult {
        let signature = shortcut.signature();
        let prefix = if previous.is_default() {
            signature
        } else {
            format!("{}{}{}", previous.raw_value, SEPARATOR, signature)
        };

        for scope in [bundle_identifier, GLOBAL_SCOPE] {
            if let Some(result) = self.lookup_in(scope, &prefix, user_modes) {
                return result;
            }
        }
        LookupResult::None
    }

    fn lookup_in(
        &self,
        scope: &str,
        prefix: &str,
        user_modes: &HashSet<String>,
    ) -> Option<LookupResult> {
        let entries = self.table.get(scope)?.get(prefix)?;

        let mut partial = None;
        for entry in entries
            .iter()
            .filter(|entry| entry.workflow.satisfies_user_modes(user_modes))
        {
            // A finished sequence wins over longer ones sharing the prefix
            if entry.complete {
                return Some(LookupResult::Exact(Arc::clone(&entry.workflow)));
            }
            partial.get_or_insert_with(|| Arc::clone(&entry.workflow));
        }

        partial.map(|workflow| {
            LookupResult::PartialMatch(PartialMatch {
                raw_value: prefix.to_string(),
                workflow: Some(workflow),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::ModifierKey;
    use crate::workflow::model::{KeyboardShortcutTrigger, Trigger, UserModeCondition};

    fn cmd(key: &str) -> KeyShortcut {
        KeyShortcut::new(key, [ModifierKey::Command])
    }

    fn workflow(name: &str, shortcuts: Vec<KeyShortcut>) -> Workflow {
        let mut workflow = Workflow::new(name);
        workflow.trigger = Some(Trigger::KeyboardShortcuts(KeyboardShortcutTrigger {
            shortcuts,
            passthrough: false,
            hold_duration_ms: None,
        }));
        workflow
    }

    fn lookup(resolver: &ShortcutResolver, shortcut: &KeyShortcut, previous: &PartialMatch) -> LookupResult {
        resolver.lookup(shortcut, "com.apple.Terminal", &HashSet::new(), previous)
    }

    #[test]
    fn test_sequence_partial_then_exact() {
        let resolver = ShortcutResolver::new(&[workflow("W", vec![cmd("K"), cmd("B")])]);

        let first = lookup(&resolver, &cmd("K"), &PartialMatch::default());
        let LookupResult::PartialMatch(partial) = first else {
            panic!("expected partial match, got {first:?}");
        };
        assert_eq!(partial.raw_value, "Cmd+K");

        let second = lookup(&resolver, &cmd("B"), &partial);
        assert!(matches!(second, LookupResult::Exact(w) if w.name == "W"));
    }

    #[test]
    fn test_wrong_continuation_is_none() {
        let resolver = ShortcutResolver::new(&[workflow("W", vec![cmd("K"), cmd("B")])]);
        let LookupResult::PartialMatch(partial) = lookup(&resolver, &cmd("K"), &PartialMatch::default()) else {
            panic!("expected partial match");
        };
        assert!(lookup(&resolver, &cmd("X"), &partial).is_none());
    }

    #[test]
    fn test_unrelated_shortcut_is_none_repeatedly() {
        let resolver = ShortcutResolver::new(&[workflow("W", vec![cmd("K")])]);
        let unrelated = cmd("Q");
        assert!(lookup(&resolver, &unrelated, &PartialMatch::default()).is_none());
        assert!(lookup(&resolver, &unrelated, &PartialMatch::default()).is_none());
    }

    #[test]
    fn test_shared_prefix_reports_partial_for_every_strict_prefix() {
        let resolver = ShortcutResolver::new(&[
            workflow("A", vec![cmd("K"), cmd("B"), cmd("C")]),
            workflow("B", vec![cmd("K"), cmd("B"), cmd("D")]),
        ]);
        let mut previous = PartialMatch::default();
        for key in ["K", "B"] {
            match lookup(&resolver, &cmd(key), &previous) {
                LookupResult::PartialMatch(partial) => previous = partial,
                other => panic!("expected partial match, got {other:?}"),
            }
        }
        assert!(matches!(lookup(&resolver, &cmd("C"), &previous), LookupResult::Exact(w) if w.name == "A"));
        assert!(matches!(lookup(&resolver, &cmd("D"), &previous), LookupResult::Exact(w) if w.name == "B"));
    }

    #[test]
    fn test_application_scope_wins_over_global() {
        let global = workflow("global", vec![cmd("K")]);
        let mut scoped = workflow("terminal", vec![cmd("K")]);
        scoped.bundle_identifiers = vec!["com.apple.Terminal".into()];
        let resolver = ShortcutResolver::new(&[global, scoped]);

        let in_terminal = lookup(&resolver, &cmd("K"), &PartialMatch::default());
        assert!(matches!(in_terminal, LookupResult::Exact(w) if w.name == "terminal"));

        let elsewhere = resolver.lookup(&cmd("K"), "com.apple.Safari", &HashSet::new(), &PartialMatch::default());
        assert!(matches!(elsewhere, LookupResult::Exact(w) if w.name == "global"));
    }

    #[test]
    fn test_user_mode_filter() {
        let mut gated = workflow("gated", vec![cmd("K")]);
        gated.user_modes = vec![UserModeCondition { id: "vim".into(), enabled: true }];
        let resolver = ShortcutResolver::new(&[gated]);

        assert!(lookup(&resolver, &cmd("K"), &PartialMatch::default()).is_none());

        let modes: HashSet<String> = ["vim".to_string()].into_iter().collect();
        let result = resolver.lookup(&cmd("K"), "any", &modes, &PartialMatch::default());
        assert!(matches!(result, LookupResult::Exact(_)));
    }

    #[test]
    fn test_disabled_workflows_are_not_indexed() {
        let mut disabled = workflow("off", vec![cmd("K")]);
        disabled.is_disabled = true;
        let resolver = ShortcutResolver::new(&[disabled]);
        assert!(resolver.is_empty());
        assert!(lookup(&resolver, &cmd("K"), &PartialMatch::default()).is_none());
    }

    #[test]
    fn test_side_is_part_of_identity() {
        let resolver = ShortcutResolver::new(&[workflow("right", vec![cmd("K").with_lhs(false)])]);
        assert!(lookup(&resolver, &cmd("K"), &PartialMatch::default()).is_none());
        assert!(matches!(
            lookup(&resolver, &cmd("K").with_lhs(false), &PartialMatch::default()),
            LookupResult::Exact(_)
        ));
    }
}
