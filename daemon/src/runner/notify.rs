//! Notifier that publishes UI affordances as coordinator events

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::events::CoordinatorEvent;
use crate::workflow::{Command, PartialMatch, Workflow};

use super::Notifier;

/// User preferences gating each notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub bundles: bool,
    pub keyboard_commands: bool,
    pub running_workflows: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            bundles: true,
            keyboard_commands: false,
            running_workflows: false,
        }
    }
}

pub struct EventNotifier {
    event_tx: broadcast::Sender<CoordinatorEvent>,
    preferences: NotificationPreferences,
}

impl EventNotifier {
    pub fn new(event_tx: broadcast::Sender<CoordinatorEvent>, preferences: NotificationPreferences) -> Self {
        Self {
            event_tx,
            preferences,
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        trace!(%event, "notification");
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl Notifier for EventNotifier {
    fn notify_bundles(&self, partial_match: &PartialMatch) {
        if !self.preferences.bundles {
            return;
        }
        self.emit(CoordinatorEvent::BundlesMatched {
            raw_value: partial_match.raw_value.clone(),
            workflow: partial_match.workflow.as_ref().map(|w| w.name.clone()),
        });
    }

    fn notify_keyboard_command(&self, workflow: &Workflow, command: &Command) {
        if !self.preferences.keyboard_commands || !command.meta().notification {
            return;
        }
        self.emit(CoordinatorEvent::KeyboardCommandRan {
            workflow: workflow.name.clone(),
            command: command.meta().name.clone(),
        });
    }

    fn notify_running_workflow(&self, workflow: &Workflow) {
        if !self.preferences.running_workflows {
            return;
        }
        self.emit(CoordinatorEvent::WorkflowRunning {
            workflow: workflow.name.clone(),
        });
    }

    fn reset(&self) {
        self.emit(CoordinatorEvent::NotificationsReset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_preferences_are_noops() {
        let (tx, mut rx) = broadcast::channel(8);
        let notifier = EventNotifier::new(
            tx,
            NotificationPreferences {
                bundles: false,
                keyboard_commands: false,
                running_workflows: false,
            },
        );

        notifier.notify_bundles(&PartialMatch::default());
        notifier.notify_running_workflow(&Workflow::new("w"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_running_workflow_is_published() {
        let (tx, mut rx) = broadcast::channel(8);
        let notifier = EventNotifier::new(
            tx,
            NotificationPreferences {
                running_workflows: true,
                ..NotificationPreferences::default()
            },
        );

        notifier.notify_running_workflow(&Workflow::new("deploy"));
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, CoordinatorEvent::WorkflowRunning { workflow } if workflow == "deploy"));
    }
}
