//! Global event tap using macOS CGEventTap
//!
//! Feeds every keyboard and mouse-down event into the coordinator on a
//! dedicated thread with its own CFRunLoop, and suppresses the events the
//! coordinator claims. Also posts the daemon's own synthetic key events,
//! tagged so the tap lets them through untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
#[cfg(target_os = "macos")]
use tracing::{debug, error, info, warn};

use crate::events::CoordinatorEvent;
use crate::runner::EventPoster;
use crate::state::EventCoordinator;

use super::event::{EventSource, SyntheticEvent};

/// Value stored in the event source user data of events we post
pub const SYNTHETIC_MARKER: i64 = 0x6b66_6c77;

/// Global listener that routes raw events through the coordinator
pub struct HotkeyListener {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    coordinator: EventCoordinator,
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    event_tx: broadcast::Sender<CoordinatorEvent>,
    running: Arc<AtomicBool>,
    tap_enabled: Arc<AtomicBool>,
}

impl HotkeyListener {
    pub fn new(coordinator: EventCoordinator, event_tx: broadcast::Sender<CoordinatorEvent>) -> Self {
        Self {
            coordinator,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            tap_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the listener
    ///
    /// This spawns a dedicated thread that runs a CFRunLoop to receive
    /// CGEventTap callbacks. The listener runs until `stop()` is called
    /// or the program exits.
    #[cfg(target_os = "macos")]
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let coordinator = self.coordinator.clone();
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let tap_enabled = Arc::clone(&self.tap_enabled);

        std::thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = tap::run_event_loop(coordinator, event_tx, &running, &tap_enabled) {
                    error!(?e, "hotkey listener error");
                }

                tap_enabled.store(false, Ordering::SeqCst);
                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    pub fn start(&self) -> Result<(), HotkeyError> {
        Err(HotkeyError::Unsupported)
    }

    /// Stop the listener; the run loop exits on its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The OS has the tap installed and enabled
    pub fn is_tap_enabled(&self) -> bool {
        self.tap_enabled.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to create run loop source for the event tap")]
    RunLoopSource,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global event taps are only supported on macOS")]
    Unsupported,
}

/// Errors from posting a synthetic event
#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("failed to create event source")]
    EventSource,

    #[error("failed to create keyboard event")]
    EventCreation,

    #[error("posting synthetic events is only supported on macOS")]
    Unsupported,
}

/// Posts synthetic key events through Quartz
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEventPoster;

impl SystemEventPoster {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "macos")]
impl EventPoster for SystemEventPoster {
    fn post(&self, event: &SyntheticEvent, source: EventSource) -> Result<(), PostError> {
        use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, EventField};
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        let state = match source {
            EventSource::Private => CGEventSourceStateID::Private,
            EventSource::CombinedSession => CGEventSourceStateID::CombinedSessionState,
        };
        let source = CGEventSource::new(state).map_err(|_| PostError::EventSource)?;
        let posted = CGEvent::new_keyboard_event(source, event.key_code, event.key_down)
            .map_err(|_| PostError::EventCreation)?;

        posted.set_flags(CGEventFlags::from_bits_truncate(event.flags.0));
        posted.set_integer_value_field(EventField::EVENT_SOURCE_USER_DATA, SYNTHETIC_MARKER);
        if event.autorepeat {
            posted.set_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT, 1);
        }
        posted.post(CGEventTapLocation::Session);
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
impl EventPoster for SystemEventPoster {
    fn post(&self, _event: &SyntheticEvent, _source: EventSource) -> Result<(), PostError> {
        Err(PostError::Unsupported)
    }
}

#[cfg(target_os = "macos")]
mod tap {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType, EventField,
    };
    use tokio::sync::broadcast;

    use super::*;
    use crate::hotkey::{KeyEvent, KeyEventKind, ModifierFlags};

    /// Map a tap event onto the coordinator's model
    fn convert(event_type: CGEventType, event: &CGEvent, started: Instant) -> Option<KeyEvent> {
        let kind = match event_type {
            CGEventType::KeyDown => KeyEventKind::KeyDown,
            CGEventType::KeyUp => KeyEventKind::KeyUp,
            CGEventType::FlagsChanged => KeyEventKind::FlagsChanged,
            CGEventType::LeftMouseDown | CGEventType::RightMouseDown | CGEventType::OtherMouseDown => {
                KeyEventKind::MouseButton
            }
            _ => return None,
        };
        Some(KeyEvent {
            kind,
            key_code: event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16,
            flags: ModifierFlags(event.get_flags().bits()),
            is_autorepeat: event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0,
            timestamp: started.elapsed().as_millis() as u64,
        })
    }

    /// Run the CFRunLoop with the event tap
    pub(super) fn run_event_loop(
        coordinator: EventCoordinator,
        event_tx: broadcast::Sender<CoordinatorEvent>,
        running: &AtomicBool,
        tap_enabled: &AtomicBool,
    ) -> Result<(), HotkeyError> {
        let started = Instant::now();
        let disabled = std::sync::Arc::new(AtomicBool::new(false));
        let disabled_flag = std::sync::Arc::clone(&disabled);

        // CGEventTap callback - must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| -> Option<CGEvent> {
            match event_type {
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    warn!("event tap disabled, will re-enable");
                    disabled_flag.store(true, Ordering::SeqCst);
                    let _ = event_tx.send(CoordinatorEvent::TapDisabled);
                    return None;
                }
                _ => {}
            }

            // Our own synthetic events go straight through
            if event.get_integer_value_field(EventField::EVENT_SOURCE_USER_DATA) == SYNTHETIC_MARKER {
                return None;
            }

            let key_event = convert(event_type, event, started)?;
            if coordinator.handle(&key_event).is_suppressed() {
                let consumed = event.clone();
                consumed.set_type(CGEventType::Null);
                return Some(consumed);
            }
            None
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::Default,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
                CGEventType::LeftMouseDown,
                CGEventType::RightMouseDown,
                CGEventType::OtherMouseDown,
            ],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::EventTapCreation
        })?;

        tap.enable();
        tap_enabled.store(true, Ordering::SeqCst);

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::RunLoopSource)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        info!("event tap created and enabled");

        while running.load(Ordering::SeqCst) {
            CFRunLoop::run_in_mode(
                unsafe { kCFRunLoopDefaultMode },
                Duration::from_millis(100),
                true,
            );

            if disabled.swap(false, Ordering::SeqCst) {
                tap.enable();
                debug!("event tap re-enabled");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::AnsiKeyCodeStore;
    use crate::state::{Collaborators, Inputs};
    use crate::testing::{RecordingKeyboard, RecordingNotifier, RecordingPoster, RecordingRunner};
    use crate::workflow::KeyShortcut;

    fn listener() -> HotkeyListener {
        let (tx, _rx) = broadcast::channel(8);
        let collaborators = Collaborators {
            runner: Arc::new(RecordingRunner::default()),
            keyboard: Arc::new(RecordingKeyboard::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            key_codes: Arc::new(AnsiKeyCodeStore::new()),
            poster: Arc::new(RecordingPoster::default()),
        };
        let coordinator = EventCoordinator::new(
            &[],
            KeyShortcut::new("M", []),
            collaborators,
            Arc::new(Inputs::new()),
            tx.clone(),
            tokio::runtime::Handle::current(),
        );
        HotkeyListener::new(coordinator, tx)
    }

    #[tokio::test]
    async fn test_listener_creation() {
        let listener = listener();
        assert!(!listener.is_running());
        assert!(!listener.is_tap_enabled());
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn test_unsupported_platform() {
        let listener = listener();
        assert!(matches!(listener.start(), Err(HotkeyError::Unsupported)));
        assert!(matches!(
            SystemEventPoster::new().post(&SyntheticEvent::press(0, Default::default())[0], EventSource::Private),
            Err(PostError::Unsupported)
        ));
    }
}
