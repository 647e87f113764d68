//! Listener registration and delivery through the core object

mod common;

use common::{harness, panel, EventRecorder};
use std::sync::Arc;

use lamco_screen_manager::config::ExternalConnectMode;
use lamco_screen_manager::listener::{
    EventKind, FoldState, ListenerError, ListenerHandle, OwnerId, ScreenEvent, ScreenListener,
};
use lamco_screen_manager::screen::{DisplayId, ScreenId};
use lamco_screen_manager::DmError;

struct Unreachable;

impl ScreenListener for Unreachable {
    fn on_event(&self, _event: &ScreenEvent) -> Result<(), ListenerError> {
        Err(ListenerError::Dead)
    }
}

#[test]
fn test_register_unregister_round_trip() {
    let h = harness(ExternalConnectMode::None);
    let recorder = Arc::new(EventRecorder::default());
    let handle = ListenerHandle::new(recorder.clone());

    h.core
        .register_listener(EventKind::ScreenConnect, Some(handle.clone()))
        .unwrap();
    h.core
        .unregister_listener(EventKind::ScreenConnect, Some(&handle))
        .unwrap();

    assert!(!h.core.listeners().contains(EventKind::ScreenConnect, &handle));
    h.core
        .on_physical_screen_connect(ScreenId::new(0), panel("builtin", 1920, 1080))
        .unwrap();
    assert!(recorder.events.lock().is_empty());
}

#[test]
fn test_absent_handle_is_null_pointer() {
    let h = harness(ExternalConnectMode::None);
    assert_eq!(
        h.core.register_listener(EventKind::FoldAngle, None),
        Err(DmError::NullPointer)
    );
    assert_eq!(
        h.core.unregister_listener(EventKind::FoldAngle, None),
        Err(DmError::NullPointer)
    );
}

#[test]
fn test_connect_and_disconnect_events() {
    let h = harness(ExternalConnectMode::None);
    let recorder = Arc::new(EventRecorder::default());
    let handle = ListenerHandle::new(recorder.clone());
    for kind in [
        EventKind::ScreenConnect,
        EventKind::ScreenDisconnect,
        EventKind::DisplayCreate,
        EventKind::DisplayDestroy,
    ] {
        h.core.register_listener(kind, Some(handle.clone())).unwrap();
    }

    let id = h
        .core
        .on_physical_screen_connect(ScreenId::new(2), panel("dp", 2560, 1440))
        .unwrap();
    h.core.on_physical_screen_disconnect(id).unwrap();

    assert_eq!(
        *recorder.events.lock(),
        vec![
            ScreenEvent::ScreenConnect { screen: id },
            ScreenEvent::DisplayCreate {
                display: DisplayId::new(2)
            },
            ScreenEvent::DisplayDestroy {
                display: DisplayId::new(2)
            },
            ScreenEvent::ScreenDisconnect { screen: id },
        ]
    );
}

#[test]
fn test_failing_listener_does_not_block_others() {
    let h = harness(ExternalConnectMode::None);
    let recorder = Arc::new(EventRecorder::default());
    h.core
        .register_listener(
            EventKind::FoldStatus,
            Some(ListenerHandle::new(Arc::new(Unreachable))),
        )
        .unwrap();
    h.core
        .register_listener(
            EventKind::FoldStatus,
            Some(ListenerHandle::new(recorder.clone())),
        )
        .unwrap();

    h.core.publish_event(&ScreenEvent::FoldStatus {
        state: FoldState::HalfFolded,
    });

    assert_eq!(recorder.events.lock().len(), 1);
}

#[test]
fn test_owner_reregistration_replaces_handle() {
    let h = harness(ExternalConnectMode::None);
    let owner = OwnerId(7);
    let first = ListenerHandle::new(Arc::new(EventRecorder::default()));
    let second = ListenerHandle::new(Arc::new(EventRecorder::default()));

    h.core
        .register_owner_listener(owner, EventKind::PrivateWindow, Some(first.clone()))
        .unwrap();
    h.core
        .register_owner_listener(owner, EventKind::PrivateWindow, Some(second.clone()))
        .unwrap();

    let registered = h.core.listeners().listeners(EventKind::PrivateWindow);
    assert_eq!(registered, vec![second]);

    assert_eq!(h.core.on_owner_died(owner), 1);
    assert!(!h.core.listeners().has_subscription(EventKind::PrivateWindow));
}
