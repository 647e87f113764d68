//! Hotplug Event Pump
//!
//! Feeds hardware-layer notifications into the screen core from a single
//! task, so connects and disconnects are applied in arrival order.
//!
//! ```text
//! Hardware layer ──> mpsc::Sender<HotplugEvent> ──> pump task ──> ScreenSessionManager
//! ```
//!
//! The task ends once every sender is dropped.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::listener::ScreenEvent;
use crate::manager::{PhysicalScreenInfo, ScreenSessionManager};
use crate::screen::ScreenId;

/// Notification from the hardware layer
#[derive(Debug, Clone, PartialEq)]
pub enum HotplugEvent {
    /// A physical screen appeared
    Connected {
        /// Hardware id
        id: ScreenId,
        /// Panel properties
        info: PhysicalScreenInfo,
    },
    /// A physical screen went away
    Disconnected {
        /// Hardware id
        id: ScreenId,
    },
    /// Sensor or panel state change forwarded to listeners
    Sensor(ScreenEvent),
}

/// Counters kept by the pump task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotplugStats {
    /// Events received
    pub received: u64,
    /// Events the core rejected
    pub failed: u64,
}

/// Start the hotplug pump
///
/// # Arguments
///
/// * `core` - Screen core receiving the events
/// * `events` - Receiving end of the hardware channel
///
/// # Returns
///
/// Join handle yielding the final counters
pub fn spawn_hotplug_pump(
    core: Arc<ScreenSessionManager>,
    mut events: mpsc::Receiver<HotplugEvent>,
) -> tokio::task::JoinHandle<HotplugStats> {
    tokio::spawn(async move {
        info!("Hotplug pump started");
        let mut stats = HotplugStats::default();

        while let Some(event) = events.recv().await {
            stats.received += 1;
            if !handle_event(&core, event) {
                stats.failed += 1;
            }
        }

        info!(
            "Hotplug channel closed, pump exiting (received={}, failed={})",
            stats.received, stats.failed
        );
        stats
    })
}

fn handle_event(core: &ScreenSessionManager, event: HotplugEvent) -> bool {
    match event {
        HotplugEvent::Connected { id, info } => match core.on_physical_screen_connect(id, info) {
            Ok(id) => {
                debug!("Hotplug connect of screen {} applied", id);
                true
            }
            Err(e) => {
                warn!("Hotplug connect of screen {} failed: {} (code {})", id, e, e.code());
                false
            }
        },
        HotplugEvent::Disconnected { id } => match core.on_physical_screen_disconnect(id) {
            Ok(()) => true,
            Err(e) => {
                warn!("Hotplug disconnect of screen {} failed: {} (code {})", id, e, e.code());
                false
            }
        },
        HotplugEvent::Sensor(event) => {
            let delivered = core.publish_event(&event);
            debug!("{} delivered to {} listener(s)", event.kind(), delivered);
            true
        }
    }
}
