//! # lamco-screen-manager
//!
//! Screen session topology and change notification core for multi-screen
//! devices.
//!
//! Tracks every physical and virtual screen as a screen session, decides
//! how screens combine (mirror, extend, unique), keeps the scene-session
//! client and the render service in step with each change, converts
//! coordinates between screens, and fans change events out to registered
//! listeners.
//!
//! # Architecture
//!
//! ```text
//! lamco-screen-manager
//!   ├─> ScreenSessionManager (explicitly constructed core object)
//!   │     ├─> ScreenSessionRegistry   (sessions, groups, id allocation)
//!   │     ├─> ListenerRegistry        (per-kind fan-out, upstream refcount)
//!   │     ├─> MultiScreenManager      (mirror/unique groups, power flows)
//!   │     │     └─> MultiScreenModeChangeManager (pairwise state machine)
//!   │     └─> CoordinateTransformer   (relative ↔ global)
//!   ├─> Collaborators
//!   │     ├─> SceneSessionClient      (remote window scene endpoint)
//!   │     └─> RenderService           (display and mirror nodes)
//!   └─> Hotplug pump (tokio task feeding hardware events into the core)
//! ```
//!
//! # Change Flow
//!
//! **Operator request:** `set_multi_screen_mode` → classify → pairwise
//! handler or group switch → journal → collaborators → commit or rollback
//! → listeners
//!
//! **Hotplug:** hardware layer → pump → connect/disconnect → connect mode
//! → listeners

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error type and numeric codes
pub mod error;

/// Screen sessions, groups and the session registry
pub mod screen;

/// Listener registry and change events
pub mod listener;

/// Scene-session client and render service seams
pub mod client;

/// Multi-screen combination: pairwise mode changes, mirror and unique
/// groups, internal screen power flows and relative positioning
pub mod multiscreen;

/// Relative/global coordinate conversion
pub mod coordinates;

/// Screen core object
pub mod manager;

/// Hardware event pump
pub mod hotplug;

/// Daemon configuration
pub mod config;

/// Logging initialisation
pub mod logging;

pub use error::{DmError, Result};
pub use manager::{PhysicalScreenInfo, ScreenSessionManager, VirtualScreenOption};
