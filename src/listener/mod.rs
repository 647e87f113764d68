//! Screen Event Listeners
//!
//! Fans screen and display change events out to any number of remote
//! observers.
//!
//! # Overview
//!
//! Observers implement [`ScreenListener`] and are registered per
//! [`EventKind`] through a [`ListenerHandle`], which compares by identity.
//! The first registration for a kind lazily attaches one shared upstream
//! subscription; the last unregistration tears it down.
//!
//! ```text
//! notify(kind, event)
//!   ├─> lock table, copy handles for `kind`, unlock
//!   └─> for each handle in the copy:
//!         deliver(event)   (errors and panics logged, never propagated)
//! ```
//!
//! Delivery never holds the table lock, so a slow or blocked listener
//! cannot starve registration on other threads, and a listener may
//! unregister itself (or others) from inside its callback.
//!
//! # Registration scopes
//!
//! - **Plain** - lives until explicitly unregistered
//! - **Owner** - one listener per kind per client process; re-registering
//!   replaces the previous handle, and [`ListenerRegistry::unregister_owner`]
//!   drops them all when the process goes away
//! - **Screen** - bound to one screen session and purged when it is destroyed

mod event;
mod handle;
mod registry;

pub use event::{
    Brightness, DisplayChangeReason, EventKind, FoldState, GroupChange, ScreenChangeReason,
    ScreenEvent,
};
pub use handle::{ListenerError, ListenerHandle, OwnerId, ScreenListener};
pub use registry::{ListenerRegistry, ListenerSettings, UpstreamSource};
