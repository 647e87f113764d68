//! Listener Handles
//!
//! Remote listeners are shared objects whose lifetime the core does not
//! own. A [`ListenerHandle`] wraps one and compares by identity, so the same
//! listener registered twice is recognised even though listeners carry no
//! comparable value.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

use super::event::ScreenEvent;

/// Failure reported by a listener while handling an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// Remote side returned an error
    #[error("Listener call failed: {0}")]
    Remote(String),

    /// Remote side is gone
    #[error("Listener is dead")]
    Dead,
}

/// Observer of screen/display changes
pub trait ScreenListener: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &ScreenEvent) -> Result<(), ListenerError>;
}

/// Client process owning a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// Identity-compared handle to a listener
#[derive(Clone)]
pub struct ListenerHandle {
    listener: Arc<dyn ScreenListener>,
}

impl ListenerHandle {
    /// Wrap a listener
    pub fn new(listener: Arc<dyn ScreenListener>) -> Self {
        Self { listener }
    }

    /// Address-based identity of the wrapped listener
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.listener) as *const () as usize
    }

    /// Deliver an event
    pub fn deliver(&self, event: &ScreenEvent) -> Result<(), ListenerError> {
        self.listener.on_event(event)
    }
}

impl PartialEq for ListenerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ListenerHandle {}

impl Hash for ListenerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerHandle({:#x})", self.id())
    }
}
