//! Coordinate Transformation
//!
//! Converts points between a screen's own coordinate space and the global
//! device space.
//!
//! # Coordinate Spaces
//!
//! ```text
//! Global:   (0,0) ───────────────────────────────────────► x
//!            │  ┌──────────────┐┌────────────┐
//!            │  │  screen 0    ││  screen 1  │
//!            │  │  origin 0,0  ││ origin 1920,0
//!            │  └──────────────┘└────────────┘
//!            ▼ y
//!
//! Relative: (screen 1, 10, 20)  <=>  Global: (1930, 20)
//! ```
//!
//! Only screens whose source mode is main have an authoritative coordinate
//! space; converting against any other screen fails with `IllegalParam`.
//! Arithmetic is checked against the 32-bit range and never wraps.
//!
//! Points that cannot be attributed to a screen degrade gracefully: an
//! unknown screen id, or a global point outside every screen, is passed
//! through unchanged and reported against the fallback screen.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::Collaborators;
use crate::error::{DmError, Result};
use crate::screen::{DisplayId, ScreenId, ScreenSession, ScreenSessionRegistry, SourceMode};

/// Point in one screen's coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativePosition {
    /// Screen the point belongs to
    pub screen_id: ScreenId,
    /// X offset from the screen's left edge
    pub x: i32,
    /// Y offset from the screen's top edge
    pub y: i32,
}

/// Point in the global device space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalPosition {
    /// Global X
    pub x: i32,
    /// Global Y
    pub y: i32,
}

/// Relative/global point conversion
#[derive(Debug)]
pub struct CoordinateTransformer {
    registry: Arc<ScreenSessionRegistry>,
    collaborators: Arc<Collaborators>,

    /// Cached placement older than this is re-fetched before use
    refresh_interval: Duration,

    /// Screen reported for points outside every screen
    fallback_screen: ScreenId,
}

impl CoordinateTransformer {
    /// Create a transformer
    ///
    /// # Arguments
    ///
    /// * `registry` - Live screen sessions
    /// * `collaborators` - Render service used to refresh stale placement
    /// * `refresh_interval` - Maximum age of cached placement
    /// * `fallback_screen` - Screen id reported for unattributed points
    pub fn new(
        registry: Arc<ScreenSessionRegistry>,
        collaborators: Arc<Collaborators>,
        refresh_interval: Duration,
        fallback_screen: ScreenId,
    ) -> Self {
        Self {
            registry,
            collaborators,
            refresh_interval,
            fallback_screen,
        }
    }

    /// Convert a screen-relative point to global coordinates
    ///
    /// An unknown screen id returns the point unchanged.
    ///
    /// # Errors
    ///
    /// * `IllegalParam` - the screen is not in main source mode, or the
    ///   result does not fit in 32 bits
    pub fn relative_to_global(&self, relative: RelativePosition) -> Result<GlobalPosition> {
        let Some(session) = self.registry.get(relative.screen_id) else {
            debug!(
                "Screen {} unknown, passing ({}, {}) through",
                relative.screen_id, relative.x, relative.y
            );
            return Ok(GlobalPosition {
                x: relative.x,
                y: relative.y,
            });
        };
        self.refresh(&session);
        Self::require_main(&session)?;

        let (origin_x, origin_y) = session.origin();
        let x = origin_x
            .checked_add(relative.x)
            .ok_or_else(|| Self::overflow(&session, "x"))?;
        let y = origin_y
            .checked_add(relative.y)
            .ok_or_else(|| Self::overflow(&session, "y"))?;
        Ok(GlobalPosition { x, y })
    }

    /// Convert a global point to the screen containing it
    ///
    /// When screens overlap, a main-source screen wins, then the lowest id.
    /// A point outside every screen is returned unchanged against the
    /// fallback screen.
    ///
    /// # Errors
    ///
    /// * `IllegalParam` - the containing screen is not in main source mode
    pub fn global_to_relative(&self, global: GlobalPosition) -> Result<RelativePosition> {
        let sessions = self.registry.sessions();
        for session in &sessions {
            self.refresh(session);
        }

        let mut containing = sessions
            .iter()
            .filter(|s| s.rect().contains(global.x, global.y));
        let first = containing.next();
        let chosen = match first {
            Some(s) if s.source_mode() == SourceMode::Main => Some(s),
            Some(s) => containing
                .find(|other| other.source_mode() == SourceMode::Main)
                .or(Some(s)),
            None => None,
        };

        match chosen {
            Some(session) => Self::to_relative(session, global),
            None => Ok(self.unattributed(global)),
        }
    }

    /// Convert a global point against an explicit display
    ///
    /// The point is not required to lie inside the display. A display id
    /// that does not resolve is treated like a point outside every screen.
    ///
    /// # Errors
    ///
    /// * `IllegalParam` - the display is not in main source mode, or the
    ///   result does not fit in 32 bits
    pub fn global_to_relative_with_display_id(
        &self,
        global: GlobalPosition,
        display_id: DisplayId,
    ) -> Result<RelativePosition> {
        let session = self
            .registry
            .screen_for_display(display_id)
            .and_then(|id| self.registry.get(id));
        let Some(session) = session else {
            debug!("Display {} unknown, passing point through", display_id);
            return Ok(self.unattributed(global));
        };
        self.refresh(&session);
        Self::to_relative(&session, global)
    }

    fn unattributed(&self, global: GlobalPosition) -> RelativePosition {
        RelativePosition {
            screen_id: self.fallback_screen,
            x: global.x,
            y: global.y,
        }
    }

    fn to_relative(session: &ScreenSession, global: GlobalPosition) -> Result<RelativePosition> {
        Self::require_main(session)?;
        let (origin_x, origin_y) = session.origin();
        let x = global
            .x
            .checked_sub(origin_x)
            .ok_or_else(|| Self::overflow(session, "x"))?;
        let y = global
            .y
            .checked_sub(origin_y)
            .ok_or_else(|| Self::overflow(session, "y"))?;
        Ok(RelativePosition {
            screen_id: session.id(),
            x,
            y,
        })
    }

    fn require_main(session: &ScreenSession) -> Result<()> {
        match session.source_mode() {
            SourceMode::Main => Ok(()),
            other => Err(DmError::IllegalParam(format!(
                "screen {} source mode is {:?}, not main",
                session.id(),
                other
            ))),
        }
    }

    fn overflow(session: &ScreenSession, axis: &str) -> DmError {
        DmError::IllegalParam(format!(
            "{} coordinate overflow against screen {}",
            axis,
            session.id()
        ))
    }

    /// Re-fetch placement if the cached copy is stale
    ///
    /// Failures keep the cached placement.
    fn refresh(&self, session: &ScreenSession) {
        if !session.needs_refresh(self.refresh_interval) {
            return;
        }
        let Some(render) = self.collaborators.render_service() else {
            return;
        };
        match render.query_placement(session.render_id()) {
            Ok(Some(placement)) => session.apply_placement(placement),
            Ok(None) => {}
            Err(e) => warn!("Placement refresh for screen {} failed: {}", session.id(), e),
        }
    }
}
