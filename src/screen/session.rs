//! Screen Session
//!
//! One screen's identity, placement and combination role.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::{
    DisplayId, NodeId, Rect, RenderId, ScreenCombination, ScreenId, ScreenKind, SourceMode,
};

/// Placement reported by the composition service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Top-left corner in global coordinates
    pub origin: (i32, i32),

    /// Size in pixels
    pub resolution: (u32, u32),
}

/// Mutable state of a screen session
///
/// Snapshots of this struct are used to roll back a failed topology change.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenState {
    /// Human-readable name
    pub name: String,

    /// Top-left corner in global coordinates
    pub origin: (i32, i32),

    /// Size in pixels
    pub resolution: (u32, u32),

    /// Pixel density scale
    pub density: f32,

    /// Current topological role
    pub combination: ScreenCombination,

    /// Secondary role in a pair (mirror or extend side)
    pub is_extend: bool,

    /// Composition node currently displaying this screen
    pub display_node: Option<NodeId>,

    /// Screen whose content is mirrored, when combination is `Mirror`
    pub mirror_source: Option<ScreenId>,

    /// Panel serial number
    pub serial_number: String,

    /// Refresh rate in Hz
    pub refresh_rate: u32,

    /// When placement was last confirmed with the composition service
    pub last_refresh: Instant,
}

/// A physical or virtual screen
#[derive(Debug)]
pub struct ScreenSession {
    id: ScreenId,
    render_id: RenderId,
    kind: ScreenKind,
    is_default: bool,
    alive: AtomicBool,
    state: RwLock<ScreenState>,
}

impl ScreenSession {
    pub(crate) fn new(
        id: ScreenId,
        render_id: RenderId,
        kind: ScreenKind,
        is_default: bool,
        name: &str,
    ) -> Self {
        Self {
            id,
            render_id,
            kind,
            is_default,
            alive: AtomicBool::new(true),
            state: RwLock::new(ScreenState {
                name: name.to_string(),
                origin: (0, 0),
                resolution: (0, 0),
                density: 1.0,
                combination: ScreenCombination::Alone,
                is_extend: false,
                display_node: None,
                mirror_source: None,
                serial_number: String::new(),
                refresh_rate: 60,
                last_refresh: Instant::now(),
            }),
        }
    }

    /// Screen id
    pub fn id(&self) -> ScreenId {
        self.id
    }

    /// Render-surface id; never shared with another session
    pub fn render_id(&self) -> RenderId {
        self.render_id
    }

    /// Logical display id for this screen
    pub fn display_id(&self) -> DisplayId {
        DisplayId::from(self.id)
    }

    /// Physical or virtual
    pub fn kind(&self) -> ScreenKind {
        self.kind
    }

    /// Whether this is the configured default (built-in) screen
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// False once the session has been removed from its registry
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Current name
    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    /// Current combination
    pub fn combination(&self) -> ScreenCombination {
        self.state.read().combination
    }

    /// Whether this session plays the secondary role of a pair
    pub fn is_extend(&self) -> bool {
        self.state.read().is_extend
    }

    /// Set combination and role flag together
    pub fn set_combination(&self, combination: ScreenCombination, is_extend: bool) {
        let mut state = self.state.write();
        state.combination = combination;
        state.is_extend = is_extend;
        if combination != ScreenCombination::Mirror {
            state.mirror_source = None;
        }
    }

    /// Source mode used by coordinate conversion
    ///
    /// The default screen counts as main while it is standalone.
    pub fn source_mode(&self) -> SourceMode {
        match self.combination() {
            ScreenCombination::Main => SourceMode::Main,
            ScreenCombination::Alone if self.is_default => SourceMode::Main,
            ScreenCombination::Alone => SourceMode::Alone,
            ScreenCombination::Mirror => SourceMode::Mirror,
            ScreenCombination::Extend => SourceMode::Extend,
            ScreenCombination::Unique => SourceMode::Unique,
        }
    }

    /// Top-left corner in global coordinates
    pub fn origin(&self) -> (i32, i32) {
        self.state.read().origin
    }

    /// Move the screen in global coordinates
    pub fn set_origin(&self, x: i32, y: i32) {
        self.state.write().origin = (x, y);
    }

    /// Size in pixels
    pub fn resolution(&self) -> (u32, u32) {
        self.state.read().resolution
    }

    /// Resize the screen
    pub fn set_resolution(&self, width: u32, height: u32) {
        self.state.write().resolution = (width, height);
    }

    /// Pixel density scale
    pub fn density(&self) -> f32 {
        self.state.read().density
    }

    /// Set pixel density scale
    pub fn set_density(&self, density: f32) {
        self.state.write().density = density;
    }

    /// Panel metadata reported at connect time
    pub fn set_panel_info(&self, serial_number: &str, refresh_rate: u32) {
        let mut state = self.state.write();
        state.serial_number = serial_number.to_string();
        state.refresh_rate = refresh_rate;
    }

    /// Placement rectangle in global coordinates
    pub fn rect(&self) -> Rect {
        let state = self.state.read();
        Rect::new(
            state.origin.0,
            state.origin.1,
            state.resolution.0,
            state.resolution.1,
        )
    }

    /// Composition node currently displaying this screen
    pub fn display_node(&self) -> Option<NodeId> {
        self.state.read().display_node
    }

    /// Replace the display node, returning the previous one
    pub fn replace_display_node(&self, node: Option<NodeId>) -> Option<NodeId> {
        std::mem::replace(&mut self.state.write().display_node, node)
    }

    /// Screen being mirrored
    pub fn mirror_source(&self) -> Option<ScreenId> {
        self.state.read().mirror_source
    }

    /// Make this screen a mirror of `source`
    pub fn set_mirror_source(&self, source: ScreenId) {
        let mut state = self.state.write();
        state.combination = ScreenCombination::Mirror;
        state.is_extend = true;
        state.mirror_source = Some(source);
    }

    /// Whether cached placement is older than `interval`
    pub fn needs_refresh(&self, interval: Duration) -> bool {
        self.state.read().last_refresh.elapsed() >= interval
    }

    /// Store placement fetched from the composition service
    pub fn apply_placement(&self, placement: Placement) {
        let mut state = self.state.write();
        state.origin = placement.origin;
        state.resolution = placement.resolution;
        state.last_refresh = Instant::now();
    }

    /// Copy of the full mutable state
    pub fn snapshot(&self) -> ScreenState {
        self.state.read().clone()
    }

    /// Restore a state captured with [`ScreenSession::snapshot`]
    pub fn restore(&self, state: ScreenState) {
        *self.state.write() = state;
    }

    /// One-line description for logs
    pub fn describe(&self) -> String {
        let state = self.state.read();
        format!(
            "screen {} (rs {}, {}) {} {}x{} @ ({}, {})",
            self.id,
            self.render_id,
            state.name,
            state.combination,
            state.resolution.0,
            state.resolution.1,
            state.origin.0,
            state.origin.1
        )
    }
}
