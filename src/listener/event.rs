//! Event Kinds and Payloads

use std::fmt;

use crate::screen::{DisplayId, GroupId, Rect, ScreenId};

/// Tag identifying one class of screen/display change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A screen was connected
    ScreenConnect,
    /// A screen was disconnected
    ScreenDisconnect,
    /// A screen's properties changed
    ScreenChange,
    /// Screens joined, left or changed a group
    ScreenGroupChange,
    /// A display was created
    DisplayCreate,
    /// A display was destroyed
    DisplayDestroy,
    /// A display's properties changed
    DisplayChange,
    /// A screenshot was taken
    Screenshot,
    /// Private-window visibility changed
    PrivateWindow,
    /// Fold status changed
    FoldStatus,
    /// Fold angle changed
    FoldAngle,
    /// Screen capture started or stopped
    CaptureStatus,
    /// Display mode changed
    DisplayMode,
    /// Available (non-decor) area changed
    AvailableArea,
    /// Magnetic keyboard attachment changed
    ScreenMagneticState,
    /// Brightness information changed
    BrightnessInfo,
}

impl EventKind {
    /// Every event kind
    pub const ALL: [EventKind; 16] = [
        EventKind::ScreenConnect,
        EventKind::ScreenDisconnect,
        EventKind::ScreenChange,
        EventKind::ScreenGroupChange,
        EventKind::DisplayCreate,
        EventKind::DisplayDestroy,
        EventKind::DisplayChange,
        EventKind::Screenshot,
        EventKind::PrivateWindow,
        EventKind::FoldStatus,
        EventKind::FoldAngle,
        EventKind::CaptureStatus,
        EventKind::DisplayMode,
        EventKind::AvailableArea,
        EventKind::ScreenMagneticState,
        EventKind::BrightnessInfo,
    ];

    /// Stable name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ScreenConnect => "screen-connect",
            EventKind::ScreenDisconnect => "screen-disconnect",
            EventKind::ScreenChange => "screen-change",
            EventKind::ScreenGroupChange => "screen-group-change",
            EventKind::DisplayCreate => "display-create",
            EventKind::DisplayDestroy => "display-destroy",
            EventKind::DisplayChange => "display-change",
            EventKind::Screenshot => "screenshot",
            EventKind::PrivateWindow => "private-window",
            EventKind::FoldStatus => "fold-status",
            EventKind::FoldAngle => "fold-angle",
            EventKind::CaptureStatus => "capture-status",
            EventKind::DisplayMode => "display-mode",
            EventKind::AvailableArea => "available-area",
            EventKind::ScreenMagneticState => "screen-magnetic-state",
            EventKind::BrightnessInfo => "brightness-info",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a screen changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenChangeReason {
    /// Origin moved
    Placement,
    /// Combination role changed
    Combination,
    /// Resolution changed
    Resolution,
    /// Density changed
    Density,
}

/// How group membership changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupChange {
    /// Screens joined a group
    Added,
    /// Screens left a group
    Removed,
    /// Group combination or root changed
    Changed,
}

/// Why a display changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayChangeReason {
    /// Origin moved
    Placement,
    /// Combination role changed
    Combination,
    /// Resolution changed
    Resolution,
}

/// Fold posture reported by the sensor layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldState {
    /// Unknown posture
    Unknown,
    /// Fully unfolded
    Expanded,
    /// Fully folded
    Folded,
    /// Partially folded
    HalfFolded,
}

/// Brightness reported for a display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brightness {
    /// Current brightness
    pub current: f32,
    /// Maximum brightness
    pub max: f32,
    /// SDR reference white in nits
    pub sdr_nits: f32,
}

/// Payload delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    /// A screen was connected
    ScreenConnect {
        /// Connected screen
        screen: ScreenId,
    },
    /// A screen was disconnected
    ScreenDisconnect {
        /// Disconnected screen
        screen: ScreenId,
    },
    /// A screen's properties changed
    ScreenChange {
        /// Changed screen
        screen: ScreenId,
        /// What changed
        reason: ScreenChangeReason,
    },
    /// Group membership changed
    ScreenGroupChange {
        /// Affected screens
        screens: Vec<ScreenId>,
        /// Group involved, if any remains
        group: Option<GroupId>,
        /// Kind of change
        change: GroupChange,
        /// Operation that caused it
        trigger: String,
    },
    /// A display was created
    DisplayCreate {
        /// New display
        display: DisplayId,
    },
    /// A display was destroyed
    DisplayDestroy {
        /// Removed display
        display: DisplayId,
    },
    /// A display's properties changed
    DisplayChange {
        /// Changed display
        display: DisplayId,
        /// What changed
        reason: DisplayChangeReason,
    },
    /// A screenshot was taken
    Screenshot {
        /// Captured display
        display: DisplayId,
    },
    /// Private-window visibility changed
    PrivateWindow {
        /// Whether a private window is visible
        visible: bool,
    },
    /// Fold status changed
    FoldStatus {
        /// New posture
        state: FoldState,
    },
    /// Fold angle changed
    FoldAngle {
        /// Hinge angles in degrees
        angles: Vec<f32>,
    },
    /// Capture started or stopped
    CaptureStatus {
        /// Whether a capture is running
        capturing: bool,
    },
    /// Display mode changed
    DisplayMode {
        /// Opaque mode value from the fold layer
        mode: u32,
    },
    /// Available area changed
    AvailableArea {
        /// Affected display
        display: DisplayId,
        /// New available area
        area: Rect,
    },
    /// Magnetic keyboard state changed
    ScreenMagneticState {
        /// Whether a keyboard is attached
        attached: bool,
    },
    /// Brightness changed
    BrightnessInfo {
        /// Affected display
        display: DisplayId,
        /// New brightness
        brightness: Brightness,
    },
}

impl ScreenEvent {
    /// Kind this payload is delivered under
    pub fn kind(&self) -> EventKind {
        match self {
            ScreenEvent::ScreenConnect { .. } => EventKind::ScreenConnect,
            ScreenEvent::ScreenDisconnect { .. } => EventKind::ScreenDisconnect,
            ScreenEvent::ScreenChange { .. } => EventKind::ScreenChange,
            ScreenEvent::ScreenGroupChange { .. } => EventKind::ScreenGroupChange,
            ScreenEvent::DisplayCreate { .. } => EventKind::DisplayCreate,
            ScreenEvent::DisplayDestroy { .. } => EventKind::DisplayDestroy,
            ScreenEvent::DisplayChange { .. } => EventKind::DisplayChange,
            ScreenEvent::Screenshot { .. } => EventKind::Screenshot,
            ScreenEvent::PrivateWindow { .. } => EventKind::PrivateWindow,
            ScreenEvent::FoldStatus { .. } => EventKind::FoldStatus,
            ScreenEvent::FoldAngle { .. } => EventKind::FoldAngle,
            ScreenEvent::CaptureStatus { .. } => EventKind::CaptureStatus,
            ScreenEvent::DisplayMode { .. } => EventKind::DisplayMode,
            ScreenEvent::AvailableArea { .. } => EventKind::AvailableArea,
            ScreenEvent::ScreenMagneticState { .. } => EventKind::ScreenMagneticState,
            ScreenEvent::BrightnessInfo { .. } => EventKind::BrightnessInfo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_kinds_unique_names() {
        let names: HashSet<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn test_payload_kind() {
        let event = ScreenEvent::FoldAngle {
            angles: vec![90.0],
        };
        assert_eq!(event.kind(), EventKind::FoldAngle);
        let event = ScreenEvent::DisplayChange {
            display: DisplayId::new(1),
            reason: DisplayChangeReason::Placement,
        };
        assert_eq!(event.kind(), EventKind::DisplayChange);
    }
}
