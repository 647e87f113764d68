//! Screen Session Model
//!
//! In-memory representation of every physical and virtual screen attached
//! to the device, plus the registry that owns them.
//!
//! # Overview
//!
//! A [`ScreenSession`] is created when a physical screen connects or a
//! virtual screen is requested, and lives in the [`ScreenSessionRegistry`]
//! until it is disconnected or destroyed. Sessions that mirror or extend
//! another screen are tracked as children of a [`ScreenSessionGroup`]
//! rooted at the main screen.
//!
//! ```text
//! ScreenSessionRegistry
//!   ├─> sessions   ScreenId → Arc<ScreenSession>
//!   ├─> groups     GroupId  → ScreenSessionGroup { main, children, combination }
//!   └─> membership ScreenId → GroupId   (a child belongs to at most one group)
//! ```
//!
//! # Identity
//!
//! Screen ids are opaque 64-bit handles. A screen id may be reused after
//! its session is removed, but every session receives a render id that is
//! never reused, so a recycled screen id always resolves to a new identity.
//!
//! # Combinations
//!
//! | Combination | Role                                              |
//! |-------------|---------------------------------------------------|
//! | `Alone`     | Standalone screen, not part of any group          |
//! | `Main`      | Root of a mirror/extend pair or group             |
//! | `Mirror`    | Shows the main screen's content                   |
//! | `Extend`    | Extends the main screen's coordinate space        |
//! | `Unique`    | Independent surface removed from any group        |

mod group;
mod registry;
mod session;

pub use group::{GroupCombination, ScreenSessionGroup};
pub use registry::{GroupSnapshot, ScreenSessionRegistry};
pub use session::{Placement, ScreenSession, ScreenState};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Sentinel distinct from every valid id
            pub const INVALID: Self = Self(u64::MAX);

            /// Wrap a raw id value
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Raw id value
            pub const fn value(self) -> u64 {
                self.0
            }

            /// Whether this is a usable id
            pub const fn is_valid(self) -> bool {
                self.0 != u64::MAX
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}", self.0)
                } else {
                    write!(f, "invalid")
                }
            }
        }
    };
}

opaque_id!(
    /// Screen session identifier
    ScreenId
);
opaque_id!(
    /// Logical display identifier exposed to applications
    DisplayId
);
opaque_id!(
    /// Render-surface identifier owned by the composition service
    RenderId
);
opaque_id!(
    /// Screen group identifier
    GroupId
);
opaque_id!(
    /// Composition node handle returned by the render service
    NodeId
);

impl From<ScreenId> for DisplayId {
    fn from(id: ScreenId) -> Self {
        DisplayId(id.0)
    }
}

impl From<DisplayId> for ScreenId {
    fn from(id: DisplayId) -> Self {
        ScreenId(id.0)
    }
}

/// Topological role of a screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenCombination {
    /// Standalone
    #[default]
    Alone,
    /// Root of a pair or group
    Main,
    /// Mirrors the main screen
    Mirror,
    /// Extends the main screen
    Extend,
    /// Independent surface
    Unique,
}

impl fmt::Display for ScreenCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScreenCombination::Alone => "alone",
            ScreenCombination::Main => "main",
            ScreenCombination::Mirror => "mirror",
            ScreenCombination::Extend => "extend",
            ScreenCombination::Unique => "unique",
        };
        f.write_str(name)
    }
}

/// Whether a screen's coordinate space is authoritative for global coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceMode {
    /// Authoritative
    Main,
    /// Shows another screen's content
    Mirror,
    /// Extends the main screen
    Extend,
    /// Standalone, not the default screen
    Alone,
    /// Independent surface
    Unique,
}

/// Physical screens come from hardware, virtual ones from explicit requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenKind {
    /// Hardware-backed screen
    Physical,
    /// Software screen (casting, recording, ...)
    Virtual,
}

/// Axis-aligned rectangle in global coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Create a rectangle
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, widened so it cannot overflow
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge, widened so it cannot overflow
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Half-open containment test
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (x as i64, y as i64);
        x >= self.x as i64 && x < self.right() && y >= self.y as i64 && y < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ids_are_distinct() {
        assert!(!ScreenId::INVALID.is_valid());
        assert!(ScreenId::new(0).is_valid());
        assert_ne!(ScreenId::INVALID, ScreenId::new(0));
        assert_eq!(DisplayId::INVALID.to_string(), "invalid");
    }

    #[test]
    fn test_display_id_conversion() {
        let display: DisplayId = ScreenId::new(7).into();
        assert_eq!(display, DisplayId::new(7));
        assert_eq!(ScreenId::from(display), ScreenId::new(7));
    }

    #[test]
    fn test_rect_contains_half_open() {
        let rect = Rect::new(0, 0, 1920, 1080);
        assert!(rect.contains(0, 0));
        assert!(rect.contains(1919, 1079));
        assert!(!rect.contains(1920, 0));
        assert!(!rect.contains(0, 1080));
        assert!(!rect.contains(-1, 0));
    }

    #[test]
    fn test_rect_edges_do_not_overflow() {
        let rect = Rect::new(i32::MAX, 0, 100, 100);
        assert_eq!(rect.right(), i32::MAX as i64 + 100);
        assert!(rect.contains(i32::MAX, 50));
    }
}
