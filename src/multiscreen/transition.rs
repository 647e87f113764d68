//! Transition Table
//!
//! Legal combination pairs and the handler for each (source, target) edge.

use std::fmt;
use std::str::FromStr;

use crate::error::DmError;
use crate::screen::{GroupCombination, ScreenCombination};

/// Requested multi-screen operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperateType {
    /// `"mirror"`
    Mirror,
    /// `"extend"`
    Extend,
    /// `"unique"`
    Unique,
}

impl OperateType {
    /// Operation name as received from callers
    pub fn as_str(self) -> &'static str {
        match self {
            OperateType::Mirror => "mirror",
            OperateType::Extend => "extend",
            OperateType::Unique => "unique",
        }
    }

    /// Target `(inner, external)` combinations implied by the operation
    pub fn targets(self) -> (ScreenCombination, ScreenCombination) {
        match self {
            OperateType::Mirror => (ScreenCombination::Main, ScreenCombination::Mirror),
            OperateType::Extend => (ScreenCombination::Main, ScreenCombination::Extend),
            OperateType::Unique => (ScreenCombination::Main, ScreenCombination::Unique),
        }
    }
}

impl FromStr for OperateType {
    type Err = DmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mirror" => Ok(OperateType::Mirror),
            "extend" => Ok(OperateType::Extend),
            "unique" => Ok(OperateType::Unique),
            other => Err(DmError::InvalidParam(format!(
                "unknown operate type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OperateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(inner, external)` combination pair the state machine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombinationPair {
    /// Inner main, external extends it
    MainExtend,
    /// Inner main, external mirrors it
    MainMirror,
    /// External main, inner extends it
    ExtendMain,
    /// External main, inner mirrors it
    MirrorMain,
}

impl CombinationPair {
    /// Every legal pair
    pub const ALL: [CombinationPair; 4] = [
        CombinationPair::MainExtend,
        CombinationPair::MainMirror,
        CombinationPair::ExtendMain,
        CombinationPair::MirrorMain,
    ];

    /// Recognise a pair of combinations
    pub fn from_combinations(inner: ScreenCombination, external: ScreenCombination) -> Option<Self> {
        use ScreenCombination::{Extend, Main, Mirror};
        match (inner, external) {
            (Main, Extend) => Some(CombinationPair::MainExtend),
            (Main, Mirror) => Some(CombinationPair::MainMirror),
            (Extend, Main) => Some(CombinationPair::ExtendMain),
            (Mirror, Main) => Some(CombinationPair::MirrorMain),
            _ => None,
        }
    }

    /// `(inner, external)` combinations of the pair
    pub fn combinations(self) -> (ScreenCombination, ScreenCombination) {
        use ScreenCombination::{Extend, Main, Mirror};
        match self {
            CombinationPair::MainExtend => (Main, Extend),
            CombinationPair::MainMirror => (Main, Mirror),
            CombinationPair::ExtendMain => (Extend, Main),
            CombinationPair::MirrorMain => (Mirror, Main),
        }
    }

    /// Whether the inner screen is the main one
    pub fn inner_is_main(self) -> bool {
        matches!(self, CombinationPair::MainExtend | CombinationPair::MainMirror)
    }

    /// Role of the non-main screen
    pub fn secondary_role(self) -> GroupCombination {
        match self {
            CombinationPair::MainExtend | CombinationPair::ExtendMain => GroupCombination::Extend,
            CombinationPair::MainMirror | CombinationPair::MirrorMain => GroupCombination::Mirror,
        }
    }
}

impl fmt::Display for CombinationPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (inner, external) = self.combinations();
        write!(f, "({}, {})", inner, external)
    }
}

/// What a transition does to the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    /// Target equals source
    Unchanged,
    /// Same main screen, secondary switches between mirror and extend
    SwitchSecondary,
    /// Main and secondary trade places, secondary role kind kept
    SwapRoles,
    /// Main and secondary trade places and the role kind switches
    SwapAndSwitch,
}

impl Handler {
    /// Handler for a source/target edge
    ///
    /// Total over legal pairs: adding a pair without handlers is a compile
    /// error here rather than a runtime lookup miss.
    pub fn for_edge(source: CombinationPair, target: CombinationPair) -> Handler {
        use CombinationPair::{ExtendMain, MainExtend, MainMirror, MirrorMain};
        match (source, target) {
            (MainExtend, MainExtend)
            | (MainMirror, MainMirror)
            | (ExtendMain, ExtendMain)
            | (MirrorMain, MirrorMain) => Handler::Unchanged,

            (MainExtend, MainMirror)
            | (MainMirror, MainExtend)
            | (ExtendMain, MirrorMain)
            | (MirrorMain, ExtendMain) => Handler::SwitchSecondary,

            (MainExtend, ExtendMain)
            | (ExtendMain, MainExtend)
            | (MainMirror, MirrorMain)
            | (MirrorMain, MainMirror) => Handler::SwapRoles,

            (MainExtend, MirrorMain)
            | (MirrorMain, MainExtend)
            | (MainMirror, ExtendMain)
            | (ExtendMain, MainMirror) => Handler::SwapAndSwitch,
        }
    }

    /// Handler for the current pair and requested target combinations
    ///
    /// `None` means no handler exists for the target from this source.
    pub fn lookup(
        source: CombinationPair,
        target: (ScreenCombination, ScreenCombination),
    ) -> Option<Handler> {
        CombinationPair::from_combinations(target.0, target.1)
            .map(|target| Handler::for_edge(source, target))
    }
}
