//! Screen Session Groups

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{GroupId, ScreenCombination, ScreenId};

/// Relationship shared by all children of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupCombination {
    /// Children show the main screen's content
    Mirror,
    /// Children extend the main screen's coordinate space
    Extend,
}

impl GroupCombination {
    /// Combination carried by every child of such a group
    pub fn child_combination(self) -> ScreenCombination {
        match self {
            GroupCombination::Mirror => ScreenCombination::Mirror,
            GroupCombination::Extend => ScreenCombination::Extend,
        }
    }

    /// Group combination implied by a child combination
    pub fn from_child(combination: ScreenCombination) -> Option<Self> {
        match combination {
            ScreenCombination::Mirror => Some(GroupCombination::Mirror),
            ScreenCombination::Extend => Some(GroupCombination::Extend),
            _ => None,
        }
    }
}

impl fmt::Display for GroupCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.child_combination().fmt(f)
    }
}

/// A main screen plus the screens mirroring or extending it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSessionGroup {
    /// Group id
    pub id: GroupId,

    /// Root screen
    pub main: ScreenId,

    /// Member screens in attach order
    pub children: Vec<ScreenId>,

    /// Relationship shared by the children
    pub combination: GroupCombination,

    /// Which operation created or last changed the group
    pub trigger: String,
}

impl ScreenSessionGroup {
    pub(crate) fn new(
        id: GroupId,
        main: ScreenId,
        combination: GroupCombination,
        trigger: &str,
    ) -> Self {
        Self {
            id,
            main,
            children: Vec::new(),
            combination,
            trigger: trigger.to_string(),
        }
    }

    /// Whether `id` is a child of this group
    pub fn contains(&self, id: ScreenId) -> bool {
        self.children.contains(&id)
    }

    /// Whether `id` is the main screen or a child
    pub fn involves(&self, id: ScreenId) -> bool {
        self.main == id || self.contains(id)
    }
}
