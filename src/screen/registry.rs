//! Screen Session Registry
//!
//! Owns all live screen sessions and their groups behind one mutex. The
//! lock is held only for the map operation itself and never across a call
//! into a collaborator.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    DisplayId, GroupCombination, GroupId, RenderId, ScreenCombination, ScreenId, ScreenKind,
    ScreenSession, ScreenSessionGroup,
};
use crate::error::{DmError, Result};

/// Registry state guarded by the registry mutex
#[derive(Debug)]
struct RegistryInner {
    /// Live sessions, ordered by id for deterministic scans
    sessions: BTreeMap<ScreenId, Arc<ScreenSession>>,

    /// Groups by id
    groups: HashMap<GroupId, ScreenSessionGroup>,

    /// Child screen → owning group
    membership: HashMap<ScreenId, GroupId>,

    /// Next candidate for an allocated (non-hinted) screen id
    next_screen_id: u64,

    /// Next render id; never reused
    next_render_id: u64,

    /// Next group id; never reused
    next_group_id: u64,
}

impl RegistryInner {
    fn allocate_screen_id(&mut self) -> ScreenId {
        loop {
            let candidate = ScreenId::new(self.next_screen_id);
            self.next_screen_id = self.next_screen_id.wrapping_add(1);
            if candidate.is_valid() && !self.sessions.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn detach(&mut self, id: ScreenId) -> Option<GroupId> {
        let group_id = self.membership.remove(&id)?;
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.children.retain(|child| *child != id);
            if group.children.is_empty() {
                debug!("Dropping empty group {}", group_id);
                self.groups.remove(&group_id);
            }
        }
        Some(group_id)
    }

    /// Remove a group and reset its children to standalone
    fn dissolve(&mut self, group_id: GroupId) {
        let Some(group) = self.groups.remove(&group_id) else {
            return;
        };
        for child in group.children {
            self.membership.remove(&child);
            if let Some(session) = self.sessions.get(&child) {
                session.set_combination(ScreenCombination::Alone, false);
            }
        }
    }

    fn group_rooted_at(&self, main: ScreenId, combination: GroupCombination) -> Option<GroupId> {
        self.groups
            .values()
            .find(|g| g.main == main && g.combination == combination)
            .map(|g| g.id)
    }
}

/// Group state captured before a topology change
///
/// Holds every group that involved one of the captured screens, so the
/// groups can be put back verbatim if the change fails.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    screens: Vec<ScreenId>,
    groups: Vec<ScreenSessionGroup>,
}

/// Owner of every live [`ScreenSession`]
#[derive(Debug)]
pub struct ScreenSessionRegistry {
    inner: Mutex<RegistryInner>,

    /// First id of the virtual id range
    virtual_id_start: u64,

    /// Built-in screen
    default_screen_id: ScreenId,
}

impl ScreenSessionRegistry {
    /// Create an empty registry
    ///
    /// # Arguments
    ///
    /// * `default_screen_id` - Id of the built-in screen
    /// * `virtual_id_start` - Ids at or above this value are virtual
    pub fn new(default_screen_id: ScreenId, virtual_id_start: u64) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: BTreeMap::new(),
                groups: HashMap::new(),
                membership: HashMap::new(),
                next_screen_id: virtual_id_start,
                next_render_id: 1,
                next_group_id: 1,
            }),
            virtual_id_start,
            default_screen_id,
        }
    }

    /// Built-in screen id
    pub fn default_screen_id(&self) -> ScreenId {
        self.default_screen_id
    }

    /// Whether `id` falls in the virtual id range
    pub fn is_virtual_id(&self, id: ScreenId) -> bool {
        id.value() >= self.virtual_id_start
    }

    /// Create a session
    ///
    /// Uses `hint_id` when it is valid and not live; otherwise allocates a
    /// fresh id from the virtual range.
    ///
    /// # Returns
    ///
    /// Id of the new session, never one that is currently live
    pub fn create(&self, name: &str, hint_id: Option<ScreenId>) -> ScreenId {
        let mut inner = self.inner.lock();

        let id = match hint_id {
            Some(hint) if hint.is_valid() && !inner.sessions.contains_key(&hint) => hint,
            Some(hint) => {
                warn!("Screen id {} unavailable, allocating a fresh id", hint);
                inner.allocate_screen_id()
            }
            None => inner.allocate_screen_id(),
        };

        let render_id = RenderId::new(inner.next_render_id);
        inner.next_render_id += 1;

        let kind = if self.is_virtual_id(id) {
            ScreenKind::Virtual
        } else {
            ScreenKind::Physical
        };
        let session = Arc::new(ScreenSession::new(
            id,
            render_id,
            kind,
            id == self.default_screen_id,
            name,
        ));
        inner.sessions.insert(id, session);

        info!(
            "Screen session created: id={}, rs={}, name='{}', {:?}",
            id, render_id, name, kind
        );
        id
    }

    /// Look up a live session
    pub fn get(&self, id: ScreenId) -> Option<Arc<ScreenSession>> {
        self.inner.lock().sessions.get(&id).cloned()
    }

    /// Remove a session, detaching it from every group first
    ///
    /// # Returns
    ///
    /// `false` if `id` was not live; nothing is changed in that case
    pub fn remove(&self, id: ScreenId) -> bool {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(&id) {
            return false;
        }

        inner.detach(id);
        let rooted: Vec<GroupId> = inner
            .groups
            .values()
            .filter(|g| g.main == id)
            .map(|g| g.id)
            .collect();
        for group_id in rooted {
            debug!("Dissolving group {} rooted at removed screen {}", group_id, id);
            inner.dissolve(group_id);
        }

        if let Some(session) = inner.sessions.remove(&id) {
            session.mark_removed();
        }
        info!("Screen session removed: id={}", id);
        true
    }

    /// Render-surface id of a live session
    pub fn to_render_id(&self, id: ScreenId) -> Option<RenderId> {
        self.inner.lock().sessions.get(&id).map(|s| s.render_id())
    }

    /// Ids of all live sessions in ascending order
    pub fn all_ids(&self) -> Vec<ScreenId> {
        self.inner.lock().sessions.keys().copied().collect()
    }

    /// All live sessions in ascending id order
    pub fn sessions(&self) -> Vec<Arc<ScreenSession>> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Whether no session is live
    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }

    /// Display id of a live screen
    pub fn display_id(&self, id: ScreenId) -> Option<DisplayId> {
        self.get(id).map(|s| s.display_id())
    }

    /// Screen backing a display id
    pub fn screen_for_display(&self, display: DisplayId) -> Option<ScreenId> {
        let id = ScreenId::from(display);
        self.inner.lock().sessions.contains_key(&id).then_some(id)
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Add `child` to the group rooted at `main` with `combination`
    ///
    /// The group is created if needed. `child` leaves any other group first,
    /// and `main` stops being a child anywhere.
    ///
    /// # Errors
    ///
    /// * `InvalidParam` - `main` and `child` are the same screen
    /// * `NotFound` - either screen is not live
    pub fn attach(
        &self,
        main: ScreenId,
        child: ScreenId,
        combination: GroupCombination,
        trigger: &str,
    ) -> Result<GroupId> {
        if main == child {
            return Err(DmError::InvalidParam(format!(
                "screen {} cannot join its own group",
                main
            )));
        }

        let mut inner = self.inner.lock();
        for id in [main, child] {
            if !inner.sessions.contains_key(&id) {
                return Err(DmError::NotFound(id));
            }
        }

        inner.detach(main);
        let group_id = match inner.group_rooted_at(main, combination) {
            Some(existing) => existing,
            None => {
                let group_id = GroupId::new(inner.next_group_id);
                inner.next_group_id += 1;
                inner.groups.insert(
                    group_id,
                    ScreenSessionGroup::new(group_id, main, combination, trigger),
                );
                group_id
            }
        };

        if inner.membership.get(&child) != Some(&group_id) {
            inner.detach(child);
            inner.membership.insert(child, group_id);
        }
        if let Some(group) = inner.groups.get_mut(&group_id) {
            if !group.contains(child) {
                group.children.push(child);
            }
            group.trigger = trigger.to_string();
        }

        debug!(
            "Screen {} attached to {} group {} rooted at {}",
            child, combination, group_id, main
        );
        Ok(group_id)
    }

    /// Remove `id` from the group it belongs to
    ///
    /// # Returns
    ///
    /// `false` if the screen was not a group member
    pub fn detach(&self, id: ScreenId) -> bool {
        self.inner.lock().detach(id).is_some()
    }

    /// Group `id` belongs to as a child
    pub fn group_of(&self, id: ScreenId) -> Option<GroupId> {
        self.inner.lock().membership.get(&id).copied()
    }

    /// Copy of a group
    pub fn group(&self, id: GroupId) -> Option<ScreenSessionGroup> {
        self.inner.lock().groups.get(&id).cloned()
    }

    /// Group rooted at `main` with `combination`
    pub fn group_rooted_at(
        &self,
        main: ScreenId,
        combination: GroupCombination,
    ) -> Option<GroupId> {
        self.inner.lock().group_rooted_at(main, combination)
    }

    /// Copies of all groups ordered by id
    pub fn groups(&self) -> Vec<ScreenSessionGroup> {
        let mut groups: Vec<_> = self.inner.lock().groups.values().cloned().collect();
        groups.sort_by_key(|g| g.id);
        groups
    }

    /// Capture every group involving one of `screens`
    pub fn snapshot_groups(&self, screens: &[ScreenId]) -> GroupSnapshot {
        let inner = self.inner.lock();
        let groups = inner
            .groups
            .values()
            .filter(|g| screens.iter().any(|id| g.involves(*id)))
            .cloned()
            .collect();
        GroupSnapshot {
            screens: screens.to_vec(),
            groups,
        }
    }

    /// Put back the groups captured by [`ScreenSessionRegistry::snapshot_groups`]
    ///
    /// Groups created since the snapshot and rooted at a captured screen are
    /// dropped; captured groups are restored verbatim.
    pub fn restore_groups(&self, snapshot: GroupSnapshot) {
        let mut inner = self.inner.lock();

        for id in &snapshot.screens {
            inner.detach(*id);
        }
        let created: Vec<GroupId> = inner
            .groups
            .values()
            .filter(|g| snapshot.screens.contains(&g.main))
            .filter(|g| !snapshot.groups.iter().any(|saved| saved.id == g.id))
            .map(|g| g.id)
            .collect();
        for group_id in created {
            if let Some(group) = inner.groups.remove(&group_id) {
                for child in group.children {
                    inner.membership.remove(&child);
                }
            }
        }

        for group in snapshot.groups {
            let children: Vec<ScreenId> = group
                .children
                .iter()
                .copied()
                .filter(|child| inner.sessions.contains_key(child))
                .collect();
            if children.is_empty() {
                inner.groups.remove(&group.id);
                continue;
            }
            for child in &children {
                if inner.membership.get(child) != Some(&group.id) {
                    inner.detach(*child);
                    inner.membership.insert(*child, group.id);
                }
            }
            inner.groups.insert(
                group.id,
                ScreenSessionGroup {
                    children,
                    ..group
                },
            );
        }
    }

    /// Log registry contents
    pub fn log_summary(&self) {
        let sessions = self.sessions();
        let groups = self.groups();

        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║                  Screen Session Registry                   ║");
        info!("╚════════════════════════════════════════════════════════════╝");
        info!("  Sessions: {}, groups: {}", sessions.len(), groups.len());
        info!("  ─────────────────────────────────────────────────────────");
        for session in &sessions {
            info!("  {}", session.describe());
        }
        for group in &groups {
            info!(
                "  group {} [{}] main={} children={:?} trigger='{}'",
                group.id, group.combination, group.main, group.children, group.trigger
            );
        }
    }
}
