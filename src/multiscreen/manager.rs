//! Multi-Screen Manager
//!
//! Operations over any number of screens. Exactly-two-screen changes with a
//! legal source pair go through [`MultiScreenModeChangeManager`]; everything
//! else is applied to groups directly inside a change journal.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::change::ChangeJournal;
use super::mode_change::{MultiScreenModeChangeManager, ScreenClaim};
use super::position::{are_screens_touching, calculate_bounds, ScreenPositionOptions};
use super::transition::{CombinationPair, OperateType};
use crate::client::{Collaborators, ConnectionEvent};
use crate::error::{DmError, Result};
use crate::listener::{
    DisplayChangeReason, GroupChange, ListenerRegistry, ScreenChangeReason, ScreenEvent,
};
use crate::screen::{
    DisplayId, GroupCombination, GroupId, Rect, ScreenCombination, ScreenId, ScreenKind,
    ScreenSession, ScreenSessionRegistry,
};

/// Screen ids split by id domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenClassification {
    /// Ids below the virtual boundary, in request order
    pub physical_screens: Vec<ScreenId>,

    /// Ids at or above the virtual boundary, in request order
    pub virtual_screens: Vec<ScreenId>,
}

impl ScreenClassification {
    /// Whether neither domain holds an id
    pub fn is_empty(&self) -> bool {
        self.physical_screens.is_empty() && self.virtual_screens.is_empty()
    }
}

/// Multi-screen orchestration
#[derive(Debug)]
pub struct MultiScreenManager {
    registry: Arc<ScreenSessionRegistry>,
    listeners: Arc<ListenerRegistry>,
    collaborators: Arc<Collaborators>,
    mode_change: Arc<MultiScreenModeChangeManager>,

    /// Main screen and secondary role before the internal screen went off
    last_screen_mode: Mutex<Option<(ScreenId, GroupCombination)>>,
}

impl MultiScreenManager {
    /// Create a manager over shared core state
    pub fn new(
        registry: Arc<ScreenSessionRegistry>,
        listeners: Arc<ListenerRegistry>,
        collaborators: Arc<Collaborators>,
        mode_change: Arc<MultiScreenModeChangeManager>,
    ) -> Self {
        Self {
            registry,
            listeners,
            collaborators,
            mode_change,
            last_screen_mode: Mutex::new(None),
        }
    }

    /// Pairwise state machine used for two-screen changes
    pub fn mode_change(&self) -> &Arc<MultiScreenModeChangeManager> {
        &self.mode_change
    }

    /// Split `ids` into physical and virtual screens
    ///
    /// Ids that do not resolve to a live session are dropped, as are
    /// duplicates.
    pub fn classify(&self, ids: &[ScreenId]) -> ScreenClassification {
        let mut classes = ScreenClassification::default();
        for id in ids {
            let Some(session) = self.registry.get(*id) else {
                debug!("Skipping unknown screen {}", id);
                continue;
            };
            let bucket = match session.kind() {
                ScreenKind::Physical => &mut classes.physical_screens,
                ScreenKind::Virtual => &mut classes.virtual_screens,
            };
            if !bucket.contains(id) {
                bucket.push(*id);
            }
        }
        classes
    }

    /// Apply an operator request to a list of screens
    ///
    /// * `"mirror"` - the first id becomes main, the rest mirror it
    /// * `"unique"` - every id becomes an independent surface
    /// * `"extend"` - exactly two ids, routed pairwise
    pub fn set_multi_screen_mode(&self, operate_type: &str, ids: &[ScreenId]) -> Result<()> {
        let operate: OperateType = operate_type.parse()?;
        info!("Multi-screen mode '{}' requested for {:?}", operate, ids);

        match operate {
            OperateType::Mirror => match ids.split_first() {
                Some((main, rest)) => self.mirror_switch(*main, rest).map(|_| ()),
                None => Ok(()),
            },
            OperateType::Unique => self.unique_switch(ids).map(|_| ()),
            OperateType::Extend => match ids {
                [] => Ok(()),
                [inner, external] => {
                    let inner = self.session(*inner)?;
                    let external = self.session(*external)?;
                    self.mode_change
                        .on_mode_change_request(Some(&*inner), Some(&*external), operate.as_str())
                }
                _ => Err(DmError::InvalidParam(format!(
                    "extend needs exactly two screens, got {}",
                    ids.len()
                ))),
            },
        }
    }

    fn session(&self, id: ScreenId) -> Result<Arc<ScreenSession>> {
        self.registry.get(id).ok_or(DmError::NotFound(id))
    }

    // =========================================================================
    // Mirror
    // =========================================================================

    /// Build or extend the mirror group rooted at `main_id`
    ///
    /// # Returns
    ///
    /// The mirror group rooted at `main_id`, or `None` when there is nothing
    /// to group
    ///
    /// # Errors
    ///
    /// * `NotFound` - `main_id` is not live
    /// * `InvalidCalling` - a required collaborator is unavailable
    pub fn mirror_switch(
        &self,
        main_id: ScreenId,
        candidates: &[ScreenId],
    ) -> Result<Option<GroupId>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        self.session(main_id)?;

        let others: Vec<ScreenId> = candidates
            .iter()
            .copied()
            .filter(|id| *id != main_id)
            .collect();
        let classes = self.classify(&others);
        if classes.is_empty() {
            return Ok(self
                .registry
                .group_rooted_at(main_id, GroupCombination::Mirror));
        }

        let mut group = None;
        if !classes.physical_screens.is_empty() {
            group = self.physical_screen_mirror_switch(main_id, &classes.physical_screens)?;
        }
        if !classes.virtual_screens.is_empty() {
            group = self
                .virtual_screen_mirror_switch(main_id, &classes.virtual_screens)?
                .or(group);
        }
        Ok(group)
    }

    /// Mirror physical screens onto `main_id`
    ///
    /// Ids outside the physical domain are ignored.
    pub fn physical_screen_mirror_switch(
        &self,
        main_id: ScreenId,
        ids: &[ScreenId],
    ) -> Result<Option<GroupId>> {
        let ids = self.classify(ids).physical_screens;
        self.mirror_group(main_id, &ids, "physical-mirror")
    }

    /// Mirror virtual screens onto `main_id`
    ///
    /// Ids outside the virtual domain are ignored.
    pub fn virtual_screen_mirror_switch(
        &self,
        main_id: ScreenId,
        ids: &[ScreenId],
    ) -> Result<Option<GroupId>> {
        let ids = self.classify(ids).virtual_screens;
        self.mirror_group(main_id, &ids, "virtual-mirror")
    }

    fn mirror_group(
        &self,
        main_id: ScreenId,
        ids: &[ScreenId],
        trigger: &str,
    ) -> Result<Option<GroupId>> {
        let main = self.session(main_id)?;
        let candidates: Vec<Arc<ScreenSession>> = ids
            .iter()
            .filter(|id| **id != main_id)
            .filter_map(|id| self.registry.get(*id))
            .collect();
        if candidates.is_empty() {
            return Ok(self
                .registry
                .group_rooted_at(main_id, GroupCombination::Mirror));
        }

        if let [candidate] = candidates.as_slice() {
            if CombinationPair::from_combinations(main.combination(), candidate.combination())
                .is_some()
            {
                self.mode_change.on_mode_change_request(
                    Some(&*main),
                    Some(&**candidate),
                    OperateType::Mirror.as_str(),
                )?;
                return Ok(self
                    .registry
                    .group_rooted_at(main_id, GroupCombination::Mirror));
            }
        }

        let mut listed = vec![main_id];
        listed.extend(candidates.iter().map(|c| c.id()));
        let (_claim, orphans) = self.claim_with_orphans(&listed, &candidates);

        let existing = self
            .registry
            .group_rooted_at(main_id, GroupCombination::Mirror);
        let already_mirrored = main.combination() == ScreenCombination::Main
            && existing.is_some()
            && orphans.is_empty()
            && candidates.iter().all(|c| {
                c.mirror_source() == Some(main_id) && self.registry.group_of(c.id()) == existing
            });
        if already_mirrored {
            info!("Screens {:?} already mirror screen {}", ids, main_id);
            return Ok(existing);
        }

        let render = self.collaborators.require_render_service(trigger)?;
        let mut journal = ChangeJournal::new(
            &self.registry,
            self.collaborators.scene_client(),
            render,
            trigger,
        );
        let mut affected: Vec<&ScreenSession> = vec![&main];
        affected.extend(candidates.iter().map(|c| c.as_ref()));
        affected.extend(orphans.iter().map(|o| o.as_ref()));
        journal.capture(&affected);

        let outcome = orphans
            .iter()
            .try_for_each(|orphan| Self::release(&mut journal, orphan, ScreenCombination::Alone))
            .and_then(|()| Self::build_mirror_group(&mut journal, &main, &candidates));
        match outcome {
            Ok(group) => {
                journal.commit();
                info!(
                    "Mirror group {} rooted at screen {}: {:?} ({} released to alone)",
                    group,
                    main_id,
                    candidates.iter().map(|c| c.id()).collect::<Vec<_>>(),
                    orphans.len()
                );
                self.publish_group_change(&affected, Some(group), GroupChange::Added, trigger);
                Ok(Some(group))
            }
            Err(e) => {
                error!("Mirror onto screen {} failed: {}", main_id, e);
                journal.rollback();
                Err(e)
            }
        }
    }

    fn build_mirror_group<'a>(
        journal: &mut ChangeJournal<'a>,
        main: &'a ScreenSession,
        candidates: &'a [Arc<ScreenSession>],
    ) -> Result<GroupId> {
        let main_before = main.combination();
        if main_before == ScreenCombination::Mirror || main.display_node().is_none() {
            journal.attach_display_node(main)?;
        }
        main.set_combination(ScreenCombination::Main, false);
        if main_before == ScreenCombination::Mirror {
            journal.create_session_only(main, false)?;
            journal.notify_connection(main, ConnectionEvent::Connected)?;
        } else if main_before != ScreenCombination::Main {
            journal.report_combination(main, ScreenCombination::Main)?;
        }

        let mut group = GroupId::INVALID;
        for candidate in candidates {
            let before = candidate.combination();
            if before != ScreenCombination::Mirror {
                journal.notify_connection(candidate, ConnectionEvent::Disconnected)?;
            }
            let still_valid = before == ScreenCombination::Mirror
                && candidate.mirror_source() == Some(main.id())
                && candidate.display_node().is_some();
            if !still_valid {
                journal.attach_mirror_node(candidate, main)?;
            }
            candidate.set_mirror_source(main.id());
            journal.move_to(candidate, 0, 0)?;
            group = journal.attach(main.id(), candidate.id(), GroupCombination::Mirror)?;
        }
        Ok(group)
    }

    // =========================================================================
    // Unique
    // =========================================================================

    /// Make every listed screen an independent surface
    ///
    /// Unknown ids are skipped. Children of a group rooted at a listed
    /// screen that are not listed themselves fall back to `Alone`.
    ///
    /// # Returns
    ///
    /// Display ids of the screens that are now unique
    ///
    /// # Errors
    ///
    /// * `InvalidParam` - the list is non-empty but no id resolves
    pub fn unique_switch(&self, ids: &[ScreenId]) -> Result<Vec<DisplayId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let classes = self.classify(ids);
        if classes.is_empty() {
            return Err(DmError::InvalidParam(format!(
                "none of {:?} is a live screen",
                ids
            )));
        }

        let mut displays = self.physical_screen_unique_switch(&classes.physical_screens)?;
        displays.extend(self.virtual_screen_unique_switch(&classes.virtual_screens)?);
        Ok(displays)
    }

    /// Make physical screens unique; other ids are ignored
    pub fn physical_screen_unique_switch(&self, ids: &[ScreenId]) -> Result<Vec<DisplayId>> {
        let ids = self.classify(ids).physical_screens;
        self.make_unique(&ids, "physical-unique")
    }

    /// Make virtual screens unique; other ids are ignored
    pub fn virtual_screen_unique_switch(&self, ids: &[ScreenId]) -> Result<Vec<DisplayId>> {
        let ids = self.classify(ids).virtual_screens;
        self.make_unique(&ids, "virtual-unique")
    }

    fn make_unique(&self, ids: &[ScreenId], trigger: &str) -> Result<Vec<DisplayId>> {
        let targets: Vec<Arc<ScreenSession>> =
            ids.iter().filter_map(|id| self.registry.get(*id)).collect();
        let displays: Vec<DisplayId> = targets.iter().map(|s| s.display_id()).collect();

        if targets
            .iter()
            .all(|s| s.combination() == ScreenCombination::Unique)
        {
            return Ok(displays);
        }

        let (_claim, orphans) = self.claim_with_orphans(ids, &targets);
        let pending: Vec<Arc<ScreenSession>> = targets
            .iter()
            .filter(|s| s.combination() != ScreenCombination::Unique)
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(displays);
        }

        let render = self.collaborators.require_render_service(trigger)?;
        let mut journal = ChangeJournal::new(
            &self.registry,
            self.collaborators.scene_client(),
            render,
            trigger,
        );
        let affected: Vec<&ScreenSession> = orphans
            .iter()
            .chain(pending.iter())
            .map(|s| s.as_ref())
            .collect();
        journal.capture(&affected);

        let outcome = orphans
            .iter()
            .map(|s| (s, ScreenCombination::Alone))
            .chain(pending.iter().map(|s| (s, ScreenCombination::Unique)))
            .try_for_each(|(session, target)| Self::release(&mut journal, session, target));

        match outcome {
            Ok(()) => {
                journal.commit();
                info!(
                    "Screens {:?} now unique ({} released to alone)",
                    pending.iter().map(|s| s.id()).collect::<Vec<_>>(),
                    orphans.len()
                );
                self.publish_group_change(&affected, None, GroupChange::Removed, trigger);
                Ok(displays)
            }
            Err(e) => {
                error!("Unique switch for {:?} failed: {}", ids, e);
                journal.rollback();
                Err(e)
            }
        }
    }

    /// Children of groups rooted at `roots` that are not in `listed`
    fn orphans_of(
        &self,
        roots: &[Arc<ScreenSession>],
        listed: &[ScreenId],
    ) -> Vec<Arc<ScreenSession>> {
        let mut orphans: Vec<Arc<ScreenSession>> = Vec::new();
        for root in roots {
            for combination in [GroupCombination::Mirror, GroupCombination::Extend] {
                let Some(group) = self
                    .registry
                    .group_rooted_at(root.id(), combination)
                    .and_then(|id| self.registry.group(id))
                else {
                    continue;
                };
                for child in group.children {
                    let seen = orphans.iter().any(|o| o.id() == child);
                    if !listed.contains(&child) && !seen {
                        if let Some(orphan) = self.registry.get(child) {
                            orphans.push(orphan);
                        }
                    }
                }
            }
        }
        orphans
    }

    /// Claim `listed` together with the orphans of groups rooted at `roots`
    ///
    /// Membership is re-read once the claim is held; a concurrent change
    /// that added a child in between forces another round.
    fn claim_with_orphans(
        &self,
        listed: &[ScreenId],
        roots: &[Arc<ScreenSession>],
    ) -> (ScreenClaim<'_>, Vec<Arc<ScreenSession>>) {
        loop {
            let mut ids = listed.to_vec();
            ids.extend(self.orphans_of(roots, listed).iter().map(|o| o.id()));
            let claim = self.mode_change.claim_screens(&ids);

            let orphans = self.orphans_of(roots, listed);
            if orphans.iter().all(|o| ids.contains(&o.id())) {
                return (claim, orphans);
            }
            debug!("Groups under {:?} changed while claiming, retrying", listed);
        }
    }

    /// Take a screen out of its group and give it its own content
    fn release<'a>(
        journal: &mut ChangeJournal<'a>,
        session: &'a ScreenSession,
        target: ScreenCombination,
    ) -> Result<()> {
        if session.combination() == ScreenCombination::Mirror {
            journal.attach_display_node(session)?;
            journal.create_session_only(session, false)?;
            journal.notify_connection(session, ConnectionEvent::Connected)?;
        } else {
            if session.display_node().is_none() {
                journal.attach_display_node(session)?;
            }
            journal.report_combination(session, target)?;
        }
        journal.detach(session.id());
        session.set_combination(target, false);
        Ok(())
    }

    fn publish_group_change(
        &self,
        sessions: &[&ScreenSession],
        group: Option<GroupId>,
        change: GroupChange,
        trigger: &str,
    ) {
        self.listeners.publish(&ScreenEvent::ScreenGroupChange {
            screens: sessions.iter().map(|s| s.id()).collect(),
            group,
            change,
            trigger: trigger.to_string(),
        });
        for session in sessions {
            self.listeners.publish(&ScreenEvent::ScreenChange {
                screen: session.id(),
                reason: ScreenChangeReason::Combination,
            });
        }
    }

    // =========================================================================
    // Internal Screen Power Flows
    // =========================================================================

    /// Remember which screen is main and what the other one does
    pub fn set_last_screen_mode(&self, main: ScreenId, mode: GroupCombination) {
        debug!("Last screen mode: main {} with {} secondary", main, mode);
        *self.last_screen_mode.lock() = Some((main, mode));
    }

    /// Remembered main screen and secondary role
    pub fn last_screen_mode(&self) -> Option<(ScreenId, GroupCombination)> {
        *self.last_screen_mode.lock()
    }

    /// Remember the current pair, if it is a legal one
    pub fn record_last_screen_mode(&self, internal: &ScreenSession, external: &ScreenSession) {
        match CombinationPair::from_combinations(internal.combination(), external.combination()) {
            Some(pair) => {
                let main = if pair.inner_is_main() {
                    internal.id()
                } else {
                    external.id()
                };
                self.set_last_screen_mode(main, pair.secondary_role());
            }
            None => debug!(
                "Screens {}/{} not paired, last screen mode unchanged",
                internal.id(),
                external.id()
            ),
        }
    }

    /// Internal screen powered on: restore the remembered pair
    ///
    /// Without a remembered mode the current pair is recorded and nothing
    /// changes.
    pub fn internal_screen_on_change(
        &self,
        internal: Option<&ScreenSession>,
        external: Option<&ScreenSession>,
    ) -> Result<()> {
        let (Some(internal), Some(external)) = (internal, external) else {
            return Err(DmError::NullPointer);
        };
        let Some((main, mode)) = self.last_screen_mode() else {
            self.record_last_screen_mode(internal, external);
            return Ok(());
        };

        let targets = match (main == internal.id(), mode) {
            (true, GroupCombination::Extend) => {
                (ScreenCombination::Main, ScreenCombination::Extend)
            }
            (false, GroupCombination::Extend) => {
                (ScreenCombination::Extend, ScreenCombination::Main)
            }
            (_, GroupCombination::Mirror) => (ScreenCombination::Main, ScreenCombination::Mirror),
        };
        info!(
            "Internal screen {} on, restoring ({}, {})",
            internal.id(),
            targets.0,
            targets.1
        );
        self.mode_change.on_mode_change_request_with_targets(
            Some(internal),
            Some(external),
            targets.0,
            targets.1,
        )
    }

    /// Internal screen powered off: external becomes main, internal mirrors
    pub fn internal_screen_off_change(
        &self,
        internal: Option<&ScreenSession>,
        external: Option<&ScreenSession>,
    ) -> Result<()> {
        let (Some(internal), Some(external)) = (internal, external) else {
            return Err(DmError::NullPointer);
        };
        self.record_last_screen_mode(internal, external);
        info!("Internal screen {} off", internal.id());
        self.mode_change.on_mode_change_request_with_targets(
            Some(internal),
            Some(external),
            ScreenCombination::Mirror,
            ScreenCombination::Main,
        )
    }

    /// External screen going away: internal becomes main, external mirrors
    ///
    /// Screens that are not a legal pair are left alone.
    pub fn external_screen_disconnect_change(
        &self,
        internal: Option<&ScreenSession>,
        external: Option<&ScreenSession>,
    ) -> Result<()> {
        let (Some(internal), Some(external)) = (internal, external) else {
            return Err(DmError::NullPointer);
        };
        if CombinationPair::from_combinations(internal.combination(), external.combination())
            .is_none()
        {
            debug!(
                "Screens {}/{} not paired, nothing to do before disconnect",
                internal.id(),
                external.id()
            );
            return Ok(());
        }
        self.mode_change.on_mode_change_request_with_targets(
            Some(internal),
            Some(external),
            ScreenCombination::Main,
            ScreenCombination::Mirror,
        )
    }

    // =========================================================================
    // Positioning
    // =========================================================================

    /// Place an extend pair side by side
    ///
    /// # Errors
    ///
    /// * `NotFound` - either screen is not live
    /// * `InvalidParam` - same screen twice, or the screens would not touch
    pub fn set_relative_position(
        &self,
        main_options: ScreenPositionOptions,
        second_options: ScreenPositionOptions,
    ) -> Result<()> {
        if main_options.screen_id == second_options.screen_id {
            return Err(DmError::InvalidParam(format!(
                "screen {} positioned against itself",
                main_options.screen_id
            )));
        }
        let main = self.session(main_options.screen_id)?;
        let second = self.session(second_options.screen_id)?;

        let main_rect = Self::rect_at(&main, main_options);
        let second_rect = Self::rect_at(&second, second_options);
        if !are_screens_touching(main_rect, second_rect) {
            return Err(DmError::InvalidParam(format!(
                "screens {} and {} would not touch",
                main.id(),
                second.id()
            )));
        }

        let _claim = self.mode_change.claim_screens(&[main.id(), second.id()]);
        let trigger = "relative-position";
        let render = self.collaborators.require_render_service(trigger)?;
        let mut journal = ChangeJournal::new(
            &self.registry,
            self.collaborators.scene_client(),
            render,
            trigger,
        );
        journal.capture(&[&*main, &*second]);

        let outcome = journal
            .move_to(&main, main_options.start_x, main_options.start_y)
            .and_then(|()| journal.move_to(&second, second_options.start_x, second_options.start_y));
        if let Err(e) = outcome {
            error!("Positioning screens {}/{} failed: {}", main.id(), second.id(), e);
            journal.rollback();
            return Err(e);
        }
        journal.commit();

        info!(
            "Screen {} at ({}, {}), screen {} at ({}, {})",
            main.id(),
            main_options.start_x,
            main_options.start_y,
            second.id(),
            second_options.start_x,
            second_options.start_y
        );
        for session in [&main, &second] {
            self.listeners.publish(&ScreenEvent::ScreenChange {
                screen: session.id(),
                reason: ScreenChangeReason::Placement,
            });
            self.listeners.publish(&ScreenEvent::DisplayChange {
                display: session.display_id(),
                reason: DisplayChangeReason::Placement,
            });
        }
        Ok(())
    }

    fn rect_at(session: &ScreenSession, options: ScreenPositionOptions) -> Rect {
        let (width, height) = session.resolution();
        Rect::new(options.start_x, options.start_y, width, height)
    }

    /// Bounding box of every screen that shows its own content
    pub fn global_bounds(&self) -> Option<Rect> {
        let rects: Vec<Rect> = self
            .registry
            .sessions()
            .iter()
            .filter(|s| s.combination() != ScreenCombination::Mirror)
            .map(|s| s.rect())
            .collect();
        calculate_bounds(&rects)
    }

    /// Log layout and mode history
    pub fn log_summary(&self) {
        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║                    Multi-Screen Topology                   ║");
        info!("╚════════════════════════════════════════════════════════════╝");
        if let Some(bounds) = self.global_bounds() {
            info!(
                "  Bounds: {}x{} at ({}, {})",
                bounds.width, bounds.height, bounds.x, bounds.y
            );
        }
        if let Some((main, mode)) = self.last_screen_mode() {
            info!("  Last screen mode: main {} with {} secondary", main, mode);
        }
        if let Some(change) = self.mode_change.last_mode_change() {
            info!("  Last mode change: {}", change);
        }
    }
}
