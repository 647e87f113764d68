//! Pairwise Mode Change
//!
//! State machine over the `(inner, external)` combination pair. The current
//! pair picks the handler, the requested operation picks the target, and
//! the handler drives both sessions there inside a change journal.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::change::ChangeJournal;
use super::transition::{CombinationPair, Handler, OperateType};
use crate::client::{Collaborators, ConnectionEvent};
use crate::error::{DmError, Result};
use crate::listener::{
    DisplayChangeReason, GroupChange, ListenerRegistry, ScreenChangeReason, ScreenEvent,
};
use crate::screen::{
    GroupCombination, GroupId, ScreenCombination, ScreenId, ScreenSession, ScreenSessionRegistry,
};

/// Screens claimed by in-flight topology changes
#[derive(Debug, Default)]
struct ScreenClaims {
    busy: Mutex<HashSet<ScreenId>>,
    released: Condvar,
}

/// Exclusive hold on a set of screens, released on drop
#[derive(Debug)]
pub(crate) struct ScreenClaim<'a> {
    claims: &'a ScreenClaims,
    ids: Vec<ScreenId>,
}

impl Drop for ScreenClaim<'_> {
    fn drop(&mut self) {
        let mut busy = self.claims.busy.lock();
        for id in &self.ids {
            busy.remove(id);
        }
        drop(busy);
        self.claims.released.notify_all();
    }
}

/// Pairwise combination state machine
#[derive(Debug)]
pub struct MultiScreenModeChangeManager {
    registry: Arc<ScreenSessionRegistry>,
    listeners: Arc<ListenerRegistry>,
    collaborators: Arc<Collaborators>,

    /// Screens owned by a running change
    claims: ScreenClaims,

    /// Description of the last applied transition
    last_change: Mutex<Option<String>>,
}

impl MultiScreenModeChangeManager {
    /// Create a manager over shared core state
    pub fn new(
        registry: Arc<ScreenSessionRegistry>,
        listeners: Arc<ListenerRegistry>,
        collaborators: Arc<Collaborators>,
    ) -> Self {
        Self {
            registry,
            listeners,
            collaborators,
            claims: ScreenClaims::default(),
            last_change: Mutex::new(None),
        }
    }

    /// Apply an operator request to a screen pair
    ///
    /// # Arguments
    ///
    /// * `inner` - Built-in (primary) screen
    /// * `external` - Attached (secondary) screen
    /// * `operate_type` - `"mirror"`, `"extend"` or `"unique"`
    ///
    /// # Errors
    ///
    /// * `NullPointer` - either session is absent
    /// * `InvalidParam` - unknown operate type, or both sessions are the same
    /// * `InvalidCalling` - no handler for the current pair and target, or a
    ///   required collaborator is unavailable
    /// * `IpcFailed` / `RenderServiceFailed` - collaborator failure; both
    ///   sessions are left as they were
    pub fn on_mode_change_request(
        &self,
        inner: Option<&ScreenSession>,
        external: Option<&ScreenSession>,
        operate_type: &str,
    ) -> Result<()> {
        let (Some(inner), Some(external)) = (inner, external) else {
            error!("Mode change '{}' with missing session", operate_type);
            return Err(DmError::NullPointer);
        };
        let operate: OperateType = operate_type.parse()?;
        self.change_mode(inner, external, operate.targets(), operate.as_str())
    }

    /// Drive a screen pair to explicit target combinations
    ///
    /// Same validation, locking, idempotence and rollback as
    /// [`MultiScreenModeChangeManager::on_mode_change_request`].
    pub fn on_mode_change_request_with_targets(
        &self,
        inner: Option<&ScreenSession>,
        external: Option<&ScreenSession>,
        inner_target: ScreenCombination,
        external_target: ScreenCombination,
    ) -> Result<()> {
        let (Some(inner), Some(external)) = (inner, external) else {
            error!("Mode change to ({}, {}) with missing session", inner_target, external_target);
            return Err(DmError::NullPointer);
        };
        self.change_mode(inner, external, (inner_target, external_target), "explicit")
    }

    /// Description of the last applied transition
    pub fn last_mode_change(&self) -> Option<String> {
        self.last_change.lock().clone()
    }

    /// Wait until none of `ids` is claimed, then claim all of them
    ///
    /// Every change touching a screen, pairwise or group, claims it first,
    /// so changes over overlapping screens run one at a time. The whole set
    /// is taken at once, so claims never deadlock. A claim must not be
    /// requested while the same thread already holds one.
    pub(crate) fn claim_screens(&self, ids: &[ScreenId]) -> ScreenClaim<'_> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut busy = self.claims.busy.lock();
        while ids.iter().any(|id| busy.contains(id)) {
            self.claims.released.wait(&mut busy);
        }
        busy.extend(ids.iter().copied());
        ScreenClaim {
            claims: &self.claims,
            ids,
        }
    }

    #[cfg(test)]
    pub(crate) fn claimed_count(&self) -> usize {
        self.claims.busy.lock().len()
    }

    fn change_mode(
        &self,
        inner: &ScreenSession,
        external: &ScreenSession,
        target: (ScreenCombination, ScreenCombination),
        label: &str,
    ) -> Result<()> {
        if inner.id() == external.id() {
            return Err(DmError::InvalidParam(format!(
                "screen {} paired with itself",
                inner.id()
            )));
        }
        for session in [inner, external] {
            if !session.is_alive() {
                return Err(DmError::NotFound(session.id()));
            }
        }

        let _claim = self.claim_screens(&[inner.id(), external.id()]);

        let current = (inner.combination(), external.combination());
        let source = CombinationPair::from_combinations(current.0, current.1).ok_or_else(|| {
            DmError::InvalidCalling(format!(
                "no handler for source pair ({}, {})",
                current.0, current.1
            ))
        })?;
        let target_pair = CombinationPair::from_combinations(target.0, target.1).ok_or_else(|| {
            DmError::InvalidCalling(format!(
                "no '{}' handler from {} to ({}, {})",
                label, source, target.0, target.1
            ))
        })?;

        let handler = Handler::for_edge(source, target_pair);
        if handler == Handler::Unchanged {
            info!(
                "Screens {}/{} already {}, '{}' is a no-op",
                inner.id(),
                external.id(),
                source,
                label
            );
            return Ok(());
        }

        let client = self.collaborators.require_scene_client(label)?;
        let render = self.collaborators.require_render_service(label)?;

        info!(
            "Mode change '{}' on screens {}/{}: {} -> {} ({:?})",
            label,
            inner.id(),
            external.id(),
            source,
            target_pair,
            handler
        );

        let trigger = format!("mode-change:{}", label);
        let mut journal = ChangeJournal::new(&self.registry, Some(client), render, &trigger);
        journal.capture(&[inner, external]);

        match Self::run(&mut journal, inner, external, target_pair, handler) {
            Ok(group) => {
                journal.commit();
                *self.last_change.lock() = Some(format!(
                    "{}: screens {}/{} {} -> {}",
                    label,
                    inner.id(),
                    external.id(),
                    source,
                    target_pair
                ));
                self.notify_changed(inner, external, group, &trigger);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Mode change '{}' on screens {}/{} failed: {}",
                    label,
                    inner.id(),
                    external.id(),
                    e
                );
                journal.rollback();
                Err(e)
            }
        }
    }

    fn run<'a>(
        journal: &mut ChangeJournal<'a>,
        inner: &'a ScreenSession,
        external: &'a ScreenSession,
        target: CombinationPair,
        handler: Handler,
    ) -> Result<GroupId> {
        let (main, secondary) = if target.inner_is_main() {
            (inner, external)
        } else {
            (external, inner)
        };
        let role = target.secondary_role();
        let main_before = main.combination();
        let secondary_before = secondary.combination();

        if role == GroupCombination::Mirror && secondary_before != ScreenCombination::Mirror {
            journal.notify_connection(secondary, ConnectionEvent::Disconnected)?;
        }

        // Composition nodes: only the roles that changed get new ones
        if main_before == ScreenCombination::Mirror || main.display_node().is_none() {
            journal.attach_display_node(main)?;
        }
        match role {
            GroupCombination::Extend => {
                if secondary_before == ScreenCombination::Mirror
                    || secondary.display_node().is_none()
                {
                    journal.attach_display_node(secondary)?;
                }
            }
            GroupCombination::Mirror => {
                let still_valid = secondary_before == ScreenCombination::Mirror
                    && secondary.mirror_source() == Some(main.id())
                    && secondary.display_node().is_some();
                if !still_valid {
                    journal.attach_mirror_node(secondary, main)?;
                }
            }
        }

        main.set_combination(ScreenCombination::Main, false);
        match role {
            GroupCombination::Mirror => secondary.set_mirror_source(main.id()),
            GroupCombination::Extend => secondary.set_combination(ScreenCombination::Extend, true),
        }

        journal.move_to(main, 0, 0)?;
        match role {
            GroupCombination::Extend => {
                let (width, _) = main.resolution();
                let x = i32::try_from(width).map_err(|_| {
                    DmError::IllegalParam(format!("screen {} width {} out of range", main.id(), width))
                })?;
                journal.move_to(secondary, x, 0)?;
            }
            GroupCombination::Mirror => journal.move_to(secondary, 0, 0)?,
        }

        if main_before == ScreenCombination::Mirror {
            journal.create_session_only(main, false)?;
            journal.notify_connection(main, ConnectionEvent::Connected)?;
        } else if main_before != ScreenCombination::Main {
            journal.report_combination(main, ScreenCombination::Main)?;
        }
        if role == GroupCombination::Extend {
            if secondary_before == ScreenCombination::Mirror {
                journal.create_session_only(secondary, true)?;
                journal.notify_connection(secondary, ConnectionEvent::Connected)?;
            } else if secondary_before != ScreenCombination::Extend {
                journal.report_combination(secondary, ScreenCombination::Extend)?;
            }
            if handler == Handler::SwapRoles {
                journal.report_node_swap(inner.id(), external.id())?;
            }
        }

        let group = journal.attach(main.id(), secondary.id(), role)?;
        debug!(
            "Screen {} is now {} of screen {} in group {}",
            secondary.id(),
            role,
            main.id(),
            group
        );
        Ok(group)
    }

    fn notify_changed(
        &self,
        inner: &ScreenSession,
        external: &ScreenSession,
        group: GroupId,
        trigger: &str,
    ) {
        self.listeners.publish(&ScreenEvent::ScreenGroupChange {
            screens: vec![inner.id(), external.id()],
            group: Some(group),
            change: GroupChange::Changed,
            trigger: trigger.to_string(),
        });
        for session in [inner, external] {
            self.listeners.publish(&ScreenEvent::ScreenChange {
                screen: session.id(),
                reason: ScreenChangeReason::Combination,
            });
            self.listeners.publish(&ScreenEvent::DisplayChange {
                display: session.display_id(),
                reason: DisplayChangeReason::Combination,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{ClientCall, FakeRenderService, RecordingClient};
    use crate::client::{ClientError, MockSceneSessionClient, RenderService};
    use crate::listener::{EventKind, ListenerError, ListenerHandle, ScreenListener};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        registry: Arc<ScreenSessionRegistry>,
        listeners: Arc<ListenerRegistry>,
        collaborators: Arc<Collaborators>,
        client: Arc<RecordingClient>,
        render: Arc<FakeRenderService>,
        manager: MultiScreenModeChangeManager,
        inner: Arc<ScreenSession>,
        external: Arc<ScreenSession>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ScreenSessionRegistry::new(ScreenId::new(0), 1000));
        let listeners = Arc::new(ListenerRegistry::default());
        let collaborators = Arc::new(Collaborators::new());
        let client = Arc::new(RecordingClient::default());
        let render = Arc::new(FakeRenderService::default());

        let inner_id = registry.create("builtin", Some(ScreenId::new(0)));
        let external_id = registry.create("hdmi", Some(ScreenId::new(1)));
        let inner = registry.get(inner_id).unwrap();
        let external = registry.get(external_id).unwrap();
        inner.set_resolution(1920, 1080);
        external.set_resolution(1280, 720);

        let manager = MultiScreenModeChangeManager::new(
            registry.clone(),
            listeners.clone(),
            collaborators.clone(),
        );
        Fixture {
            registry,
            listeners,
            collaborators,
            client,
            render,
            manager,
            inner,
            external,
        }
    }

    impl Fixture {
        fn connect_collaborators(&self) {
            self.collaborators
                .set_scene_client(Some(self.client.clone()));
            self.collaborators
                .set_render_service(Some(self.render.clone()));
        }

        /// Put the pair into `pair` with real nodes and a matching group
        fn arrange(&self, pair: CombinationPair) {
            let (main, secondary) = if pair.inner_is_main() {
                (&self.inner, &self.external)
            } else {
                (&self.external, &self.inner)
            };
            main.set_combination(ScreenCombination::Main, false);
            let node = self.render.create_display_node(main.render_id()).unwrap();
            main.replace_display_node(Some(node));

            let role = pair.secondary_role();
            match role {
                GroupCombination::Extend => {
                    secondary.set_combination(ScreenCombination::Extend, true);
                    let node = self
                        .render
                        .create_display_node(secondary.render_id())
                        .unwrap();
                    secondary.replace_display_node(Some(node));
                    secondary.set_origin(main.resolution().0 as i32, 0);
                }
                GroupCombination::Mirror => {
                    secondary.set_mirror_source(main.id());
                    let node = self
                        .render
                        .create_mirror_node(secondary.render_id(), main.render_id())
                        .unwrap();
                    secondary.replace_display_node(Some(node));
                }
            }
            self.registry
                .attach(main.id(), secondary.id(), role, "arrange")
                .unwrap();
        }

        fn request(&self, operate_type: &str) -> Result<()> {
            self.manager.on_mode_change_request(
                Some(&*self.inner),
                Some(&*self.external),
                operate_type,
            )
        }

        fn combinations(&self) -> (ScreenCombination, ScreenCombination) {
            (self.inner.combination(), self.external.combination())
        }
    }

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl ScreenListener for Counter {
        fn on_event(&self, _event: &ScreenEvent) -> std::result::Result<(), ListenerError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_missing_session_is_null_pointer() {
        let fx = fixture();
        assert_eq!(
            fx.manager
                .on_mode_change_request(None, Some(&*fx.external), "mirror"),
            Err(DmError::NullPointer)
        );
        assert_eq!(
            fx.manager
                .on_mode_change_request(Some(&*fx.inner), None, "extend"),
            Err(DmError::NullPointer)
        );
    }

    #[test]
    fn test_unknown_operate_type() {
        let fx = fixture();
        fx.arrange(CombinationPair::MainExtend);
        assert!(matches!(fx.request("sideways"), Err(DmError::InvalidParam(_))));
    }

    #[test]
    fn test_same_session_twice() {
        let fx = fixture();
        assert!(matches!(
            fx.manager
                .on_mode_change_request(Some(&*fx.inner), Some(&*fx.inner), "mirror"),
            Err(DmError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_unsupported_source_pair() {
        let fx = fixture();
        fx.connect_collaborators();
        assert!(matches!(fx.request("mirror"), Err(DmError::InvalidCalling(_))));
        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Alone, ScreenCombination::Alone)
        );
    }

    // =========================================================================
    // Idempotence and Missing Handler Tests
    // =========================================================================

    #[test]
    fn test_matching_target_is_noop_for_every_pair() {
        for pair in CombinationPair::ALL {
            let fx = fixture();
            fx.arrange(pair);
            let inner_before = fx.inner.snapshot();
            let external_before = fx.external.snapshot();
            let groups_before = fx.registry.groups();

            // No collaborators installed: a no-op must not need them
            let (inner_target, external_target) = pair.combinations();
            fx.manager
                .on_mode_change_request_with_targets(
                    Some(&*fx.inner),
                    Some(&*fx.external),
                    inner_target,
                    external_target,
                )
                .unwrap();

            assert_eq!(fx.inner.snapshot(), inner_before, "{}", pair);
            assert_eq!(fx.external.snapshot(), external_before, "{}", pair);
            assert_eq!(fx.registry.groups(), groups_before, "{}", pair);
        }
    }

    #[test]
    fn test_matching_operate_type_is_noop() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainMirror);
        fx.request("mirror").unwrap();
        assert!(fx.client.calls().is_empty());

        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);
        fx.request("extend").unwrap();
        assert!(fx.client.calls().is_empty());
    }

    #[test]
    fn test_unique_is_invalid_calling_for_every_pair() {
        for pair in CombinationPair::ALL {
            let fx = fixture();
            fx.connect_collaborators();
            fx.arrange(pair);
            let before = fx.combinations();

            assert!(
                matches!(fx.request("unique"), Err(DmError::InvalidCalling(_))),
                "{}",
                pair
            );
            assert_eq!(fx.combinations(), before, "{}", pair);
            assert!(fx.client.calls().is_empty());
        }
    }

    // =========================================================================
    // Transition Tests
    // =========================================================================

    #[test]
    fn test_extend_to_mirror_keeps_main_node() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);
        let main_node = fx.inner.display_node();
        let old_external_node = fx.external.display_node().unwrap();

        let counter = Arc::new(Counter::default());
        fx.listeners
            .register(
                EventKind::ScreenGroupChange,
                Some(ListenerHandle::new(counter.clone())),
            )
            .unwrap();

        fx.request("mirror").unwrap();

        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Main, ScreenCombination::Mirror)
        );
        assert_eq!(fx.inner.display_node(), main_node);
        let new_node = fx.external.display_node().unwrap();
        assert_ne!(new_node, old_external_node);
        assert_eq!(
            fx.render.mirrors.lock().get(&new_node),
            Some(&fx.inner.render_id())
        );
        assert!(!fx.render.live_nodes.lock().contains(&old_external_node));
        assert_eq!(fx.external.mirror_source(), Some(fx.inner.id()));
        assert_eq!(fx.external.origin(), (0, 0));

        assert_eq!(
            fx.client.calls(),
            vec![ClientCall::Connection(
                fx.external.id(),
                ConnectionEvent::Disconnected
            )]
        );
        let group = fx.registry.group_of(fx.external.id()).unwrap();
        assert_eq!(
            fx.registry.group(group).unwrap().combination,
            GroupCombination::Mirror
        );
        assert_eq!(counter.hits.load(Ordering::SeqCst), 1);
        assert!(fx.manager.last_mode_change().unwrap().starts_with("mirror"));
    }

    #[test]
    fn test_mirror_to_extend_creates_scene_session() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainMirror);
        let nodes_before = fx.render.live_count();

        fx.request("extend").unwrap();

        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Main, ScreenCombination::Extend)
        );
        assert!(fx.external.is_extend());
        assert_eq!(fx.external.origin(), (1920, 0));
        assert_eq!(fx.render.offsets.lock().get(&fx.external.render_id()), Some(&(1920, 0)));
        assert_eq!(fx.render.live_count(), nodes_before);
        assert_eq!(
            fx.client.calls(),
            vec![
                ClientCall::CreateOnly(fx.external.id(), true),
                ClientCall::Connection(fx.external.id(), ConnectionEvent::Connected),
            ]
        );
    }

    #[test]
    fn test_swap_extend_roles() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);

        fx.manager
            .on_mode_change_request_with_targets(
                Some(&*fx.inner),
                Some(&*fx.external),
                ScreenCombination::Extend,
                ScreenCombination::Main,
            )
            .unwrap();

        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Extend, ScreenCombination::Main)
        );
        assert_eq!(fx.external.origin(), (0, 0));
        assert_eq!(fx.inner.origin(), (1280, 0));
        let calls = fx.client.calls();
        assert!(calls.contains(&ClientCall::Combination(
            fx.external.id(),
            ScreenCombination::Main
        )));
        assert!(calls.contains(&ClientCall::Combination(
            fx.inner.id(),
            ScreenCombination::Extend
        )));
        assert!(calls.contains(&ClientCall::NodeChange(fx.inner.id(), fx.external.id())));

        let group = fx.registry.group_of(fx.inner.id()).unwrap();
        assert_eq!(fx.registry.group(group).unwrap().main, fx.external.id());
        assert_eq!(fx.registry.group_of(fx.external.id()), None);
    }

    #[test]
    fn test_mirror_main_back_to_main_extend() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MirrorMain);

        fx.request("extend").unwrap();

        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Main, ScreenCombination::Extend)
        );
        assert_eq!(
            fx.client.calls(),
            vec![
                ClientCall::CreateOnly(fx.inner.id(), false),
                ClientCall::Connection(fx.inner.id(), ConnectionEvent::Connected),
                ClientCall::Combination(fx.external.id(), ScreenCombination::Extend),
            ]
        );
    }

    // =========================================================================
    // Collaborator and Rollback Tests
    // =========================================================================

    #[test]
    fn test_missing_client_is_invalid_calling() {
        let fx = fixture();
        fx.collaborators
            .set_render_service(Some(fx.render.clone()));
        fx.arrange(CombinationPair::MainExtend);
        let before = (fx.inner.snapshot(), fx.external.snapshot());

        assert!(matches!(fx.request("mirror"), Err(DmError::InvalidCalling(_))));
        assert_eq!((fx.inner.snapshot(), fx.external.snapshot()), before);
    }

    #[test]
    fn test_client_failure_rolls_back() {
        let fx = fixture();
        let failing = Arc::new(RecordingClient::failing(ClientError::Transport(
            "binder died".to_string(),
        )));
        fx.collaborators.set_scene_client(Some(failing));
        fx.collaborators
            .set_render_service(Some(fx.render.clone()));
        fx.arrange(CombinationPair::MainMirror);
        let before = (fx.inner.snapshot(), fx.external.snapshot());
        let groups_before = fx.registry.groups();
        let nodes_before = fx.render.live_count();

        assert_eq!(
            fx.request("extend"),
            Err(DmError::IpcFailed("binder died".to_string()))
        );
        assert_eq!((fx.inner.snapshot(), fx.external.snapshot()), before);
        assert_eq!(fx.registry.groups(), groups_before);
        assert_eq!(fx.render.live_count(), nodes_before);
    }

    #[test]
    fn test_render_failure_reverts_connection_notice() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);
        *fx.render.fail_offsets.lock() = true;
        let before = (fx.inner.snapshot(), fx.external.snapshot());

        assert!(matches!(
            fx.request("mirror"),
            Err(DmError::RenderServiceFailed(_))
        ));
        assert_eq!((fx.inner.snapshot(), fx.external.snapshot()), before);
        assert_eq!(
            fx.client.calls(),
            vec![
                ClientCall::Connection(fx.external.id(), ConnectionEvent::Disconnected),
                ClientCall::Connection(fx.external.id(), ConnectionEvent::Connected),
            ]
        );
        let group = fx.registry.group_of(fx.external.id()).unwrap();
        assert_eq!(
            fx.registry.group(group).unwrap().combination,
            GroupCombination::Extend
        );
    }

    #[test]
    fn test_rejected_notice_is_not_reverted() {
        let fx = fixture();
        let mut mock = MockSceneSessionClient::new();
        mock.expect_on_screen_connection_changed()
            .times(1)
            .returning(|_, _, _, _| Err(ClientError::Rejected("busy".to_string())));
        fx.collaborators.set_scene_client(Some(Arc::new(mock)));
        fx.collaborators
            .set_render_service(Some(fx.render.clone()));
        fx.arrange(CombinationPair::MainExtend);

        assert_eq!(
            fx.request("mirror"),
            Err(DmError::IpcFailed("busy".to_string()))
        );
        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Main, ScreenCombination::Extend)
        );
    }

    fn swap_extend_roles(fx: &Fixture) -> Result<()> {
        fx.manager.on_mode_change_request_with_targets(
            Some(&*fx.inner),
            Some(&*fx.external),
            ScreenCombination::Extend,
            ScreenCombination::Main,
        )
    }

    #[test]
    fn test_offset_failure_restores_accepted_offsets() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);
        *fx.render.fail_offset_call.lock() = Some(1);
        let before = (fx.inner.snapshot(), fx.external.snapshot());

        assert!(matches!(
            swap_extend_roles(&fx),
            Err(DmError::RenderServiceFailed(_))
        ));

        assert_eq!((fx.inner.snapshot(), fx.external.snapshot()), before);
        let offsets = fx.render.offsets.lock().clone();
        assert_eq!(offsets.get(&fx.external.render_id()), Some(&fx.external.origin()));
        assert_eq!(offsets.get(&fx.inner.render_id()), None);
    }

    #[test]
    fn test_late_failure_reverts_reported_combinations() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);
        // Third call is the node swap
        *fx.client.fail_call.lock() = Some(2);

        assert!(matches!(swap_extend_roles(&fx), Err(DmError::IpcFailed(_))));

        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Main, ScreenCombination::Extend)
        );
        assert_eq!(
            fx.client.calls(),
            vec![
                ClientCall::Combination(fx.external.id(), ScreenCombination::Main),
                ClientCall::Combination(fx.inner.id(), ScreenCombination::Extend),
                ClientCall::Combination(fx.inner.id(), ScreenCombination::Main),
                ClientCall::Combination(fx.external.id(), ScreenCombination::Extend),
            ]
        );
        let offsets = fx.render.offsets.lock().clone();
        assert_eq!(offsets.get(&fx.inner.render_id()), Some(&(0, 0)));
        assert_eq!(offsets.get(&fx.external.render_id()), Some(&(1920, 0)));
    }

    #[test]
    fn test_late_failure_tears_down_created_session() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MirrorMain);
        *fx.client.fail_call.lock() = Some(2);

        assert!(matches!(fx.request("extend"), Err(DmError::IpcFailed(_))));

        assert_eq!(
            fx.combinations(),
            (ScreenCombination::Mirror, ScreenCombination::Main)
        );
        assert_eq!(
            fx.client.calls(),
            vec![
                ClientCall::CreateOnly(fx.inner.id(), false),
                ClientCall::Connection(fx.inner.id(), ConnectionEvent::Connected),
                ClientCall::Connection(fx.inner.id(), ConnectionEvent::Disconnected),
            ]
        );
    }

    // =========================================================================
    // Concurrency Tests
    // =========================================================================

    #[test]
    fn test_concurrent_requests_leave_consistent_pair() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let fx = &fx;
                scope.spawn(move || {
                    for round in 0..25 {
                        let op = if (worker + round) % 2 == 0 {
                            "mirror"
                        } else {
                            "extend"
                        };
                        fx.request(op).unwrap();
                    }
                });
            }
        });

        let (inner, external) = fx.combinations();
        assert_eq!(inner, ScreenCombination::Main);
        let group = fx.registry.group_of(fx.external.id()).unwrap();
        let group = fx.registry.group(group).unwrap();
        assert_eq!(group.combination.child_combination(), external);
        assert_eq!(group.main, fx.inner.id());
        assert_eq!(fx.registry.groups().len(), 1);
        assert_eq!(fx.manager.claimed_count(), 0);
    }

    #[test]
    fn test_overlapping_claim_waits_for_release() {
        let fx = fixture();
        let third = ScreenId::new(7);
        let acquired = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            let claim = fx.manager.claim_screens(&[fx.inner.id(), fx.external.id()]);
            let waiter = scope.spawn(|| {
                let _claim = fx.manager.claim_screens(&[third, fx.external.id()]);
                acquired.fetch_add(1, Ordering::SeqCst);
            });

            std::thread::sleep(std::time::Duration::from_millis(50));
            assert_eq!(acquired.load(Ordering::SeqCst), 0);
            drop(claim);
            waiter.join().unwrap();
        });

        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(fx.manager.claimed_count(), 0);
    }

    #[test]
    fn test_claims_do_not_outlive_requests() {
        let fx = fixture();
        fx.connect_collaborators();
        fx.arrange(CombinationPair::MainExtend);

        fx.request("mirror").unwrap();
        fx.request("mirror").unwrap();
        *fx.render.fail_offsets.lock() = true;
        assert!(fx.request("extend").is_err());
        assert!(fx.request("unique").is_err());

        assert_eq!(fx.manager.claimed_count(), 0);
    }
}
