//! Change Journal
//!
//! Records every side effect of a topology change so a failed change can
//! be undone. Sessions and groups are restored exactly. Remote effects are
//! compensated newest first on a best-effort basis, so the scene-session
//! client and the render service end up describing the restored topology.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{ConnectionEvent, RenderService, SceneSessionClient};
use crate::error::{DmError, Result};
use crate::screen::{
    GroupCombination, GroupId, GroupSnapshot, NodeId, Placement, RenderId, ScreenCombination,
    ScreenId, ScreenSession, ScreenSessionRegistry, ScreenState,
};

/// Remote effect already accepted by a collaborator
enum RemoteEffect<'a> {
    Connection {
        session: &'a ScreenSession,
        event: ConnectionEvent,
    },
    SessionCreated(&'a ScreenSession),
    Combination {
        screen: ScreenId,
        previous: ScreenCombination,
    },
    NodeSwap(ScreenId, ScreenId),
    Offset {
        screen: ScreenId,
        render_id: RenderId,
        previous: (i32, i32),
    },
}

pub(super) struct ChangeJournal<'a> {
    registry: &'a ScreenSessionRegistry,
    client: Option<Arc<dyn SceneSessionClient>>,
    render: Arc<dyn RenderService>,
    trigger: String,
    sessions: Vec<(&'a ScreenSession, ScreenState)>,
    groups: Vec<GroupSnapshot>,
    created: Vec<NodeId>,
    retired: Vec<NodeId>,
    remote: Vec<RemoteEffect<'a>>,
}

impl<'a> ChangeJournal<'a> {
    pub(super) fn new(
        registry: &'a ScreenSessionRegistry,
        client: Option<Arc<dyn SceneSessionClient>>,
        render: Arc<dyn RenderService>,
        trigger: &str,
    ) -> Self {
        Self {
            registry,
            client,
            render,
            trigger: trigger.to_string(),
            sessions: Vec::new(),
            groups: Vec::new(),
            created: Vec::new(),
            retired: Vec::new(),
            remote: Vec::new(),
        }
    }

    /// Snapshot sessions and every group involving them
    pub(super) fn capture(&mut self, sessions: &[&'a ScreenSession]) {
        let mut ids = Vec::with_capacity(sessions.len());
        for session in sessions {
            if !self.sessions.iter().any(|(s, _)| s.id() == session.id()) {
                self.sessions.push((session, session.snapshot()));
            }
            ids.push(session.id());
        }
        self.groups.push(self.registry.snapshot_groups(&ids));
    }

    fn client(&self) -> Result<&Arc<dyn SceneSessionClient>> {
        self.client.as_ref().ok_or_else(|| {
            DmError::InvalidCalling(format!("{}: scene session client unavailable", self.trigger))
        })
    }

    // =========================================================================
    // Scene-session client
    // =========================================================================

    pub(super) fn notify_connection(
        &mut self,
        session: &'a ScreenSession,
        event: ConnectionEvent,
    ) -> Result<()> {
        self.client()?.on_screen_connection_changed(
            session.id(),
            session.render_id(),
            &session.name(),
            event,
        )?;
        self.remote.push(RemoteEffect::Connection { session, event });
        Ok(())
    }

    pub(super) fn create_session_only(
        &mut self,
        session: &'a ScreenSession,
        is_extend: bool,
    ) -> Result<()> {
        self.client()?.on_create_screen_session_only(
            session.id(),
            session.render_id(),
            &session.name(),
            is_extend,
        )?;
        self.remote.push(RemoteEffect::SessionCreated(session));
        Ok(())
    }

    pub(super) fn report_combination(
        &mut self,
        session: &ScreenSession,
        combination: ScreenCombination,
    ) -> Result<()> {
        let previous = self.captured(session.id()).map_or_else(
            || session.combination(),
            |state| state.combination,
        );
        self.client()?
            .set_screen_combination(session.id(), combination)?;
        self.remote.push(RemoteEffect::Combination {
            screen: session.id(),
            previous,
        });
        Ok(())
    }

    pub(super) fn report_node_swap(&mut self, first: ScreenId, second: ScreenId) -> Result<()> {
        self.client()?.on_extend_display_node_change(first, second)?;
        self.remote.push(RemoteEffect::NodeSwap(first, second));
        Ok(())
    }

    /// State of `id` when it was first captured
    fn captured(&self, id: ScreenId) -> Option<&ScreenState> {
        self.sessions
            .iter()
            .find(|(session, _)| session.id() == id)
            .map(|(_, state)| state)
    }

    // =========================================================================
    // Render service
    // =========================================================================

    /// Give `session` a node showing its own content
    pub(super) fn attach_display_node(&mut self, session: &ScreenSession) -> Result<()> {
        let node = self.render.create_display_node(session.render_id())?;
        self.created.push(node);
        if let Some(old) = session.replace_display_node(Some(node)) {
            self.retired.push(old);
        }
        debug!("Screen {} display node {}", session.id(), node);
        Ok(())
    }

    /// Give `session` a node mirroring `source`
    pub(super) fn attach_mirror_node(
        &mut self,
        session: &ScreenSession,
        source: &ScreenSession,
    ) -> Result<()> {
        let node = self
            .render
            .create_mirror_node(session.render_id(), source.render_id())?;
        self.created.push(node);
        if let Some(old) = session.replace_display_node(Some(node)) {
            self.retired.push(old);
        }
        debug!(
            "Screen {} mirror node {} (source {})",
            session.id(),
            node,
            source.id()
        );
        Ok(())
    }

    /// Move `session` and push the offset to the render service
    pub(super) fn move_to(&mut self, session: &ScreenSession, x: i32, y: i32) -> Result<()> {
        let previous = session.origin();
        session.apply_placement(Placement {
            origin: (x, y),
            resolution: session.resolution(),
        });
        self.render.set_screen_offset(session.render_id(), x, y)?;
        self.remote.push(RemoteEffect::Offset {
            screen: session.id(),
            render_id: session.render_id(),
            previous,
        });
        Ok(())
    }

    // =========================================================================
    // Groups
    // =========================================================================

    pub(super) fn attach(
        &mut self,
        main: ScreenId,
        child: ScreenId,
        combination: GroupCombination,
    ) -> Result<GroupId> {
        self.registry.attach(main, child, combination, &self.trigger)
    }

    pub(super) fn detach(&mut self, id: ScreenId) -> bool {
        self.registry.detach(id)
    }

    // =========================================================================
    // Outcome
    // =========================================================================

    /// Keep the change and release nodes it replaced
    pub(super) fn commit(self) {
        for node in self.retired {
            if let Err(e) = self.render.destroy_node(node) {
                warn!("{}: failed to release node {}: {}", self.trigger, node, e);
            }
        }
    }

    /// Undo the change
    pub(super) fn rollback(self) {
        warn!("{}: rolling back", self.trigger);

        for (session, state) in self.sessions.into_iter().rev() {
            session.restore(state);
        }
        for snapshot in self.groups.into_iter().rev() {
            self.registry.restore_groups(snapshot);
        }
        for node in self.created.into_iter().rev() {
            if let Err(e) = self.render.destroy_node(node) {
                warn!("{}: failed to destroy node {}: {}", self.trigger, node, e);
            }
        }

        // A created session is torn down by a single disconnect, even when a
        // connect notice followed its creation
        let mut disconnected: Vec<ScreenId> = Vec::new();
        for effect in self.remote.into_iter().rev() {
            let outcome = match effect {
                RemoteEffect::Offset {
                    screen,
                    render_id,
                    previous: (x, y),
                } => {
                    debug!("{}: moving screen {} back to ({}, {})", self.trigger, screen, x, y);
                    self.render.set_screen_offset(render_id, x, y)
                }
                RemoteEffect::Connection { session, event } => {
                    let inverse = match event {
                        ConnectionEvent::Connected => ConnectionEvent::Disconnected,
                        ConnectionEvent::Disconnected => ConnectionEvent::Connected,
                    };
                    if inverse == ConnectionEvent::Disconnected {
                        disconnected.push(session.id());
                    }
                    match &self.client {
                        Some(client) => client.on_screen_connection_changed(
                            session.id(),
                            session.render_id(),
                            &session.name(),
                            inverse,
                        ),
                        None => Ok(()),
                    }
                }
                RemoteEffect::SessionCreated(session) => {
                    if disconnected.contains(&session.id()) {
                        continue;
                    }
                    disconnected.push(session.id());
                    match &self.client {
                        Some(client) => client.on_screen_connection_changed(
                            session.id(),
                            session.render_id(),
                            &session.name(),
                            ConnectionEvent::Disconnected,
                        ),
                        None => Ok(()),
                    }
                }
                RemoteEffect::Combination { screen, previous } => match &self.client {
                    Some(client) => client.set_screen_combination(screen, previous),
                    None => Ok(()),
                },
                RemoteEffect::NodeSwap(first, second) => match &self.client {
                    Some(client) => client.on_extend_display_node_change(second, first),
                    None => Ok(()),
                },
            };
            if let Err(e) = outcome {
                warn!("{}: failed to compensate remote change: {}", self.trigger, e);
            }
        }
    }
}
