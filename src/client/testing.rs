//! Recording collaborator fakes for unit tests

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::{ClientError, ClientResult, ConnectionEvent, RenderService, SceneSessionClient};
use crate::screen::{NodeId, Placement, RenderId, ScreenCombination, ScreenId};

/// One scene-session client call
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ClientCall {
    Connection(ScreenId, ConnectionEvent),
    CreateOnly(ScreenId, bool),
    NodeChange(ScreenId, ScreenId),
    Combination(ScreenId, ScreenCombination),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingClient {
    pub(crate) calls: Mutex<Vec<ClientCall>>,
    pub(crate) fail_with: Mutex<Option<ClientError>>,
    /// Zero-based index of the single call to reject
    pub(crate) fail_call: Mutex<Option<usize>>,
    attempts: Mutex<usize>,
}

impl RecordingClient {
    pub(crate) fn failing(err: ClientError) -> Self {
        Self {
            fail_with: Mutex::new(Some(err)),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: ClientCall) -> ClientResult<()> {
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts - 1
        };
        if *self.fail_call.lock() == Some(attempt) {
            return Err(ClientError::Transport(format!("call {} dropped", attempt)));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl SceneSessionClient for RecordingClient {
    fn on_screen_connection_changed(
        &self,
        screen: ScreenId,
        _render_id: RenderId,
        _name: &str,
        event: ConnectionEvent,
    ) -> ClientResult<()> {
        self.record(ClientCall::Connection(screen, event))
    }

    fn on_create_screen_session_only(
        &self,
        screen: ScreenId,
        _render_id: RenderId,
        _name: &str,
        is_extend: bool,
    ) -> ClientResult<()> {
        self.record(ClientCall::CreateOnly(screen, is_extend))
    }

    fn on_extend_display_node_change(
        &self,
        first: ScreenId,
        second: ScreenId,
    ) -> ClientResult<()> {
        self.record(ClientCall::NodeChange(first, second))
    }

    fn set_screen_combination(
        &self,
        screen: ScreenId,
        combination: ScreenCombination,
    ) -> ClientResult<()> {
        self.record(ClientCall::Combination(screen, combination))
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeRenderService {
    next_node: Mutex<u64>,
    pub(crate) live_nodes: Mutex<HashSet<NodeId>>,
    pub(crate) mirrors: Mutex<HashMap<NodeId, RenderId>>,
    pub(crate) offsets: Mutex<HashMap<RenderId, (i32, i32)>>,
    pub(crate) placements: Mutex<HashMap<RenderId, Placement>>,
    pub(crate) fail_offsets: Mutex<bool>,
    /// Zero-based index of the single offset update to reject
    pub(crate) fail_offset_call: Mutex<Option<usize>>,
    offset_attempts: Mutex<usize>,
}

impl FakeRenderService {
    fn allocate(&self) -> NodeId {
        let mut next = self.next_node.lock();
        *next += 1;
        let node = NodeId::new(*next);
        self.live_nodes.lock().insert(node);
        node
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live_nodes.lock().len()
    }
}

impl RenderService for FakeRenderService {
    fn create_display_node(&self, _screen: RenderId) -> ClientResult<NodeId> {
        Ok(self.allocate())
    }

    fn create_mirror_node(&self, _screen: RenderId, source: RenderId) -> ClientResult<NodeId> {
        let node = self.allocate();
        self.mirrors.lock().insert(node, source);
        Ok(node)
    }

    fn destroy_node(&self, node: NodeId) -> ClientResult<()> {
        self.mirrors.lock().remove(&node);
        if self.live_nodes.lock().remove(&node) {
            Ok(())
        } else {
            Err(ClientError::Render(format!("unknown node {}", node)))
        }
    }

    fn set_screen_offset(&self, screen: RenderId, x: i32, y: i32) -> ClientResult<()> {
        if *self.fail_offsets.lock() {
            return Err(ClientError::Render("offset rejected".to_string()));
        }
        let attempt = {
            let mut attempts = self.offset_attempts.lock();
            *attempts += 1;
            *attempts - 1
        };
        if *self.fail_offset_call.lock() == Some(attempt) {
            return Err(ClientError::Render(format!("offset {} rejected", attempt)));
        }
        self.offsets.lock().insert(screen, (x, y));
        Ok(())
    }

    fn query_placement(&self, screen: RenderId) -> ClientResult<Option<Placement>> {
        Ok(self.placements.lock().get(&screen).copied())
    }
}
