//! Shared fixtures for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use lamco_screen_manager::client::{
    ClientError, ClientResult, ConnectionEvent, RenderService, SceneSessionClient,
};
use lamco_screen_manager::config::{Config, ExternalConnectMode};
use lamco_screen_manager::listener::{ListenerError, ScreenEvent, ScreenListener};
use lamco_screen_manager::screen::{NodeId, Placement, RenderId, ScreenCombination, ScreenId};
use lamco_screen_manager::{PhysicalScreenInfo, ScreenSessionManager};

/// Scene-session client that records connection notices
#[derive(Debug, Default)]
pub struct SceneRecorder {
    pub notices: Mutex<Vec<(ScreenId, ConnectionEvent)>>,
    pub combinations: Mutex<Vec<(ScreenId, ScreenCombination)>>,
    pub fail: AtomicBool,
}

impl SceneRecorder {
    fn check(&self) -> ClientResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("scene endpoint gone".to_string()));
        }
        Ok(())
    }
}

impl SceneSessionClient for SceneRecorder {
    fn on_screen_connection_changed(
        &self,
        screen: ScreenId,
        _render_id: RenderId,
        _name: &str,
        event: ConnectionEvent,
    ) -> ClientResult<()> {
        self.check()?;
        self.notices.lock().push((screen, event));
        Ok(())
    }

    fn on_create_screen_session_only(
        &self,
        screen: ScreenId,
        _render_id: RenderId,
        _name: &str,
        _is_extend: bool,
    ) -> ClientResult<()> {
        self.check()?;
        self.notices.lock().push((screen, ConnectionEvent::Connected));
        Ok(())
    }

    fn on_extend_display_node_change(&self, _first: ScreenId, _second: ScreenId) -> ClientResult<()> {
        self.check()
    }

    fn set_screen_combination(
        &self,
        screen: ScreenId,
        combination: ScreenCombination,
    ) -> ClientResult<()> {
        self.check()?;
        self.combinations.lock().push((screen, combination));
        Ok(())
    }
}

/// Render service keeping a set of live nodes
#[derive(Debug, Default)]
pub struct NodeTracker {
    next: AtomicU64,
    pub live: Mutex<HashSet<NodeId>>,
    pub fail_offsets: AtomicBool,
}

impl NodeTracker {
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    fn allocate(&self) -> NodeId {
        let node = NodeId::new(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.live.lock().insert(node);
        node
    }
}

impl RenderService for NodeTracker {
    fn create_display_node(&self, _screen: RenderId) -> ClientResult<NodeId> {
        Ok(self.allocate())
    }

    fn create_mirror_node(&self, _screen: RenderId, _source: RenderId) -> ClientResult<NodeId> {
        Ok(self.allocate())
    }

    fn destroy_node(&self, node: NodeId) -> ClientResult<()> {
        self.live.lock().remove(&node);
        Ok(())
    }

    fn set_screen_offset(&self, _screen: RenderId, _x: i32, _y: i32) -> ClientResult<()> {
        if self.fail_offsets.load(Ordering::SeqCst) {
            return Err(ClientError::Render("offset rejected".to_string()));
        }
        Ok(())
    }

    fn query_placement(&self, _screen: RenderId) -> ClientResult<Option<Placement>> {
        Ok(None)
    }
}

/// Listener collecting every event it receives
#[derive(Debug, Default)]
pub struct EventRecorder {
    pub events: Mutex<Vec<ScreenEvent>>,
}

impl ScreenListener for EventRecorder {
    fn on_event(&self, event: &ScreenEvent) -> Result<(), ListenerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Core with both collaborators installed
pub struct Harness {
    pub core: Arc<ScreenSessionManager>,
    pub scene: Arc<SceneRecorder>,
    pub render: Arc<NodeTracker>,
}

pub fn harness(mode: ExternalConnectMode) -> Harness {
    let mut config = Config::default_config();
    config.screens.external_connect_mode = mode;
    harness_with(&config)
}

pub fn harness_with(config: &Config) -> Harness {
    let core = Arc::new(ScreenSessionManager::new(config));
    let scene = Arc::new(SceneRecorder::default());
    let render = Arc::new(NodeTracker::default());
    core.set_scene_client(Some(scene.clone()));
    core.set_render_service(Some(render.clone()));
    Harness {
        core,
        scene,
        render,
    }
}

pub fn panel(name: &str, width: u32, height: u32) -> PhysicalScreenInfo {
    PhysicalScreenInfo {
        name: name.to_string(),
        width,
        height,
        density: None,
        refresh_rate: 60,
        serial_number: format!("{}-0001", name),
    }
}

/// Built-in 1920x1080 screen 0 and external 1280x720 screen 1
pub fn connect_pair(core: &ScreenSessionManager) -> (ScreenId, ScreenId) {
    let internal = core
        .on_physical_screen_connect(ScreenId::new(0), panel("builtin", 1920, 1080))
        .unwrap();
    let external = core
        .on_physical_screen_connect(ScreenId::new(1), panel("hdmi", 1280, 720))
        .unwrap();
    (internal, external)
}

pub fn combination(core: &ScreenSessionManager, id: ScreenId) -> ScreenCombination {
    core.screen_session(id).unwrap().combination()
}
