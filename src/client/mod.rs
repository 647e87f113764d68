//! External Collaborators
//!
//! The screen core drives two remote services it does not own:
//!
//! - **Scene-session client** ([`SceneSessionClient`]) - the window scene
//!   side that creates and tears down per-screen scene sessions. Topology
//!   changes that introduce or remove a scene-visible screen must tell it.
//! - **Render service** ([`RenderService`]) - composition nodes and screen
//!   offsets in the render tree.
//!
//! Both are installed at runtime into [`Collaborators`] and may be absent.
//! Operations that need an absent collaborator fail with
//! [`DmError::InvalidCalling`](crate::error::DmError::InvalidCalling) rather
//! than silently skipping the call. Calls are never retried.

#[cfg(test)]
pub(crate) mod testing;

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{DmError, Result};
use crate::screen::{NodeId, Placement, RenderId, ScreenCombination, ScreenId};

/// Result type for collaborator calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Collaborator call failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport to the remote endpoint failed
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Remote endpoint refused the request
    #[error("Remote rejected request: {0}")]
    Rejected(String),

    /// Render service failure
    #[error("Render failure: {0}")]
    Render(String),
}

/// Scene session connection state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// Screen now hosts a scene session
    Connected,
    /// Screen no longer hosts a scene session
    Disconnected,
}

/// Remote window scene endpoint
#[cfg_attr(test, mockall::automock)]
pub trait SceneSessionClient: Send + Sync {
    /// A screen gained or lost its scene session
    fn on_screen_connection_changed(
        &self,
        screen: ScreenId,
        render_id: RenderId,
        name: &str,
        event: ConnectionEvent,
    ) -> ClientResult<()>;

    /// Create a scene session for a screen without recreating the main one
    fn on_create_screen_session_only(
        &self,
        screen: ScreenId,
        render_id: RenderId,
        name: &str,
        is_extend: bool,
    ) -> ClientResult<()>;

    /// Display nodes of an extend pair were swapped
    fn on_extend_display_node_change(&self, first: ScreenId, second: ScreenId)
        -> ClientResult<()>;

    /// A screen's combination changed while it kept its scene session
    fn set_screen_combination(
        &self,
        screen: ScreenId,
        combination: ScreenCombination,
    ) -> ClientResult<()>;
}

/// Composition / render-tree service
#[cfg_attr(test, mockall::automock)]
pub trait RenderService: Send + Sync {
    /// Create a node that displays `screen`'s own content
    fn create_display_node(&self, screen: RenderId) -> ClientResult<NodeId>;

    /// Create a node on `screen` that mirrors `source`
    fn create_mirror_node(&self, screen: RenderId, source: RenderId) -> ClientResult<NodeId>;

    /// Destroy a node
    fn destroy_node(&self, node: NodeId) -> ClientResult<()>;

    /// Move a screen in the global coordinate space
    fn set_screen_offset(&self, screen: RenderId, x: i32, y: i32) -> ClientResult<()>;

    /// Current placement of a screen, if the service knows it
    fn query_placement(&self, screen: RenderId) -> ClientResult<Option<Placement>>;
}

/// Runtime-installable collaborator slots
#[derive(Default)]
pub struct Collaborators {
    scene_client: RwLock<Option<Arc<dyn SceneSessionClient>>>,
    render_service: RwLock<Option<Arc<dyn RenderService>>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("scene_client", &self.scene_client.read().is_some())
            .field("render_service", &self.render_service.read().is_some())
            .finish()
    }
}

impl Collaborators {
    /// Empty slots
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or clear the scene-session client
    pub fn set_scene_client(&self, client: Option<Arc<dyn SceneSessionClient>>) {
        *self.scene_client.write() = client;
    }

    /// Install or clear the render service
    pub fn set_render_service(&self, service: Option<Arc<dyn RenderService>>) {
        *self.render_service.write() = service;
    }

    /// Current scene-session client
    pub fn scene_client(&self) -> Option<Arc<dyn SceneSessionClient>> {
        self.scene_client.read().clone()
    }

    /// Current render service
    pub fn render_service(&self) -> Option<Arc<dyn RenderService>> {
        self.render_service.read().clone()
    }

    /// Scene-session client, or `InvalidCalling` naming `operation`
    pub fn require_scene_client(&self, operation: &str) -> Result<Arc<dyn SceneSessionClient>> {
        self.scene_client().ok_or_else(|| {
            DmError::InvalidCalling(format!("{}: scene session client unavailable", operation))
        })
    }

    /// Render service, or `InvalidCalling` naming `operation`
    pub fn require_render_service(&self, operation: &str) -> Result<Arc<dyn RenderService>> {
        self.render_service().ok_or_else(|| {
            DmError::InvalidCalling(format!("{}: render service unavailable", operation))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeRenderService, RecordingClient};
    use super::*;

    #[test]
    fn test_missing_collaborators_are_invalid_calling() {
        let slots = Collaborators::new();
        assert!(matches!(
            slots.require_scene_client("mirror"),
            Err(DmError::InvalidCalling(_))
        ));
        assert!(matches!(
            slots.require_render_service("mirror"),
            Err(DmError::InvalidCalling(_))
        ));
    }

    #[test]
    fn test_install_and_clear() {
        let slots = Collaborators::new();
        slots.set_scene_client(Some(Arc::new(RecordingClient::default())));
        slots.set_render_service(Some(Arc::new(FakeRenderService::default())));
        assert!(slots.require_scene_client("x").is_ok());
        assert!(slots.require_render_service("x").is_ok());

        slots.set_scene_client(None);
        assert!(slots.scene_client().is_none());
        assert_eq!(
            format!("{:?}", slots),
            "Collaborators { scene_client: false, render_service: true }"
        );
    }
}
