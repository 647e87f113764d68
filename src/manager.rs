//! Screen Session Manager
//!
//! The explicitly constructed core object. Owns the session registry,
//! listener registry, collaborator slots, the multi-screen managers and the
//! coordinate transformer, and exposes the operations the IPC-facing layer
//! calls.
//!
//! # Screen Lifecycle
//!
//! ```text
//! on_physical_screen_connect / create_virtual_screen
//!   ├─> registry.create
//!   ├─> render: display node        (if a render service is installed)
//!   ├─> client: Connected           (if a scene client is installed)
//!   ├─> notify ScreenConnect, DisplayCreate
//!   └─> second physical screen: apply external_connect_mode
//!
//! on_physical_screen_disconnect / destroy_virtual_screen
//!   ├─> external screen: disconnect flow (internal becomes main)
//!   ├─> client: Disconnected, render: destroy node
//!   ├─> registry.remove             (groups detached or dissolved)
//!   ├─> purge per-screen listeners
//!   └─> notify DisplayDestroy, ScreenDisconnect
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{Collaborators, ConnectionEvent, RenderService, SceneSessionClient};
use crate::config::{Config, ExternalConnectMode, ScreensConfig};
use crate::coordinates::{CoordinateTransformer, GlobalPosition, RelativePosition};
use crate::error::{DmError, Result};
use crate::listener::{EventKind, ListenerHandle, ListenerRegistry, OwnerId, ScreenEvent};
use crate::multiscreen::{MultiScreenManager, MultiScreenModeChangeManager, OperateType};
use crate::screen::{
    DisplayId, GroupId, ScreenCombination, ScreenId, ScreenKind, ScreenSession,
    ScreenSessionRegistry,
};

/// Physical screen properties reported at connect time
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalScreenInfo {
    /// Panel name
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel density (None = configured default)
    pub density: Option<f32>,
    /// Refresh rate in Hz
    pub refresh_rate: u32,
    /// Panel serial number
    pub serial_number: String,
}

/// Virtual screen creation request
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualScreenOption {
    /// Screen name
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel density (None = configured default)
    pub density: Option<f32>,
}

/// Screen topology and notification core
#[derive(Debug)]
pub struct ScreenSessionManager {
    screens: ScreensConfig,
    registry: Arc<ScreenSessionRegistry>,
    listeners: Arc<ListenerRegistry>,
    collaborators: Arc<Collaborators>,
    mode_change: Arc<MultiScreenModeChangeManager>,
    multi_screen: MultiScreenManager,
    transformer: CoordinateTransformer,
}

impl ScreenSessionManager {
    /// Build the core from configuration
    ///
    /// No collaborators are installed; see
    /// [`ScreenSessionManager::set_scene_client`] and
    /// [`ScreenSessionManager::set_render_service`].
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(ScreenSessionRegistry::new(
            config.screens.default_screen(),
            config.screens.virtual_screen_id_start,
        ));
        let listeners = Arc::new(ListenerRegistry::new(config.listeners.settings()));
        let collaborators = Arc::new(Collaborators::new());

        let mode_change = Arc::new(MultiScreenModeChangeManager::new(
            registry.clone(),
            listeners.clone(),
            collaborators.clone(),
        ));
        let multi_screen = MultiScreenManager::new(
            registry.clone(),
            listeners.clone(),
            collaborators.clone(),
            mode_change.clone(),
        );
        let transformer = CoordinateTransformer::new(
            registry.clone(),
            collaborators.clone(),
            config.coordinates.refresh_interval(),
            config.coordinates.fallback_screen(),
        );

        info!(
            "Screen core created (default screen {}, virtual ids from {})",
            config.screens.default_screen_id, config.screens.virtual_screen_id_start
        );

        Self {
            screens: config.screens.clone(),
            registry,
            listeners,
            collaborators,
            mode_change,
            multi_screen,
            transformer,
        }
    }

    /// Session registry
    pub fn registry(&self) -> &Arc<ScreenSessionRegistry> {
        &self.registry
    }

    /// Listener registry
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Multi-screen manager
    pub fn multi_screen(&self) -> &MultiScreenManager {
        &self.multi_screen
    }

    /// Pairwise mode change manager
    pub fn mode_change(&self) -> &Arc<MultiScreenModeChangeManager> {
        &self.mode_change
    }

    /// Coordinate transformer
    pub fn transformer(&self) -> &CoordinateTransformer {
        &self.transformer
    }

    /// Install or clear the scene-session client
    pub fn set_scene_client(&self, client: Option<Arc<dyn SceneSessionClient>>) {
        info!("Scene session client {}", if client.is_some() { "installed" } else { "cleared" });
        self.collaborators.set_scene_client(client);
    }

    /// Install or clear the render service
    pub fn set_render_service(&self, service: Option<Arc<dyn RenderService>>) {
        info!("Render service {}", if service.is_some() { "installed" } else { "cleared" });
        self.collaborators.set_render_service(service);
    }

    /// Live session by id
    pub fn screen_session(&self, id: ScreenId) -> Option<Arc<ScreenSession>> {
        self.registry.get(id)
    }

    // =========================================================================
    // Screen Lifecycle
    // =========================================================================

    /// Bring up a physical screen
    ///
    /// # Arguments
    ///
    /// * `hw_id` - Id assigned by the hardware layer (below the virtual range)
    /// * `info` - Panel properties
    ///
    /// # Errors
    ///
    /// * `InvalidParam` - zero size, or `hw_id` in the virtual range
    /// * `InvalidCalling` - `hw_id` is already connected
    /// * `IpcFailed` / `RenderServiceFailed` - bring-up failed; the session
    ///   is not kept
    pub fn on_physical_screen_connect(
        &self,
        hw_id: ScreenId,
        info: PhysicalScreenInfo,
    ) -> Result<ScreenId> {
        Self::check_size(info.width, info.height)?;
        if !hw_id.is_valid() || self.registry.is_virtual_id(hw_id) {
            return Err(DmError::InvalidParam(format!(
                "{} is not a physical screen id",
                hw_id
            )));
        }
        if self.registry.get(hw_id).is_some() {
            return Err(DmError::InvalidCalling(format!(
                "screen {} already connected",
                hw_id
            )));
        }

        let id = self.registry.create(&info.name, Some(hw_id));
        let session = self.registry.get(id).ok_or(DmError::NotFound(id))?;
        session.set_resolution(info.width, info.height);
        session.set_density(info.density.unwrap_or(self.screens.default_density));
        session.set_panel_info(&info.serial_number, info.refresh_rate);

        if let Err(e) = self.bring_up(&session) {
            warn!("Screen {} bring-up failed: {}", id, e);
            self.registry.remove(id);
            return Err(e);
        }

        info!(
            "Physical screen {} connected: '{}' {}x{}@{}Hz",
            id, info.name, info.width, info.height, info.refresh_rate
        );
        self.announce_connect(&session);
        self.apply_connect_mode(&session);
        Ok(id)
    }

    /// Tear down a physical screen
    ///
    /// # Errors
    ///
    /// * `InvalidParam` - `id` is in the virtual range
    /// * `NotFound` - `id` is not connected
    pub fn on_physical_screen_disconnect(&self, id: ScreenId) -> Result<()> {
        if self.registry.is_virtual_id(id) {
            return Err(DmError::InvalidParam(format!(
                "{} is not a physical screen id",
                id
            )));
        }
        let session = self.registry.get(id).ok_or(DmError::NotFound(id))?;

        let default_id = self.screens.default_screen();
        if id != default_id {
            if let Some(internal) = self.registry.get(default_id) {
                if let Err(e) = self
                    .multi_screen
                    .external_screen_disconnect_change(Some(&*internal), Some(&*session))
                {
                    warn!("Disconnect flow for screen {} failed: {}", id, e);
                }
            }
        }

        self.teardown(&session);
        info!("Physical screen {} disconnected", id);
        Ok(())
    }

    /// Create a virtual screen
    ///
    /// # Errors
    ///
    /// * `InvalidParam` - zero size
    /// * `IpcFailed` / `RenderServiceFailed` - bring-up failed
    pub fn create_virtual_screen(&self, option: VirtualScreenOption) -> Result<ScreenId> {
        Self::check_size(option.width, option.height)?;

        let id = self.registry.create(&option.name, None);
        let session = self.registry.get(id).ok_or(DmError::NotFound(id))?;
        session.set_resolution(option.width, option.height);
        session.set_density(option.density.unwrap_or(self.screens.default_density));

        if let Err(e) = self.bring_up(&session) {
            warn!("Virtual screen {} bring-up failed: {}", id, e);
            self.registry.remove(id);
            return Err(e);
        }

        info!(
            "Virtual screen {} created: '{}' {}x{}",
            id, option.name, option.width, option.height
        );
        self.announce_connect(&session);
        Ok(id)
    }

    /// Destroy a virtual screen
    ///
    /// # Errors
    ///
    /// * `InvalidParam` - `id` is not in the virtual range
    /// * `NotFound` - `id` is not live
    pub fn destroy_virtual_screen(&self, id: ScreenId) -> Result<()> {
        if !self.registry.is_virtual_id(id) {
            return Err(DmError::InvalidParam(format!(
                "{} is not a virtual screen id",
                id
            )));
        }
        let session = self.registry.get(id).ok_or(DmError::NotFound(id))?;
        self.teardown(&session);
        info!("Virtual screen {} destroyed", id);
        Ok(())
    }

    fn check_size(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(DmError::InvalidParam(format!(
                "screen size {}x{} is empty",
                width, height
            )));
        }
        Ok(())
    }

    /// Display node and scene session for a new screen
    fn bring_up(&self, session: &ScreenSession) -> Result<()> {
        if let Some(render) = self.collaborators.render_service() {
            let node = render.create_display_node(session.render_id())?;
            session.replace_display_node(Some(node));
        }

        let Some(client) = self.collaborators.scene_client() else {
            debug!("No scene session client, screen {} not announced", session.id());
            return Ok(());
        };
        if let Err(e) = client.on_screen_connection_changed(
            session.id(),
            session.render_id(),
            &session.name(),
            ConnectionEvent::Connected,
        ) {
            self.release_node(session);
            return Err(e.into());
        }
        Ok(())
    }

    fn release_node(&self, session: &ScreenSession) {
        let Some(node) = session.replace_display_node(None) else {
            return;
        };
        let Some(render) = self.collaborators.render_service() else {
            warn!("Render service gone, node {} of screen {} leaked", node, session.id());
            return;
        };
        if let Err(e) = render.destroy_node(node) {
            warn!("Failed to destroy node {} of screen {}: {}", node, session.id(), e);
        }
    }

    fn teardown(&self, session: &ScreenSession) {
        let id = session.id();
        if session.combination() != ScreenCombination::Mirror {
            if let Some(client) = self.collaborators.scene_client() {
                if let Err(e) = client.on_screen_connection_changed(
                    id,
                    session.render_id(),
                    &session.name(),
                    ConnectionEvent::Disconnected,
                ) {
                    warn!("Scene session client missed disconnect of screen {}: {}", id, e);
                }
            }
        }
        self.release_node(session);

        self.registry.remove(id);
        let purged = self.listeners.purge_screen(id);
        if purged > 0 {
            debug!("Purged {} listener(s) bound to screen {}", purged, id);
        }

        self.listeners.publish(&ScreenEvent::DisplayDestroy {
            display: session.display_id(),
        });
        self.listeners
            .publish(&ScreenEvent::ScreenDisconnect { screen: id });
    }

    fn announce_connect(&self, session: &ScreenSession) {
        self.listeners.publish(&ScreenEvent::ScreenConnect {
            screen: session.id(),
        });
        self.listeners.publish(&ScreenEvent::DisplayCreate {
            display: session.display_id(),
        });
    }

    /// Combine the built-in screen with the first external one
    fn apply_connect_mode(&self, session: &ScreenSession) {
        let default_id = self.screens.default_screen();
        if session.id() == default_id {
            return;
        }
        let Some(internal) = self.registry.get(default_id) else {
            debug!("Built-in screen {} absent, screen {} stays alone", default_id, session.id());
            return;
        };
        let physical = self
            .registry
            .sessions()
            .iter()
            .filter(|s| s.kind() == ScreenKind::Physical)
            .count();
        if physical != 2 {
            debug!("{} physical screens, connect mode not applied", physical);
            return;
        }

        let mode = self.screens.external_connect_mode;
        let outcome = match mode {
            ExternalConnectMode::None => return,
            ExternalConnectMode::Mirror => self
                .multi_screen
                .mirror_switch(default_id, &[session.id()])
                .map(|_| ()),
            ExternalConnectMode::Extend => self
                .multi_screen
                .mirror_switch(default_id, &[session.id()])
                .and_then(|_| {
                    self.mode_change.on_mode_change_request(
                        Some(&*internal),
                        Some(session),
                        OperateType::Extend.as_str(),
                    )
                }),
        };

        match outcome {
            Ok(()) => {
                self.multi_screen
                    .record_last_screen_mode(&internal, session);
                info!("Screen {} joined screen {} as {}", session.id(), default_id, mode);
            }
            Err(e) => warn!(
                "Connect mode {} for screen {} not applied: {}",
                mode,
                session.id(),
                e
            ),
        }
    }

    // =========================================================================
    // Combination Requests
    // =========================================================================

    /// Apply an operator request to a list of screens
    pub fn set_multi_screen_mode(&self, operate_type: &str, ids: &[ScreenId]) -> Result<()> {
        self.multi_screen.set_multi_screen_mode(operate_type, ids)
    }

    /// Pairwise request by screen id; unknown ids count as absent sessions
    pub fn on_mode_change_request(
        &self,
        inner: ScreenId,
        external: ScreenId,
        operate_type: &str,
    ) -> Result<()> {
        let inner = self.registry.get(inner);
        let external = self.registry.get(external);
        self.mode_change
            .on_mode_change_request(inner.as_deref(), external.as_deref(), operate_type)
    }

    /// Mirror `candidates` onto `main`
    pub fn mirror_switch(
        &self,
        main: ScreenId,
        candidates: &[ScreenId],
    ) -> Result<Option<GroupId>> {
        self.multi_screen.mirror_switch(main, candidates)
    }

    /// Make screens unique
    pub fn unique_switch(&self, ids: &[ScreenId]) -> Result<Vec<DisplayId>> {
        self.multi_screen.unique_switch(ids)
    }

    /// Built-in screen power change against the first external screen
    ///
    /// Does nothing unless both the built-in and an external physical screen
    /// are connected.
    pub fn set_internal_screen_power(&self, on: bool) -> Result<()> {
        let default_id = self.screens.default_screen();
        let internal = self.registry.get(default_id);
        let external = self
            .registry
            .sessions()
            .into_iter()
            .find(|s| s.kind() == ScreenKind::Physical && s.id() != default_id);
        if internal.is_none() || external.is_none() {
            debug!("Internal screen power change without a pair, ignored");
            return Ok(());
        }
        if on {
            self.multi_screen
                .internal_screen_on_change(internal.as_deref(), external.as_deref())
        } else {
            self.multi_screen
                .internal_screen_off_change(internal.as_deref(), external.as_deref())
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener for `kind`
    pub fn register_listener(&self, kind: EventKind, handle: Option<ListenerHandle>) -> Result<()> {
        self.listeners.register(kind, handle)
    }

    /// Unregister a listener for `kind`
    pub fn unregister_listener(
        &self,
        kind: EventKind,
        handle: Option<&ListenerHandle>,
    ) -> Result<()> {
        self.listeners.unregister(kind, handle)
    }

    /// Register a listener on behalf of a client process
    pub fn register_owner_listener(
        &self,
        owner: OwnerId,
        kind: EventKind,
        handle: Option<ListenerHandle>,
    ) -> Result<()> {
        self.listeners.register_for_owner(owner, kind, handle)
    }

    /// Drop every listener of a client process that went away
    pub fn on_owner_died(&self, owner: OwnerId) -> usize {
        let removed = self.listeners.unregister_owner(owner);
        info!("{} gone, {} listener(s) removed", owner, removed);
        removed
    }

    /// Register a listener bound to one screen's lifetime
    ///
    /// # Errors
    ///
    /// * `NotFound` - `screen` is not live
    /// * `NullPointer` - `handle` is `None`
    pub fn register_screen_listener(
        &self,
        screen: ScreenId,
        kind: EventKind,
        handle: Option<ListenerHandle>,
    ) -> Result<()> {
        if self.registry.get(screen).is_none() {
            return Err(DmError::NotFound(screen));
        }
        self.listeners.register_for_screen(screen, kind, handle)
    }

    /// Forward an event from the hardware/sensor layer
    pub fn publish_event(&self, event: &ScreenEvent) -> usize {
        self.listeners.publish(event)
    }

    // =========================================================================
    // Coordinates and Enumeration
    // =========================================================================

    /// Screen-relative point to global coordinates
    pub fn relative_to_global(&self, relative: RelativePosition) -> Result<GlobalPosition> {
        self.transformer.relative_to_global(relative)
    }

    /// Global point to the screen containing it
    pub fn global_to_relative(&self, global: GlobalPosition) -> Result<RelativePosition> {
        self.transformer.global_to_relative(global)
    }

    /// Global point against an explicit display
    pub fn global_to_relative_with_display_id(
        &self,
        global: GlobalPosition,
        display_id: DisplayId,
    ) -> Result<RelativePosition> {
        self.transformer
            .global_to_relative_with_display_id(global, display_id)
    }

    /// Ids of all live screens
    pub fn all_screen_ids(&self) -> Vec<ScreenId> {
        self.registry.all_ids()
    }

    /// Display ids of all live screens
    pub fn all_display_ids(&self) -> Vec<DisplayId> {
        self.registry
            .sessions()
            .iter()
            .map(|s| s.display_id())
            .collect()
    }

    /// Log a summary of the whole core
    pub fn log_summary(&self) {
        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║                    Screen Core Summary                     ║");
        info!("╚════════════════════════════════════════════════════════════╝");
        info!(
            "  Default screen: {}, virtual ids from {}",
            self.screens.default_screen_id, self.screens.virtual_screen_id_start
        );
        info!("  External connect mode: {}", self.screens.external_connect_mode);
        info!("  Collaborators: {:?}", self.collaborators);

        self.registry.log_summary();
        self.multi_screen.log_summary();
        self.listeners.log_summary();
    }
}
