//! Listener Registry
//!
//! Event kind → set of listener handles, with snapshot-then-call fan-out.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::event::{EventKind, ScreenEvent};
use super::handle::{ListenerHandle, OwnerId};
use crate::error::{DmError, Result};
use crate::screen::ScreenId;

/// Upstream event source shared by every listener of one kind
///
/// Called with the registry lock held; implementations must not block or
/// call back into the registry.
pub trait UpstreamSource: Send + Sync {
    /// First listener of `kind` registered
    fn attach(&self, kind: EventKind);

    /// Last listener of `kind` unregistered
    fn detach(&self, kind: EventKind);
}

/// Listener registry tuning
#[derive(Debug, Clone, Copy)]
pub struct ListenerSettings {
    /// Listener calls slower than this are logged
    pub slow_listener_warn: Duration,

    /// Registrations allowed per kind
    pub max_listeners_per_kind: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            slow_listener_warn: Duration::from_millis(100),
            max_listeners_per_kind: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct Registration {
    handle: ListenerHandle,
    owner: Option<OwnerId>,
    screen: Option<ScreenId>,
}

#[derive(Debug, Default)]
struct KindEntry {
    registrations: Vec<Registration>,

    /// Serial of the shared upstream subscription, present while the kind
    /// has at least one listener
    subscription: Option<u64>,
}

#[derive(Debug, Default)]
struct Table {
    kinds: BTreeMap<EventKind, KindEntry>,
    next_subscription: u64,
}

/// Typed pub/sub table for screen/display events
pub struct ListenerRegistry {
    table: Mutex<Table>,
    upstream: Option<Arc<dyn UpstreamSource>>,
    settings: ListenerSettings,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("table", &self.table)
            .field("upstream", &self.upstream.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(ListenerSettings::default())
    }
}

impl ListenerRegistry {
    /// Create a registry without an upstream source
    pub fn new(settings: ListenerSettings) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            upstream: None,
            settings,
        }
    }

    /// Create a registry that attaches to `upstream` lazily per kind
    pub fn with_upstream(settings: ListenerSettings, upstream: Arc<dyn UpstreamSource>) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            upstream: Some(upstream),
            settings,
        }
    }

    /// Register a listener for `kind`
    ///
    /// Registering a handle already present is a no-op.
    ///
    /// # Errors
    ///
    /// * `NullPointer` - `handle` is `None`
    /// * `InvalidParam` - the kind already has the maximum number of listeners
    pub fn register(&self, kind: EventKind, handle: Option<ListenerHandle>) -> Result<()> {
        let handle = handle.ok_or(DmError::NullPointer)?;
        self.insert(
            kind,
            Registration {
                handle,
                owner: None,
                screen: None,
            },
        )
    }

    /// Register a listener on behalf of a client process
    ///
    /// An owner holds at most one listener per kind; a different handle
    /// replaces the previous one.
    pub fn register_for_owner(
        &self,
        owner: OwnerId,
        kind: EventKind,
        handle: Option<ListenerHandle>,
    ) -> Result<()> {
        let handle = handle.ok_or(DmError::NullPointer)?;
        {
            let mut table = self.table.lock();
            if let Some(entry) = table.kinds.get_mut(&kind) {
                let before = entry.registrations.len();
                entry
                    .registrations
                    .retain(|r| r.owner != Some(owner) || r.handle == handle);
                if entry.registrations.len() != before {
                    debug!("Replacing {} listener of {}", kind, owner);
                }
            }
        }
        self.insert(
            kind,
            Registration {
                handle,
                owner: Some(owner),
                screen: None,
            },
        )
    }

    /// Register a listener whose lifetime is bound to one screen session
    pub fn register_for_screen(
        &self,
        screen: ScreenId,
        kind: EventKind,
        handle: Option<ListenerHandle>,
    ) -> Result<()> {
        let handle = handle.ok_or(DmError::NullPointer)?;
        self.insert(
            kind,
            Registration {
                handle,
                owner: None,
                screen: Some(screen),
            },
        )
    }

    fn insert(&self, kind: EventKind, registration: Registration) -> Result<()> {
        let mut table = self.table.lock();
        let next_serial = table.next_subscription;
        let entry = table.kinds.entry(kind).or_default();

        if let Some(existing) = entry
            .registrations
            .iter_mut()
            .find(|r| r.handle == registration.handle)
        {
            // An unowned entry adopts the owner so owner cleanup reaches it
            if existing.owner.is_none() {
                existing.owner = registration.owner;
            }
            debug!("{:?} already registered for {}", registration.handle, kind);
            return Ok(());
        }
        if entry.registrations.len() >= self.settings.max_listeners_per_kind {
            return Err(DmError::InvalidParam(format!(
                "{} already has {} listeners",
                kind, self.settings.max_listeners_per_kind
            )));
        }

        entry.registrations.push(registration);
        let created = entry.subscription.is_none();
        if created {
            entry.subscription = Some(next_serial);
        }
        let count = entry.registrations.len();

        if created {
            table.next_subscription += 1;
            if let Some(upstream) = &self.upstream {
                upstream.attach(kind);
            }
            info!("Upstream subscription {} created for {}", next_serial, kind);
        }
        debug!("Listener registered for {} ({} total)", kind, count);
        Ok(())
    }

    /// Unregister a listener
    ///
    /// Removing a handle that is not registered succeeds. Removing the last
    /// handle of a kind tears down its upstream subscription.
    ///
    /// # Errors
    ///
    /// * `NullPointer` - `handle` is `None`
    pub fn unregister(&self, kind: EventKind, handle: Option<&ListenerHandle>) -> Result<()> {
        let handle = handle.ok_or(DmError::NullPointer)?;
        let mut table = self.table.lock();
        let Some(entry) = table.kinds.get_mut(&kind) else {
            return Ok(());
        };
        entry.registrations.retain(|r| r.handle != *handle);
        self.release_if_empty(&mut table, kind);
        Ok(())
    }

    /// Drop every registration of a client process
    ///
    /// # Returns
    ///
    /// Number of registrations removed
    pub fn unregister_owner(&self, owner: OwnerId) -> usize {
        let removed = self.remove_where(|r| r.owner == Some(owner));
        if removed > 0 {
            info!("Removed {} listener(s) of {}", removed, owner);
        }
        removed
    }

    /// Drop every registration bound to a screen session
    ///
    /// # Returns
    ///
    /// Number of registrations removed
    pub fn purge_screen(&self, screen: ScreenId) -> usize {
        let removed = self.remove_where(|r| r.screen == Some(screen));
        if removed > 0 {
            info!("Purged {} listener(s) bound to screen {}", removed, screen);
        }
        removed
    }

    fn remove_where(&self, predicate: impl Fn(&Registration) -> bool) -> usize {
        let mut table = self.table.lock();
        let mut removed = 0;
        let kinds: Vec<EventKind> = table.kinds.keys().copied().collect();
        for kind in kinds {
            if let Some(entry) = table.kinds.get_mut(&kind) {
                let before = entry.registrations.len();
                entry.registrations.retain(|r| !predicate(r));
                removed += before - entry.registrations.len();
            }
            self.release_if_empty(&mut table, kind);
        }
        removed
    }

    fn release_if_empty(&self, table: &mut Table, kind: EventKind) {
        let empty = table
            .kinds
            .get(&kind)
            .is_some_and(|entry| entry.registrations.is_empty());
        if !empty {
            return;
        }
        if let Some(entry) = table.kinds.remove(&kind) {
            if let Some(serial) = entry.subscription {
                if let Some(upstream) = &self.upstream {
                    upstream.detach(kind);
                }
                info!("Upstream subscription {} for {} torn down", serial, kind);
            }
        }
    }

    /// Deliver `event` to every listener of `kind`
    ///
    /// The listener set is copied under the lock and delivery happens after
    /// the lock is released. A listener that fails or panics is logged and
    /// skipped; delivery to the rest continues.
    ///
    /// # Returns
    ///
    /// Number of listeners that handled the event successfully
    pub fn notify(&self, kind: EventKind, event: &ScreenEvent) -> usize {
        let snapshot = self.listeners(kind);
        if snapshot.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for handle in &snapshot {
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handle.deliver(event)));
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("{:?} failed to handle {}: {}", handle, kind, e),
                Err(_) => warn!("{:?} panicked while handling {}", handle, kind),
            }
            if elapsed >= self.settings.slow_listener_warn {
                warn!(
                    "{:?} took {:?} to handle {} (threshold {:?})",
                    handle, elapsed, kind, self.settings.slow_listener_warn
                );
            }
        }

        debug!("{} delivered to {}/{} listeners", kind, delivered, snapshot.len());
        delivered
    }

    /// Deliver `event` under its own kind
    pub fn publish(&self, event: &ScreenEvent) -> usize {
        self.notify(event.kind(), event)
    }

    /// Snapshot of the handles registered for `kind`
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerHandle> {
        self.table
            .lock()
            .kinds
            .get(&kind)
            .map(|entry| entry.registrations.iter().map(|r| r.handle.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether `handle` is registered for `kind`
    pub fn contains(&self, kind: EventKind, handle: &ListenerHandle) -> bool {
        self.table
            .lock()
            .kinds
            .get(&kind)
            .is_some_and(|entry| entry.registrations.iter().any(|r| r.handle == *handle))
    }

    /// Whether the shared upstream subscription for `kind` exists
    pub fn has_subscription(&self, kind: EventKind) -> bool {
        self.subscription_serial(kind).is_some()
    }

    /// Serial of the shared upstream subscription for `kind`
    pub fn subscription_serial(&self, kind: EventKind) -> Option<u64> {
        self.table
            .lock()
            .kinds
            .get(&kind)
            .and_then(|entry| entry.subscription)
    }

    /// Total registrations across all kinds
    pub fn registration_count(&self) -> usize {
        self.table
            .lock()
            .kinds
            .values()
            .map(|entry| entry.registrations.len())
            .sum()
    }

    /// Log registrations per kind
    pub fn log_summary(&self) {
        let table = self.table.lock();
        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║                     Listener Registry                      ║");
        info!("╚════════════════════════════════════════════════════════════╝");
        if table.kinds.is_empty() {
            info!("  No listeners registered");
            return;
        }
        for (kind, entry) in &table.kinds {
            info!("  {:24} {} listener(s)", kind.as_str(), entry.registrations.len());
        }
    }
}
