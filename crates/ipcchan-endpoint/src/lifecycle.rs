//! Window lifecycle tracking.
//!
//! ```text
//! Created ──start──▶ Started ──close──▶ Closed
//!    │                                    ▲
//!    └───────────────close────────────────┘
//! ```
//!
//! No transition is reversible. Only `Started` windows receive broadcasts.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ipcchan_transport::WindowId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChannelError, Result};

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle state of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Created,
    Started,
    Closed,
}

impl WindowState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            CREATED => WindowState::Created,
            STARTED => WindowState::Started,
            _ => WindowState::Closed,
        }
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowState::Created => f.write_str("created"),
            WindowState::Started => f.write_str("started"),
            WindowState::Closed => f.write_str("closed"),
        }
    }
}

/// Handle to one window instance. Clones share state.
#[derive(Clone)]
pub struct WindowHandle {
    id: WindowId,
    state: Arc<AtomicU8>,
}

impl WindowHandle {
    fn new(id: WindowId) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(CREATED)),
        }
    }

    pub fn id(&self) -> &WindowId {
        &self.id
    }

    pub fn state(&self) -> WindowState {
        WindowState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_started(&self) -> bool {
        self.state() == WindowState::Started
    }

    fn same_instance(&self, other: &WindowHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Registry of live (created or started) windows.
///
/// Closed windows are dropped from the registry; their handles keep
/// reporting `Closed`.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: RwLock<HashMap<WindowId, WindowHandle>>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new window in the `Created` state.
    pub fn create(&self, id: impl Into<WindowId>) -> Result<WindowHandle> {
        let id = id.into();
        let mut windows = self.write();
        if windows.contains_key(&id) {
            return Err(ChannelError::DuplicateWindow(id));
        }
        let handle = WindowHandle::new(id.clone());
        windows.insert(id.clone(), handle.clone());
        debug!(window = %id, "window created");
        Ok(handle)
    }

    /// Make a window a delivery target. Starting a started window is a no-op.
    pub fn start(&self, handle: &WindowHandle) -> Result<()> {
        match handle
            .state
            .compare_exchange(CREATED, STARTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(window = %handle.id, "window started");
                Ok(())
            }
            Err(STARTED) => Ok(()),
            Err(_) => Err(ChannelError::WindowClosed(handle.id.clone())),
        }
    }

    /// Close a window. Idempotent; returns whether this call closed it.
    pub fn close(&self, handle: &WindowHandle) -> bool {
        let previous = handle.state.swap(CLOSED, Ordering::AcqRel);
        {
            let mut windows = self.write();
            // Only drop the entry if it still belongs to this instance.
            if windows
                .get(&handle.id)
                .is_some_and(|current| current.same_instance(handle))
            {
                windows.remove(&handle.id);
            }
        }
        if previous == CLOSED {
            return false;
        }
        debug!(window = %handle.id, "window closed");
        true
    }

    /// Windows that currently receive broadcasts.
    pub fn list_started(&self) -> Vec<WindowHandle> {
        self.read()
            .values()
            .filter(|handle| handle.is_started())
            .cloned()
            .collect()
    }

    /// All live windows, sorted by id.
    pub fn list(&self) -> Vec<WindowHandle> {
        let mut windows: Vec<WindowHandle> = self.read().values().cloned().collect();
        windows.sort_by(|a, b| a.id.cmp(&b.id));
        windows
    }

    pub fn get(&self, id: &WindowId) -> Option<WindowHandle> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<WindowId, WindowHandle>> {
        self.windows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<WindowId, WindowHandle>> {
        self.windows
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_ids(registry: &WindowRegistry) -> Vec<String> {
        let mut ids: Vec<String> = registry
            .list_started()
            .iter()
            .map(|handle| handle.id().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn created_windows_are_not_broadcast_targets() {
        let registry = WindowRegistry::new();
        let handle = registry.create("w1").unwrap();
        assert_eq!(handle.state(), WindowState::Created);
        assert!(registry.list_started().is_empty());

        registry.start(&handle).unwrap();
        assert_eq!(started_ids(&registry), vec!["w1"]);
    }

    #[test]
    fn start_is_idempotent() {
        let registry = WindowRegistry::new();
        let handle = registry.create("w1").unwrap();
        registry.start(&handle).unwrap();
        registry.start(&handle).unwrap();
        assert_eq!(handle.state(), WindowState::Started);
    }

    #[test]
    fn closed_window_is_never_revived() {
        let registry = WindowRegistry::new();
        let handle = registry.create("w1").unwrap();
        registry.start(&handle).unwrap();

        assert!(registry.close(&handle));
        assert!(!registry.close(&handle), "second close is a no-op");
        assert_eq!(handle.state(), WindowState::Closed);
        assert!(registry.list_started().is_empty());
        assert!(registry.get(handle.id()).is_none());

        let err = registry.start(&handle).unwrap_err();
        assert!(matches!(err, ChannelError::WindowClosed(_)));
        assert!(registry.list_started().is_empty());
    }

    #[test]
    fn window_may_close_before_starting() {
        let registry = WindowRegistry::new();
        let handle = registry.create("w1").unwrap();
        assert!(registry.close(&handle));
        assert!(registry.is_empty());
        assert!(registry.start(&handle).is_err());
    }

    #[test]
    fn live_ids_are_unique_but_reusable_after_close() {
        let registry = WindowRegistry::new();
        let first = registry.create("w1").unwrap();
        assert!(matches!(
            registry.create("w1"),
            Err(ChannelError::DuplicateWindow(_))
        ));

        registry.close(&first);
        let second = registry.create("w1").unwrap();
        registry.start(&second).unwrap();

        // Closing the stale handle again must not evict the new instance.
        registry.close(&first);
        assert_eq!(started_ids(&registry), vec!["w1"]);
        assert_eq!(first.state(), WindowState::Closed);
    }

    #[test]
    fn clones_share_state() {
        let registry = WindowRegistry::new();
        let handle = registry.create("w1").unwrap();
        let clone = handle.clone();
        registry.start(&clone).unwrap();
        assert!(handle.is_started());
        assert_eq!(registry.get(&"w1".into()).unwrap().state(), WindowState::Started);
    }

    #[test]
    fn list_started_is_evaluated_at_call_time() {
        let registry = WindowRegistry::new();
        let a = registry.create("a").unwrap();
        let b = registry.create("b").unwrap();
        let c = registry.create("c").unwrap();
        registry.start(&a).unwrap();
        assert_eq!(started_ids(&registry), vec!["a"]);

        registry.start(&b).unwrap();
        registry.start(&c).unwrap();
        registry.close(&a);
        assert_eq!(started_ids(&registry), vec!["b", "c"]);
        assert_eq!(registry.len(), 2);
    }
}
