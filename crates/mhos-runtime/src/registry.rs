//! In-memory table of supervised processes.
//!
//! Pure bookkeeping: no disk or network I/O. The registry is constructed and
//! injected by the composition root so independent supervisors (and tests)
//! never share state.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use mhos_core::{ProcessHandle, ProcessStatus};
use tracing::debug;

/// Named process table. At most one handle per name.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: RwLock<HashMap<String, ProcessHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pid` under `name`, replacing any previous handle.
    pub fn register(&self, name: &str, pid: u32) -> ProcessHandle {
        self.register_handle(ProcessHandle::new(name, pid))
    }

    /// Insert a prepared handle, replacing any previous handle for its name.
    pub fn register_handle(&self, handle: ProcessHandle) -> ProcessHandle {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = entries.insert(handle.name.clone(), handle.clone()) {
            debug!(name = %handle.name, old_pid = %previous.pid, new_pid = %handle.pid, "Replaced registry entry");
        }
        handle
    }

    /// Remove whatever is registered under `name`.
    pub fn unregister(&self, name: &str) -> Option<ProcessHandle> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Remove the entry for `name` only if it still refers to `pid`.
    ///
    /// Exit handlers use this so that a late exit of an old pid never removes
    /// a newer process registered under the same name.
    pub fn unregister_pid(&self, name: &str, pid: u32) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(name) {
            Some(handle) if handle.pid == pid => {
                entries.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Update the status of `name` if it still refers to `pid`.
    pub fn set_status(&self, name: &str, pid: u32, status: ProcessStatus) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(name) {
            Some(handle) if handle.pid == pid => {
                handle.status = status;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<ProcessHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshot of all handles, sorted by name.
    pub fn list(&self) -> Vec<ProcessHandle> {
        let mut handles: Vec<ProcessHandle> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        handles
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_register_replaces_first() {
        let registry = ProcessRegistry::new();
        registry.register("agentA", 111);
        registry.register("agentA", 222);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("agentA").map(|h| h.pid), Some(222));
    }

    #[test]
    fn unregister_pid_ignores_newer_process() {
        let registry = ProcessRegistry::new();
        registry.register("agentA", 111);
        registry.register("agentA", 222);

        // Late exit of the first pid must not drop the second one.
        assert!(!registry.unregister_pid("agentA", 111));
        assert_eq!(registry.get("agentA").map(|h| h.pid), Some(222));

        assert!(registry.unregister_pid("agentA", 222));
        assert!(registry.get("agentA").is_none());
    }

    #[test]
    fn set_status_requires_matching_pid() {
        let registry = ProcessRegistry::new();
        registry.register("whisper", 10);

        assert!(!registry.set_status("whisper", 11, ProcessStatus::Failed));
        assert!(registry.set_status("whisper", 10, ProcessStatus::Running));
        assert_eq!(
            registry.get("whisper").map(|h| h.status),
            Some(ProcessStatus::Running)
        );
    }

    #[test]
    fn list_is_sorted_snapshot() {
        let registry = ProcessRegistry::new();
        registry.register("organizer", 3);
        registry.register("curiosity", 2);
        registry.register("reflector", 1);

        let names: Vec<String> = registry.list().into_iter().map(|h| h.name).collect();
        assert_eq!(names, ["curiosity", "organizer", "reflector"]);
    }

    #[test]
    fn concurrent_registration_of_distinct_names() {
        let registry = Arc::new(ProcessRegistry::new());
        let threads: Vec<_> = (0..8u32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for round in 0..50u32 {
                        registry.register(&format!("agent-{i}"), i * 1000 + round);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.len(), 8);
        assert_eq!(registry.get("agent-3").map(|h| h.pid), Some(3049));
    }

    #[test]
    fn unregister_missing_name_is_harmless() {
        let registry = ProcessRegistry::new();
        assert!(registry.unregister("ghost").is_none());
        assert!(registry.is_empty());
    }
}
