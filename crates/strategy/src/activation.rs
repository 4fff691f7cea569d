use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

/// Which strategies may currently emit intents.
///
/// Built once at startup and handed to the strategy pool; clones share state
/// so an operator-facing surface can flip flags at runtime. Unknown names
/// are inactive.
#[derive(Clone, Default)]
pub struct ActivationRegistry {
    flags: Arc<RwLock<HashMap<String, bool>>>,
}

impl ActivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, name: &str) {
        self.set(name, true);
    }

    pub fn deactivate(&self, name: &str) {
        self.set(name, false);
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.flags
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
            .unwrap_or(false)
    }

    /// Registered names with their flag, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        let flags = self.flags.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = flags.iter().map(|(k, v)| (k.clone(), *v)).collect();
        all.sort();
        all
    }

    fn set(&self, name: &str, active: bool) {
        let previous = self
            .flags
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), active);
        if previous != Some(active) {
            info!(strategy = name, active, "Strategy activation changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_shared_between_clones() {
        let registry = ActivationRegistry::new();
        let handle = registry.clone();
        assert!(!registry.is_active("s1"));

        handle.activate("s1");
        assert!(registry.is_active("s1"));
        registry.deactivate("s1");
        assert!(!handle.is_active("s1"));
        assert_eq!(handle.snapshot(), vec![("s1".to_string(), false)]);
    }
}
