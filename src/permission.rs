//! Capability checks consulted before every radio operation.
//!
//! The gate is never cached: callers ask it again each time, since the user
//! can revoke access at the OS level between two calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait PermissionGate: Send + Sync {
    /// Are the radio capabilities needed for scanning and connecting granted right now?
    fn has_required_capabilities(&self) -> bool;
}

impl<F> PermissionGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn has_required_capabilities(&self) -> bool {
        self()
    }
}

/// A gate whose answer can be flipped at runtime.
///
/// Desktop stacks have no permission prompt, so the binary starts with this
/// granted; clones share the same switch.
#[derive(Debug, Clone)]
pub struct CapabilitySwitch {
    granted: Arc<AtomicBool>,
}

impl CapabilitySwitch {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: Arc::new(AtomicBool::new(granted)),
        }
    }

    pub fn grant(&self) {
        self.granted.store(true, Ordering::SeqCst);
    }

    pub fn revoke(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }
}

impl Default for CapabilitySwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PermissionGate for CapabilitySwitch {
    fn has_required_capabilities(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_is_shared_between_clones() {
        let gate = CapabilitySwitch::default();
        let other = gate.clone();
        assert!(gate.has_required_capabilities());

        other.revoke();
        assert!(!gate.has_required_capabilities());

        gate.grant();
        assert!(other.has_required_capabilities());
    }

    #[test]
    fn test_closure_gate() {
        let gate = || false;
        assert!(!gate.has_required_capabilities());
    }
}
