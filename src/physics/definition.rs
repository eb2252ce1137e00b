//! Shared identity and shape of reusable force/constraint definitions

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide identity of a compiled definition
///
/// Sessions group registrations by this id, so every instance of the same
/// definition shares one compiled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

impl DefinitionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Common surface of anything that can be registered against a session
pub trait Definition: Send + Sync {
    fn id(&self) -> DefinitionId;

    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Number of DOF indices each registration must supply
    fn num_components(&self) -> usize;

    /// Number of parameters each registration must supply
    fn num_parameters(&self) -> usize;
}
