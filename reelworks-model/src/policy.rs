//! Concurrency limit types.

use serde::{Deserialize, Serialize};

/// Resolved concurrency caps for one admission decision. Derived per
/// request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    /// Maximum active jobs (and running videos at dequeue time) for one
    /// tenant.
    pub per_tenant: u32,

    /// Maximum active jobs across all tenants.
    pub global: u32,
}

impl ConcurrencyLimits {
    /// Hard defaults applied when neither the tenant's plan nor the
    /// system configuration says otherwise.
    pub const HARD_DEFAULT: ConcurrencyLimits = ConcurrencyLimits {
        per_tenant: 2,
        global: 10,
    };
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self::HARD_DEFAULT
    }
}

/// Partial limit override supplied by a tenant's subscription plan.
/// `None` fields fall through to the next resolution layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverride {
    pub per_tenant: Option<u32>,
    pub global: Option<u32>,
}
