//! Concurrency limit resolution.

use std::sync::Arc;

use reelworks_model::{ConcurrencyLimits, LimitOverride, TenantId};

use crate::store::PlanDirectory;
use crate::Result;

/// Resolves `{per_tenant, global}` limits for one tenant. Pure and
/// side-effect free: subscription-plan override first, then the
/// system-wide configuration, then the hard default `{2, 10}`. Each
/// field falls through independently.
#[derive(Clone)]
pub struct ConcurrencyPolicyResolver {
    plans: Arc<dyn PlanDirectory>,
    system: LimitOverride,
}

impl std::fmt::Debug for ConcurrencyPolicyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyPolicyResolver")
            .field("system", &self.system)
            .finish_non_exhaustive()
    }
}

impl ConcurrencyPolicyResolver {
    pub fn new(plans: Arc<dyn PlanDirectory>, system: LimitOverride) -> Self {
        Self { plans, system }
    }

    pub async fn limits_for(
        &self,
        tenant: TenantId,
    ) -> Result<ConcurrencyLimits> {
        let plan = self
            .plans
            .concurrency_override(tenant)
            .await?
            .unwrap_or_default();

        Ok(ConcurrencyLimits {
            per_tenant: plan
                .per_tenant
                .or(self.system.per_tenant)
                .unwrap_or(ConcurrencyLimits::HARD_DEFAULT.per_tenant),
            global: plan
                .global
                .or(self.system.global)
                .unwrap_or(ConcurrencyLimits::HARD_DEFAULT.global),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::StaticPlanDirectory;

    #[tokio::test]
    async fn falls_back_to_hard_default() {
        let resolver = ConcurrencyPolicyResolver::new(
            Arc::new(StaticPlanDirectory::new()),
            LimitOverride::default(),
        );
        let limits = resolver.limits_for(TenantId::new()).await.unwrap();
        assert_eq!(limits, ConcurrencyLimits { per_tenant: 2, global: 10 });
    }

    #[tokio::test]
    async fn system_config_overrides_default() {
        let resolver = ConcurrencyPolicyResolver::new(
            Arc::new(StaticPlanDirectory::new()),
            LimitOverride {
                per_tenant: Some(4),
                global: None,
            },
        );
        let limits = resolver.limits_for(TenantId::new()).await.unwrap();
        assert_eq!(limits.per_tenant, 4);
        assert_eq!(limits.global, 10);
    }

    #[tokio::test]
    async fn plan_override_wins_over_system_config() {
        let plans = StaticPlanDirectory::new();
        let tenant = TenantId::new();
        plans
            .set_override(
                tenant,
                LimitOverride {
                    per_tenant: Some(8),
                    global: None,
                },
            )
            .await;

        let resolver = ConcurrencyPolicyResolver::new(
            Arc::new(plans),
            LimitOverride {
                per_tenant: Some(4),
                global: Some(20),
            },
        );

        let limits = resolver.limits_for(tenant).await.unwrap();
        assert_eq!(limits.per_tenant, 8);
        assert_eq!(limits.global, 20);

        // Other tenants still see the system layer.
        let other = resolver.limits_for(TenantId::new()).await.unwrap();
        assert_eq!(other.per_tenant, 4);
    }
}
