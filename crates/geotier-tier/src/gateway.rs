//! Turns create/remove decisions into ordered cluster commands.
//!
//! Both sequences stop at the first failing step and never roll back.
//! A retried create sees `-EEXIST` from steps that already landed and
//! treats them as applied.

use std::sync::Arc;

use geotier_cluster::{
    CacheMode, ClusterCommand, ClusterControl, PoolType, PoolVar, StorageContent,
};
use geotier_core::config::TierConfig;
use geotier_state::CacheTierRecord;
use tracing::{debug, info};

use crate::error::{TierError, TierResult};

/// What a removal attempt found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Overlay and tier association removed.
    Removed,
    /// The cache pool still holds objects; nothing was changed.
    NotEmpty { objects: usize },
}

#[derive(Clone)]
pub struct ProvisioningGateway {
    control: Arc<dyn ClusterControl>,
    storage: Arc<dyn StorageContent>,
    tier: TierConfig,
}

impl ProvisioningGateway {
    pub fn new(
        control: Arc<dyn ClusterControl>,
        storage: Arc<dyn StorageContent>,
        tier: TierConfig,
    ) -> Self {
        Self {
            control,
            storage,
            tier,
        }
    }

    /// The ordered create sequence for one record.
    pub fn create_sequence(&self, record: &CacheTierRecord) -> TierResult<Vec<ClusterCommand>> {
        let cache = &record.cache_pool;
        let target_max_bytes = self.tier.target_max_bytes().ok_or_else(|| {
            provisioning_error(
                cache,
                &format!("set-{}", PoolVar::TargetMaxBytes.as_str()),
                format!(
                    "cache size of {} MB overflows target_max_bytes",
                    self.tier.default_cache_size_mb
                ),
            )
        })?;
        let set = |var, val: String| ClusterCommand::PoolSet {
            pool: cache.clone(),
            var,
            val,
        };
        let pool_type = match &self.tier.erasure_code_profile {
            Some(profile) => PoolType::Erasure {
                profile: profile.clone(),
            },
            None => PoolType::Replicated {
                size: self.tier.size,
            },
        };

        let mut cmds = vec![
            ClusterCommand::PoolCreate {
                pool: cache.clone(),
                pg_num: self.tier.pg_num,
                pool_type,
                rule: record.placement_rule.clone(),
            },
            set(PoolVar::MinSize, self.tier.min_size.to_string()),
            ClusterCommand::TierAdd {
                pool: record.backing_pool.clone(),
                tierpool: cache.clone(),
            },
            ClusterCommand::TierCacheMode {
                pool: cache.clone(),
                mode: CacheMode::Writeback,
                force: false,
            },
            ClusterCommand::TierSetOverlay {
                pool: record.backing_pool.clone(),
                overlaypool: cache.clone(),
            },
            set(PoolVar::HitSetType, self.tier.hit_set_type.clone()),
            set(PoolVar::TargetMaxBytes, target_max_bytes.to_string()),
        ];
        if self.tier.default_cache_objects > 0 {
            cmds.push(set(
                PoolVar::TargetMaxObjects,
                self.tier.default_cache_objects.to_string(),
            ));
        }
        Ok(cmds)
    }

    /// Run the create sequence, stopping at the first failure.
    pub fn create(&self, record: &CacheTierRecord) -> TierResult<()> {
        for cmd in self.create_sequence(record)? {
            self.run_step(&record.cache_pool, &cmd, true)?;
        }
        info!(
            cache_pool = %record.cache_pool,
            backing_pool = %record.backing_pool,
            rule = %record.placement_rule,
            "cache tier provisioned"
        );
        Ok(())
    }

    /// Verify the cache pool is empty, then detach it from the backing pool.
    pub fn remove(&self, record: &CacheTierRecord) -> TierResult<RemoveOutcome> {
        let objects = self
            .storage
            .list_objects(&record.cache_pool)
            .map_err(|e| provisioning_error(&record.cache_pool, "verify-empty", e.to_string()))?;
        if !objects.is_empty() {
            info!(
                cache_pool = %record.cache_pool,
                objects = objects.len(),
                "cache pool not empty, removal deferred"
            );
            return Ok(RemoveOutcome::NotEmpty {
                objects: objects.len(),
            });
        }

        let steps = [
            ClusterCommand::TierRemoveOverlay {
                pool: record.backing_pool.clone(),
            },
            ClusterCommand::TierRemove {
                pool: record.backing_pool.clone(),
                tierpool: record.cache_pool.clone(),
            },
        ];
        for cmd in &steps {
            self.run_step(&record.cache_pool, cmd, false)?;
        }
        info!(
            cache_pool = %record.cache_pool,
            backing_pool = %record.backing_pool,
            "cache tier removed"
        );
        Ok(RemoveOutcome::Removed)
    }

    fn run_step(&self, pool: &str, cmd: &ClusterCommand, tolerate_exists: bool) -> TierResult<()> {
        debug!(%pool, command = %cmd, "running cluster command");
        let output = self
            .control
            .execute(cmd)
            .map_err(|e| provisioning_error(pool, &cmd.step(), e.to_string()))?;
        if output.is_success() {
            return Ok(());
        }
        if tolerate_exists && output.already_exists() {
            debug!(%pool, step = %cmd.step(), "step already applied");
            return Ok(());
        }
        Err(provisioning_error(
            pool,
            &cmd.step(),
            format!("status {}: {}", output.status, output.stderr),
        ))
    }
}

fn provisioning_error(pool: &str, step: &str, detail: String) -> TierError {
    TierError::Provisioning {
        pool: pool.to_string(),
        step: step.to_string(),
        detail,
    }
}
