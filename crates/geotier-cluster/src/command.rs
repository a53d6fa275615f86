//! Typed administrative commands issued against the cluster.
//!
//! Each variant maps onto one monitor command: a space-separated prefix
//! plus named parameters.

use std::fmt;

/// errno for "already exists". A create step answering `-EEXIST` has
/// already been applied.
pub const EEXIST: i32 = 17;

/// How a new cache pool stores its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolType {
    Replicated { size: u32 },
    Erasure { profile: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Writeback,
    Forward,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Writeback => "writeback",
            CacheMode::Forward => "forward",
        }
    }
}

/// Pool variables set during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolVar {
    MinSize,
    HitSetType,
    TargetMaxBytes,
    TargetMaxObjects,
}

impl PoolVar {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolVar::MinSize => "min_size",
            PoolVar::HitSetType => "hit_set_type",
            PoolVar::TargetMaxBytes => "target_max_bytes",
            PoolVar::TargetMaxObjects => "target_max_objects",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCommand {
    PoolCreate {
        pool: String,
        pg_num: u32,
        pool_type: PoolType,
        rule: String,
    },
    PoolSet {
        pool: String,
        var: PoolVar,
        val: String,
    },
    TierAdd {
        pool: String,
        tierpool: String,
    },
    TierCacheMode {
        pool: String,
        mode: CacheMode,
        /// Required by the cluster when switching away from writeback.
        force: bool,
    },
    TierSetOverlay {
        pool: String,
        overlaypool: String,
    },
    TierRemoveOverlay {
        pool: String,
    },
    TierRemove {
        pool: String,
        tierpool: String,
    },
}

impl ClusterCommand {
    pub fn prefix(&self) -> &'static str {
        match self {
            ClusterCommand::PoolCreate { .. } => "osd pool create",
            ClusterCommand::PoolSet { .. } => "osd pool set",
            ClusterCommand::TierAdd { .. } => "osd tier add",
            ClusterCommand::TierCacheMode { .. } => "osd tier cache-mode",
            ClusterCommand::TierSetOverlay { .. } => "osd tier set-overlay",
            ClusterCommand::TierRemoveOverlay { .. } => "osd tier rm-overlay",
            ClusterCommand::TierRemove { .. } => "osd tier remove",
        }
    }

    /// Short step name used in logs and provisioning errors.
    pub fn step(&self) -> String {
        match self {
            ClusterCommand::PoolCreate { .. } => "pool-create".to_string(),
            ClusterCommand::PoolSet { var, .. } => format!("set-{}", var.as_str()),
            ClusterCommand::TierAdd { .. } => "tier-add".to_string(),
            ClusterCommand::TierCacheMode { mode, .. } => format!("cache-mode-{}", mode.as_str()),
            ClusterCommand::TierSetOverlay { .. } => "set-overlay".to_string(),
            ClusterCommand::TierRemoveOverlay { .. } => "rm-overlay".to_string(),
            ClusterCommand::TierRemove { .. } => "tier-remove".to_string(),
        }
    }

    /// Named parameters, in the order the monitor documents them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            ClusterCommand::PoolCreate {
                pool,
                pg_num,
                pool_type,
                rule,
            } => {
                let mut p = vec![
                    ("pool", pool.clone()),
                    ("pg_num", pg_num.to_string()),
                    ("pgp_num", pg_num.to_string()),
                ];
                match pool_type {
                    PoolType::Replicated { size } => {
                        p.push(("pool_type", "replicated".to_string()));
                        p.push(("rule", rule.clone()));
                        p.push(("size", size.to_string()));
                    }
                    PoolType::Erasure { profile } => {
                        p.push(("pool_type", "erasure".to_string()));
                        p.push(("erasure_code_profile", profile.clone()));
                        p.push(("rule", rule.clone()));
                    }
                }
                p
            }
            ClusterCommand::PoolSet { pool, var, val } => vec![
                ("pool", pool.clone()),
                ("var", var.as_str().to_string()),
                ("val", val.clone()),
            ],
            ClusterCommand::TierAdd { pool, tierpool } => {
                vec![("pool", pool.clone()), ("tierpool", tierpool.clone())]
            }
            ClusterCommand::TierCacheMode { pool, mode, force } => {
                let mut p = vec![("pool", pool.clone()), ("mode", mode.as_str().to_string())];
                if *force {
                    p.push(("yes_i_really_mean_it", "true".to_string()));
                }
                p
            }
            ClusterCommand::TierSetOverlay { pool, overlaypool } => {
                vec![("pool", pool.clone()), ("overlaypool", overlaypool.clone())]
            }
            ClusterCommand::TierRemoveOverlay { pool } => vec![("pool", pool.clone())],
            ClusterCommand::TierRemove { pool, tierpool } => {
                vec![("pool", pool.clone()), ("tierpool", tierpool.clone())]
            }
        }
    }

    /// Arguments for the `ceph` binary: prefix words followed by
    /// `--name value` pairs.
    pub fn cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.prefix().split(' ').map(String::from).collect();
        for (name, value) in self.params() {
            if name == "yes_i_really_mean_it" {
                args.push("--yes-i-really-mean-it".to_string());
                continue;
            }
            args.push(format!("--{name}"));
            args.push(value);
        }
        args
    }
}

impl fmt::Display for ClusterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())?;
        for (name, value) in self.params() {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

/// Result of one command: status code (0 or negative errno), output, error text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    pub fn already_exists(&self) -> bool {
        self.status == -EEXIST
    }
}
