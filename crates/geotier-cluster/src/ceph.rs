//! Cluster collaborators backed by the `ceph` and `rados` command-line tools.

use std::path::PathBuf;
use std::process::{Command, Output};

use geotier_core::config::ClusterConfig;
use tracing::{debug, warn};

use crate::command::{ClusterCommand, CommandOutput};
use crate::error::{ClusterError, ClusterResult};
use crate::traits::{ClusterControl, ClusterTopology, StorageContent};

/// Runs `ceph` for monitor commands and `rados` for object operations.
#[derive(Debug, Clone)]
pub struct CephCli {
    ceph_bin: String,
    rados_bin: String,
    conf: Option<PathBuf>,
    user: Option<String>,
}

impl CephCli {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            ceph_bin: config.ceph_bin.clone(),
            rados_bin: config.rados_bin.clone(),
            conf: config.conf.clone(),
            user: config.user.clone(),
        }
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(conf) = &self.conf {
            cmd.arg("--conf").arg(conf);
        }
        if let Some(user) = &self.user {
            cmd.arg("--id").arg(user);
        }
        cmd
    }

    fn run(&self, program: &str, args: &[String]) -> ClusterResult<Output> {
        let mut cmd = self.command(program);
        cmd.args(args);
        debug!("Running: {:?}", cmd);
        cmd.output().map_err(|source| ClusterError::Spawn {
            program: program.to_string(),
            source,
        })
    }

    /// Run a command that must succeed and return its stdout.
    fn run_checked(&self, program: &str, args: &[String]) -> ClusterResult<String> {
        let output = self.run(program, args)?;
        if !output.status.success() {
            return Err(ClusterError::CommandFailed {
                command: format!("{program} {}", args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn json_names(&self, args: &[&str]) -> ClusterResult<Vec<String>> {
        let mut args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        args.extend(["--format".to_string(), "json".to_string()]);
        let stdout = self.run_checked(&self.ceph_bin, &args)?;
        serde_json::from_str(&stdout).map_err(|e| ClusterError::Parse {
            command: format!("{} {}", self.ceph_bin, args.join(" ")),
            detail: e.to_string(),
        })
    }
}

impl ClusterControl for CephCli {
    fn execute(&self, command: &ClusterCommand) -> ClusterResult<CommandOutput> {
        let output = self.run(&self.ceph_bin, &command.cli_args())?;
        // The CLI exits with the positive errno; report it the way the
        // monitor does.
        let status = match output.status.code() {
            Some(0) => 0,
            Some(code) => -code.abs(),
            None => -1,
        };
        let result = CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        if !result.is_success() {
            warn!(%command, status, stderr = %result.stderr, "cluster command failed");
        }
        Ok(result)
    }
}

impl ClusterTopology for CephCli {
    fn pools(&self) -> ClusterResult<Vec<String>> {
        self.json_names(&["osd", "pool", "ls"])
    }

    fn placement_rules(&self) -> ClusterResult<Vec<String>> {
        self.json_names(&["osd", "crush", "rule", "ls"])
    }
}

impl StorageContent for CephCli {
    fn list_objects(&self, pool: &str) -> ClusterResult<Vec<String>> {
        let args = ["-p".to_string(), pool.to_string(), "ls".to_string()];
        let stdout = self.run_checked(&self.rados_bin, &args)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn flush_evict_all(&self, pool: &str) -> ClusterResult<()> {
        let args = [
            "-p".to_string(),
            pool.to_string(),
            "cache-flush-evict-all".to_string(),
        ];
        self.run_checked(&self.rados_bin, &args)?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write an executable shell script and return its path.
    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn cli(ceph_bin: String, rados_bin: String) -> CephCli {
        CephCli::new(&ClusterConfig {
            ceph_bin,
            rados_bin,
            conf: None,
            user: None,
        })
    }

    #[test]
    fn execute_passes_cli_args() {
        let dir = tempfile::tempdir().unwrap();
        let ceph = script(dir.path(), "ceph", r#"echo "$@""#);
        let cli = cli(ceph, "rados".into());

        let out = cli
            .execute(&ClusterCommand::TierRemoveOverlay { pool: "rbd".into() })
            .unwrap();
        assert!(out.is_success());
        assert_eq!(out.stdout.trim(), "osd tier rm-overlay --pool rbd");
    }

    #[test]
    fn nonzero_exit_becomes_negative_errno() {
        let dir = tempfile::tempdir().unwrap();
        let ceph = script(dir.path(), "ceph", "echo 'pool exists' >&2; exit 17");
        let cli = cli(ceph, "rados".into());

        let out = cli
            .execute(&ClusterCommand::TierAdd {
                pool: "rbd".into(),
                tierpool: "rbd.cache".into(),
            })
            .unwrap();
        assert!(out.already_exists());
        assert_eq!(out.stderr, "pool exists");
    }

    #[test]
    fn pools_parse_json_listing() {
        let dir = tempfile::tempdir().unwrap();
        let ceph = script(dir.path(), "ceph", r#"echo '["rbd","cephfs_data"]'"#);
        let cli = cli(ceph, "rados".into());

        assert_eq!(cli.pools().unwrap(), vec!["rbd", "cephfs_data"]);
        assert!(cli.has_pool("rbd").unwrap());
        assert!(!cli.has_pool("nope").unwrap());
    }

    #[test]
    fn garbage_listing_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let ceph = script(dir.path(), "ceph", "echo not-json");
        let cli = cli(ceph, "rados".into());

        assert!(matches!(cli.placement_rules(), Err(ClusterError::Parse { .. })));
    }

    #[test]
    fn list_objects_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let rados = script(dir.path(), "rados", "printf 'obj1\\n\\nobj2\\n'");
        let cli = cli("ceph".into(), rados);

        assert_eq!(cli.list_objects("rbd.cache").unwrap(), vec!["obj1", "obj2"]);
    }

    #[test]
    fn failed_flush_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rados = script(dir.path(), "rados", "exit 5");
        let cli = cli("ceph".into(), rados);

        assert!(matches!(
            cli.flush_evict_all("rbd.cache"),
            Err(ClusterError::CommandFailed { status: 5, .. })
        ));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let cli = cli("/nonexistent/ceph".into(), "rados".into());
        assert!(matches!(cli.pools(), Err(ClusterError::Spawn { .. })));
    }
}
