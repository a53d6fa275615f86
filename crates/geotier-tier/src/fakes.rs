//! In-memory cluster used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use geotier_cluster::{
    ClusterCommand, ClusterControl, ClusterError, ClusterResult, CommandOutput, StorageContent,
};
use geotier_state::{KvStore, RedbKv, StateError, StateResult};

#[derive(Default)]
struct State {
    commands: Vec<ClusterCommand>,
    failing: HashMap<String, i32>,
    objects: HashMap<String, usize>,
    flushed: Vec<String>,
    flush_fails: bool,
}

/// Records every command; steps can be made to fail until cleared.
/// Flushing evicts all objects of the pool.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    hold: Mutex<bool>,
    released: Condvar,
}

impl FakeCluster {
    pub fn fail_step(&self, step: &str, status: i32) {
        self.state.lock().unwrap().failing.insert(step.to_string(), status);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    pub fn fail_flush(&self) {
        self.state.lock().unwrap().flush_fails = true;
    }

    pub fn put_objects(&self, pool: &str, count: usize) {
        self.state.lock().unwrap().objects.insert(pool.to_string(), count);
    }

    pub fn object_count(&self, pool: &str) -> usize {
        self.state.lock().unwrap().objects.get(pool).copied().unwrap_or(0)
    }

    pub fn commands(&self) -> Vec<ClusterCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn steps(&self) -> Vec<String> {
        self.commands().iter().map(ClusterCommand::step).collect()
    }

    pub fn flushed(&self) -> Vec<String> {
        self.state.lock().unwrap().flushed.clone()
    }

    /// Make flushes block until `release_flush`.
    pub fn hold_flush(&self) {
        *self.hold.lock().unwrap() = true;
    }

    pub fn release_flush(&self) {
        *self.hold.lock().unwrap() = false;
        self.released.notify_all();
    }
}

impl ClusterControl for FakeCluster {
    fn execute(&self, command: &ClusterCommand) -> ClusterResult<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.clone());
        Ok(match state.failing.get(&command.step()) {
            Some(&status) => CommandOutput::failed(status, "injected failure"),
            None => CommandOutput::ok(),
        })
    }
}

impl StorageContent for FakeCluster {
    fn list_objects(&self, pool: &str) -> ClusterResult<Vec<String>> {
        let count = self.object_count(pool);
        Ok((0..count).map(|i| format!("obj{i}")).collect())
    }

    fn flush_evict_all(&self, pool: &str) -> ClusterResult<()> {
        let mut held = self.hold.lock().unwrap();
        while *held {
            held = self.released.wait(held).unwrap();
        }
        drop(held);

        let mut state = self.state.lock().unwrap();
        if state.flush_fails {
            return Err(ClusterError::CommandFailed {
                command: format!("rados -p {pool} cache-flush-evict-all"),
                status: 1,
                stderr: "injected failure".to_string(),
            });
        }
        state.objects.remove(pool);
        state.flushed.push(pool.to_string());
        Ok(())
    }
}

/// In-memory kv store whose writes can be made to fail.
pub struct FlakyKv {
    inner: RedbKv,
    fail_writes: AtomicBool,
}

impl FlakyKv {
    pub fn new() -> Self {
        Self {
            inner: RedbKv::open_in_memory().unwrap(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KvStore for FlakyKv {
    fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StateResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StateError::Write("injected failure".to_string()));
        }
        self.inner.put(key, value)
    }
}

/// Poll `cond` until it holds. Panics after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}
