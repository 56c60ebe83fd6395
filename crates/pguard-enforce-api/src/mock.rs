//! Mock enforcement point for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{EnforcementError, EnforcementPoint, EnforcementResult};

/// Prefix of every blocked-domain line in a hosts-style blocklist
const BLOCK_LINE_PREFIX: &str = "0.0.0.0 ";

/// In-memory enforcement point that records everything it is sent
pub struct MockEnforcer {
    writes: Arc<Mutex<Vec<String>>>,
    reloads: AtomicUsize,

    /// Configure writes to fail
    pub fail_write: Arc<Mutex<bool>>,

    /// Configure reloads to fail
    pub fail_reload: Arc<Mutex<bool>>,

    /// Delay before a write completes (simulates a hung privileged helper)
    pub write_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockEnforcer {
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            reloads: AtomicUsize::new(0),
            fail_write: Arc::new(Mutex::new(false)),
            fail_reload: Arc::new(Mutex::new(false)),
            write_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Every blocklist successfully written, oldest first
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn last_write(&self) -> Option<String> {
        self.writes.lock().unwrap().last().cloned()
    }

    /// Domains listed in the most recent write, in file order
    pub fn last_blocked_domains(&self) -> Vec<String> {
        self.last_write()
            .map(|contents| {
                contents
                    .lines()
                    .filter_map(|line| line.strip_prefix(BLOCK_LINE_PREFIX))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_fail_write(&self, fail: bool) {
        *self.fail_write.lock().unwrap() = fail;
    }

    pub fn set_fail_reload(&self, fail: bool) {
        *self.fail_reload.lock().unwrap() = fail;
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().unwrap() = delay;
    }
}

impl Default for MockEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnforcementPoint for MockEnforcer {
    async fn write_blocklist(&self, contents: &str) -> EnforcementResult<()> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_write.lock().unwrap() {
            return Err(EnforcementError::WriteFailed("Mock write failure".into()));
        }

        self.writes.lock().unwrap().push(contents.to_string());
        Ok(())
    }

    async fn reload(&self) -> EnforcementResult<()> {
        if *self.fail_reload.lock().unwrap() {
            return Err(EnforcementError::ReloadFailed("Mock reload failure".into()));
        }

        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
