// src/msi/retry.rs

//! Bounded retry for database commits
//!
//! A commit that hits a sharing or lock violation is retried with a fixed
//! delay; every other failure propagates on the first attempt.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of commit attempts
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;

/// Default delay between commit attempts
pub const DEFAULT_COMMIT_DELAY_MS: u64 = 100;

/// Retry policy for committing an installer database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub attempts: u32,
    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_COMMIT_ATTEMPTS,
            delay_ms: DEFAULT_COMMIT_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Same attempt count without sleeping between attempts
    pub fn immediate() -> Self {
        Self {
            delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Run `op` until it succeeds, fails with something other than a lock
/// violation, or the policy's attempts are used up
pub fn commit_with_retry<F>(policy: &RetryPolicy, mut op: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op() {
            Ok(()) => {
                if attempt > 1 {
                    debug!("Commit succeeded on attempt {}", attempt);
                }
                return Ok(());
            }
            Err(e) if e.is_lock_violation() && attempt < attempts => {
                warn!(
                    "Commit attempt {} failed: {}, retrying in {}ms...",
                    attempt, e, policy.delay_ms
                );
                if policy.delay_ms > 0 {
                    thread::sleep(policy.delay());
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wrap a lock violation raised outside of SQLite (tests, external locks)
pub fn lock_violation(message: impl Into<String>) -> Error {
    Error::LockViolation {
        code: rusqlite::ffi::SQLITE_BUSY,
        message: message.into(),
    }
}
