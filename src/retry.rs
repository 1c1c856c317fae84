use crate::store::StoreError;

use log::{error, warn};
use std::thread;
use std::time::Duration;

/// Bounded retry with a fixed pause between attempts. Only transient store
/// errors are retried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_transient() => {
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, attempts, err, self.backoff
                    );
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
                Err(err) => {
                    error!("{} failed after {} attempt(s): {}", label, attempt, err);
                    return Err(err);
                }
            }
        }
    }
}
