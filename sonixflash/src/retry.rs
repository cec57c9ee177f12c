//! Bounded retry with a fixed delay between attempts.
//!
//! Every transport call made by the ISP engine goes through a
//! [`RetryPolicy`]. Transient failures (see [`Error::is_transient`]) are
//! retried after `delay`; any other failure aborts immediately.

use crate::error::{Error, Result};
use log::warn;
use std::thread;
use std::time::Duration;

/// Maximum number of attempts for every ISP transport call.
pub const MAX_ATTEMPTS: u32 = 5;

/// Retry parameters for one class of call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Feature report reads.
    pub const READ: Self = Self::new(MAX_ATTEMPTS, Duration::from_millis(100));

    /// Feature report writes.
    pub const WRITE: Self = Self::new(MAX_ATTEMPTS, Duration::from_secs(1));

    /// Bootloader initialization, which may follow a device reboot.
    pub const INIT: Self = Self::new(MAX_ATTEMPTS, Duration::from_secs(3));

    /// Opening the device by VID/PID.
    pub const OPEN: Self = Self::new(MAX_ATTEMPTS, Duration::from_secs(3));

    /// Create a policy.
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same attempt count without any delay.
    #[must_use]
    pub const fn immediate(self) -> Self {
        Self::new(self.max_attempts, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// `retries` is incremented once per repeated attempt.
    pub fn run<T, F>(&self, operation: &str, retries: &mut u32, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        self.run_while(operation, retries, Error::is_transient, op)
    }

    /// Like [`run`](Self::run), with `should_retry` deciding which failures
    /// are worth another attempt.
    pub fn run_while<T, F, R>(
        &self,
        operation: &str,
        retries: &mut u32,
        should_retry: R,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        R: Fn(&Error) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if !should_retry(&e) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(Error::DeviceUnresponsive {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                },
                Err(e) => {
                    warn!(
                        "{operation} failed (attempt {attempt}/{max_attempts}): {e}, retrying in {:?}",
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                    *retries += 1;
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::WRITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> Error {
        Error::DeviceBusy("pipe error".into())
    }

    #[test]
    fn test_first_attempt_success() {
        let mut retries = 0;
        let value = RetryPolicy::READ
            .immediate()
            .run("read", &mut retries, || Ok(7))
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(retries, 0);
    }

    #[test]
    fn test_transient_then_success() {
        let mut retries = 0;
        let mut calls = 0;
        let value = RetryPolicy::WRITE
            .immediate()
            .run("write", &mut retries, || {
                calls += 1;
                if calls < 3 { Err(busy()) } else { Ok(calls) }
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(retries, 2);
    }

    #[test]
    fn test_terminal_error_aborts_immediately() {
        let mut retries = 0;
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::INIT.immediate().run("init", &mut retries, || {
            calls += 1;
            Err(Error::ProtocolMismatch {
                what: "response status",
                expected: 0xFAFA_FAFA,
                actual: 0,
            })
        });
        assert!(matches!(result, Err(Error::ProtocolMismatch { .. })));
        assert_eq!(calls, 1);
        assert_eq!(retries, 0);
    }

    #[test]
    fn test_exhausted_attempts() {
        let mut retries = 0;
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::READ.immediate().run("read", &mut retries, || {
            calls += 1;
            Err(Error::ShortReport {
                expected: 64,
                actual: 3,
            })
        });
        match result {
            Err(Error::DeviceUnresponsive {
                attempts, last, ..
            }) => {
                assert_eq!(attempts, MAX_ATTEMPTS);
                assert!(matches!(*last, Error::ShortReport { .. }));
            },
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, MAX_ATTEMPTS);
        assert_eq!(retries, MAX_ATTEMPTS - 1);
    }

    #[test]
    fn test_custom_retry_predicate() {
        let not_found = || Error::DeviceNotFound {
            vid: 0x0C45,
            pid: 0x7040,
        };

        let mut retries = 0;
        let mut calls = 0;
        let value = RetryPolicy::OPEN
            .immediate()
            .run_while(
                "open",
                &mut retries,
                |e| matches!(e, Error::DeviceNotFound { .. }),
                || {
                    calls += 1;
                    if calls < 3 { Err(not_found()) } else { Ok(calls) }
                },
            )
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(retries, 2);

        // Transient errors are terminal under a predicate that excludes them.
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::OPEN.immediate().run_while(
            "open",
            &mut retries,
            |e| matches!(e, Error::DeviceNotFound { .. }),
            || {
                calls += 1;
                Err(busy())
            },
        );
        assert!(matches!(result, Err(Error::DeviceBusy(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_custom_predicate_exhausted() {
        let mut retries = 0;
        let result: Result<()> = RetryPolicy::OPEN.immediate().run_while(
            "open",
            &mut retries,
            |e| matches!(e, Error::DeviceNotFound { .. }),
            || {
                Err(Error::DeviceNotFound {
                    vid: 0x0C45,
                    pid: 0x7040,
                })
            },
        );
        match result {
            Err(Error::DeviceUnresponsive {
                attempts, last, ..
            }) => {
                assert_eq!(attempts, MAX_ATTEMPTS);
                assert!(matches!(*last, Error::DeviceNotFound { .. }));
            },
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_policy_delays() {
        assert_eq!(RetryPolicy::READ.delay, Duration::from_millis(100));
        assert_eq!(RetryPolicy::WRITE.delay, Duration::from_secs(1));
        assert_eq!(RetryPolicy::INIT.delay, Duration::from_secs(3));
        assert_eq!(RetryPolicy::OPEN.delay, Duration::from_secs(3));
        assert_eq!(RetryPolicy::INIT.immediate().delay, Duration::ZERO);
    }
}
