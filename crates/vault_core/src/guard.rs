//! Single in-flight operation guard
//!
//! Every public vault operation holds an [`InFlight`] token for its whole
//! body. The token clears the flag when dropped, so the guard is released on
//! every exit path including early `?` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{VaultError, VaultResult};

/// Shared in-flight flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct ReentrancyGuard {
    in_flight: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag, or fail with `Reentrancy` if an operation is running
    pub fn enter(&self) -> VaultResult<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VaultError::Reentrancy)?;
        Ok(InFlight {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_entered(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Held for the duration of one operation
#[derive(Debug)]
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct InFlight {
    in_flight: Arc<AtomicBool>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
