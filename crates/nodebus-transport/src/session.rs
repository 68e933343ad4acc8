//! Shared bus session with scoped exclusive access

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::port::BusPort;

/// Default pause between discovery probes, measured from the last bus access
pub const DEFAULT_SETTLE_MS: u64 = 75;

/// Bus session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Minimum quiet time after the last access before the next probe
    pub settle: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }
}

struct BusState<P> {
    port: P,
    opened_at: Instant,
    last_access: Option<Instant>,
}

/// Handle to the single physical bus shared by every node.
///
/// Cloning is cheap; all clones serialize on the same lock. The port is only
/// reachable through [`SharedBus::with_bus`], which releases the lock on every
/// exit path.
pub struct SharedBus<P> {
    state: Arc<Mutex<BusState<P>>>,
    config: BusConfig,
}

impl<P> Clone for SharedBus<P> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: self.config,
        }
    }
}

impl<P: BusPort> SharedBus<P> {
    pub fn new(port: P, config: BusConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                port,
                opened_at: Instant::now(),
                last_access: None,
            })),
            config,
        }
    }

    pub fn config(&self) -> BusConfig {
        self.config
    }

    /// Run `f` with exclusive ownership of the port.
    ///
    /// The closure's return value (including any `Err`) is passed through.
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state.port);
        state.last_access = Some(Instant::now());
        result
    }

    /// Re-establish the port's connection after a fault
    pub fn reset_session(&self) {
        let mut state = self.state.lock();
        state.port.reset_session();
        state.last_access = Some(Instant::now());
        trace!("Bus session reset");
    }

    /// Seconds between session open and the last bus access
    pub fn timestamp(&self) -> f64 {
        let state = self.state.lock();
        state
            .last_access
            .map(|t| t.duration_since(state.opened_at).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Sleep for whatever remains of the settle time since the last access
    pub fn inter_probe_delay(&self) {
        let remaining = {
            let state = self.state.lock();
            match state.last_access {
                Some(last) => self.config.settle.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            }
        };
        if !remaining.is_zero() {
            trace!(remaining_ms = remaining.as_millis() as u64, "Settling bus");
            std::thread::sleep(remaining);
        }
    }
}
