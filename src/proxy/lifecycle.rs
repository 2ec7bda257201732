use crate::error::{GridError, GridResult};

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProxyState {
    Open = 0,
    Closed = 1,
    Destroyed = 2,
}

impl ProxyState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ProxyState::Open,
            1 => ProxyState::Closed,
            _ => ProxyState::Destroyed,
        }
    }
}

/// `OPEN -> CLOSED -> DESTROYED`, plus `CLOSED -> OPEN` until destroyed.
///
/// Every transition is a compare-and-set, so of several concurrent callers
/// exactly one wins and runs the side effects.
#[derive(Debug)]
pub struct ProxyLifecycle {
    name: String,
    state: AtomicU8,
}

impl ProxyLifecycle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: AtomicU8::new(ProxyState::Open as u8),
        }
    }

    pub fn state(&self) -> ProxyState {
        ProxyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ProxyState, to: ProxyState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `true` for the one caller that moved the proxy from open to closed.
    pub fn try_close(&self) -> bool {
        self.transition(ProxyState::Open, ProxyState::Closed)
    }

    /// `true` for the one caller that moved the proxy from closed to destroyed.
    pub fn try_destroy(&self) -> bool {
        self.transition(ProxyState::Closed, ProxyState::Destroyed)
    }

    /// Reopens a closed proxy. `Ok(false)` if it was already open.
    pub fn open(&self) -> GridResult<bool> {
        loop {
            match self.state() {
                ProxyState::Open => return Ok(false),
                ProxyState::Destroyed => {
                    return Err(GridError::lifecycle(&self.name, "cannot open a destroyed proxy"));
                }
                ProxyState::Closed => {
                    if self.transition(ProxyState::Closed, ProxyState::Open) {
                        return Ok(true);
                    }
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() != ProxyState::Open
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == ProxyState::Destroyed
    }

    /// Guard for every data-access call.
    pub fn ensure_open(&self) -> GridResult<()> {
        match self.state() {
            ProxyState::Open => Ok(()),
            ProxyState::Closed => Err(GridError::lifecycle(&self.name, "proxy is closed")),
            ProxyState::Destroyed => Err(GridError::lifecycle(&self.name, "proxy is destroyed")),
        }
    }
}
