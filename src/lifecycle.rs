use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Supervisor states, in the only order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum State {
    Initializing = 0,
    Running = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => State::Initializing,
            1 => State::Running,
            2 => State::ShuttingDown,
            _ => State::Terminated,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Initializing => "initializing",
            State::Running => "running",
            State::ShuttingDown => "shutting_down",
            State::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Shared supervisor state machine.
///
/// Transitions only move forward. [`Lifecycle::begin_shutdown`] succeeds for
/// exactly one caller, which makes it the gate for the shutdown path.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(State::Initializing as u8),
        }
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Initializing -> Running`. Returns false if shutdown already began.
    pub fn mark_running(&self) -> bool {
        self.transition(State::Initializing, State::Running)
    }

    /// Claims the shutdown path. Only the first caller gets `true`.
    pub fn begin_shutdown(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if State::from_u8(current) >= State::ShuttingDown {
                return false;
            }
            match self.state.compare_exchange(
                current,
                State::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!(from = %State::from_u8(current), "shutdown claimed");
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Terminal; safe to call more than once.
    pub fn mark_terminated(&self) {
        self.state.store(State::Terminated as u8, Ordering::Release);
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn shutdown_is_claimed_once() {
        let lc = Lifecycle::new();
        assert!(lc.mark_running());
        assert!(lc.begin_shutdown());
        assert!(!lc.begin_shutdown());
        assert_eq!(lc.state(), State::ShuttingDown);
        lc.mark_terminated();
        lc.mark_terminated();
        assert_eq!(lc.state(), State::Terminated);
    }

    #[test]
    fn shutdown_before_running_blocks_startup() {
        let lc = Lifecycle::new();
        assert!(lc.begin_shutdown());
        assert!(!lc.mark_running());
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let lc = Arc::new(Lifecycle::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lc = lc.clone();
                std::thread::spawn(move || lc.begin_shutdown())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
