/// Dead-man switch guarding radio liveness.
///
/// Armed with a deadline; every qualifying radio event pushes the deadline
/// out. If the deadline passes unreassured, the restart action fires once
/// and the guard stays expired. The caller supplies a monotonic millisecond
/// clock so the state machine runs the same on hardware and in tests.

use core::cell::RefCell;

use critical_section::Mutex;

/// Terminal recovery action. On hardware this resets the CPU and never
/// returns.
pub trait Restart {
    fn restart(&self);
}

/// Anything the dispatcher can reassure on radio activity
pub trait Liveness {
    fn reassure(&mut self, now_ms: u64);
}

/// Result of a deadline check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogStatus {
    Armed { remaining_ms: u64 },
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disarmed,
    Armed { deadline_ms: u64 },
    Expired,
}

#[derive(Debug)]
struct Deadline {
    timeout_ms: u64,
    state: State,
}

impl Deadline {
    const fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            state: State::Disarmed,
        }
    }

    fn arm(&mut self, now_ms: u64) {
        if self.state != State::Expired {
            self.state = State::Armed {
                deadline_ms: now_ms.saturating_add(self.timeout_ms),
            };
        }
    }

    /// Returns the status and whether this call is the one that expired it.
    fn poll(&mut self, now_ms: u64) -> (WatchdogStatus, bool) {
        match self.state {
            State::Disarmed => (
                WatchdogStatus::Armed {
                    remaining_ms: self.timeout_ms,
                },
                false,
            ),
            State::Armed { deadline_ms } if now_ms < deadline_ms => (
                WatchdogStatus::Armed {
                    remaining_ms: deadline_ms - now_ms,
                },
                false,
            ),
            State::Armed { .. } => {
                self.state = State::Expired;
                (WatchdogStatus::Expired, true)
            }
            State::Expired => (WatchdogStatus::Expired, false),
        }
    }
}

pub struct WatchdogGuard<R> {
    deadline: Deadline,
    action: R,
}

impl<R: Restart> WatchdogGuard<R> {
    /// Create a disarmed guard. Call [`arm`](Self::arm) to start the clock.
    pub const fn new(timeout_ms: u64, action: R) -> Self {
        Self {
            deadline: Deadline::new(timeout_ms),
            action,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.deadline.timeout_ms
    }

    /// Start (or restart) the countdown from `now_ms`. No effect once
    /// expired.
    pub fn arm(&mut self, now_ms: u64) {
        self.deadline.arm(now_ms);
    }

    /// Push the deadline out to `now_ms + timeout`.
    pub fn reassure(&mut self, now_ms: u64) {
        self.deadline.arm(now_ms);
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.state == State::Expired
    }

    /// Check the deadline, firing the restart action the first time it has
    /// passed. A disarmed guard reports the full timeout remaining.
    pub fn check(&mut self, now_ms: u64) -> WatchdogStatus {
        let (status, fire) = self.deadline.poll(now_ms);
        if fire {
            self.action.restart();
        }
        status
    }
}

impl<R: Restart> Liveness for WatchdogGuard<R> {
    fn reassure(&mut self, now_ms: u64) {
        WatchdogGuard::reassure(self, now_ms);
    }
}

/// A guard reachable from both the radio callback and the timer callback.
///
/// The deadline is only touched inside a critical section; the restart
/// action runs after leaving it.
pub struct SharedWatchdog<R> {
    deadline: Mutex<RefCell<Deadline>>,
    action: R,
}

impl<R: Restart> SharedWatchdog<R> {
    pub const fn new(timeout_ms: u64, action: R) -> Self {
        Self {
            deadline: Mutex::new(RefCell::new(Deadline::new(timeout_ms))),
            action,
        }
    }

    pub fn arm(&self, now_ms: u64) {
        critical_section::with(|cs| self.deadline.borrow_ref_mut(cs).arm(now_ms));
    }

    pub fn reassure(&self, now_ms: u64) {
        self.arm(now_ms);
    }

    pub fn check(&self, now_ms: u64) -> WatchdogStatus {
        let (status, fire) =
            critical_section::with(|cs| self.deadline.borrow_ref_mut(cs).poll(now_ms));
        if fire {
            self.action.restart();
        }
        status
    }
}

impl<R: Restart> Liveness for &SharedWatchdog<R> {
    fn reassure(&mut self, now_ms: u64) {
        SharedWatchdog::reassure(*self, now_ms);
    }
}
