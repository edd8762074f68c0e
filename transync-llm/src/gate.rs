//! Admission control for outbound service calls.
//!
//! Two limits apply together: at most `max_in_flight` calls hold a permit at
//! once, and at most `max_per_window` permits are granted in any rolling
//! `window`. [`AdmissionGate::acquire`] blocks until both allow.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Rolling window used for the per-minute request limit.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct GateState {
    in_flight: usize,
    granted: VecDeque<Instant>,
}

#[derive(Debug)]
pub struct AdmissionGate {
    max_in_flight: usize,
    max_per_window: usize,
    window: Duration,
    state: Mutex<GateState>,
    freed: Condvar,
}

/// RAII admission; dropping it frees the in-flight slot.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.gate.freed.notify_all();
    }
}

impl AdmissionGate {
    /// Gate with `max_in_flight` concurrent calls and `per_minute` calls per
    /// rolling minute. Zero limits are raised to one.
    pub fn new(max_in_flight: usize, per_minute: usize) -> Self {
        Self::with_window(max_in_flight, per_minute, RATE_WINDOW)
    }

    pub fn with_window(max_in_flight: usize, max_per_window: usize, window: Duration) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            max_per_window: max_per_window.max(1),
            window,
            state: Mutex::new(GateState {
                in_flight: 0,
                granted: VecDeque::new(),
            }),
            freed: Condvar::new(),
        }
    }

    /// Block until a call may start.
    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.state.lock();
        loop {
            let now = Instant::now();
            self.expire(&mut state, now);

            if state.in_flight < self.max_in_flight && state.granted.len() < self.max_per_window {
                state.in_flight += 1;
                state.granted.push_back(now);
                return Permit { gate: self };
            }

            if state.in_flight >= self.max_in_flight {
                self.freed.wait(&mut state);
            } else if let Some(oldest) = state.granted.front().copied() {
                let wait = self.window.saturating_sub(now.duration_since(oldest));
                tracing::debug!(wait_ms = wait.as_millis() as u64, "rate window full");
                self.freed.wait_for(&mut state, wait);
            }
        }
    }

    /// Non-blocking variant of [`acquire`](Self::acquire).
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.expire(&mut state, now);
        if state.in_flight < self.max_in_flight && state.granted.len() < self.max_per_window {
            state.in_flight += 1;
            state.granted.push_back(now);
            Some(Permit { gate: self })
        } else {
            None
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    fn expire(&self, state: &mut GateState, now: Instant) {
        while let Some(front) = state.granted.front() {
            if now.duration_since(*front) >= self.window {
                state.granted.pop_front();
            } else {
                break;
            }
        }
    }
}
