use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimerId {
    TokenPoll,
    Countdown,
}

/// Named periodic timers driven by an explicit clock value.
pub trait Scheduler: Send {
    fn start(&mut self, timer: TimerId, every: Duration, now: DateTime<Utc>);
    fn stop(&mut self, timer: TimerId);
    fn is_running(&self, timer: TimerId) -> bool;

    fn reschedule(&mut self, timer: TimerId, every: Duration, now: DateTime<Utc>) {
        self.stop(timer);
        self.start(timer, every, now);
    }

    fn stop_all(&mut self) {
        self.stop(TimerId::TokenPoll);
        self.stop(TimerId::Countdown);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Registration {
    every: Duration,
    next_due: DateTime<Utc>,
}

/// Deadline table behind the `Scheduler` trait. Cloned handles share state so
/// a driver loop can ask for due timers while the monitor owns another handle.
#[derive(Clone, Debug, Default)]
pub struct TimerTable {
    timers: Arc<Mutex<BTreeMap<TimerId, Registration>>>,
}

impl TimerTable {
    /// Timers whose deadline is at or before `now`, in deadline order. Each
    /// fired timer is re-armed one period after its previous deadline; a timer
    /// that fell several periods behind fires once.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TimerId> {
        self.with_timers(|timers| {
            let mut fired: Vec<(DateTime<Utc>, TimerId)> = timers
                .iter()
                .filter(|(_, registration)| registration.next_due <= now)
                .map(|(timer, registration)| (registration.next_due, *timer))
                .collect();
            fired.sort();

            for (_, timer) in &fired {
                if let Some(registration) = timers.get_mut(timer) {
                    let mut next_due = registration.next_due + registration.every;
                    if next_due <= now {
                        next_due = now + registration.every;
                    }
                    registration.next_due = next_due;
                }
            }

            fired.into_iter().map(|(_, timer)| timer).collect()
        })
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.with_timers(|timers| timers.values().map(|registration| registration.next_due).min())
    }

    pub fn active(&self) -> Vec<TimerId> {
        self.with_timers(|timers| timers.keys().copied().collect())
    }

    fn with_timers<T>(&self, apply: impl FnOnce(&mut BTreeMap<TimerId, Registration>) -> T) -> T {
        match self.timers.lock() {
            Ok(mut timers) => apply(&mut timers),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

impl Scheduler for TimerTable {
    fn start(&mut self, timer: TimerId, every: Duration, now: DateTime<Utc>) {
        self.with_timers(|timers| {
            timers.insert(timer, Registration { every, next_due: now + every });
        });
    }

    fn stop(&mut self, timer: TimerId) {
        self.with_timers(|timers| {
            timers.remove(&timer);
        });
    }

    fn is_running(&self, timer: TimerId) -> bool {
        self.with_timers(|timers| timers.contains_key(&timer))
    }
}
