//! Workout and rest timer state plus the arithmetic over it.
//!
//! Timers are not self-driving: every computation takes the caller's `now`,
//! which keeps them deterministic under test. Durations are stored as whole
//! milliseconds so snapshots stay plain JSON numbers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Running/paused stopwatch for the whole workout
///
/// Total elapsed time is `elapsed_ms` plus the current running interval.
/// `start_time` is set exactly when the timer is running.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkoutTimer {
    pub start_time: Option<DateTime<Utc>>,
    /// Accumulated time excluding the current running interval
    pub elapsed_ms: i64,
    pub is_running: bool,
}

impl WorkoutTimer {
    /// A timer started at `now` with nothing accumulated
    pub fn started_at(now: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(now),
            elapsed_ms: 0,
            is_running: true,
        }
    }

    /// Fold the running interval into the accumulator and stop
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => {
                self.elapsed_ms = accumulate(self.elapsed_ms, start, now);
                self.start_time = None;
                self.is_running = false;
                true
            }
            _ => false,
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_running {
            return false;
        }
        self.start_time = Some(now);
        self.is_running = true;
        true
    }

    /// Advance the accumulator to `now` and restart the interval there
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => {
                self.elapsed_ms = accumulate(self.elapsed_ms, start, now);
                self.start_time = Some(now);
                true
            }
            _ => false,
        }
    }
}

/// Countdown between sets
///
/// `start_time` is set exactly when the rest period is active.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RestTimer {
    pub start_time: Option<DateTime<Utc>>,
    /// Target rest length
    pub duration_ms: i64,
    pub is_active: bool,
}

impl RestTimer {
    pub fn start(&mut self, seconds: u32, now: DateTime<Utc>) {
        self.start_time = Some(now);
        self.duration_ms = i64::from(seconds) * 1000;
        self.is_active = true;
    }

    pub fn stop(&mut self) {
        *self = RestTimer::default();
    }

    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.duration_ms.max(0))
    }

    /// Active with no time left
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active && remaining_rest(self, now) == Duration::zero()
    }
}

/// Length of `[start, now]`, never negative
fn interval(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - start).max(Duration::zero())
}

/// `elapsed_ms` plus `[start, now]`, saturating at `i64::MAX` milliseconds
fn accumulate(elapsed_ms: i64, start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    elapsed_ms
        .max(0)
        .saturating_add(interval(start, now).num_milliseconds())
}

/// Total workout time at `now`
pub fn elapsed(timer: &WorkoutTimer, now: DateTime<Utc>) -> Duration {
    let total_ms = match (timer.is_running, timer.start_time) {
        (true, Some(start)) => accumulate(timer.elapsed_ms, start, now),
        _ => timer.elapsed_ms.max(0),
    };
    Duration::milliseconds(total_ms)
}

/// Rest time left at `now`, clamped to zero; zero when no rest is active
pub fn remaining_rest(rest: &RestTimer, now: DateTime<Utc>) -> Duration {
    match (rest.is_active, rest.start_time) {
        (true, Some(start)) => {
            let left = rest
                .duration_ms
                .max(0)
                .saturating_sub(interval(start, now).num_milliseconds());
            Duration::milliseconds(left.max(0))
        }
        _ => Duration::zero(),
    }
}

/// Render as `H:MM:SS`, or `M:SS` under one hour
///
/// Fractions of a second are truncated; negative durations render as `0:00`.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
