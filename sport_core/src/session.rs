//! The workout session state machine.
//!
//! A [`WorkoutSession`] holds at most one active workout, its timers, the
//! selected exercises and the locally tracked sets. Every transition is
//! total: references to unknown sets or out-of-range indices leave the state
//! untouched, because repeated UI events (double taps) are expected.
//!
//! States, derived from the data:
//! - Idle: no active workout
//! - Running / Paused: active workout, timer running or not
//! - Resting: orthogonal to the above, a rest countdown is active

use crate::timer::{self, RestTimer, WorkoutTimer};
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rest applied to a new set that does not specify one
pub const DEFAULT_REST_SECONDS: u32 = 60;

/// State of the single in-progress workout
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSession {
    pub active_workout: Option<Workout>,
    pub active_sets: Vec<ActiveSet>,
    pub workout_timer: WorkoutTimer,
    pub rest_timer: RestTimer,
    /// Display order, unique by exercise id
    pub selected_exercises: Vec<Exercise>,
    pub workout_notes: String,
    /// Last sequence number handed to a temp id; survives `end_workout`
    #[serde(default)]
    pub temp_id_sequence: u64,
}

impl WorkoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a workout is active
    pub fn is_workout_mode(&self) -> bool {
        self.active_workout.is_some()
    }

    // ------------------------------------------------------------------
    // Workout lifecycle
    // ------------------------------------------------------------------

    /// Begin a session for a workout the server has already created
    ///
    /// Any previous session is discarded.
    pub fn start_workout(&mut self, workout: Workout, now: DateTime<Utc>) {
        tracing::info!("Starting workout {} ({})", workout.id, workout.name);
        self.reset();
        self.active_workout = Some(workout);
        self.workout_timer = WorkoutTimer::started_at(now);
    }

    /// Discard the session, including every unsaved set
    pub fn end_workout(&mut self) {
        if let Some(workout) = &self.active_workout {
            tracing::info!(
                "Ending workout {} with {} sets ({} completed)",
                workout.id,
                self.active_sets.len(),
                self.completed_count()
            );
        }
        self.reset();
    }

    fn reset(&mut self) {
        let sequence = self.temp_id_sequence;
        *self = WorkoutSession {
            temp_id_sequence: sequence,
            ..WorkoutSession::default()
        };
    }

    pub fn pause_workout(&mut self, now: DateTime<Utc>) {
        if self.workout_timer.pause(now) {
            tracing::debug!("Workout paused at {}ms", self.workout_timer.elapsed_ms);
        } else {
            tracing::debug!("Pause ignored: timer not running");
        }
    }

    pub fn resume_workout(&mut self, now: DateTime<Utc>) {
        if self.workout_timer.resume(now) {
            tracing::debug!("Workout resumed");
        } else {
            tracing::debug!("Resume ignored: timer already running");
        }
    }

    /// Periodic tick from the caller's clock
    pub fn update_workout_timer(&mut self, now: DateTime<Utc>) {
        if self.workout_timer.tick(now) {
            tracing::debug!("Workout timer at {}ms", self.workout_timer.elapsed_ms);
        } else {
            tracing::debug!("Tick ignored: timer not running");
        }
    }

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------

    /// Append a new, uncompleted set and return its temp id
    pub fn add_set(&mut self, new_set: NewSet) -> TempId {
        // The random suffix keeps ids unique even once the counter saturates
        self.temp_id_sequence = self.temp_id_sequence.saturating_add(1);
        let temp_id = TempId::generate(self.temp_id_sequence);

        let set = ActiveSet {
            temp_id: temp_id.clone(),
            exercise_id: new_set.exercise_id,
            reps: new_set.reps,
            weight_kg: new_set.weight_kg,
            rest_seconds: Some(new_set.rest_seconds.unwrap_or(DEFAULT_REST_SECONDS)),
            notes: new_set.notes,
            set_order: self.active_sets.len() as u32 + 1,
            completed: false,
        };

        tracing::debug!(
            "Added set {} for exercise {} ({} reps)",
            temp_id,
            set.exercise_id,
            set.reps
        );
        self.active_sets.push(set);
        temp_id
    }

    /// Merge the fields present in `update` into a set
    pub fn update_set(&mut self, temp_id: &TempId, update: SetUpdate) {
        let Some(set) = self.set_mut(temp_id) else {
            tracing::debug!("Update ignored: unknown set {}", temp_id);
            return;
        };

        if let Some(exercise_id) = update.exercise_id {
            set.exercise_id = exercise_id;
        }
        if let Some(reps) = update.reps {
            set.reps = reps;
        }
        if let Some(weight_kg) = update.weight_kg {
            set.weight_kg = Some(weight_kg);
        }
        if let Some(rest_seconds) = update.rest_seconds {
            set.rest_seconds = Some(rest_seconds);
        }
        if let Some(notes) = update.notes {
            set.notes = Some(notes);
        }
    }

    pub fn remove_set(&mut self, temp_id: &TempId) {
        let before = self.active_sets.len();
        self.active_sets.retain(|set| &set.temp_id != temp_id);

        if self.active_sets.len() == before {
            tracing::debug!("Remove ignored: unknown set {}", temp_id);
            return;
        }
        self.renumber_sets();
    }

    /// Mark a set done and start its rest period
    ///
    /// Completing an already completed set restarts the rest timer.
    pub fn complete_set(&mut self, temp_id: &TempId, now: DateTime<Utc>) {
        let Some(set) = self.set_mut(temp_id) else {
            tracing::debug!("Complete ignored: unknown set {}", temp_id);
            return;
        };

        set.completed = true;
        let rest_seconds = set.rest_seconds.unwrap_or(DEFAULT_REST_SECONDS);
        tracing::debug!("Completed set {}", temp_id);

        if rest_seconds > 0 {
            self.rest_timer.start(rest_seconds, now);
        }
    }

    /// Move the set at `from_index` to `to_index`
    ///
    /// Either index out of range leaves the order unchanged.
    pub fn reorder_sets(&mut self, from_index: usize, to_index: usize) {
        let len = self.active_sets.len();
        if from_index >= len || to_index >= len {
            tracing::debug!(
                "Reorder ignored: {} -> {} with {} sets",
                from_index,
                to_index,
                len
            );
            return;
        }

        let set = self.active_sets.remove(from_index);
        self.active_sets.insert(to_index, set);
        self.renumber_sets();
        tracing::debug!("Moved set {} -> {}", from_index, to_index);
    }

    pub(crate) fn renumber_sets(&mut self) {
        for (index, set) in self.active_sets.iter_mut().enumerate() {
            set.set_order = index as u32 + 1;
        }
    }

    // ------------------------------------------------------------------
    // Rest timer
    // ------------------------------------------------------------------

    pub fn start_rest_timer(&mut self, seconds: u32, now: DateTime<Utc>) {
        tracing::debug!("Rest timer started for {}s", seconds);
        self.rest_timer.start(seconds, now);
    }

    pub fn stop_rest_timer(&mut self) {
        tracing::debug!("Rest timer stopped");
        self.rest_timer.stop();
    }

    /// Stop the rest timer if its countdown has run out
    ///
    /// Returns true when this call ended the rest period.
    pub fn check_rest_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.rest_timer.is_expired(now) {
            tracing::debug!("Rest period over");
            self.rest_timer.stop();
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Exercises, notes, templates
    // ------------------------------------------------------------------

    /// Append an exercise unless one with the same id is already selected
    pub fn add_exercise_to_workout(&mut self, exercise: Exercise) {
        if self.selected_exercises.iter().any(|e| e.id == exercise.id) {
            tracing::debug!("Exercise {} already selected", exercise.id);
            return;
        }
        tracing::debug!("Selected exercise {} ({})", exercise.id, exercise.name);
        self.selected_exercises.push(exercise);
    }

    /// Deselect an exercise and drop every set recorded for it
    pub fn remove_exercise_from_workout(&mut self, exercise_id: i64) {
        self.selected_exercises.retain(|e| e.id != exercise_id);

        let before = self.active_sets.len();
        self.active_sets.retain(|set| set.exercise_id != exercise_id);
        let dropped = before - self.active_sets.len();

        if dropped > 0 {
            tracing::debug!("Dropped {} sets of exercise {}", dropped, exercise_id);
            self.renumber_sets();
        }
    }

    pub fn set_workout_notes(&mut self, notes: impl Into<String>) {
        self.workout_notes = notes.into();
        tracing::debug!("Workout notes set ({} chars)", self.workout_notes.chars().count());
    }

    /// Replace the selected exercises and notes; timers are untouched
    pub fn load_workout_template(&mut self, template: WorkoutTemplate) {
        tracing::debug!(
            "Loaded template {} with {} exercises",
            template.training.name,
            template.exercises.len()
        );
        self.selected_exercises = template.exercises;
        self.workout_notes = template.training.notes.unwrap_or_default();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn sets(&self) -> &[ActiveSet] {
        &self.active_sets
    }

    pub fn set(&self, temp_id: &TempId) -> Option<&ActiveSet> {
        self.active_sets.iter().find(|set| &set.temp_id == temp_id)
    }

    fn set_mut(&mut self, temp_id: &TempId) -> Option<&mut ActiveSet> {
        self.active_sets.iter_mut().find(|set| &set.temp_id == temp_id)
    }

    pub fn completed_count(&self) -> usize {
        self.active_sets.iter().filter(|set| set.completed).count()
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        timer::elapsed(&self.workout_timer, now)
    }

    pub fn remaining_rest(&self, now: DateTime<Utc>) -> Duration {
        timer::remaining_rest(&self.rest_timer, now)
    }

    /// Sets grouped by exercise, groups in order of first appearance
    pub fn sets_by_exercise(&self) -> Vec<(i64, Vec<&ActiveSet>)> {
        let mut groups: Vec<(i64, Vec<&ActiveSet>)> = Vec::new();
        for set in &self.active_sets {
            match groups.iter_mut().find(|(id, _)| *id == set.exercise_id) {
                Some((_, sets)) => sets.push(set),
                None => groups.push((set.exercise_id, vec![set])),
            }
        }
        groups
    }

    /// Payload to save a set on the server
    pub fn create_set_request(&self, temp_id: &TempId) -> Option<CreateSetRequest> {
        self.set(temp_id).map(CreateSetRequest::from)
    }

    /// Payload to mark the active workout complete, with whole elapsed minutes
    pub fn complete_training_request(&self, now: DateTime<Utc>) -> Option<CompleteTrainingRequest> {
        self.active_workout.as_ref()?;
        let minutes = self.elapsed(now).num_minutes().max(0);
        Some(CompleteTrainingRequest {
            duration: Some(u32::try_from(minutes).unwrap_or(u32::MAX)),
        })
    }
}
