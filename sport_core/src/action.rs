//! Action vocabulary of the workout session.
//!
//! Every mutation of a [`WorkoutSession`] can be expressed as an [`Action`]
//! value, so UI handlers can dispatch them, and logs can record and replay
//! them. The JSON form is tagged: `{"type": "complete_set", "temp_id": "..."}`.

use crate::session::WorkoutSession;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    StartWorkout { workout: Workout },
    EndWorkout,
    PauseWorkout,
    ResumeWorkout,
    /// Periodic clock tick; the tick time is the `now` passed to `apply`
    UpdateWorkoutTimer,
    AddSet { set: NewSet },
    UpdateSet { temp_id: TempId, update: SetUpdate },
    RemoveSet { temp_id: TempId },
    CompleteSet { temp_id: TempId },
    StartRestTimer { seconds: u32 },
    StopRestTimer,
    AddExerciseToWorkout { exercise: Exercise },
    RemoveExerciseFromWorkout { exercise_id: i64 },
    SetWorkoutNotes { notes: String },
    ReorderSets { from_index: usize, to_index: usize },
    LoadWorkoutTemplate { template: WorkoutTemplate },
}

impl Action {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartWorkout { .. } => "start_workout",
            Action::EndWorkout => "end_workout",
            Action::PauseWorkout => "pause_workout",
            Action::ResumeWorkout => "resume_workout",
            Action::UpdateWorkoutTimer => "update_workout_timer",
            Action::AddSet { .. } => "add_set",
            Action::UpdateSet { .. } => "update_set",
            Action::RemoveSet { .. } => "remove_set",
            Action::CompleteSet { .. } => "complete_set",
            Action::StartRestTimer { .. } => "start_rest_timer",
            Action::StopRestTimer => "stop_rest_timer",
            Action::AddExerciseToWorkout { .. } => "add_exercise_to_workout",
            Action::RemoveExerciseFromWorkout { .. } => "remove_exercise_from_workout",
            Action::SetWorkoutNotes { .. } => "set_workout_notes",
            Action::ReorderSets { .. } => "reorder_sets",
            Action::LoadWorkoutTemplate { .. } => "load_workout_template",
        }
    }
}

impl WorkoutSession {
    /// Apply one action at wall-clock time `now`
    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) {
        tracing::trace!("Dispatching {}", action.name());

        match action {
            Action::StartWorkout { workout } => self.start_workout(workout, now),
            Action::EndWorkout => self.end_workout(),
            Action::PauseWorkout => self.pause_workout(now),
            Action::ResumeWorkout => self.resume_workout(now),
            Action::UpdateWorkoutTimer => self.update_workout_timer(now),
            Action::AddSet { set } => {
                self.add_set(set);
            }
            Action::UpdateSet { temp_id, update } => self.update_set(&temp_id, update),
            Action::RemoveSet { temp_id } => self.remove_set(&temp_id),
            Action::CompleteSet { temp_id } => self.complete_set(&temp_id, now),
            Action::StartRestTimer { seconds } => self.start_rest_timer(seconds, now),
            Action::StopRestTimer => self.stop_rest_timer(),
            Action::AddExerciseToWorkout { exercise } => self.add_exercise_to_workout(exercise),
            Action::RemoveExerciseFromWorkout { exercise_id } => {
                self.remove_exercise_from_workout(exercise_id)
            }
            Action::SetWorkoutNotes { notes } => self.set_workout_notes(notes),
            Action::ReorderSets {
                from_index,
                to_index,
            } => self.reorder_sets(from_index, to_index),
            Action::LoadWorkoutTemplate { template } => self.load_workout_template(template),
        }
    }

    /// Apply a sequence of timestamped actions in order
    pub fn replay<I>(&mut self, actions: I)
    where
        I: IntoIterator<Item = (DateTime<Utc>, Action)>,
    {
        for (now, action) in actions {
            self.apply(action, now);
        }
    }
}
