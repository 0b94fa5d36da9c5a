//! Core domain types for the Sport workout tracker.
//!
//! This module defines:
//! - Server-side entities referenced by a session (workouts, exercises)
//! - The locally held, not-yet-persisted active set
//! - Payloads accepted by the session (new sets, partial set updates, templates)
//! - Request contracts of the remote training API

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Server Entities
// ============================================================================

/// A training confirmed by the remote API
///
/// Field names on the wire follow the API (`nom` for the name).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(default)]
    pub date: Option<String>,
    /// Duration in minutes, set once the training is completed
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl Workout {
    /// Minimal workout with just an identity and a name
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            user_id: None,
            name: name.into(),
            date: None,
            duration: None,
            notes: None,
            completed: false,
        }
    }
}

/// An exercise from the catalog (read-only for the session)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: i64,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "muscle_principal", default)]
    pub muscle_group: String,
    #[serde(rename = "equipement", default)]
    pub equipment: String,
}

impl Exercise {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            muscle_group: String::new(),
            equipment: String::new(),
        }
    }
}

// ============================================================================
// Active Sets
// ============================================================================

/// Client-generated identifier of a set the server has not confirmed yet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    /// Build an id from a per-session sequence number plus a random suffix
    ///
    /// The sequence alone is unique within a data directory; the suffix keeps
    /// ids from two directories (or a reset counter) from colliding.
    pub fn generate(sequence: u64) -> Self {
        TempId(format!("temp_{}_{}", sequence, uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TempId {
    fn from(value: &str) -> Self {
        TempId(value.to_string())
    }
}

impl From<String> for TempId {
    fn from(value: String) -> Self {
        TempId(value)
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A performed set held locally until it is saved to the server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveSet {
    pub temp_id: TempId,
    pub exercise_id: i64,
    pub reps: u32,
    pub weight_kg: Option<f64>,
    pub rest_seconds: Option<u32>,
    pub notes: Option<String>,
    /// 1-based position among all active sets
    pub set_order: u32,
    pub completed: bool,
}

/// Payload of the "add set" action
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NewSet {
    pub exercise_id: i64,
    pub reps: u32,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewSet {
    pub fn new(exercise_id: i64, reps: u32) -> Self {
        Self {
            exercise_id,
            reps,
            ..Default::default()
        }
    }

    pub fn weight(mut self, weight_kg: f64) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn rest(mut self, rest_seconds: u32) -> Self {
        self.rest_seconds = Some(rest_seconds);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Partial update of an active set; `None` leaves a field untouched
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SetUpdate {
    #[serde(default)]
    pub exercise_id: Option<i64>,
    #[serde(default)]
    pub reps: Option<u32>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SetUpdate {
    pub fn is_empty(&self) -> bool {
        self.exercise_id.is_none()
            && self.reps.is_none()
            && self.weight_kg.is_none()
            && self.rest_seconds.is_none()
            && self.notes.is_none()
    }
}

/// A saved training plus the exercises it pre-selects
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutTemplate {
    pub training: Workout,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

// ============================================================================
// Remote API Contracts
// ============================================================================

/// Body of `POST /trainings`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateTrainingRequest {
    pub nom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of `POST /trainings/{id}/sets`
///
/// Carries no temp id: the server assigns the set its own identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateSetRequest {
    pub exercise_id: i64,
    pub reps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<&ActiveSet> for CreateSetRequest {
    fn from(set: &ActiveSet) -> Self {
        CreateSetRequest {
            exercise_id: set.exercise_id,
            reps: set.reps,
            weight_kg: set.weight_kg,
            rest_seconds: set.rest_seconds,
            notes: set.notes.clone(),
        }
    }
}

/// Body of `POST /trainings/{id}/complete`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompleteTrainingRequest {
    /// Whole minutes of workout time
    #[serde(default)]
    pub duration: Option<u32>,
}
