//! Session snapshot persistence with file locking.
//!
//! The session is written as JSON after every dispatched action and
//! hydrated before the next one. Loading is forgiving: a missing or broken
//! snapshot yields an idle session, and a snapshot whose fields disagree
//! with each other is normalized before use.
//!
//! Read-modify-write cycles hold an exclusive lock on a sibling `.lock`
//! file, since the data file itself is replaced by rename on every save.

use crate::{Error, Result, WorkoutSession};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Largest accumulated workout time a snapshot may carry (100 years)
const MAX_ELAPSED_MS: i64 = 100 * 365 * 24 * 60 * 60 * 1000;

impl WorkoutSession {
    /// Load a session snapshot with shared locking
    ///
    /// Returns an idle session if the file doesn't exist, can't be read, or
    /// doesn't parse.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No session snapshot found, starting idle");
            return Ok(Self::default());
        }

        let contents = match read_locked(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("Unable to read session snapshot {:?}: {}. Starting idle.", path, e);
                return Ok(Self::default());
            }
        };

        match serde_json::from_str::<WorkoutSession>(&contents) {
            Ok(mut session) => {
                session.normalize();
                tracing::debug!("Loaded session snapshot from {:?}", path);
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse session snapshot {:?}: {}. Starting idle.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Save the session snapshot atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec(self)?;
        write_atomic(path, &contents)?;
        tracing::debug!("Saved session snapshot to {:?}", path);
        Ok(())
    }

    /// Load, apply `f`, and save back under the snapshot's lock
    ///
    /// Concurrent updates of the same snapshot are serialized. Nothing is
    /// saved when `f` fails.
    pub fn update<F>(path: &Path, f: F) -> Result<Self>
    where
        F: FnOnce(&mut WorkoutSession) -> Result<()>,
    {
        with_lock(path, || {
            let mut session = Self::load(path)?;
            f(&mut session)?;
            session.save(path)?;
            Ok(session)
        })
    }

    /// Restore the invariants between fields of a hydrated snapshot
    pub fn normalize(&mut self) {
        if self.active_workout.is_none() {
            let sequence = self.temp_id_sequence;
            *self = WorkoutSession {
                temp_id_sequence: sequence,
                ..WorkoutSession::default()
            };
            return;
        }

        let timer = &mut self.workout_timer;
        if timer.is_running && timer.start_time.is_none() {
            tracing::warn!("Snapshot timer running without start time; treating as paused");
            timer.is_running = false;
        }
        if !timer.is_running {
            timer.start_time = None;
        }
        if !(0..=MAX_ELAPSED_MS).contains(&timer.elapsed_ms) {
            tracing::warn!("Snapshot elapsed time {}ms out of range; clamping", timer.elapsed_ms);
            timer.elapsed_ms = timer.elapsed_ms.clamp(0, MAX_ELAPSED_MS);
        }

        // No rest period can outlast the longest rest a set can ask for
        let max_rest_ms = i64::from(u32::MAX) * 1000;
        if self.rest_timer.is_active != self.rest_timer.start_time.is_some()
            || !(0..=max_rest_ms).contains(&self.rest_timer.duration_ms)
        {
            self.rest_timer.stop();
        }

        // Temp ids from the snapshot must stay below the next generated one
        let highest = self
            .active_sets
            .iter()
            .filter_map(|set| sequence_of(set.temp_id.as_str()))
            .max()
            .unwrap_or(0);
        self.temp_id_sequence = self.temp_id_sequence.max(highest);

        self.renumber_sets();
    }
}

fn sequence_of(temp_id: &str) -> Option<u64> {
    temp_id.strip_prefix("temp_")?.split('_').next()?.parse().ok()
}

/// Lock file guarding read-modify-write cycles on `path`
pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Run `f` while holding an exclusive lock for `path`
///
/// Not reentrant: `f` must not lock the same `path` again.
pub(crate) fn with_lock<T, F>(path: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let lock = lock_path(path);
    if let Some(parent) = lock.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock)?;
    file.lock_exclusive()?;

    let result = f();
    file.unlock()?;
    result
}

/// Read a whole file under a shared lock
pub(crate) fn read_locked(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    file.lock_shared()?;

    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    file.unlock()?;
    read?;

    Ok(contents)
}

/// Replace `path` with `contents` atomically
///
/// Writes to a temp file in the same directory under an exclusive lock,
/// syncs it, then renames it over the target.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Store(format!("{:?} has no parent directory", path)))?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        writer.write_all(contents)?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Exercise, NewSet, Workout};
    use chrono::{TimeZone, Utc};

    fn started() -> WorkoutSession {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut session = WorkoutSession::new();
        session.start_workout(Workout::new(1, "Leg Day"), now);
        session.add_exercise_to_workout(Exercise::new(10, "Squat"));
        session.add_set(NewSet::new(10, 8).weight(100.0));
        session.set_workout_notes("heavy");
        session
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");

        let session = started();
        session.save(&path).unwrap();

        let loaded = WorkoutSession::load(&path).unwrap();
        assert_eq!(loaded, session);
        assert!(loaded.is_workout_mode());
    }

    #[test]
    fn test_load_nonexistent_returns_idle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        let session = WorkoutSession::load(&path).unwrap();
        assert!(!session.is_workout_mode());
        assert!(session.sets().is_empty());
    }

    #[test]
    fn test_corrupted_snapshot_returns_idle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        let session = WorkoutSession::load(&path).unwrap();
        assert_eq!(session, WorkoutSession::default());
    }

    #[test]
    fn test_normalize_without_workout_goes_idle() {
        let mut session = started();
        session.active_workout = None;
        session.normalize();

        assert!(session.sets().is_empty());
        assert!(session.selected_exercises.is_empty());
        assert!(!session.workout_timer.is_running);
        assert_eq!(session.temp_id_sequence, 1);
    }

    #[test]
    fn test_normalize_fixes_timer_flags() {
        let mut session = started();
        session.workout_timer.start_time = None;
        session.rest_timer.is_active = true;
        session.rest_timer.start_time = None;
        session.normalize();

        assert!(!session.workout_timer.is_running);
        assert!(!session.rest_timer.is_active);
    }

    #[test]
    fn test_normalize_renumbers_and_protects_sequence() {
        let mut session = started();
        session.add_set(NewSet::new(10, 6));
        session.active_sets[0].set_order = 7;
        session.active_sets[1].set_order = 7;
        session.temp_id_sequence = 0;
        session.normalize();

        assert_eq!(session.active_sets[0].set_order, 1);
        assert_eq!(session.active_sets[1].set_order, 2);
        assert_eq!(session.temp_id_sequence, 2);

        let next = session.add_set(NewSet::new(10, 4));
        assert!(next.as_str().starts_with("temp_3_"));
    }

    #[test]
    fn test_out_of_range_numbers_are_clamped_on_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");

        let mut snapshot = serde_json::to_value(started()).unwrap();
        snapshot["workout_timer"]["elapsed_ms"] = serde_json::json!(i64::MAX);
        snapshot["rest_timer"] = serde_json::json!({
            "start_time": snapshot["workout_timer"]["start_time"].clone(),
            "duration_ms": i64::MIN,
            "is_active": true,
        });
        snapshot["temp_id_sequence"] = serde_json::json!(u64::MAX);
        snapshot["active_sets"][0]["temp_id"] =
            serde_json::json!(format!("temp_{}_abc", u64::MAX));
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let mut session = WorkoutSession::load(&path).unwrap();
        let now = Utc::now();

        assert_eq!(session.workout_timer.elapsed_ms, MAX_ELAPSED_MS);
        assert!(session.elapsed(now) >= chrono::Duration::milliseconds(MAX_ELAPSED_MS));
        assert!(!session.rest_timer.is_active);
        assert_eq!(session.remaining_rest(now), chrono::Duration::zero());

        session.update_workout_timer(now);
        session.pause_workout(now);
        let next = session.add_set(NewSet::new(10, 3));
        assert_ne!(&next, &session.sets()[0].temp_id);
        assert_eq!(session.temp_id_sequence, u64::MAX);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");
        started().save(&path).unwrap();

        let ticker_path = path.clone();
        let ticker = std::thread::spawn(move || {
            for _ in 0..300 {
                WorkoutSession::update(&ticker_path, |session| {
                    session.update_workout_timer(Utc::now());
                    Ok(())
                })
                .unwrap();
            }
        });

        for reps in 0..100 {
            WorkoutSession::update(&path, |session| {
                session.add_set(NewSet::new(10, reps));
                Ok(())
            })
            .unwrap();
        }
        ticker.join().unwrap();

        let loaded = WorkoutSession::load(&path).unwrap();
        // One set from `started()` plus every concurrent add
        assert_eq!(loaded.sets().len(), 101);
    }

    #[test]
    fn test_failed_update_saves_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");
        started().save(&path).unwrap();

        let result = WorkoutSession::update(&path, |session| {
            session.end_workout();
            Err(Error::Other("rejected".into()))
        });

        assert!(result.is_err());
        assert!(WorkoutSession::load(&path).unwrap().is_workout_mode());
    }

    #[test]
    fn test_update_pattern() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");
        started().save(&path).unwrap();

        WorkoutSession::update(&path, |session| {
            session.set_workout_notes("lighter");
            Ok(())
        })
        .unwrap();

        let loaded = WorkoutSession::load(&path).unwrap();
        assert_eq!(loaded.workout_notes, "lighter");
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");

        started().save(&path).unwrap();
        started().save(&path).unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "session.json")
            .collect();
        assert!(extras.is_empty(), "Unexpected files: {:?}", extras);
    }
}
