use chrono::Utc;
use clap::{Parser, Subcommand};
use sport_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sport")]
#[command(about = "Workout session tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a workout (discards any session in progress)
    Start {
        #[arg(long)]
        name: String,

        /// Server id of the training; allocated locally when omitted
        #[arg(long)]
        id: Option<i64>,

        /// Template JSON to pre-select exercises and notes
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Pause the workout timer
    Pause,

    /// Resume the workout timer
    Resume,

    /// Advance the workout timer and check the rest countdown
    Tick,

    /// Add an exercise to the workout
    AddExercise {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        muscle: String,

        #[arg(long, default_value = "")]
        equipment: String,
    },

    /// Remove an exercise and all of its sets
    RemoveExercise { id: i64 },

    /// Record a new set
    AddSet {
        #[arg(long)]
        exercise: i64,

        #[arg(long)]
        reps: u32,

        #[arg(long)]
        weight: Option<f64>,

        /// Rest after the set in seconds (default 60)
        #[arg(long)]
        rest: Option<u32>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Change fields of a recorded set
    UpdateSet {
        temp_id: String,

        #[arg(long)]
        exercise: Option<i64>,

        #[arg(long)]
        reps: Option<u32>,

        #[arg(long)]
        weight: Option<f64>,

        #[arg(long)]
        rest: Option<u32>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a recorded set
    RemoveSet { temp_id: String },

    /// Queue a set for saving and mark it complete
    Complete { temp_id: String },

    /// Control the rest timer
    Rest {
        #[command(subcommand)]
        command: RestCommand,
    },

    /// Replace the workout notes
    Notes { text: String },

    /// Move the set at position FROM to position TO (0-based)
    Reorder { from: usize, to: usize },

    /// Load exercises and notes from a template JSON file
    Template { file: PathBuf },

    /// Show the current session
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Drive the timers until interrupted
    Watch {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Queue workout completion and end the session
    End,

    /// Move queued sets into the CSV history
    Rollup {
        /// Delete archived outbox files afterwards
        #[arg(long)]
        cleanup: bool,
    },

    /// Store the API auth token
    Login { token: String },

    /// Forget the API auth token
    Logout,
}

#[derive(Subcommand)]
enum RestCommand {
    /// Start a rest countdown
    Start { seconds: u32 },
    /// Skip the rest of the countdown
    Stop,
}

/// Files under the data directory
struct DataPaths {
    session: PathBuf,
    outbox_dir: PathBuf,
    outbox: PathBuf,
    kv: PathBuf,
    history: PathBuf,
}

impl DataPaths {
    fn new(data_dir: &Path) -> Self {
        let outbox_dir = data_dir.join("outbox");
        Self {
            session: data_dir.join("session.json"),
            outbox: outbox_dir.join("requests.jsonl"),
            outbox_dir,
            kv: data_dir.join("kv.json"),
            history: data_dir.join("history.csv"),
        }
    }
}

const NEXT_TRAINING_ID_KEY: &str = "next_training_id";

fn main() -> Result<()> {
    let cli = Cli::parse();
    sport_core::logging::init(cli.verbose);

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;
    let paths = DataPaths::new(&data_dir);

    match cli.command {
        Commands::Start { name, id, template } => cmd_start(&paths, name, id, template),
        Commands::Pause => report(&paths, Action::PauseWorkout),
        Commands::Resume => report(&paths, Action::ResumeWorkout),
        Commands::Tick => cmd_tick(&paths),
        Commands::AddExercise {
            id,
            name,
            muscle,
            equipment,
        } => report(
            &paths,
            Action::AddExerciseToWorkout {
                exercise: Exercise {
                    id,
                    name,
                    muscle_group: muscle,
                    equipment,
                },
            },
        ),
        Commands::RemoveExercise { id } => {
            report(&paths, Action::RemoveExerciseFromWorkout { exercise_id: id })
        }
        Commands::AddSet {
            exercise,
            reps,
            weight,
            rest,
            notes,
        } => cmd_add_set(
            &paths,
            NewSet {
                exercise_id: exercise,
                reps,
                weight_kg: weight,
                rest_seconds: rest,
                notes,
            },
        ),
        Commands::UpdateSet {
            temp_id,
            exercise,
            reps,
            weight,
            rest,
            notes,
        } => {
            let update = SetUpdate {
                exercise_id: exercise,
                reps,
                weight_kg: weight,
                rest_seconds: rest,
                notes,
            };
            if update.is_empty() {
                return Err(Error::Other("Nothing to update".into()));
            }
            report(
                &paths,
                Action::UpdateSet {
                    temp_id: temp_id.into(),
                    update,
                },
            )
        }
        Commands::RemoveSet { temp_id } => report(
            &paths,
            Action::RemoveSet {
                temp_id: temp_id.into(),
            },
        ),
        Commands::Complete { temp_id } => cmd_complete(&paths, temp_id.into(), &config),
        Commands::Rest { command } => match command {
            RestCommand::Start { seconds } => report(&paths, Action::StartRestTimer { seconds }),
            RestCommand::Stop => report(&paths, Action::StopRestTimer),
        },
        Commands::Notes { text } => report(&paths, Action::SetWorkoutNotes { notes: text }),
        Commands::Reorder { from, to } => report(
            &paths,
            Action::ReorderSets {
                from_index: from,
                to_index: to,
            },
        ),
        Commands::Template { file } => {
            let template = read_template(&file)?;
            report(&paths, Action::LoadWorkoutTemplate { template })
        }
        Commands::Status { json } => cmd_status(&paths, json),
        Commands::Watch { ticks } => cmd_watch(&paths, ticks, &config),
        Commands::End => cmd_end(&paths, &config),
        Commands::Rollup { cleanup } => cmd_rollup(&paths, cleanup),
        Commands::Login { token } => {
            FileStore::new(&paths.kv).set_auth_token(&token)?;
            println!("✓ Logged in");
            Ok(())
        }
        Commands::Logout => {
            FileStore::new(&paths.kv).clear_auth_token()?;
            println!("✓ Logged out");
            Ok(())
        }
    }
}

/// Hydrate, apply one action now, persist
fn dispatch(paths: &DataPaths, action: Action) -> Result<WorkoutSession> {
    let now = Utc::now();
    tracing::debug!("Dispatching {}", action.name());
    WorkoutSession::update(&paths.session, |session| {
        session.apply(action, now);
        Ok(())
    })
}

/// Dispatch and print the resulting session
fn report(paths: &DataPaths, action: Action) -> Result<()> {
    let session = dispatch(paths, action)?;
    print_session(&session);
    Ok(())
}

fn cmd_start(
    paths: &DataPaths,
    name: String,
    id: Option<i64>,
    template: Option<PathBuf>,
) -> Result<()> {
    // Read the template first so a bad file doesn't leave a half-started session
    let template = template.as_deref().map(read_template).transpose()?;

    let id = match id {
        Some(id) => id,
        None => allocate_training_id(paths)?,
    };

    // Start and template land in one save
    let now = Utc::now();
    let session = WorkoutSession::update(&paths.session, |session| {
        session.apply(
            Action::StartWorkout {
                workout: Workout::new(id, name),
            },
            now,
        );
        if let Some(template) = template {
            session.apply(Action::LoadWorkoutTemplate { template }, now);
        }
        Ok(())
    })?;

    print_session(&session);
    Ok(())
}

/// Take the next local training id, atomically across processes
fn allocate_training_id(paths: &DataPaths) -> Result<i64> {
    let mut allocated = 1;
    FileStore::new(&paths.kv).update(NEXT_TRAINING_ID_KEY, |current| {
        if let Some(raw) = current {
            allocated = raw
                .parse::<i64>()
                .map_err(|e| Error::Store(format!("Invalid {}: {}", NEXT_TRAINING_ID_KEY, e)))?;
        }
        let next = allocated
            .checked_add(1)
            .ok_or_else(|| Error::Store(format!("{} exhausted", NEXT_TRAINING_ID_KEY)))?;
        Ok(Some(next.to_string()))
    })?;
    tracing::debug!("Allocated training id {}", allocated);
    Ok(allocated)
}

fn read_template(path: &Path) -> Result<WorkoutTemplate> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn cmd_add_set(paths: &DataPaths, set: NewSet) -> Result<()> {
    let session = dispatch(paths, Action::AddSet { set })?;
    if let Some(added) = session.sets().last() {
        println!("Added set #{} {}", added.set_order, added.temp_id);
    }
    Ok(())
}

/// Queue the set for the server and mark it complete, under the session lock
///
/// A set is queued only the first time it is completed.
fn cmd_complete(paths: &DataPaths, temp_id: TempId, config: &Config) -> Result<()> {
    let now = Utc::now();
    let session = WorkoutSession::update(&paths.session, |session| {
        let (Some(workout), Some(set)) = (session.active_workout.as_ref(), session.set(&temp_id))
        else {
            return Err(Error::Other(format!("No set {} in an active workout", temp_id)));
        };

        if set.completed {
            tracing::info!("Set {} already completed; not queueing it again", temp_id);
        } else {
            let pending = PendingRequest::new(
                workout.id,
                ApiRequest::CreateSet(CreateSetRequest::from(set)),
                config.sync.max_retries,
                now,
            );
            JsonlOutbox::new(&paths.outbox).append(&pending)?;
        }

        session.apply(Action::CompleteSet { temp_id }, now);
        Ok(())
    })?;

    print_session(&session);
    Ok(())
}

fn cmd_tick(paths: &DataPaths) -> Result<()> {
    let now = Utc::now();
    let mut rest_over = false;
    let session = WorkoutSession::update(&paths.session, |session| {
        session.update_workout_timer(now);
        rest_over = session.check_rest_expiry(now);
        Ok(())
    })?;

    if rest_over {
        println!("Rest complete - ready for your next set!");
    }
    println!("{}", format_duration(session.elapsed(now)));
    Ok(())
}

fn cmd_watch(paths: &DataPaths, ticks: Option<u64>, config: &Config) -> Result<()> {
    let interval = std::time::Duration::from_secs(config.timer.tick_seconds);
    let mut count = 0;

    loop {
        if !WorkoutSession::load(&paths.session)?.is_workout_mode() {
            println!("No active workout");
            return Ok(());
        }
        if ticks.is_some_and(|limit| count >= limit) {
            return Ok(());
        }

        std::thread::sleep(interval);
        cmd_tick(paths)?;
        count += 1;
    }
}

fn cmd_end(paths: &DataPaths, config: &Config) -> Result<()> {
    let now = Utc::now();
    let mut ended = None;

    WorkoutSession::update(&paths.session, |session| {
        let Some(workout) = session.active_workout.clone() else {
            return Ok(());
        };

        if let Some(request) = session.complete_training_request(now) {
            let pending = PendingRequest::new(
                workout.id,
                ApiRequest::CompleteTraining(request),
                config.sync.max_retries,
                now,
            );
            JsonlOutbox::new(&paths.outbox).append(&pending)?;
        }

        let unsaved = session.sets().len() - session.completed_count();
        if unsaved > 0 {
            eprintln!("Discarding {} uncompleted sets", unsaved);
        }

        ended = Some((workout.name, session.elapsed(now)));
        session.apply(Action::EndWorkout, now);
        Ok(())
    })?;

    match ended {
        Some((name, elapsed)) => {
            println!("✓ Workout {} ended after {}", name, format_duration(elapsed))
        }
        None => println!("No active workout"),
    }
    Ok(())
}

fn cmd_rollup(paths: &DataPaths, cleanup: bool) -> Result<()> {
    if !paths.outbox.exists() {
        println!("No queued requests - nothing to roll up.");
        return Ok(());
    }

    let count = sport_core::rollup::outbox_to_csv_and_archive(&paths.outbox, &paths.history)?;
    println!("✓ Rolled up {} sets to CSV", count);
    println!("  CSV: {}", paths.history.display());

    if cleanup {
        let cleaned = sport_core::rollup::cleanup_processed(&paths.outbox_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} archived outbox files", cleaned);
        }
    }
    Ok(())
}

fn cmd_status(paths: &DataPaths, json: bool) -> Result<()> {
    let session = WorkoutSession::load(&paths.session)?;
    if json {
        let now = Utc::now();
        let status = serde_json::json!({
            "workout_mode": session.is_workout_mode(),
            "elapsed_ms": session.elapsed(now).num_milliseconds(),
            "remaining_rest_ms": session.remaining_rest(now).num_milliseconds(),
            "session": session,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_session(&session);
    }
    Ok(())
}

fn print_session(session: &WorkoutSession) {
    let now = Utc::now();
    let Some(workout) = &session.active_workout else {
        println!("No active workout");
        return;
    };

    let state = if session.workout_timer.is_running {
        "running"
    } else {
        "paused"
    };
    println!(
        "{} (#{}) {} {}",
        workout.name,
        workout.id,
        state,
        format_duration(session.elapsed(now))
    );

    if session.rest_timer.is_active {
        println!("  Rest: {} left", format_duration(session.remaining_rest(now)));
    }

    for exercise in &session.selected_exercises {
        println!("  [{}] {}", exercise.id, exercise.name);
    }

    for (exercise_id, sets) in session.sets_by_exercise() {
        let name = session
            .selected_exercises
            .iter()
            .find(|e| e.id == exercise_id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| format!("Exercise {}", exercise_id));
        println!("  {}", name);

        for set in sets {
            let weight = set
                .weight_kg
                .map(|w| format!(" @ {} kg", w))
                .unwrap_or_default();
            let done = if set.completed { " ✓" } else { "" };
            println!(
                "    {}. {} reps{}{}  {}",
                set.set_order, set.reps, weight, done, set.temp_id
            );
        }
    }

    if !session.workout_notes.is_empty() {
        println!("  Notes: {}", session.workout_notes);
    }
}
