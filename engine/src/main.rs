//! Operator CLI for the sandboxed execution engine.
//!
//! Reads `engine.toml` (defaults when missing), the lesson catalog it points
//! at, and the JSON stores under its state directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandbox_engine::core::filter::{Verdict, check, stage_bases};
use sandbox_engine::core::types::{LearnerId, TrackId};
use sandbox_engine::exit_codes;
use sandbox_engine::io::catalog::load_catalog;
use sandbox_engine::io::config::{EngineConfig, load_config, write_config};
use sandbox_engine::logging;
use sandbox_engine::terminal::{TerminalError, TerminalService};

#[derive(Parser)]
#[command(
    name = "sandbox-engine",
    version,
    about = "Per-learner sandboxed command execution and lesson progression"
)]
struct Cli {
    /// Engine config file. Relative paths inside it resolve against its directory.
    #[arg(long, global = true, default_value = "engine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the sandbox filter on a command without executing it.
    Check {
        /// Raw command line as typed by a learner.
        command: String,
    },
    /// List tracks, or the lessons of one track, and report check patterns
    /// that do not compile.
    Lessons {
        #[arg(long)]
        track: Option<TrackId>,
    },
    /// Manage the learner directory.
    Learner {
        #[command(subcommand)]
        command: LearnerCommand,
    },
    /// Execute a command for a learner and evaluate the current lesson.
    Exec {
        #[arg(long)]
        learner: String,
        #[arg(long, default_value_t = 1)]
        track: TrackId,
        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
        /// Command line (joined with spaces). Options must come before it:
        /// everything from the first command word on is passed through.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Print a learner's position within a track.
    Progress {
        #[arg(long)]
        learner: String,
        #[arg(long, default_value_t = 1)]
        track: TrackId,
        #[arg(long)]
        json: bool,
    },
    /// Reset a learner's track progress and recreate their environment.
    Reset {
        #[arg(long)]
        learner: String,
        #[arg(long, default_value_t = 1)]
        track: TrackId,
    },
}

#[derive(Subcommand)]
enum LearnerCommand {
    /// Register a learner id (no-op if already registered).
    Add { id: String },
}

fn main() {
    logging::init("warn");
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::Init { force } = cli.command {
        return cmd_init(&cli.config, force);
    }
    let config = load_engine_config(&cli.config)?;
    match cli.command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Check { command } => Ok(cmd_check(&config, &command)),
        Command::Lessons { track } => cmd_lessons(&config, track),
        Command::Learner {
            command: LearnerCommand::Add { id },
        } => {
            let service = TerminalService::from_config(&config)?;
            let record = service.register_learner(&LearnerId::new(id))?;
            println!("{}", record.id);
            Ok(exit_codes::OK)
        }
        Command::Exec {
            learner,
            track,
            command,
            json,
        } => {
            let service = TerminalService::from_config(&config)?;
            let outcome =
                service.execute_command(&LearnerId::new(learner), track, &command.join(" "))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", outcome.output);
                if !outcome.output.is_empty() && !outcome.output.ends_with('\n') {
                    println!();
                }
                eprintln!(
                    "{} ({}/{})",
                    if outcome.passed { "passed" } else { "not passed" },
                    outcome.progress.current,
                    outcome.progress.total
                );
            }
            Ok(exit_codes::OK)
        }
        Command::Progress {
            learner,
            track,
            json,
        } => {
            let service = TerminalService::from_config(&config)?;
            let progress = service.get_progress(&LearnerId::new(learner), track)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&progress)?);
            } else {
                println!("{}/{}", progress.current, progress.total);
            }
            Ok(exit_codes::OK)
        }
        Command::Reset { learner, track } => {
            let service = TerminalService::from_config(&config)?;
            service.reset_course(&LearnerId::new(learner), track)?;
            Ok(exit_codes::OK)
        }
    }
}

fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(load_config(path)?.resolve_paths(base))
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &EngineConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_check(config: &EngineConfig, command: &str) -> i32 {
    match check(&config.policy, command) {
        Verdict::Allowed => {
            println!("allowed");
            for base in stage_bases(command.trim()) {
                let tier = config.policy.tier_of(base).unwrap_or("unlisted");
                println!("  {base}: {tier}");
            }
            exit_codes::OK
        }
        Verdict::Rejected(rejection) => {
            println!("{rejection}");
            exit_codes::REJECTED
        }
    }
}

fn cmd_lessons(config: &EngineConfig, track: Option<TrackId>) -> Result<i32> {
    let catalog = load_catalog(&config.catalog_path)?;
    match track {
        None => {
            for id in catalog.track_ids() {
                println!("track {id}: {} lessons", catalog.lesson_count(id));
            }
        }
        Some(id) => {
            let lessons = catalog
                .track(id)
                .ok_or(TerminalError::UnknownTrack(id))?
                .lessons();
            for (index, lesson) in lessons.iter().enumerate() {
                println!(
                    "{index}\t{}\t{}",
                    lesson.title,
                    lesson.check.as_deref().unwrap_or("-")
                );
            }
        }
    }
    let invalid = catalog.invalid_checks();
    for check in &invalid {
        eprintln!(
            "track {} lesson {}: pattern {:?} does not compile: {}",
            check.track_id, check.order, check.pattern, check.error
        );
    }
    if invalid.is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::INVALID)
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<TerminalError>() {
        Some(err) if err.is_not_found() => exit_codes::NOT_FOUND,
        _ => exit_codes::INVALID,
    }
}
