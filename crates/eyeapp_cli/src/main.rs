//! Command-line host for the eyeapp core.
//!
//! # Responsibility
//! - Manage patient records and list their completed sessions.
//! - Run an interactive slide session and export its anonymized record.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use eyeapp_core::db::open_db;
use eyeapp_core::{
    default_log_level, init_logging, load_manifest_or_empty, write_export, AppPaths, Clock,
    DirFileWriter, NewPatient, Patient, ProtocolManifest, Registry, SessionEngine, SessionState,
    SnapshotRepository, SqliteSnapshotRepository, DEFAULT_PROTOCOL_KEY,
};
use log::warn;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "eyeapp",
    version,
    about = "Administer slide protocols and export anonymized session timings"
)]
struct Cli {
    /// Directory holding the store, logs and exports.
    #[arg(long, env = "EYEAPP_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,
    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, list or delete patients
    #[command(subcommand)]
    Patient(PatientCommand),
    /// List completed sessions of a patient
    Sessions {
        patient_id: String,
    },
    /// List protocols from the manifest
    Protocols {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Run an interactive slide session
    Run(RunArgs),
}

#[derive(Subcommand)]
enum PatientCommand {
    Add {
        #[arg(long)]
        initials: Option<String>,
        #[arg(long)]
        birth_year: Option<i32>,
        #[arg(long)]
        notes: Option<String>,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Patient id selected for the session.
    #[arg(long)]
    patient: Option<String>,
    #[arg(long, default_value = DEFAULT_PROTOCOL_KEY)]
    protocol: String,
    #[arg(long)]
    manifest: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = resolve_paths(cli.data_dir)?;
    std::fs::create_dir_all(paths.data_dir())
        .with_context(|| format!("creating {}", paths.data_dir().display()))?;

    let level = cli
        .log_level
        .unwrap_or_else(|| default_log_level().to_string());
    init_logging(&level, paths.log_dir()).map_err(|err| anyhow!(err))?;

    let conn = open_db(paths.db_path()).context("opening patient store")?;
    let mut registry = Registry::open(SqliteSnapshotRepository::new(&conn));
    if let Some(warning) = registry.load_warning() {
        eprintln!("warning: stored patient data could not be loaded ({warning}); starting empty");
    }

    match cli.command {
        Commands::Patient(command) => run_patient(&mut registry, command),
        Commands::Sessions { patient_id } => {
            let patient = registry
                .get_patient(&patient_id)
                .ok_or_else(|| anyhow!("unknown patient {patient_id}"))?;
            println!("sessions for {}:", patient.code);
            for session in registry.list_sessions(&patient_id) {
                println!(
                    "  {}  {}  {} -> {}",
                    session.id,
                    session.protocol_key,
                    session.started_at,
                    session.ended_at.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        Commands::Protocols { manifest } => {
            let manifest_path = manifest.unwrap_or_else(|| paths.manifest_path());
            let manifest = load_manifest_or_empty(manifest_path);
            if manifest.is_empty() {
                println!("no protocols available");
            }
            for (key, protocol) in manifest.iter() {
                println!("{key}\t{} ({} slides)", protocol.label, protocol.slide_count());
            }
            Ok(())
        }
        Commands::Run(args) => {
            let manifest_path = args
                .manifest
                .clone()
                .unwrap_or_else(|| paths.manifest_path());
            let manifest = load_manifest_or_empty(manifest_path);
            run_session(&mut registry, &manifest, &args, &paths)
        }
    }
}

fn resolve_paths(data_dir: Option<PathBuf>) -> Result<AppPaths> {
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => dirs_next::data_dir()
            .ok_or_else(|| anyhow!("no platform data directory; pass --data-dir"))?
            .join("eyeapp"),
    };
    let data_dir = if data_dir.is_absolute() {
        data_dir
    } else {
        std::env::current_dir()?.join(data_dir)
    };
    AppPaths::new(data_dir).map_err(|err| anyhow!(err))
}

fn run_patient(
    registry: &mut Registry<SqliteSnapshotRepository<'_>>,
    command: PatientCommand,
) -> Result<()> {
    match command {
        PatientCommand::Add {
            initials,
            birth_year,
            notes,
        } => {
            let patient = registry.add_patient(NewPatient {
                initials,
                birth_year,
                notes,
            })?;
            println!("created {} (id {})", patient.code, patient.id);
        }
        PatientCommand::List => {
            let patients = registry.list_patients();
            if patients.is_empty() {
                println!("no patients yet");
            }
            for patient in patients {
                let initials = patient
                    .initials
                    .as_deref()
                    .map(|value| format!(" ({value})"))
                    .unwrap_or_default();
                println!(
                    "{}{initials}\tid={}\tcreated={}",
                    patient.code, patient.id, patient.created_at
                );
            }
        }
        PatientCommand::Delete { id } => {
            registry.delete_patient(&id)?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

const RUN_HELP: &str = "commands: use <patient-id> | start | n(ext) | p(rev) | end | export \
     | clear | status | q(uit)";

fn run_session(
    registry: &mut Registry<SqliteSnapshotRepository<'_>>,
    manifest: &ProtocolManifest,
    args: &RunArgs,
    paths: &AppPaths,
) -> Result<()> {
    let mut patient = registry.resolve_selection(args.patient.as_deref()).cloned();
    match &patient {
        Some(patient) => println!("patient {}", patient.code),
        None => println!("no patient selected; `use <patient-id>` to pick one"),
    }

    if manifest.get(&args.protocol).is_none() {
        warn!(
            "event=protocol_select module=cli status=missing protocol={}",
            args.protocol
        );
        println!("protocol `{}` not available; stage has no slides", args.protocol);
    }
    let protocol = manifest.protocol_or_empty(&args.protocol);
    let mut engine = SessionEngine::new();
    engine.select_protocol(&args.protocol, &protocol);
    let mut writer = DirFileWriter::new(paths.export_dir());

    println!("{RUN_HELP}");
    println!("{}", stage_line(&engine));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let (command, rest) = line
            .trim()
            .split_once(char::is_whitespace)
            .map_or((line.trim(), ""), |(command, rest)| (command, rest.trim()));
        match command {
            "use" => match pick_patient(registry, &engine, rest) {
                Ok(selected) => {
                    println!("patient {}", selected.code);
                    patient = Some(selected);
                }
                Err(reason) => println!("{reason}"),
            },
            "start" => {
                if !engine.start_session(patient.as_ref(), &args.protocol, &protocol) {
                    println!("cannot start: needs a patient, slides, and no running session");
                }
            }
            "n" | "next" => {
                engine.next();
            }
            "p" | "prev" => {
                engine.prev();
            }
            "end" => match engine.end_session(registry) {
                Ok(true) => println!("session ended"),
                Ok(false) => println!("no running session"),
                Err(err) => println!("session ended but summary was not saved: {err}"),
            },
            "export" => match engine.last_export() {
                Some(export) => {
                    let path = write_export(export, &mut writer)?;
                    println!("exported {}", path.display());
                }
                None => println!("nothing to export; end a session first"),
            },
            "clear" => engine.clear_session(),
            "status" => {}
            "q" | "quit" => break,
            "" => continue,
            other => {
                println!("unknown command `{other}`; {RUN_HELP}");
                continue;
            }
        }
        println!("{}", stage_line(&engine));
        let _ = io::stdout().flush();
    }

    if engine.state() == SessionState::Running {
        println!("warning: session still running at exit; it was not recorded");
    }
    Ok(())
}

fn pick_patient<R: SnapshotRepository, C: Clock>(
    registry: &Registry<R>,
    engine: &SessionEngine<C>,
    id: &str,
) -> std::result::Result<Patient, String> {
    if engine.is_running() {
        return Err("cannot change patient while a session is running".to_string());
    }
    registry
        .resolve_selection(Some(id))
        .cloned()
        .ok_or_else(|| format!("unknown patient `{id}`"))
}

fn stage_line<C: Clock>(engine: &SessionEngine<C>) -> String {
    let state = match engine.state() {
        SessionState::Idle => "idle",
        SessionState::Running => "running",
        SessionState::Ended => "ended",
    };
    let mut line = match engine.current_slide() {
        Some(slide) => format!(
            "[{state}] slide {}/{} {slide}",
            engine.slide_index() + 1,
            engine.slide_count()
        ),
        None => format!("[{state}] no slides"),
    };
    if engine.state() != SessionState::Idle {
        line.push_str(&format!(" marks={}", engine.marks().len()));
    }
    line
}
