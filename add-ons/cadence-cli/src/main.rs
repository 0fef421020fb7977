//! Cadence CLI: chained step timers with spoken announcements.
//!
//! Usage:
//!   cadence run --step "Squats:45s" --step "Plank:1m" --buffer 10
//!   cadence save Morning --step "Stretch:2m" --step "Breathe:1m" --alarm chime
//!   cadence run Morning
//!   cadence routines | show Morning | delete Morning
//!   cadence transcribe recording.webm

use anyhow::{bail, Context};
use cadence_cli::{
    parse_steps, run_view, CadenceConfig, Command, Routine, RoutineStore, RunOutcome,
};
use cadence_core::{SequenceController, SequenceSettings};
use cadence_voice::{
    clean_transcript, create_speech_service, format_duration, AlarmSound, AudioContext,
    AudioOutput, SimulatedOutput,
};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cadence", version, about = "Chained step timers with spoken announcements")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a saved routine or an ad-hoc list of steps
    Run(RunArgs),
    /// Save a routine (asks before replacing one with the same name)
    Save {
        name: String,
        /// Step as Name:DURATION (90, 45s, 2m, 1m30s); repeat for each step
        #[arg(long = "step", required = true)]
        steps: Vec<String>,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Replace an existing routine without asking
        #[arg(long)]
        yes: bool,
    },
    /// List saved routines
    Routines,
    /// Show one routine
    Show { name: String },
    /// Delete a routine (asks first)
    Delete {
        name: String,
        #[arg(long)]
        yes: bool,
    },
    /// Transcribe a short recording into a step name
    Transcribe {
        file: PathBuf,
        /// MIME type; guessed from the file extension when omitted
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Saved routine to run
    routine: Option<String>,
    /// Step as Name:DURATION; used when no routine is given
    #[arg(long = "step")]
    steps: Vec<String>,
    #[command(flatten)]
    settings: SettingsArgs,
    /// Do not open an audio device
    #[arg(long)]
    silent: bool,
}

#[derive(Args)]
struct SettingsArgs {
    /// bell, digital, chime or gong
    #[arg(long)]
    alarm: Option<AlarmSound>,
    #[arg(long)]
    alarm_volume: Option<f32>,
    /// Rest seconds between steps
    #[arg(long)]
    buffer: Option<u32>,
    #[arg(long)]
    voice_volume: Option<f32>,
}

impl SettingsArgs {
    fn apply(&self, base: SequenceSettings) -> SequenceSettings {
        SequenceSettings {
            alarm_sound: self.alarm.unwrap_or(base.alarm_sound),
            alarm_volume: self.alarm_volume.unwrap_or(base.alarm_volume),
            buffer_seconds: self.buffer.unwrap_or(base.buffer_seconds),
            voice_volume: self.voice_volume.unwrap_or(base.voice_volume),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[cadence] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = CadenceConfig::load().context("loading configuration")?;
    let store = RoutineStore::open(config.storage_dir());

    match cli.command {
        Commands::Run(args) => run(args, &config, &store).await,
        Commands::Save {
            name,
            steps,
            settings,
            yes,
        } => {
            let steps = parse_steps(&steps).map_err(anyhow::Error::msg)?;
            let routine = Routine::new(name, steps, settings.apply(config.sequence_defaults()));
            routine.settings.validate()?;
            let exists = store.get(&routine.name)?.is_some();
            if exists && !yes && !confirm(&format!("Replace routine '{}'?", routine.name))? {
                println!("Not saved.");
                return Ok(());
            }
            let name = routine.name.clone();
            let outcome = store.save(routine, exists)?;
            println!("{:?} routine '{}'.", outcome, name);
            Ok(())
        }
        Commands::Routines => {
            let routines = store.list()?;
            if routines.is_empty() {
                println!("No saved routines in {}", store.path().display());
            }
            for r in routines {
                println!(
                    "{:<24} {:>2} steps  {}  (saved {})",
                    r.name,
                    r.steps.len(),
                    format_duration(r.total_seconds().min(u32::MAX as u64) as u32),
                    r.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        Commands::Show { name } => {
            let routine = store
                .get(&name)?
                .with_context(|| format!("no routine named '{}'", name))?;
            println!("{}", routine.name);
            for (i, step) in routine.steps.iter().enumerate() {
                println!("  {:>2}. {:<24} {}", i + 1, step.name, format_duration(step.duration_seconds));
            }
            let s = &routine.settings;
            println!(
                "  alarm {} at {:.0}%, buffer {}s, voice {:.0}%",
                s.alarm_sound,
                s.alarm_volume * 100.0,
                s.buffer_seconds,
                s.voice_volume * 100.0
            );
            Ok(())
        }
        Commands::Delete { name, yes } => {
            if store.get(&name)?.is_none() {
                bail!("no routine named '{}'", name);
            }
            if !yes && !confirm(&format!("Delete routine '{}'?", name))? {
                println!("Not deleted.");
                return Ok(());
            }
            let removed = store.delete(&name)?;
            println!("Deleted routine '{}'.", removed.name);
            Ok(())
        }
        Commands::Transcribe { file, mime } => {
            let audio = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let mime = mime.unwrap_or_else(|| {
                mime_guess::from_path(&file)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
            let speech = create_speech_service(&config.speech_settings());
            let text = speech.transcribe(&audio, &mime).await?;
            println!("{}", clean_transcript(&text));
            Ok(())
        }
    }
}

async fn run(args: RunArgs, config: &CadenceConfig, store: &RoutineStore) -> anyhow::Result<()> {
    let (steps, settings) = match &args.routine {
        Some(name) => {
            let routine = store
                .get(name)?
                .with_context(|| format!("no routine named '{}'", name))?;
            (routine.steps, args.settings.apply(routine.settings))
        }
        None => (
            parse_steps(&args.steps).map_err(anyhow::Error::msg)?,
            args.settings.apply(config.sequence_defaults()),
        ),
    };
    if steps.is_empty() {
        bail!("nothing to run: give a routine name or at least one --step");
    }

    let speech = create_speech_service(&config.speech_settings());
    let context = if args.silent {
        None
    } else {
        match AudioContext::open_default() {
            Ok(context) => Some(context),
            Err(e) => {
                warn!(error = %e, "no audio device, running silently");
                None
            }
        }
    };
    let audio: Arc<dyn AudioOutput> = match &context {
        Some(context) => Arc::new(context.output()),
        None => Arc::new(SimulatedOutput::new()),
    };

    let (controller, events) = SequenceController::start(steps, settings, speech, audio)?;
    let (tx, commands) = mpsc::unbounded_channel();
    spawn_stdin_reader(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("CTRL-C received; exiting sequence");
            let _ = tx.send(Command::Quit);
        }
    });

    let mut stdout = std::io::stdout();
    let outcome = run_view::drive(controller, events, commands, &mut stdout).await?;
    info!(?outcome, "run finished");
    // The controller has exited; release the device last.
    drop(context);
    if outcome == RunOutcome::Quit {
        println!("Stopped early.");
    }
    Ok(())
}

/// Read commands on a dedicated thread; blocking stdin must not hold up runtime shutdown.
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Command>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            }
        }
    });
}

fn confirm(prompt: &str) -> std::io::Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
