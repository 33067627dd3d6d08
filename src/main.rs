use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cycle_predictor::config::Config;
use cycle_predictor::models::{FlowIntensity, ProfileData};
use cycle_predictor::tracker::Tracker;
use cycle_predictor::validation::{EntryInput, SettingsUpdate};

#[derive(Parser)]
#[command(name = "cycle-predictor")]
#[command(version)]
#[command(about = "Cycle phase and period predictions over a profile file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a profile file with default settings
    Init {
        file: PathBuf,

        #[arg(long)]
        force: bool,
    },
    /// Current cycle day, phase and next period start
    Status {
        file: PathBuf,

        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Change cycle settings
    Settings {
        file: PathBuf,

        #[arg(long)]
        cycle_length: Option<u32>,

        #[arg(long)]
        period_length: Option<u32>,

        #[arg(long, conflicts_with = "clear_last_period_start")]
        last_period_start: Option<NaiveDate>,

        #[arg(long)]
        clear_last_period_start: bool,

        /// Custom sensation tag; repeat to set the whole list
        #[arg(long = "sensation", conflicts_with = "clear_sensations")]
        sensations: Vec<String>,

        #[arg(long)]
        clear_sensations: bool,

        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Log or update one day
    Log {
        file: PathBuf,

        #[arg(short, long)]
        date: NaiveDate,

        #[arg(short, long, value_enum, conflicts_with = "clear_flow")]
        flow: Option<FlowArg>,

        /// Reset the flow mark to empty
        #[arg(long)]
        clear_flow: bool,

        #[arg(short, long, conflicts_with = "clear_mood")]
        mood: Option<u8>,

        #[arg(long)]
        clear_mood: bool,

        #[arg(short, long)]
        notes: Option<String>,

        /// Repeat for each sensation
        #[arg(short, long = "sensation", conflicts_with = "clear_sensations")]
        sensations: Vec<String>,

        #[arg(long)]
        clear_sensations: bool,
    },
    /// Delete a logged day
    Remove {
        file: PathBuf,

        #[arg(short, long)]
        date: NaiveDate,
    },
    /// Predictions and logged days for one month
    Month {
        file: PathBuf,

        #[arg(short, long)]
        year: i32,

        #[arg(short, long)]
        month: u32,
    },
    /// Statistics over logged periods
    History { file: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum FlowArg {
    None,
    Light,
    Medium,
    Heavy,
}

impl From<FlowArg> for FlowIntensity {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::None => FlowIntensity::None,
            FlowArg::Light => FlowIntensity::Light,
            FlowArg::Medium => FlowIntensity::Medium,
            FlowArg::Heavy => FlowIntensity::Heavy,
        }
    }
}

/// `None` keeps the stored value, `Some(None)` clears it.
fn patch<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

/// An empty list means "leave as is" unless clearing was asked for.
fn replace_list(values: Vec<String>, clear: bool) -> Option<Vec<String>> {
    if clear {
        Some(Vec::new())
    } else {
        (!values.is_empty()).then_some(values)
    }
}

fn today_or_now(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| chrono::Local::now().date_naive())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_profile(file: &Path) -> Result<ProfileData> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("could not read profile '{}'", file.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("profile '{}' is not a valid profile file", file.display()))
}

fn main() -> Result<()> {
    let args = Cli::parse();

    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    let tracker = Tracker::new(config.default_settings())?;

    if let Commands::Init { file, force } = &args.command {
        if file.exists() && !force {
            bail!("'{}' already exists, pass --force to overwrite", file.display());
        }
        let id = tracker.create_profile()?;
        fs::write(file, tracker.export(id)?)?;
        tracing::info!("profile written to {}", file.display());
        return Ok(());
    }

    let file = match &args.command {
        Commands::Init { file, .. }
        | Commands::Status { file, .. }
        | Commands::Settings { file, .. }
        | Commands::Log { file, .. }
        | Commands::Remove { file, .. }
        | Commands::Month { file, .. }
        | Commands::History { file } => file.clone(),
    };
    let id = tracker.import(read_profile(&file)?)?;

    let changed = match args.command {
        Commands::Init { .. } => false,
        Commands::Status { today, .. } => {
            print_json(&tracker.settings(id, today_or_now(today))?)?;
            false
        }
        Commands::Settings {
            cycle_length,
            period_length,
            last_period_start,
            clear_last_period_start,
            sensations,
            clear_sensations,
            today,
            ..
        } => {
            let update = SettingsUpdate {
                average_cycle_length: cycle_length,
                average_period_length: period_length,
                reference_period_start: patch(last_period_start, clear_last_period_start),
                custom_sensations: replace_list(sensations, clear_sensations),
            };
            print_json(&tracker.update_settings(id, &update, today_or_now(today))?)?;
            true
        }
        Commands::Log {
            date,
            flow,
            clear_flow,
            mood,
            clear_mood,
            notes,
            sensations,
            clear_sensations,
            ..
        } => {
            let input = EntryInput {
                date,
                flow_intensity: patch(flow.map(FlowIntensity::from), clear_flow),
                sensations: replace_list(sensations, clear_sensations),
                mood: patch(mood, clear_mood),
                notes,
            };
            print_json(&tracker.log_entry(id, input)?)?;
            true
        }
        Commands::Remove { date, .. } => {
            let removed = tracker.delete_entry(id, date)?;
            if !removed {
                tracing::warn!("nothing logged on {date}");
            }
            removed
        }
        Commands::Month { year, month, .. } => {
            print_json(&tracker.month(id, year, month)?)?;
            false
        }
        Commands::History { .. } => {
            print_json(&tracker.history(id)?)?;
            false
        }
    };

    if changed {
        fs::write(&file, tracker.export(id)?)
            .with_context(|| format!("could not write profile '{}'", file.display()))?;
    }
    Ok(())
}
