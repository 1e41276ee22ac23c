mod commands;
mod config;
mod llm;
mod server;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    PlannerOverrides, cmd_dashboard, cmd_export, cmd_import, cmd_log, cmd_profile_set,
    cmd_profile_show, cmd_recent, cmd_recommend, cmd_recommendations, cmd_stats, cmd_target_set,
    cmd_target_show, export_path,
};
use crate::config::{Config, LlmConfig};
use crate::llm::ChatClient;
use gluco_core::Session;
use gluco_core::models::MealRequest;

#[derive(Parser)]
#[command(
    name = "gluco",
    version,
    about = "A blood glucose tracker with meal recommendations",
    long_about = "\n\n   ██████╗ ██╗     ██╗   ██╗ ██████╗ ██████╗
  ██╔════╝ ██║     ██║   ██║██╔════╝██╔═══██╗
  ██║  ███╗██║     ██║   ██║██║     ██║   ██║
  ██║   ██║██║     ██║   ██║██║     ██║   ██║
  ╚██████╔╝███████╗╚██████╔╝╚██████╗╚██████╔╝
   ╚═════╝ ╚══════╝ ╚═════╝  ╚═════╝ ╚═════╝
        know where your numbers are going.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a glucose reading
    Log {
        /// Reading in mg/dL (40-500)
        value: i64,
        /// Period label, e.g. "Morning (Before Breakfast)", "Bedtime", "Other"
        #[arg(short, long, default_value = "Morning (Before Breakfast)")]
        period: String,
        /// Date of the reading (YYYY-MM-DD, today, yesterday; default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time of the reading (HH:MM, default: now)
        #[arg(long)]
        time: Option<String>,
        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent readings
    Recent {
        /// Number of readings to show
        #[arg(short, long, default_value = "5")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the dashboard: last reading, averages, time in range
    Dashboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show statistics and per-period averages for a time window
    Stats {
        /// Window: all, 7, 14, 30
        #[arg(short, long, default_value = "7")]
        window: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the target glucose range
    Target {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Manage the user profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Ask for a meal recommendation based on recent readings
    Recommend {
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long)]
        meal: String,
        /// Foods you are interested in eating
        #[arg(short, long, default_value = "")]
        foods: String,
        /// Dietary restriction (repeatable), e.g. vegan, gluten-free
        #[arg(short, long = "restriction")]
        restrictions: Vec<String>,
        /// Cuisine preference
        #[arg(short, long, default_value = "Any")]
        cuisine: String,
        /// Override the morning reading used for planning
        #[arg(long)]
        morning: Option<i64>,
        /// Override the afternoon reading used for planning
        #[arg(long)]
        afternoon: Option<i64>,
        /// Override the evening reading used for planning
        #[arg(long)]
        evening: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show past recommendations
    Recommendations {
        /// Show the whole history instead of only the latest
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export readings as CSV
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Save to glucose_readings_YYYYMMDD.csv in the current directory
        #[arg(short, long, conflicts_with = "output")]
        save: bool,
        /// Row order: newest, oldest, insertion
        #[arg(long, default_value = "newest")]
        order: String,
    },
    /// Import readings from a CSV export
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Set the target range
    Set {
        /// Lower bound in mg/dL (70-200)
        min: i64,
        /// Upper bound in mg/dL (70-200)
        max: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the target range
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Update name and/or diabetes type
    Set {
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
        /// Diabetes type: type1, type2, gestational, prediabetes, none
        #[arg(short = 't', long = "type")]
        diabetes_type: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    if let Commands::Serve {
        port,
        bind,
        no_auth,
    } = cli.command
    {
        let api_key = if no_auth {
            None
        } else {
            let (key, _) = config.load_or_create_api_key()?;
            Some(key)
        };
        let llm = ChatClient::new(LlmConfig::from_env()?)?;
        return server::start_server(Arc::new(llm), port, &bind, api_key).await;
    }

    let mut session = config.load_session()?;
    let revision = session.revision();

    let result = dispatch(cli.command, &mut session);

    if session.revision() != revision {
        config.save_session(&session)?;
    }
    result
}

fn dispatch(command: Commands, session: &mut Session) -> Result<()> {
    match command {
        Commands::Log {
            value,
            period,
            date,
            time,
            notes,
            json,
        } => cmd_log(session, value, &period, date, time, notes, json),
        Commands::Recent { limit, json } => cmd_recent(session, limit, json),
        Commands::Dashboard { json } => cmd_dashboard(session, json),
        Commands::Stats { window, json } => cmd_stats(session, &window, json),
        Commands::Target { command } => match command {
            TargetCommands::Set { min, max, json } => cmd_target_set(session, min, max, json),
            TargetCommands::Show { json } => cmd_target_show(session, json),
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                name,
                diabetes_type,
                json,
            } => cmd_profile_set(session, name, diabetes_type.as_deref(), json),
            ProfileCommands::Show { json } => cmd_profile_show(session, json),
        },
        Commands::Recommend {
            meal,
            foods,
            restrictions,
            cuisine,
            morning,
            afternoon,
            evening,
            json,
        } => {
            let llm = ChatClient::new(LlmConfig::from_env()?)?;
            let request = MealRequest {
                meal_type: meal,
                foods,
                restrictions,
                cuisine,
            };
            let overrides = PlannerOverrides {
                morning,
                afternoon,
                evening,
            };
            cmd_recommend(session, &llm, request, &overrides, json)
        }
        Commands::Recommendations { all, json } => cmd_recommendations(session, all, json),
        Commands::Export {
            output,
            save,
            order,
        } => {
            let path = export_path(output, save, &std::env::current_dir()?);
            cmd_export(session, path.as_deref(), &order)
        }
        Commands::Import { file, json } => cmd_import(session, &file, json),
        Commands::Serve { .. } => unreachable!("serve is handled before the session is loaded"),
    }
}
