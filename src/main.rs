mod commands;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use commands::StatusFormat;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(name = "ecobee", about = "Control ecobee thermostats from the command line")]
struct Cli {
    /// ecobee API application key
    #[arg(short = 'i', long, global = true)]
    appid: Option<String>,

    /// Thermostat identifier
    #[arg(short, long, global = true)]
    thermostat: Option<String>,

    /// Token cache file (default: ~/.ecobee-authcache)
    #[arg(long, global = true)]
    authcache: Option<PathBuf>,

    /// Config file (default: <config dir>/ecobee-cli/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log HTTP exchanges and token handling to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all registered thermostats
    List,
    /// Display current thermostat status
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = StatusFormat::Human)]
        format: StatusFormat,
    },
    /// Hold the temperature between heat and cool setpoints
    Hold {
        /// Heat setpoint in °F
        #[arg(long)]
        heat: Option<f64>,
        /// Cool setpoint in °F
        #[arg(long)]
        cool: Option<f64>,
        /// How long to hold, e.g. 90m or 2h
        #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
        duration: Duration,
        /// Shift the current setpoints by +N or -N degrees (at most 2)
        #[arg(allow_negative_numbers = true)]
        relative: Option<String>,
    },
    /// Run the fan
    Fan {
        /// How long to run the fan
        #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
        duration: Duration,
    },
    /// Display a message on the thermostat
    Message {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Resume the scheduled program, releasing any holds
    Resume {
        /// Resume all events, not just the most recent hold
        #[arg(long)]
        all: bool,
    },
    /// Authorize without waiting on the console
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Request a PIN to enter on the ecobee portal
    Pin,
    /// Exchange the code printed by `auth pin` for a token
    Token {
        #[arg(long)]
        code: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ecobee=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let settings = config::load(cli.config.as_deref())?.merge(cli.appid, cli.thermostat, cli.authcache);
    let client = ecobee::Client::new(settings.appid()?, settings.auth_cache()?)?;

    let outcome = match cli.command {
        Commands::List => commands::list(&client).await,
        Commands::Auth { action } => match action {
            AuthAction::Pin => commands::auth_pin(&client).await,
            AuthAction::Token { code } => commands::auth_token(&client, &code).await,
        },
        Commands::Status { format } => {
            commands::status(&client, settings.thermostat()?, format).await
        }
        Commands::Hold {
            heat,
            cool,
            duration,
            relative,
        } => {
            commands::hold(
                &client,
                settings.thermostat()?,
                heat,
                cool,
                relative.as_deref(),
                duration,
            )
            .await
        }
        Commands::Fan { duration } => commands::fan(&client, settings.thermostat()?, duration).await,
        Commands::Message { text } => {
            commands::message(&client, settings.thermostat()?, &text).await
        }
        Commands::Resume { all } => commands::resume(&client, settings.thermostat()?, all).await,
    };
    outcome?;

    // The command ran with the fresh token; report the failed save after it.
    match client.take_persist_error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
