use clap::Parser;
use mangos::args::{Args, Command};
use mangos::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().mangos_home().path();

    // When MANGOS_IN_TEST_MODE is set and non-empty the ledger is an in-memory sheet and no Google
    // API is called.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(
            home,
            init_args.sheet_url(),
            init_args.sheet_name(),
            init_args.client_id(),
            init_args.provider(),
            init_args.api_key(),
            init_args.model(),
        )
        .await?
        .print(),

        Command::Auth(auth_args) => {
            let config = Config::load(home).await?;
            if auth_args.sign_out() {
                commands::sign_out(&config).await?.print()
            } else if auth_args.status() {
                commands::auth_status(&config).await?.print()
            } else {
                commands::auth(&config, auth_args.complete()).await?.print()
            }
        }

        Command::Capture(capture_args) => {
            let config = Config::load(home).await?;
            commands::capture(&config, mode, &capture_args.text(), capture_args.confirm())
                .await?
                .print()
        }

        Command::Add(add_args) => {
            let config = Config::load(home).await?;
            commands::add(&config, mode, add_args.entries())
                .await?
                .print()
        }

        Command::Tabs => {
            let config = Config::load(home).await?;
            commands::tabs(&config, mode).await?.print()
        }

        Command::Summary => {
            let config = Config::load(home).await?;
            commands::summary(&config, mode).await?.print()
        }

        Command::Clone(clone_args) => {
            let mut config = Config::load(home).await?;
            commands::clone(&mut config, mode, clone_args.template())
                .await?
                .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => EnvFilter::from_default_env(),
        // Only this crate logs at `level` unless RUST_LOG says otherwise
        None => EnvFilter::new(format!(
            "{}={},{}={}",
            env!("CARGO_CRATE_NAME"),
            level,
            env!("CARGO_BIN_NAME"),
            level
        )),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
