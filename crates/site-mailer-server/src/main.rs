use std::{
    io,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use site_mailer::{MailerConfig, MailerSettings, SettingsError, UreqClient, email_status};
use site_mailer_server::{AppState, build_router};
use tokio::net::TcpListener;
use tokio::runtime::Builder;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "site-mailer-server")]
#[command(about = "Relays website form submissions through Gmail", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the form endpoints.
    Serve {
        #[arg(long, env = "SITE_MAILER_BIND", default_value = "127.0.0.1:3000")]
        bind: String,
        #[arg(long, value_name = "SETTINGS_JSON")]
        settings: Option<PathBuf>,
    },
    /// Print the email configuration report and test the refresh token.
    Status {
        #[arg(long, value_name = "SETTINGS_JSON")]
        settings: Option<PathBuf>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    };
    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve { bind, settings } => {
            let config = MailerConfig::from_env(load_settings(settings.as_deref())?);
            serve(bind, config)
        }
        Command::Status { settings } => {
            let config = MailerConfig::from_env(load_settings(settings.as_deref())?);
            report_status(&config)
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<MailerSettings, CliError> {
    match path {
        Some(path) => MailerSettings::load(path).map_err(CliError::Settings),
        None => Ok(MailerSettings::default()),
    }
}

fn serve(bind: String, config: MailerConfig) -> Result<(), CliError> {
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "email credentials incomplete; submissions will fail");
    }
    let state = AppState::with_ureq(config);

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|source| CliError::Bind {
                addr: bind.clone(),
                source,
            })?;
        info!(addr = %bind, "site mailer listening");
        axum::serve(listener, build_router(state))
            .with_graceful_shutdown(wait_for_shutdown())
            .await
            .map_err(CliError::Serve)
    })
}

async fn wait_for_shutdown() {
    signal::ctrl_c().await.ok();
    info!("shutdown requested");
}

fn report_status(config: &MailerConfig) -> Result<(), CliError> {
    let client = UreqClient::new(config.settings.http_timeout());
    let report = email_status(config, &client);
    let rendered = serde_json::to_string_pretty(&report).map_err(CliError::Output)?;
    println!("{rendered}");
    let token_ok = report.token_test.as_ref().is_some_and(|test| test.success);
    if report.all_variables_set && token_ok {
        Ok(())
    } else {
        Err(CliError::EmailUnavailable)
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("settings: {0}")]
    Settings(#[source] SettingsError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
    #[error("failed to render report: {0}")]
    Output(#[source] serde_json::Error),
    #[error("email is not ready to send")]
    EmailUnavailable,
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Settings(_) => 2,
            CliError::EmailUnavailable => 3,
            CliError::Bind { .. } => 4,
            CliError::Serve(_) => 5,
            CliError::Runtime(_) => 1,
            CliError::Output(_) => 1,
        }
    }
}
