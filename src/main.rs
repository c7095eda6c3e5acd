use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};
use getandrun::{
    Configuration, Launcher, SessionOptions,
    config::Settings,
    error::{ConfigError, GetRunError, diagnostic},
    get_and_run,
};
use tracing_subscriber::EnvFilter;
mod args;
use args::Args;

fn print_usage() {
    println!("{}", Args::command().render_help());
}

fn load_settings(args: &Args) -> Result<Settings, ConfigError> {
    let Some(dir) = args.config_dir.clone().or_else(Settings::default_dir) else {
        return Ok(Settings::default());
    };
    Settings::load_from_dir(&dir).map_err(|e| ConfigError::Settings {
        path: Settings::config_path_for_dir(&dir),
        e,
    })
}

/// Settings file values with command line flags on top.
fn session_options(args: &Args, mut settings: Settings) -> Result<SessionOptions, GetRunError> {
    if let Some(user_agent) = &args.user_agent {
        settings.user_agent = Some(user_agent.clone());
    }
    if let Some(proxy) = &args.proxy {
        settings.proxy = Some(proxy.clone());
    }
    Ok(settings.session_options()?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            println!("{}", e.render());
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{}", diagnostic(&e));
            return ExitCode::FAILURE;
        }
    };

    let options = match session_options(&args, settings) {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("{}", diagnostic(&e));
            return ExitCode::FAILURE;
        }
    };

    let configuration = match Configuration::init(
        args.url.as_deref(),
        args.output.as_deref(),
        &args.params,
    ) {
        Ok(configuration) => configuration,
        Err(e) => {
            tracing::error!("{}", e);
            if e.is_usage_error() {
                print_usage();
            }
            return ExitCode::FAILURE;
        }
    };

    match get_and_run(configuration, options, &Launcher::default()).await {
        // transfer and launch failures are logged where they happen
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", diagnostic(&e));
            ExitCode::FAILURE
        }
    }
}
