#![warn(missing_docs)]
//! # botdesk-app binary
//!
//! Headless entry point: loads configuration, installs logging, starts the
//! settings runtime and prints the effective state.

use botdesk_app::{AppConfig, AppError, app_version, init_logging};
use botdesk_settings::SettingsRuntime;
use tracing::info;

/// CLI entry point.
fn main() {
    if let Err(error) = run() {
        eprintln!("failed to start botdesk: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    init_logging(&config)?;

    let settings = SettingsRuntime::start()?;
    info!(version = app_version(), "botdesk starting");

    println!("botdesk-app {}", app_version());
    println!(
        "payment timeouts: form={}ms credentials={}ms submit={}ms",
        config.payments.form_timeout_ms,
        config.payments.credentials_timeout_ms,
        config.payments.submit_timeout_ms
    );
    println!("{}", settings.snapshot().redacted().to_json()?);

    settings.finish();
    Ok(())
}
