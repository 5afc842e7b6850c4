//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `goo_core` linkage and the environment configuration.
//! - Keep output deterministic for quick local sanity checks.

use goo_core::{init_logging, GooConfig, LogSettings, Store};
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(err) = init_logging(&LogSettings::from_env()) {
        eprintln!("goo logging={err}");
    }

    println!("goo_core version={}", goo_core::core_version());

    let config = match GooConfig::from_env() {
        Ok(Some(config)) => config,
        Ok(None) => {
            println!("goo url=unset");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            error!("event=cli_config module=cli status=error error={err}");
            eprintln!("goo config error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match Store::from_config(&config) {
        Ok(store) => {
            println!("goo url={} echo={}", store.url(), store.echo());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_open module=cli status=error error={err}");
            eprintln!("goo open error: {err}");
            ExitCode::FAILURE
        }
    }
}
