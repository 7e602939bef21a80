mod asset;
mod backup;
mod cert;
mod config;
mod error;
mod fetch;
mod ownership;
mod provision;
mod rewrite;
mod site;
mod telephony;
mod tools;
mod webserver;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::{error, info};

use crate::config::{GlobalConfig, ProvisionConfig};
use crate::error::exit_code_for;
use crate::fetch::{probe_transport, Fetcher};
use crate::provision::{Provisioner, ProvisioningRequest, RunReport};

#[derive(Debug, Parser)]
#[command(
    name = "hostprov",
    version,
    about = "Provision a tenant subdomain: virtual hosts, hostname rewrite, certificate and calendar asset."
)]
struct Cli {
    /// Tenant label, e.g. `acme` for acme.gesditel.app
    subdomain: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Nothing is logged until the configuration names the log destination.
    let (config, source) = match ProvisionConfig::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{} {:#}", "hostprov:".red().bold(), e);
            return ExitCode::from(exit_code_for(&e));
        }
    };
    let _guard = init_tracing(&config.global);

    match real_main(&cli, &config, source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Provisioning failed: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn real_main(cli: &Cli, config: &ProvisionConfig, source: Option<PathBuf>) -> anyhow::Result<()> {
    match source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using built-in defaults"),
    }
    let request = ProvisioningRequest::parse(&cli.subdomain)?;

    info!("🚀 Provisioning subdomain '{}'", request.subdomain);
    let fetcher = Fetcher::new(probe_transport(&config.fetch)?);

    let provisioner = Provisioner::new(config, fetcher);
    let mut report = RunReport::default();
    provisioner.run(&request, &mut report)?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!(
        "{} {}",
        "✅ Provisioned".green().bold(),
        report.hostnames.join(", ")
    );
    let backups = report.backups();
    if !backups.is_empty() {
        println!("   {} backup(s) taken", backups.len());
    }
    if report.warnings.is_empty() {
        return;
    }
    println!(
        "{}",
        format!("⚠ {} warning(s):", report.warnings.len()).yellow().bold()
    );
    for w in &report.warnings {
        println!("   - {}", w);
    }
}

/// Console logging always; a rolling file is added when `log_directory` is set.
fn init_tracing(global_config: &GlobalConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    // Determine log level from RUST_LOG env var or default to "info"
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match global_config.log_directory {
        Some(ref log_dir) => {
            let file_prefix = global_config
                .log_file_prefix
                .as_deref()
                .unwrap_or("hostprov");

            let file_appender = match global_config.log_rotation.as_str() {
                "daily" => tracing_appender::rolling::daily(log_dir, file_prefix),
                "hourly" => tracing_appender::rolling::hourly(log_dir, file_prefix),
                _ => tracing_appender::rolling::never(log_dir, file_prefix),
            };
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(tracing_subscriber::EnvFilter::new(&log_level))
        .init();

    if let Some(ref log_dir) = global_config.log_directory {
        eprintln!("✅ Logging to stderr and {}", log_dir);
    }
    guard
}
