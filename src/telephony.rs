use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::config::TelephonyConfig;
use crate::error::{Warning, Warnings};
use crate::tools::{combined_output, find_executable};

/// Control interface of the telephony server. The server may legitimately be
/// absent or stopped, so nothing here is fatal.
#[derive(Debug, Clone)]
pub struct Telephony {
    pub service_name: String,
    cli_path: String,
    reload_args: Vec<String>,
}

impl Telephony {
    pub fn new(config: &TelephonyConfig) -> Self {
        Telephony {
            service_name: config.service_name.clone(),
            cli_path: config.cli_path.clone(),
            reload_args: config.reload_args.clone(),
        }
    }

    pub fn cli(&self) -> Option<PathBuf> {
        find_executable(&self.cli_path)
    }

    /// Ask the running server to reload. Returns whether it did; every
    /// failure is recorded as a warning.
    pub fn reload(&self, warnings: &mut Warnings) -> bool {
        let Some(cli) = self.cli() else {
            warnings.push(Warning::ServiceReload {
                service: self.service_name.clone(),
                detail: format!("control binary `{}` not installed", self.cli_path),
            });
            return false;
        };

        info!("🔄 Reloading {} via {}", self.service_name, cli.display());
        match Command::new(&cli).args(&self.reload_args).output() {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                warnings.push(Warning::ServiceReload {
                    service: self.service_name.clone(),
                    detail: format!("{}: {}", out.status, combined_output(&out)),
                });
                false
            }
            Err(e) => {
                warnings.push(Warning::ServiceReload {
                    service: self.service_name.clone(),
                    detail: e.to_string(),
                });
                false
            }
        }
    }
}
