use std::process::{Command, Output};

use anyhow::Result;
use tracing::{debug, info};

use crate::config::WebServerConfig;
use crate::error::{ActivationError, MissingDependency};
use crate::tools::{combined_output, display_command, find_executable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    Enabled,
    AlreadyEnabled,
}

/// Client for the web server's site registry and reload.
#[derive(Debug, Clone)]
pub struct WebServer {
    enable_site: Vec<String>,
    configtest: Option<Vec<String>>,
    reload: Vec<String>,
}

impl WebServer {
    pub fn new(config: &WebServerConfig) -> Self {
        WebServer {
            enable_site: config.enable_site_command.clone(),
            configtest: config.configtest_command.clone(),
            reload: config.reload_command.clone(),
        }
    }

    /// Enable a site by its file name. A site that is already enabled counts
    /// as success.
    pub fn enable_site(&self, site_file: &str) -> Result<EnableOutcome> {
        let Some((program, args)) = self.enable_site.split_first() else {
            return Err(MissingDependency::install("a2ensite").into());
        };
        if find_executable(program).is_none() {
            return Err(MissingDependency::install(program).into());
        }
        let output = Command::new(program).args(args).arg(site_file).output()?;
        let text = combined_output(&output);
        debug!("enable {}: {}", site_file, text);

        if text.to_lowercase().contains("already enabled") {
            return Ok(EnableOutcome::AlreadyEnabled);
        }
        if output.status.success() {
            return Ok(EnableOutcome::Enabled);
        }
        Err(ActivationError::EnableFailed {
            site: site_file.to_string(),
            status: output.status.to_string(),
            output: text,
        }
        .into())
    }

    /// Run the configured syntax check. Returns false when none is configured.
    pub fn config_test(&self) -> Result<bool, ActivationError> {
        let Some(argv) = self.configtest.as_deref().filter(|a| !a.is_empty()) else {
            return Ok(false);
        };
        info!("Checking web server configuration: {}", display_command(argv));
        let output = run(argv).map_err(|e| ActivationError::ConfigTestFailed {
            status: "not started".to_string(),
            output: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(ActivationError::ConfigTestFailed {
                status: output.status.to_string(),
                output: combined_output(&output),
            });
        }
        Ok(true)
    }

    /// Process-wide reload. Any failure is fatal to the run.
    pub fn reload(&self) -> Result<(), ActivationError> {
        let command = display_command(&self.reload);
        info!("🔄 Reloading web server: {}", command);
        let output = run(&self.reload).map_err(|e| ActivationError::ReloadFailed {
            command: command.clone(),
            output: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(ActivationError::ReloadFailed {
                command,
                output: format!("{}: {}", output.status, combined_output(&output)),
            });
        }
        Ok(())
    }
}

fn run(argv: &[String]) -> std::io::Result<Output> {
    match argv.split_first() {
        Some((program, args)) => Command::new(program).args(args).output(),
        None => Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")),
    }
}
