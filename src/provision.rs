use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::asset::{refresh_asset, RefreshReport};
use crate::backup::BackupRecord;
use crate::cert::{rotate_certificate, RotationReport};
use crate::config::ProvisionConfig;
use crate::error::{UsageError, Warning, Warnings};
use crate::fetch::Fetcher;
use crate::rewrite::{rewrite_hostname, RewriteReport};
use crate::site::{self, ActivationReport, WrittenSite};
use crate::telephony::Telephony;
use crate::webserver::WebServer;

const STAGES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningRequest {
    pub subdomain: String,
}

impl ProvisioningRequest {
    /// Accepts one DNS label; stored lower-cased.
    pub fn parse(raw: &str) -> Result<Self, UsageError> {
        let label = raw.trim().to_ascii_lowercase();
        if label.is_empty() {
            return Err(UsageError("subdomain must not be empty".to_string()));
        }
        if label.len() > 63 {
            return Err(UsageError(format!("subdomain `{}` is longer than 63 characters", label)));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(UsageError(format!(
                "subdomain `{}` may only contain letters, digits and hyphens",
                label
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(UsageError(format!(
                "subdomain `{}` must not start or end with a hyphen",
                label
            )));
        }
        Ok(ProvisioningRequest { subdomain: label })
    }
}

/// Everything a run did, written as JSON when `global.report_file` is set.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub subdomain: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub hostnames: Vec<String>,
    pub sites: Vec<WrittenSite>,
    pub activation: Option<ActivationReport>,
    pub rewrite: Option<RewriteReport>,
    pub rotation: Option<RotationReport>,
    pub refresh: Option<RefreshReport>,
    pub warnings: Vec<Warning>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn backups(&self) -> Vec<&BackupRecord> {
        let mut all: Vec<&BackupRecord> = self.sites.iter().filter_map(|s| s.backup.as_ref()).collect();
        if let Some(r) = &self.rewrite {
            all.extend(r.backups.iter());
        }
        if let Some(r) = &self.rotation {
            all.extend(r.backups.iter());
        }
        if let Some(r) = &self.refresh {
            all.extend(r.backup.iter());
        }
        all
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write run report {}", path.display()))?;
        Ok(())
    }
}

/// Status line printed before each stage so a failed run shows where it stopped.
pub fn stage_banner(index: usize, title: &str) {
    println!(
        "{} {}",
        format!("==> [{}/{}]", index, STAGES).cyan().bold(),
        title.bold()
    );
    info!("Stage {}/{}: {}", index, STAGES, title);
}

pub struct Provisioner<'a> {
    config: &'a ProvisionConfig,
    fetcher: Fetcher,
    web: WebServer,
    telephony: Telephony,
}

impl<'a> Provisioner<'a> {
    pub fn new(config: &'a ProvisionConfig, fetcher: Fetcher) -> Self {
        Provisioner {
            config,
            fetcher,
            web: WebServer::new(&config.web_server),
            telephony: Telephony::new(&config.telephony),
        }
    }

    /// One linear run. The report is filled in as stages complete, so on a
    /// fatal error it still shows what was done.
    pub fn run(&self, request: &ProvisioningRequest, report: &mut RunReport) -> Result<()> {
        let cfg = self.config;
        let mut warnings = Warnings::new();
        report.subdomain = request.subdomain.clone();
        report.started_at = Local::now().to_rfc3339();
        debug!("Downloads go through {}", self.fetcher.transport_name());

        let outcome = self.run_stages(request, report, &mut warnings);
        report.warnings = warnings.items().to_vec();
        report.finished_at = Some(Local::now().to_rfc3339());
        if let Err(e) = &outcome {
            report.error = Some(format!("{:#}", e));
        }
        if let Some(path) = &cfg.global.report_file {
            match (report.write_to(path), &outcome) {
                (Ok(()), _) => {}
                // the stage failure decides the exit status, not the report
                (Err(write_err), Err(_)) => warn!("Run report not written: {:#}", write_err),
                (Err(write_err), Ok(())) => return Err(write_err),
            }
        }
        outcome
    }

    fn run_stages(
        &self,
        request: &ProvisioningRequest,
        report: &mut RunReport,
        warnings: &mut Warnings,
    ) -> Result<()> {
        let cfg = self.config;

        stage_banner(1, "Generating site definitions");
        let (admin, tenant) = site::generate(&request.subdomain, &cfg.site, &cfg.certificate.web_path);
        report.hostnames = vec![admin.hostname.clone(), tenant.hostname.clone()];
        let template = site::load_template(&cfg.site)?;
        let written = site::write_definitions(&[admin, tenant.clone()], &template, &cfg.web_server.sites_dir)?;
        report.sites = written.clone();

        stage_banner(2, "Enabling sites and reloading the web server");
        report.activation = Some(site::activate(&self.web, &written)?);

        stage_banner(3, "Rewriting placeholder hostname in the application tree");
        let root = cfg.rewrite.root.clone().unwrap_or_else(|| cfg.site.app_root());
        report.rewrite = Some(rewrite_hostname(
            &root,
            &cfg.rewrite.placeholder_host,
            &tenant.hostname,
            &cfg.rewrite,
            warnings,
        )?);

        stage_banner(4, "Rotating the wildcard certificate");
        report.rotation = Some(rotate_certificate(
            &self.fetcher,
            &cfg.certificate,
            &self.web,
            &self.telephony,
            warnings,
        )?);

        stage_banner(5, "Refreshing the calendar asset");
        report.refresh = Some(refresh_asset(&self.fetcher, &cfg.asset, warnings)?);

        Ok(())
    }
}
