use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::backup::{backup_if_exists, BackupRecord};
use crate::config::SiteConfig;
use crate::webserver::{EnableOutcome, WebServer};

/// Built-in virtual-host template: a plain-HTTP listener that only redirects,
/// and the TLS listener serving the document root.
pub const DEFAULT_TEMPLATE: &str = r#"<VirtualHost *:80>
    ServerName ${hostname}
    Redirect permanent / https://${hostname}/
</VirtualHost>

<VirtualHost *:443>
    ServerName ${hostname}
    DocumentRoot ${document_root}

    SSLEngine on
    SSLCertificateFile ${certificate_path}

    <Directory ${document_root}>
        Options Indexes FollowSymLinks
        AllowOverride All
        Require all granted
    </Directory>

    ErrorLog ${APACHE_LOG_DIR}/${hostname}-error.log
    CustomLog ${APACHE_LOG_DIR}/${hostname}-access.log combined
</VirtualHost>
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteDefinition {
    pub hostname: String,
    pub document_root: PathBuf,
    pub certificate_path: PathBuf,
}

impl SiteDefinition {
    pub fn config_file_name(&self) -> String {
        format!("{}.conf", self.hostname)
    }
}

/// Derive the administrative and tenant definitions for `subdomain`.
pub fn generate(
    subdomain: &str,
    site: &SiteConfig,
    certificate_path: &Path,
) -> (SiteDefinition, SiteDefinition) {
    let admin = SiteDefinition {
        hostname: format!("{}{}.{}", site.admin_prefix, subdomain, site.base_domain),
        document_root: site.web_root.clone(),
        certificate_path: certificate_path.to_path_buf(),
    };
    let tenant = SiteDefinition {
        hostname: format!("{}.{}", subdomain, site.base_domain),
        document_root: site.app_root(),
        certificate_path: certificate_path.to_path_buf(),
    };
    (admin, tenant)
}

pub fn load_template(site: &SiteConfig) -> Result<String> {
    match &site.template_path {
        Some(p) => fs::read_to_string(p)
            .with_context(|| format!("Failed to read site template: {}", p.display())),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

pub fn render(def: &SiteDefinition, template: &str) -> String {
    template
        .replace("${hostname}", &def.hostname)
        .replace("${document_root}", &def.document_root.to_string_lossy())
        .replace("${certificate_path}", &def.certificate_path.to_string_lossy())
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenSite {
    pub definition: SiteDefinition,
    pub config_path: PathBuf,
    pub backup: Option<BackupRecord>,
}

/// Render each definition into `sites_dir`, backing up whatever was there.
pub fn write_definitions(
    defs: &[SiteDefinition],
    template: &str,
    sites_dir: &Path,
) -> Result<Vec<WrittenSite>> {
    fs::create_dir_all(sites_dir)
        .with_context(|| format!("Failed to create sites directory {}", sites_dir.display()))?;

    let mut written = Vec::with_capacity(defs.len());
    for def in defs {
        let config_path = sites_dir.join(def.config_file_name());
        let backup = backup_if_exists(&config_path)?;

        // Always write, so a re-run picks up template changes.
        fs::write(&config_path, render(def, template))
            .with_context(|| format!("Failed to write site definition {}", config_path.display()))?;
        info!("📝 Generated site definition: {}", config_path.display());

        written.push(WrittenSite {
            definition: def.clone(),
            config_path,
            backup,
        });
    }
    Ok(written)
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivationReport {
    pub enabled: Vec<String>,
    pub already_enabled: Vec<String>,
    pub config_tested: bool,
}

/// Enable every written site, then reload the web server once.
pub fn activate(server: &WebServer, sites: &[WrittenSite]) -> Result<ActivationReport> {
    let mut report = ActivationReport {
        enabled: Vec::new(),
        already_enabled: Vec::new(),
        config_tested: false,
    };

    for site in sites {
        let file_name = site.definition.config_file_name();
        match server
            .enable_site(&file_name)
            .with_context(|| format!("Failed to enable site {}", file_name))?
        {
            EnableOutcome::Enabled => {
                info!("✅ Enabled {}", file_name);
                report.enabled.push(file_name);
            }
            EnableOutcome::AlreadyEnabled => {
                info!("{} already enabled", file_name);
                report.already_enabled.push(file_name);
            }
        }
    }

    report.config_tested = server.config_test()?;
    server.reload()?;
    Ok(report)
}
