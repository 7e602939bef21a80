use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::backup::{backup_if_exists, BackupRecord};
use crate::config::CertConfig;
use crate::error::Warnings;
use crate::fetch::{FetchResult, Fetcher};
use crate::ownership::{chown_or_warn, parse_mode};
use crate::telephony::Telephony;
use crate::webserver::WebServer;

#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub fetched: FetchResult,
    pub web_path: PathBuf,
    pub telephony_path: PathBuf,
    pub backups: Vec<BackupRecord>,
    pub telephony_reloaded: bool,
}

/// Replace the shared wildcard certificate in both stores and reload both
/// consumers. Only the web server reload is fatal.
pub fn rotate_certificate(
    fetcher: &Fetcher,
    cert: &CertConfig,
    web: &WebServer,
    telephony: &Telephony,
    warnings: &mut Warnings,
) -> Result<RotationReport> {
    let web_mode = parse_mode(&cert.web_mode)?;
    let telephony_mode = parse_mode(&cert.telephony_mode)?;
    check_telephony_mode(web_mode, telephony_mode)?;

    for dest in [&cert.web_path, &cert.telephony_path] {
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create certificate directory {}", dir.display()))?;
        }
    }

    let tmp = tempfile::Builder::new()
        .prefix("hostprov-cert-")
        .suffix(".pem")
        .tempfile()
        .context("Failed to create temporary file for the certificate")?;
    let fetched = fetcher
        .fetch(&cert.url, tmp.path())
        .with_context(|| format!("Failed to fetch certificate bundle from {}", cert.url))?;
    let bundle = fs::read(tmp.path())
        .with_context(|| format!("Failed to read downloaded bundle {}", tmp.path().display()))?;

    let mut backups = Vec::new();

    info!("1️⃣ Installing web server certificate: {}", cert.web_path.display());
    backups.extend(backup_if_exists(&cert.web_path)?);
    install_atomically(&bundle, &cert.web_path, web_mode)?;
    chown_or_warn(&cert.web_path, &cert.web_owner, &cert.web_group, warnings);

    info!("2️⃣ Installing telephony certificate: {}", cert.telephony_path.display());
    backups.extend(backup_if_exists(&cert.telephony_path)?);
    install_atomically(&bundle, &cert.telephony_path, telephony_mode)?;
    chown_or_warn(
        &cert.telephony_path,
        &cert.telephony_owner,
        &cert.telephony_group,
        warnings,
    );

    info!("3️⃣ Reloading {}", telephony.service_name);
    let telephony_reloaded = telephony.reload(warnings);

    info!("4️⃣ Reloading web server");
    web.reload()
        .context("Web server reload failed after certificate swap; it may be serving a stale certificate")?;

    Ok(RotationReport {
        fetched,
        web_path: cert.web_path.clone(),
        telephony_path: cert.telephony_path.clone(),
        backups,
        telephony_reloaded,
    })
}

/// The telephony copy must grant nothing to others and strictly less than the
/// web copy.
fn check_telephony_mode(web_mode: u32, telephony_mode: u32) -> Result<()> {
    if telephony_mode & 0o007 != 0 {
        anyhow::bail!(
            "certificate.telephony_mode {:04o} grants access to others",
            telephony_mode
        );
    }
    if telephony_mode & !web_mode != 0 || telephony_mode == web_mode {
        anyhow::bail!(
            "certificate.telephony_mode {:04o} must be stricter than web_mode {:04o}",
            telephony_mode,
            web_mode
        );
    }
    Ok(())
}

/// Write `content` next to `dest` with `mode` already applied, then rename
/// over `dest`. Readers see either the old or the new file.
fn install_atomically(content: &[u8], dest: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage certificate in {}", dir.display()))?;
    staged.write_all(content)?;
    staged.as_file().sync_all()?;
    fs::set_permissions(staged.path(), fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set mode {:o} on staged certificate", mode))?;
    staged
        .persist(dest)
        .with_context(|| format!("Failed to install certificate at {}", dest.display()))?;
    Ok(())
}
