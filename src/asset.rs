use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::backup::{backup_if_exists, BackupRecord};
use crate::config::AssetConfig;
use crate::error::{ExtractionFailed, MissingDependency, Warning, Warnings};
use crate::fetch::{FetchResult, Fetcher};
use crate::ownership::{chown_or_warn, set_mode};
use crate::tools::{combined_output, display_command, find_executable};

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub fetched: FetchResult,
    pub target: PathBuf,
    pub backup: Option<BackupRecord>,
    pub target_present: bool,
    pub ownership_applied: bool,
}

/// Pull the packaged asset, unpack it over `extract_dir` and normalize the
/// target file.
pub fn refresh_asset(fetcher: &Fetcher, asset: &AssetConfig, warnings: &mut Warnings) -> Result<RefreshReport> {
    // Fail before anything is downloaded or backed up.
    let extractor = asset
        .extract_command
        .first()
        .ok_or_else(|| anyhow::anyhow!("asset.extract_command is empty"))?;
    if find_executable(extractor).is_none() {
        return Err(MissingDependency::install(extractor).into());
    }

    fs::create_dir_all(&asset.extract_dir)
        .with_context(|| format!("Failed to create {}", asset.extract_dir.display()))?;

    let target = asset.extract_dir.join(&asset.target_relative_path);
    let backup = backup_if_exists(&target)?;

    let archive = tempfile::Builder::new()
        .prefix("hostprov-asset-")
        .tempfile()
        .context("Failed to create temporary file for the asset archive")?;
    let fetched = fetcher
        .fetch(&asset.url, archive.path())
        .with_context(|| format!("Failed to fetch asset package from {}", asset.url))?;

    let argv = extract_argv(&asset.extract_command, archive.path(), &asset.extract_dir);
    info!("📦 Extracting: {}", display_command(&argv));
    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .with_context(|| format!("Failed to run {}", argv[0]))?;
    if !output.status.success() {
        return Err(ExtractionFailed {
            archive: asset.url.clone(),
            dest: asset.extract_dir.clone(),
            status: output.status.to_string(),
            output: combined_output(&output),
        }
        .into());
    }

    archive
        .close()
        .context("Failed to remove the temporary asset archive")?;

    let mut report = RefreshReport {
        fetched,
        target: target.clone(),
        backup,
        target_present: target.is_file(),
        ownership_applied: false,
    };

    if !report.target_present {
        warnings.push(Warning::NotFound {
            what: "expected file after extraction (package contents may have changed)".to_string(),
            path: target,
        });
        return Ok(report);
    }

    set_mode(&target, &asset.mode)?;
    report.ownership_applied = chown_or_warn(&target, &asset.owner, &asset.group, warnings);
    info!("✅ Refreshed {}", target.display());
    Ok(report)
}

fn extract_argv(template: &[String], archive: &Path, dest: &Path) -> Vec<String> {
    template
        .iter()
        .map(|a| {
            a.replace("${archive}", &archive.to_string_lossy())
                .replace("${dest}", &dest.to_string_lossy())
        })
        .collect()
}
