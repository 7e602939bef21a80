use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::backup::{backup_if_exists, is_backup_artifact, BackupRecord};
use crate::config::RewriteConfig;
use crate::error::{Warning, Warnings};

/// Same window git uses to decide a file is binary.
const BINARY_SNIFF_LEN: usize = 8000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RewriteReport {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub changed: Vec<PathBuf>,
    pub backups: Vec<BackupRecord>,
}

/// Replace every literal `old_host` with `new_host` in the text files under
/// `root`. A missing tree or a tree with nothing to replace is a warning.
///
/// Backups are siblings of the rewritten files, so they land inside the
/// document root and are served as plain text (and listed, with
/// `Options Indexes`) unless the web server denies `*.bkp-*`.
pub fn rewrite_hostname(
    root: &Path,
    old_host: &str,
    new_host: &str,
    rules: &RewriteConfig,
    warnings: &mut Warnings,
) -> Result<RewriteReport> {
    let mut report = RewriteReport::default();

    if !root.is_dir() {
        warnings.push(Warning::NotFound {
            what: "application tree".to_string(),
            path: root.to_path_buf(),
        });
        return Ok(report);
    }
    if old_host.is_empty() || old_host == new_host {
        warnings.push(Warning::NothingToRewrite {
            root: root.to_path_buf(),
            detail: format!("placeholder `{}` is empty or already the target", old_host),
        });
        return Ok(report);
    }

    let needle = old_host.as_bytes();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e, rules));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
        if !entry.file_type().is_file() || is_skipped_file(entry.path(), rules) {
            continue;
        }
        report.files_scanned += 1;

        let path = entry.path();
        let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        if looks_binary(&content) {
            debug!("Skipping binary file {}", path.display());
            continue;
        }
        let Some(updated) = replace_all(&content, needle, new_host.as_bytes()) else {
            continue;
        };

        if let Some(rec) = backup_if_exists(path)? {
            report.backups.push(rec);
        }
        // fs::write truncates in place, so mode and owner stay as they were
        fs::write(path, updated).with_context(|| format!("Failed to rewrite {}", path.display()))?;
        info!("✏ Rewrote {} -> {} in {}", old_host, new_host, path.display());
        report.changed.push(path.to_path_buf());
    }

    report.files_changed = report.changed.len();
    if report.files_changed == 0 {
        warnings.push(Warning::NothingToRewrite {
            root: root.to_path_buf(),
            detail: format!("no text file references `{}`", old_host),
        });
    }
    Ok(report)
}

fn is_excluded_dir(entry: &DirEntry, rules: &RewriteConfig) -> bool {
    entry.file_type().is_dir()
        && rules
            .exclude_dirs
            .iter()
            .any(|d| entry.file_name() == d.as_str())
}

fn is_skipped_file(path: &Path, rules: &RewriteConfig) -> bool {
    if is_backup_artifact(path) {
        return true;
    }
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy();
            rules
                .exclude_extensions
                .iter()
                .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        }
        None => false,
    }
}

/// Content heuristic: a NUL byte near the start means binary.
pub fn looks_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// `None` when `needle` does not occur.
fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    let mut found = false;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
            found = true;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    found.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = "demo.gesditel.app";
    const NEW: &str = "acme.gesditel.app";

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("config")).unwrap();
        fs::create_dir_all(root.join("js")).unwrap();
        fs::write(root.join("index.php"), format!("<?php $host = '{OLD}';\n")).unwrap();
        fs::write(
            root.join("config/app.ini"),
            format!("url=https://{OLD}/\napi=https://{OLD}/api\n"),
        )
        .unwrap();
        fs::write(root.join("js/main.js"), format!("const base = \"//{OLD}\";\n")).unwrap();
        fs::write(root.join("README"), "nothing to see\n").unwrap();

        let mut blob = vec![0x89, b'P', b'N', b'G', 0, 0, 0, 13];
        blob.extend_from_slice(OLD.as_bytes());
        blob.extend_from_slice(&[0, 1, 2, 3]);
        fs::write(root.join("logo.txt"), &blob).unwrap();
        dir
    }

    #[test]
    fn rewrites_exactly_the_three_text_files() {
        let dir = tree();
        let root = dir.path();
        let binary_before = fs::read(root.join("logo.txt")).unwrap();
        let mut warnings = Warnings::new();

        let report = rewrite_hostname(root, OLD, NEW, &RewriteConfig::default(), &mut warnings).unwrap();

        assert_eq!(report.files_changed, 3);
        assert_eq!(report.backups.len(), 3);
        assert!(warnings.is_empty());
        assert_eq!(
            fs::read_to_string(root.join("config/app.ini")).unwrap(),
            format!("url=https://{NEW}/\napi=https://{NEW}/api\n")
        );
        assert!(!fs::read_to_string(root.join("index.php")).unwrap().contains(OLD));
        // binary detection is by content, the .txt extension does not matter
        assert_eq!(fs::read(root.join("logo.txt")).unwrap(), binary_before);
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = tree();
        let rules = RewriteConfig::default();
        let mut warnings = Warnings::new();

        let first = rewrite_hostname(dir.path(), OLD, NEW, &rules, &mut warnings).unwrap();
        assert_eq!(first.files_changed, 3);

        let second = rewrite_hostname(dir.path(), OLD, NEW, &rules, &mut warnings).unwrap();
        assert_eq!(second.files_changed, 0);
        assert!(second.backups.is_empty());
        assert!(matches!(
            warnings.items().last(),
            Some(Warning::NothingToRewrite { .. })
        ));
    }

    #[test]
    fn excluded_dirs_and_archives_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for d in [".git", "node_modules/pkg", "vendor/lib"] {
            fs::create_dir_all(root.join(d)).unwrap();
            fs::write(root.join(d).join("f.txt"), OLD).unwrap();
        }
        fs::write(root.join("bundle.tar.gz"), OLD).unwrap();
        fs::write(root.join("site.ZIP"), OLD).unwrap();
        fs::write(root.join("keep.conf"), OLD).unwrap();

        let mut warnings = Warnings::new();
        let report =
            rewrite_hostname(root, OLD, NEW, &RewriteConfig::default(), &mut warnings).unwrap();
        assert_eq!(report.changed, vec![root.join("keep.conf")]);
        assert_eq!(fs::read_to_string(root.join(".git/f.txt")).unwrap(), OLD);
        assert_eq!(fs::read_to_string(root.join("bundle.tar.gz")).unwrap(), OLD);

        // exclusions are configuration, not policy
        let rules = RewriteConfig {
            exclude_dirs: vec![],
            exclude_extensions: vec![],
            ..RewriteConfig::default()
        };
        let report = rewrite_hostname(root, OLD, NEW, &rules, &mut warnings).unwrap();
        assert_eq!(report.files_changed, 5);
    }

    #[test]
    fn missing_root_is_a_warning_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut warnings = Warnings::new();
        let report = rewrite_hostname(
            &dir.path().join("not-deployed"),
            OLD,
            NEW,
            &RewriteConfig::default(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(report.files_changed, 0);
        assert!(matches!(warnings.items()[0], Warning::NotFound { .. }));
    }

    #[test]
    fn byte_replacement() {
        assert_eq!(replace_all(b"a.b a.b", b"a.b", b"xyz"), Some(b"xyz xyz".to_vec()));
        assert_eq!(replace_all(b"aaa", b"aa", b"b"), Some(b"ba".to_vec()));
        assert_eq!(replace_all(b"abc", b"zz", b"y"), None);
        assert_eq!(replace_all(b"", b"a", b"y"), None);
        assert!(looks_binary(b"ab\0cd"));
        assert!(!looks_binary("ünïcode text".as_bytes()));
    }
}
