use std::fs;
use std::os::unix::fs::{symlink, MetadataExt};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Marker inserted between an original path and its backup timestamp.
pub const BACKUP_MARKER: &str = ".bkp-";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub timestamp: String,
}

/// Snapshot `path` to `<path>.bkp-<YYYYMMDD-HHMMSS>` if it exists.
///
/// Directories are copied recursively. The original is never touched.
/// Two backups of the same path within one second share a name; the later
/// one replaces the earlier.
pub fn backup_if_exists(path: &Path) -> Result<Option<BackupRecord>> {
    backup_if_exists_at(path, Local::now())
}

pub fn backup_if_exists_at(path: &Path, now: DateTime<Local>) -> Result<Option<BackupRecord>> {
    // symlink_metadata so that a dangling link is still backed up as a link
    if fs::symlink_metadata(path).is_err() {
        debug!("No existing {} to back up", path.display());
        return Ok(None);
    }

    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let backup_path = backup_path_for(path, &timestamp);

    if fs::symlink_metadata(&backup_path).is_ok() {
        debug!("Replacing same-second backup {}", backup_path.display());
        remove_any(&backup_path)?;
    }

    copy_preserving(path, &backup_path)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup_path.display()))?;

    info!("💾 Backed up {} -> {}", path.display(), backup_path.display());

    Ok(Some(BackupRecord {
        original_path: path.to_path_buf(),
        backup_path,
        timestamp,
    }))
}

pub fn backup_path_for(path: &Path, timestamp: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(BACKUP_MARKER);
    s.push(timestamp);
    PathBuf::from(s)
}

/// True for names this module produces (`*.bkp-*`).
pub fn is_backup_artifact(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(BACKUP_MARKER))
        .unwrap_or(false)
}

fn remove_any(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn copy_preserving(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if !meta.is_dir() {
        return copy_entry(src, dst);
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };
        copy_entry(entry.path(), &target)?;
    }

    // Directory modes and mtimes are restored last: a read-only source dir
    // must still accept children, and writing children bumps mtimes.
    for entry in WalkDir::new(src).follow_links(false).contents_first(true) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            let rel = entry.path().strip_prefix(src)?;
            let meta = entry.metadata()?;
            let target = dst.join(rel);
            set_times(&target, &meta)?;
            fs::set_permissions(&target, meta.permissions())?;
        }
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)?;
    let ft = meta.file_type();

    if ft.is_symlink() {
        let target = fs::read_link(src)?;
        symlink(&target, dst)?;
        return Ok(());
    }

    if ft.is_dir() {
        fs::create_dir_all(dst)?;
    } else {
        // fs::copy carries the permission bits over
        fs::copy(src, dst)?;
        set_times(dst, &meta)?;
    }

    preserve_owner(dst, &meta);
    Ok(())
}

fn set_times(path: &Path, meta: &fs::Metadata) -> Result<()> {
    let mut times = fs::FileTimes::new();
    if let Ok(m) = meta.modified() {
        times = times.set_modified(m);
    }
    if let Ok(a) = meta.accessed() {
        times = times.set_accessed(a);
    }
    // Explicit timestamps only need ownership, a read-only handle is enough.
    fs::File::open(path)?.set_times(times)?;
    Ok(())
}

fn preserve_owner(path: &Path, meta: &fs::Metadata) {
    let uid = nix::unistd::Uid::from_raw(meta.uid());
    let gid = nix::unistd::Gid::from_raw(meta.gid());
    if let Err(e) = nix::unistd::chown(path, Some(uid), Some(gid)) {
        warn!(
            "Backup {} keeps the current owner (could not restore {}:{}): {}",
            path.display(),
            meta.uid(),
            meta.gid(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::os::unix::fs::PermissionsExt;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn missing_path_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let res = backup_if_exists(&dir.path().join("nope.conf")).unwrap();
        assert!(res.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_backup_restores_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("site.conf");
        let original: Vec<u8> = (0u8..=255).chain(b"\nServerName x\n".iter().copied()).collect();
        fs::write(&p, &original).unwrap();
        fs::set_permissions(&p, fs::Permissions::from_mode(0o640)).unwrap();

        let rec = backup_if_exists_at(&p, fixed_time()).unwrap().unwrap();
        assert_eq!(rec.original_path, p);
        assert_eq!(rec.timestamp, "20240309-140507");
        assert_eq!(
            rec.backup_path,
            dir.path().join("site.conf.bkp-20240309-140507")
        );
        // original untouched
        assert_eq!(fs::read(&p).unwrap(), original);

        // simulate a destructive write, then restore from the backup
        fs::write(&p, b"clobbered").unwrap();
        fs::copy(&rec.backup_path, &p).unwrap();
        assert_eq!(fs::read(&p).unwrap(), original);

        let mode = fs::metadata(&rec.backup_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn directory_backup_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("top.txt"), "top").unwrap();
        fs::write(root.join("a/b/deep.txt"), "deep").unwrap();
        symlink("top.txt", root.join("link")).unwrap();

        let rec = backup_if_exists_at(&root, fixed_time()).unwrap().unwrap();
        assert_eq!(fs::read_to_string(rec.backup_path.join("top.txt")).unwrap(), "top");
        assert_eq!(fs::read_to_string(rec.backup_path.join("a/b/deep.txt")).unwrap(), "deep");
        assert_eq!(
            fs::read_link(rec.backup_path.join("link")).unwrap(),
            PathBuf::from("top.txt")
        );
        assert!(root.join("a/b/deep.txt").exists());
    }

    #[test]
    fn same_second_backup_replaces_the_earlier_one() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cert.pem");
        fs::write(&p, "first").unwrap();
        let first = backup_if_exists_at(&p, fixed_time()).unwrap().unwrap();

        fs::write(&p, "second").unwrap();
        let second = backup_if_exists_at(&p, fixed_time()).unwrap().unwrap();

        assert_eq!(first.backup_path, second.backup_path);
        assert_eq!(fs::read_to_string(&second.backup_path).unwrap(), "second");
        // original + one backup
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn backup_artifacts_are_recognised() {
        assert!(is_backup_artifact(Path::new("/x/index.php.bkp-20240101-000000")));
        assert!(!is_backup_artifact(Path::new("/x/index.php")));
    }
}
