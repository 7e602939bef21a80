use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use nix::unistd::{chown, Gid, Uid};
use tracing::debug;
use users::{get_group_by_name, get_user_by_name};

use crate::error::{OwnershipError, Warning, Warnings};

/// Parse an octal mode string such as "0644" or "640".
pub fn parse_mode(mode: &str) -> Result<u32> {
    let trimmed = mode.trim();
    let digits = trimmed.trim_start_matches('0');
    if digits.is_empty() && !trimmed.is_empty() {
        return Ok(0);
    }
    let value = u32::from_str_radix(digits, 8).with_context(|| format!("Invalid mode '{}'", mode))?;
    if value > 0o7777 {
        anyhow::bail!("Invalid mode '{}': out of range", mode);
    }
    Ok(value)
}

pub fn set_mode(path: &Path, mode: &str) -> Result<()> {
    let value = parse_mode(mode)?;
    fs::set_permissions(path, fs::Permissions::from_mode(value))
        .with_context(|| format!("Failed to set mode {} for {}", mode, path.display()))?;
    debug!("      mode: {} {}", mode, path.display());
    Ok(())
}

/// chown by user and group name.
pub fn chown_by_name(path: &Path, owner: &str, group: &str) -> Result<(), OwnershipError> {
    let uid = get_user_by_name(owner)
        .map(|u| u.uid())
        .ok_or_else(|| OwnershipError::UnknownUser(owner.to_string()))?;
    let gid = get_group_by_name(group)
        .map(|g| g.gid())
        .ok_or_else(|| OwnershipError::UnknownGroup(group.to_string()))?;

    chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(|source| {
        OwnershipError::Chown {
            path: path.to_path_buf(),
            owner: owner.to_string(),
            group: group.to_string(),
            source,
        }
    })?;
    debug!("      owner: {}:{} {}", owner, group, path.display());
    Ok(())
}

/// chown where failure is tolerated: the error becomes a recorded warning.
pub fn chown_or_warn(path: &Path, owner: &str, group: &str, warnings: &mut Warnings) -> bool {
    match chown_by_name(path, owner, group) {
        Ok(()) => true,
        Err(e) => {
            warnings.push(Warning::Ownership {
                path: path.to_path_buf(),
                detail: e.to_string(),
            });
            false
        }
    }
}
