use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// argv running `script` through `sh -c`; extra arguments land in `$1..`.
pub fn sh(script: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        script.to_string(),
        "hostprov-stub".to_string(),
    ]
}

/// Write an executable shell script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn current_user_and_group() -> (String, String) {
    let user = users::get_current_username()
        .expect("current user has a passwd entry")
        .to_string_lossy()
        .into_owned();
    let group = users::get_group_by_gid(users::get_current_gid())
        .expect("current group has a group entry")
        .name()
        .to_string_lossy()
        .into_owned();
    (user, group)
}

/// A group other than the current primary one that this process may chown
/// to: any group when running as root, otherwise a supplementary group.
pub fn other_group() -> Option<String> {
    let own_gid = users::get_current_gid();
    let candidates: Vec<users::Group> = if users::get_current_uid() == 0 {
        ["nogroup", "nobody", "daemon", "bin", "adm"]
            .iter()
            .filter_map(|n| users::get_group_by_name(n))
            .collect()
    } else {
        let name = users::get_current_username()?;
        users::get_user_groups(&name, own_gid)?
    };
    candidates
        .into_iter()
        .find(|g| g.gid() != own_gid)
        .map(|g| g.name().to_string_lossy().into_owned())
}

/// An account other than the current user, with its primary group, for
/// ownership hand-over tests run as root.
pub fn other_account() -> Option<(String, String)> {
    let own_uid = users::get_current_uid();
    ["nobody", "daemon", "www-data", "bin"]
        .iter()
        .filter_map(|n| users::get_user_by_name(n))
        .find(|u| u.uid() != own_uid)
        .and_then(|u| {
            let group = users::get_group_by_gid(u.primary_group_id())?;
            Some((
                u.name().to_string_lossy().into_owned(),
                group.name().to_string_lossy().into_owned(),
            ))
        })
}
