use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Output;

/// Resolve a tool the way a shell would: a name containing `/` is checked as
/// a path, a bare name is searched for in `$PATH`.
pub fn find_executable(tool: &str) -> Option<PathBuf> {
    if tool.is_empty() {
        return None;
    }
    which::which(tool).ok()
}

/// Render an argv vector for logging.
pub fn display_command<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// stdout and stderr of a finished command, trimmed and joined.
pub fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    [stdout.trim(), stderr.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}
