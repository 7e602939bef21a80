use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Bad or missing operator input. Raised before any stage touches the host.
#[derive(Debug, Error)]
#[error("usage error: {0}")]
pub struct UsageError(pub String);

/// A required external tool is not installed.
#[derive(Debug, Error)]
#[error("required tool `{tool}` not found: {remedy}")]
pub struct MissingDependency {
    pub tool: String,
    pub remedy: String,
}

impl MissingDependency {
    pub fn install(tool: &str) -> Self {
        MissingDependency {
            tool: tool.to_string(),
            remedy: format!("install the missing tool (e.g. `apt-get install {}`) and re-run", tool),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no download tool available (tried: {tried})")]
    NoTransportAvailable { tried: String },

    #[error("{tool} failed to fetch {url} ({status}): {stderr}")]
    TransferFailed {
        tool: &'static str,
        url: String,
        status: String,
        stderr: String,
    },

    #[error("download of {url} produced an empty file")]
    EmptyDownload { url: String },

    #[error("I/O error while fetching {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("enabling site {site} failed ({status}): {output}")]
    EnableFailed {
        site: String,
        status: String,
        output: String,
    },

    #[error("web server configuration test failed ({status}): {output}")]
    ConfigTestFailed { status: String, output: String },

    #[error("web server reload `{command}` failed: {output}")]
    ReloadFailed { command: String, output: String },
}

#[derive(Debug, Error)]
#[error("extracting {archive} into {dest:?} failed ({status}): {output}")]
pub struct ExtractionFailed {
    pub archive: String,
    pub dest: PathBuf,
    pub status: String,
    pub output: String,
}

/// chown outcome. Callers never propagate this: they downgrade it to
/// [`Warning::Ownership`].
#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("unknown user `{0}`")]
    UnknownUser(String),

    #[error("unknown group `{0}`")]
    UnknownGroup(String),

    #[error("chown {owner}:{group} {path:?}: {source}")]
    Chown {
        path: PathBuf,
        owner: String,
        group: String,
        #[source]
        source: nix::Error,
    },
}

/// Non-fatal outcome recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    ServiceReload { service: String, detail: String },
    NotFound { what: String, path: PathBuf },
    Ownership { path: PathBuf, detail: String },
    NothingToRewrite { root: PathBuf, detail: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ServiceReload { service, detail } => {
                write!(f, "{} reload skipped: {}", service, detail)
            }
            Warning::NotFound { what, path } => write!(f, "{} not found: {}", what, path.display()),
            Warning::Ownership { path, detail } => {
                write!(f, "could not set ownership of {}: {}", path.display(), detail)
            }
            Warning::NothingToRewrite { root, detail } => {
                write!(f, "nothing rewritten under {}: {}", root.display(), detail)
            }
        }
    }
}

/// Warnings accumulated over a run. Each one is logged as it is recorded.
#[derive(Debug, Default)]
pub struct Warnings {
    items: Vec<Warning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: Warning) {
        tracing::warn!("⚠ {}", warning);
        self.items.push(warning);
    }

    pub fn items(&self) -> &[Warning] {
        &self.items
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Process exit status for a fatal error, picked from the first typed error
/// found in the chain.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.is::<UsageError>() {
            return 2;
        }
        if cause.is::<MissingDependency>() {
            return 3;
        }
        if cause.is::<FetchError>() {
            return 4;
        }
        if cause.is::<ActivationError>() {
            return 5;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_follows_the_typed_cause_through_context() {
        let err = Err::<(), _>(FetchError::EmptyDownload { url: "https://x".into() })
            .context("rotating certificate")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 4);

        let err = anyhow::Error::new(ActivationError::ReloadFailed {
            command: "systemctl reload apache2".into(),
            output: "boom".into(),
        });
        assert_eq!(exit_code_for(&err), 5);

        let err = anyhow::Error::new(UsageError("empty".into()));
        assert_eq!(exit_code_for(&err), 2);

        let err = anyhow::Error::new(MissingDependency::install("unzip"));
        assert_eq!(exit_code_for(&err), 3);
        assert!(format!("{err}").contains("install the missing tool"));

        assert_eq!(exit_code_for(&anyhow::anyhow!("plain")), 1);
    }

    #[test]
    fn warnings_are_collected_in_order() {
        let mut w = Warnings::new();
        assert!(w.is_empty());
        w.push(Warning::NotFound { what: "tree".into(), path: PathBuf::from("/x") });
        w.push(Warning::ServiceReload { service: "asterisk".into(), detail: "absent".into() });
        assert_eq!(w.len(), 2);
        assert!(matches!(w.items()[0], Warning::NotFound { .. }));
        assert_eq!(w.items()[1].to_string(), "asterisk reload skipped: absent");
    }
}
