use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::tools::{combined_output, find_executable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub source_url: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
}

/// A way of pulling one URL onto disk. Implementations never retry.
pub trait Transport {
    fn name(&self) -> &'static str;
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// curl: fail on HTTP errors, follow redirects, no peer verification.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    pub program: PathBuf,
}

impl Transport for CurlTransport {
    fn name(&self) -> &'static str {
        "curl"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--fail", "--silent", "--show-error", "--location", "--insecure", "--output"])
            .arg(dest)
            .arg(url);
        run_transfer(self.name(), cmd, url)
    }
}

/// wget: quiet, no peer verification.
#[derive(Debug, Clone)]
pub struct WgetTransport {
    pub program: PathBuf,
}

impl Transport for WgetTransport {
    fn name(&self) -> &'static str {
        "wget"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--quiet", "--no-check-certificate", "--output-document"])
            .arg(dest)
            .arg(url);
        run_transfer(self.name(), cmd, url)
    }
}

fn run_transfer(tool: &'static str, mut cmd: Command, url: &str) -> Result<(), FetchError> {
    debug!("{} -> {:?}", tool, cmd);
    let output = cmd.output().map_err(|source| FetchError::Io {
        url: url.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(FetchError::TransferFailed {
            tool,
            url: url.to_string(),
            status: output.status.to_string(),
            stderr: combined_output(&output),
        });
    }
    Ok(())
}

/// Pick the first available transport, curl before wget. Done once per run.
pub fn probe_transport(config: &FetchConfig) -> Result<Box<dyn Transport>, FetchError> {
    if let Some(program) = find_executable(&config.curl_path) {
        info!("Using curl for downloads: {}", program.display());
        return Ok(Box::new(CurlTransport { program }));
    }
    if let Some(program) = find_executable(&config.wget_path) {
        info!("Using wget for downloads: {}", program.display());
        return Ok(Box::new(WgetTransport { program }));
    }
    Err(FetchError::NoTransportAvailable {
        tried: format!("{}, {}", config.curl_path, config.wget_path),
    })
}

pub struct Fetcher {
    transport: Box<dyn Transport>,
}

impl Fetcher {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Fetcher { transport }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Download `url` to `dest`, overwriting it. An empty result is an error
    /// whichever transport produced it.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<FetchResult, FetchError> {
        info!("⬇ Fetching {} via {}", url, self.transport.name());
        self.transport.fetch(url, dest)?;

        let size_bytes = match fs::metadata(dest) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(source) => {
                return Err(FetchError::Io {
                    url: url.to_string(),
                    source,
                })
            }
        };
        if size_bytes == 0 {
            return Err(FetchError::EmptyDownload { url: url.to_string() });
        }

        debug!("Fetched {} bytes into {}", size_bytes, dest.display());
        Ok(FetchResult {
            source_url: url.to_string(),
            local_path: dest.to_path_buf(),
            size_bytes,
        })
    }
}

/// In-memory transport for tests of the stages that download.
#[cfg(test)]
pub struct StaticTransport {
    pub body: Vec<u8>,
}

#[cfg(test)]
impl Transport for StaticTransport {
    fn name(&self) -> &'static str {
        "static"
    }

    fn fetch(&self, _url: &str, dest: &Path) -> Result<(), FetchError> {
        fs::write(dest, &self.body).map_err(|source| FetchError::Io {
            url: "static".to_string(),
            source,
        })
    }
}
