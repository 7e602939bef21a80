use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable naming an alternate configuration file.
pub const CONFIG_ENV: &str = "HOSTPROV_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostprov/config.yaml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    pub global: GlobalConfig,
    pub site: SiteConfig,
    pub web_server: WebServerConfig,
    pub rewrite: RewriteConfig,
    pub fetch: FetchConfig,
    pub certificate: CertConfig,
    pub telephony: TelephonyConfig,
    pub asset: AssetConfig,
}

impl ProvisionConfig {
    /// Built-in defaults, overridden by `$HOSTPROV_CONFIG` or, failing that,
    /// by `/etc/hostprov/config.yaml` when present.
    pub fn load() -> Result<(Self, Option<PathBuf>)> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = match explicit {
            Some(p) => Some(p),
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_PATH);
                p.exists().then_some(p)
            }
        };

        match path {
            Some(p) => Ok((Self::from_file(&p)?, Some(p))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document means "all defaults".
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(contents)?)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    pub log_directory: Option<String>,
    pub log_file_prefix: Option<String>,
    pub log_rotation: String, // "daily", "hourly", "never"
    pub report_file: Option<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            log_directory: None,
            log_file_prefix: None,
            log_rotation: "daily".to_string(),
            report_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub base_domain: String,
    pub admin_prefix: String,        // administrative host = <prefix><subdomain>.<base>
    pub web_root: PathBuf,           // document root of the administrative host
    pub app_subdir: String,          // tenant document root = web_root/app_subdir
    pub template_path: Option<PathBuf>, // replaces the built-in virtual-host template
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            base_domain: "gesditel.app".to_string(),
            admin_prefix: "config-".to_string(),
            web_root: PathBuf::from("/var/www/html"),
            app_subdir: "gesditel".to_string(),
            template_path: None,
        }
    }
}

impl SiteConfig {
    pub fn app_root(&self) -> PathBuf {
        self.web_root.join(&self.app_subdir)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct WebServerConfig {
    pub sites_dir: PathBuf,                     // e.g., /etc/apache2/sites-available
    pub enable_site_command: Vec<String>,       // site file name is appended
    pub configtest_command: Option<Vec<String>>,
    pub reload_command: Vec<String>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        WebServerConfig {
            sites_dir: PathBuf::from("/etc/apache2/sites-available"),
            enable_site_command: vec!["a2ensite".to_string()],
            configtest_command: Some(vec!["apache2ctl".to_string(), "configtest".to_string()]),
            reload_command: vec![
                "systemctl".to_string(),
                "reload".to_string(),
                "apache2".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    pub placeholder_host: String,
    pub root: Option<PathBuf>, // Default: site.web_root/site.app_subdir
    pub exclude_dirs: Vec<String>,
    pub exclude_extensions: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        RewriteConfig {
            placeholder_host: "demo.gesditel.app".to_string(),
            root: None,
            exclude_dirs: [".git", ".svn", ".hg", "node_modules", "vendor"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_extensions: ["zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "war"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub curl_path: String,
    pub wget_path: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            curl_path: "curl".to_string(),
            wget_path: "wget".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CertConfig {
    pub url: String,
    pub web_path: PathBuf,
    pub web_owner: String,
    pub web_group: String,
    pub web_mode: String,
    pub telephony_path: PathBuf,
    pub telephony_owner: String,
    pub telephony_group: String,
    pub telephony_mode: String,
}

impl Default for CertConfig {
    fn default() -> Self {
        CertConfig {
            url: "https://repo.gesditel.app/certs/wildcard.gesditel.app.pem".to_string(),
            web_path: PathBuf::from("/etc/ssl/gesditel/wildcard.gesditel.app.pem"),
            web_owner: "root".to_string(),
            web_group: "root".to_string(),
            web_mode: "0644".to_string(),
            telephony_path: PathBuf::from("/etc/asterisk/keys/wildcard.gesditel.app.pem"),
            telephony_owner: "root".to_string(),
            telephony_group: "asterisk".to_string(),
            telephony_mode: "0640".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct TelephonyConfig {
    pub service_name: String,
    pub cli_path: String,
    pub reload_args: Vec<String>,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        TelephonyConfig {
            service_name: "asterisk".to_string(),
            cli_path: "asterisk".to_string(),
            reload_args: vec!["-rx".to_string(), "core reload".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct AssetConfig {
    pub url: String,
    pub extract_dir: PathBuf,
    pub target_relative_path: PathBuf,
    pub owner: String,
    pub group: String,
    pub mode: String,
    pub extract_command: Vec<String>, // ${archive} and ${dest} are substituted
}

impl Default for AssetConfig {
    fn default() -> Self {
        AssetConfig {
            url: "https://repo.gesditel.app/packages/calendar.zip".to_string(),
            extract_dir: PathBuf::from("/var/www/html/gesditel/modules/calendar"),
            target_relative_path: PathBuf::from("calendar.php"),
            owner: "www-data".to_string(),
            group: "www-data".to_string(),
            mode: "0644".to_string(),
            extract_command: ["unzip", "-o", "-q", "${archive}", "-d", "${dest}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
