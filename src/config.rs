use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_SERVER_URL: &str = "https://erddap.bio-oracle.org/erddap";

const RC_FILE_NAME: &str = ".biooraclerc";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base ERDDAP URL, typically `https://erddap.bio-oracle.org/erddap`.
    pub url: String,
    /// Directory downloaded layers are written to.
    pub data_directory: PathBuf,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Overall per-request timeout. `None` lets large downloads run as long as they need.
    pub timeout: Option<Duration>,
    /// Show a progress bar while downloading.
    pub progress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            data_directory: default_data_directory(),
            verify: true,
            timeout: None,
            progress: true,
        }
    }
}

impl ClientConfig {
    /// Writes `url`, `data_directory` and `verify` as an rc file, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        self.write_rc(path).map_err(|source| Error::Config { source })
    }

    fn write_rc(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
        }
        let text = format!(
            "# Bio-ORACLE client configuration\nurl: {}\ndata_directory: {}\nverify: {}\n",
            self.url,
            self.data_directory.display(),
            if self.verify { 1 } else { 0 }
        );
        std::fs::write(path, text)
            .with_context(|| format!("failed to write configuration file {}", path.display()))
    }
}

pub(crate) fn default_data_directory() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("bio-oracle"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

#[derive(Debug, Default, PartialEq)]
struct RcConfig {
    url: Option<String>,
    data_directory: Option<String>,
    verify: Option<bool>,
}

/// Resolves configuration from the process environment.
///
/// Precedence: explicit arguments, then `BIOORACLE_URL` / `BIOORACLE_DATA_DIR`,
/// then the rc file (`BIOORACLE_RC`, `./.biooraclerc`, `~/.biooraclerc`), then
/// built-in defaults.
pub(crate) fn load_config(
    url: Option<String>,
    data_directory: Option<PathBuf>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    load_config_with(url, data_directory, verify, |k| std::env::var(k).ok())
}

pub(crate) fn load_config_with<F>(
    url: Option<String>,
    data_directory: Option<PathBuf>,
    verify: Option<bool>,
    env: F,
) -> Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut url = url.or_else(|| env("BIOORACLE_URL"));
    let mut data_directory =
        data_directory.or_else(|| env("BIOORACLE_DATA_DIR").map(PathBuf::from));
    let mut file_verify: Option<bool> = None;

    if url.is_none() || data_directory.is_none() || verify.is_none() {
        for rc_path in rc_candidates(&env) {
            if rc_path.exists() {
                let cfg = read_rc(&rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;
                log::debug!("using configuration file {}", rc_path.display());

                if url.is_none() {
                    url = cfg.url;
                }
                if data_directory.is_none() {
                    data_directory = cfg.data_directory.map(PathBuf::from);
                }
                file_verify = cfg.verify;
                break;
            }
        }
    }

    let defaults = ClientConfig::default();
    Ok(ClientConfig {
        url: url.unwrap_or(defaults.url),
        data_directory: data_directory.unwrap_or(defaults.data_directory),
        verify: verify.or(file_verify).unwrap_or(defaults.verify),
        ..defaults
    })
}

/// Rewrites one `key: value` line of an rc file, appending it when absent.
///
/// Other lines, comments included, are kept as they are. A missing file is
/// created.
pub fn update_setting(path: &Path, key: &str, value: &str) -> crate::Result<()> {
    rewrite_setting(path, key, value).map_err(|source| Error::Config { source })
}

fn rewrite_setting(path: &Path, key: &str, value: &str) -> Result<()> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read configuration file {}", path.display()));
        }
    };

    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let is_target = raw
            .split_once(':')
            .map(|(k, _)| k.trim() == key)
            .unwrap_or(false)
            && !raw.trim_start().starts_with('#');
        if is_target && !replaced {
            lines.push(format!("{}: {}", key, value));
            replaced = true;
        } else if !is_target {
            lines.push(raw.to_string());
        }
    }
    if !replaced {
        lines.push(format!("{}: {}", key, value));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    std::fs::write(path, out)
        .with_context(|| format!("failed to write configuration file {}", path.display()))
}

/// The rc file a new [`Client`](crate::Client) would read, if any exists.
pub fn config_path() -> Option<PathBuf> {
    rc_candidates(&|k: &str| std::env::var(k).ok())
        .into_iter()
        .find(|p| p.exists())
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((k, v)) = line.split_once(':') {
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                continue;
            }
            match k.trim() {
                "url" | "server" => cfg.url = Some(v.to_string()),
                "data_directory" => cfg.data_directory = Some(v.to_string()),
                "verify" => cfg.verify = Some(!matches!(v, "0" | "false" | "False" | "no")),
                _ => {}
            }
        }
    }

    cfg
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates<F>(env: &F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    // 1) BIOORACLE_RC (explicit)
    // 2) ./.biooraclerc
    // 3) ~/.biooraclerc
    if let Some(p) = env("BIOORACLE_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(RC_FILE_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(RC_FILE_NAME));
    }
    v
}
