use anyhow::{Context, anyhow, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{LayerFilter, LayerInfo, parse_layer_ids, parse_layer_info};
use crate::config::{ClientConfig, load_config};
use crate::constraint::{ConstraintSet, ValidatedConstraints, validate};
use crate::error::{Error, Result, format_erddap_error};
use crate::inventory::{LocalEntry, entries_for_layer, list_local_data, local_file_name};
use crate::query::{ResponseFormat, SubsetQuery};
use crate::util::{error_chain, human_bytes, is_loopback_url, is_safe_layer_id, urljoin};

/// What to fetch for each layer of a download.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub constraints: ConstraintSet,
    /// Keep only these layer variables. Empty means every variable.
    pub variables: Vec<String>,
    pub format: ResponseFormat,
}

impl DownloadRequest {
    pub fn new(constraints: ConstraintSet) -> Self {
        Self {
            constraints,
            ..Self::default()
        }
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }
}

/// Result for one layer of a batch.
#[derive(Debug)]
pub struct LayerOutcome {
    pub layer: String,
    pub result: Result<PathBuf>,
}

/// Per-layer results of [`Client::download_layers`], in request order.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub outcomes: Vec<LayerOutcome>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(p) => Some((o.layer.as_str(), p.as_path())),
            Err(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(_) => None,
            Err(e) => Some((o.layer.as_str(), e)),
        })
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    data_directory: PathBuf,
    progress: bool,

    http: HttpClient,
}

impl Client {
    /// Creates a client using environment variables and/or `.biooraclerc`.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`data_directory` arguments
    /// - environment variables `BIOORACLE_URL` / `BIOORACLE_DATA_DIR`
    /// - config file from `BIOORACLE_RC` or `.biooraclerc`
    /// - built-in defaults
    pub fn new(
        url: Option<String>,
        data_directory: Option<PathBuf>,
        verify: Option<bool>,
    ) -> Result<Self> {
        let cfg = load_config(url, data_directory, verify)
            .map_err(|source| Error::Config { source })?;
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: ClientConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("biooracle-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("biooracle-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(cfg.timeout);

        if !cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        // A server on this machine never sits behind the system proxy.
        if is_loopback_url(&cfg.url) {
            builder = builder.no_proxy();
        }

        let http = builder
            .build()
            .context("failed to build HTTP client")
            .map_err(|source| Error::Config { source })?;

        Ok(Self {
            url: cfg.url.trim_end_matches('/').to_string(),
            data_directory: cfg.data_directory,
            progress: cfg.progress,
            http,
        })
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_data_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_directory = dir.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    /// Lists every layer id on the server, in server order.
    pub fn list_layers(&self) -> Result<Vec<String>> {
        let url = urljoin(&self.url, "tabledap/allDatasets.json?datasetID");
        log::info!("fetching layer catalog from {}", url);

        let ids = self
            .get_text(&url)
            .and_then(|body| parse_layer_ids(&body))
            .map_err(|source| Error::CatalogUnavailable {
                url: url.clone(),
                source,
            })?;

        log::info!("catalog lists {} layer(s)", ids.len());
        Ok(ids)
    }

    /// Lists layers matching `filter`, in server order.
    pub fn list_layers_filtered(&self, filter: &LayerFilter) -> Result<Vec<String>> {
        filter.warn_unknown();
        Ok(filter.apply(self.list_layers()?))
    }

    /// Fetches the dimensions and variables of one layer.
    pub fn layer_info(&self, layer: &str) -> Result<LayerInfo> {
        if !is_safe_layer_id(layer) {
            return Err(Error::InvalidLayerId {
                layer: layer.to_string(),
            });
        }
        let url = urljoin(&self.url, &format!("info/{}/index.json", layer));
        self.get_text(&url)
            .and_then(|body| parse_layer_info(layer, &body))
            .map_err(|source| Error::CatalogUnavailable { url, source })
    }

    /// Downloads one layer into the data directory and returns the file path.
    pub fn download_layer(&self, layer: &str, request: &DownloadRequest) -> Result<PathBuf> {
        let mut report = self.download_layers([layer], request)?;
        match report.outcomes.pop() {
            Some(outcome) => outcome.result,
            None => Err(Error::DownloadFailed {
                layer: layer.to_string(),
                source: anyhow!("no outcome recorded"),
            }),
        }
    }

    /// Downloads each layer in order with the same constraints.
    ///
    /// Invalid constraints fail the whole call before any request is sent.
    /// After that, a failing layer is recorded in the report and the next
    /// layer is still attempted.
    pub fn download_layers<I, S>(
        &self,
        layers: I,
        request: &DownloadRequest,
    ) -> Result<DownloadReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let constraints = validate(&request.constraints)?;

        std::fs::create_dir_all(&self.data_directory).map_err(|source| Error::Io {
            path: self.data_directory.clone(),
            source,
        })?;

        let mut report = DownloadReport::default();
        for layer in layers {
            let layer = layer.as_ref();
            let result = self
                .fetch_layer(layer, &constraints, request)
                .map_err(|source| Error::DownloadFailed {
                    layer: layer.to_string(),
                    source,
                });
            if let Err(e) = &result {
                log::warn!("{}", error_chain(e));
            }
            report.outcomes.push(LayerOutcome {
                layer: layer.to_string(),
                result,
            });
        }
        Ok(report)
    }

    /// Files currently in the data directory.
    pub fn list_local_data(&self) -> Result<Vec<LocalEntry>> {
        list_local_data(&self.data_directory)
    }

    fn fetch_layer(
        &self,
        layer: &str,
        constraints: &ValidatedConstraints,
        request: &DownloadRequest,
    ) -> anyhow::Result<PathBuf> {
        let info = self.layer_info(layer)?;
        log::info!(
            "selected layer '{}' ({}); info at {}",
            layer,
            info.dimensions
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            urljoin(&self.url, &format!("info/{}/index.html", layer))
        );

        log::info!("constraints: {}", constraints.as_set());
        for dim in constraints.as_set().dimensions() {
            if !info.has_dimension(dim) {
                log::warn!("layer '{}' has no {} axis; ignoring its constraints", layer, dim);
            }
        }

        let variables = select_variables(&info, &request.variables)?;
        let query = SubsetQuery::new(&info, constraints, request.format).with_variables(variables);
        let url = urljoin(&self.url, &format!("griddap/{}", query));

        let target = self
            .data_directory
            .join(local_file_name(layer, request.format));
        match entries_for_layer(&self.data_directory, layer) {
            Ok(existing) => {
                for entry in &existing {
                    log::info!(
                        "found local file {} ({})",
                        entry.path.display(),
                        human_bytes(entry.size)
                    );
                }
            }
            Err(e) => log::debug!("could not scan data directory: {}", error_chain(&e)),
        }
        log::info!("downloading '{}' to {}", layer, target.display());

        let resp = self.get(&url)?;
        let size = self.write_body(resp, &target)?;

        log::info!(
            "download finished at {}; file size is {}",
            target.display(),
            human_bytes(size)
        );
        Ok(target)
    }

    /// Streams `resp` into a hidden sibling file, then renames it over `target`.
    fn write_body(&self, mut resp: Response, target: &Path) -> anyhow::Result<u64> {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("invalid target path {}", target.display()))?;
        let partial = target.with_file_name(format!(".{}.part", file_name));

        let pb = if self.progress {
            let pb = match resp.content_length() {
                Some(len) => ProgressBar::new(len),
                None => ProgressBar::new_spinner(),
            };
            let style = ProgressStyle::with_template(
                "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
            )
            .context("invalid progress template")?
            .progress_chars("=>-");
            pb.set_style(style);
            Some(pb)
        } else {
            None
        };

        let mut out = File::create(&partial)
            .with_context(|| format!("failed to open {}", partial.display()))?;

        let copied = copy_body(&mut resp, &mut out, pb.as_ref(), &partial);

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        drop(out);

        let written = match copied {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(e);
            }
        };

        if let Err(e) = std::fs::rename(&partial, target) {
            let _ = std::fs::remove_file(&partial);
            return Err(e)
                .with_context(|| format!("failed to move download into {}", target.display()));
        }
        Ok(written)
    }

    fn get(&self, url: &str) -> anyhow::Result<Response> {
        log::debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("could not connect to {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(format_erddap_error(status, url, &text));
        }
        Ok(resp)
    }

    fn get_text(&self, url: &str) -> anyhow::Result<String> {
        self.get(url)?
            .text()
            .with_context(|| format!("failed to read response body from {}", url))
    }
}

fn copy_body(
    resp: &mut Response,
    out: &mut File,
    pb: Option<&ProgressBar>,
    partial: &Path,
) -> anyhow::Result<u64> {
    let mut written: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = resp.read(&mut buf).context("download interrupted")?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .with_context(|| format!("failed to write {}", partial.display()))?;
        written += n as u64;
        if let Some(pb) = pb {
            pb.inc(n as u64);
        }
    }
    out.flush()?;
    Ok(written)
}

fn select_variables<'a>(info: &'a LayerInfo, wanted: &[String]) -> anyhow::Result<Vec<&'a str>> {
    if wanted.is_empty() {
        if info.variables.is_empty() {
            bail!("layer `{}` has no data variables", info.id);
        }
        return Ok(info.variables.iter().map(String::as_str).collect());
    }

    for w in wanted {
        if !info.variables.contains(w) {
            log::warn!("layer '{}' has no variable '{}'", info.id, w);
        }
    }

    let selected: Vec<&str> = info
        .variables
        .iter()
        .filter(|v| wanted.contains(*v))
        .map(String::as_str)
        .collect();
    if selected.is_empty() {
        bail!(
            "none of the requested variables {:?} exist in layer `{}` (available: {:?})",
            wanted,
            info.id,
            info.variables
        );
    }
    log::info!("selected {} variable(s): {:?}", selected.len(), selected);
    Ok(selected)
}
