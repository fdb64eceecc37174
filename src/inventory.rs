use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::query::ResponseFormat;

/// A file present in the download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub file_name: String,
    /// File name up to the first `.`.
    pub layer: String,
    pub size: u64,
    pub path: PathBuf,
}

/// `<layer>.<ext>`; re-downloading a layer overwrites the same file.
pub fn local_file_name(layer: &str, format: ResponseFormat) -> String {
    format!("{}.{}", layer, format.extension())
}

/// Lists regular, non-hidden files in `dir`, sorted by name.
///
/// A directory that does not exist yet has nothing in it.
pub fn list_local_data(dir: &Path) -> Result<Vec<LocalEntry>> {
    let io_err = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };

    let read = match std::fs::read_dir(dir) {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("data directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(io_err(e)),
    };

    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(io_err)?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().map_err(io_err)?;
        if !meta.is_file() {
            continue;
        }
        let layer = file_name
            .split_once('.')
            .map(|(l, _)| l)
            .unwrap_or(&file_name)
            .to_string();
        entries.push(LocalEntry {
            path: entry.path(),
            file_name,
            layer,
            size: meta.len(),
        });
    }

    entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(entries)
}

/// Entries in `dir` whose file name starts with `layer`.
pub(crate) fn entries_for_layer(dir: &Path, layer: &str) -> Result<Vec<LocalEntry>> {
    let mut entries = list_local_data(dir)?;
    entries.retain(|e| e.file_name.starts_with(layer));
    Ok(entries)
}
