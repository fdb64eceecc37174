use anyhow::anyhow;
use reqwest::StatusCode;
use std::path::PathBuf;

use crate::constraint::Dimension;

/// Errors surfaced by the public API.
///
/// Constraint errors are raised before any network traffic. Transport and
/// server failures carry the `anyhow` context chain as their source.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "invalid constraint key `{key}` \
         (expected <time|depth|latitude|longitude><>=|<=|_step>)"
    )]
    InvalidConstraintKey { key: String },

    #[error("invalid value `{value}` for constraint `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("constraint set is empty")]
    EmptyConstraintSet,

    #[error(
        "invalid range for {dimension}: lower bound {lower} is greater than upper bound {upper}"
    )]
    InvalidRange {
        dimension: Dimension,
        lower: String,
        upper: String,
    },

    #[error("invalid step for {dimension}: `{value}` is not a positive integer")]
    InvalidStep { dimension: Dimension, value: String },

    #[error("catalog unavailable ({url})")]
    CatalogUnavailable {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("download of layer `{layer}` failed")]
    DownloadFailed {
        layer: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error")]
    Config {
        #[source]
        source: anyhow::Error,
    },

    #[error("`{layer}` is not a valid layer id (expected letters, digits and `_`)")]
    InvalidLayerId { layer: String },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Pulls `message="..."` out of an ERDDAP error body.
///
/// ERDDAP answers failed requests with a plain-text block such as:
///
/// ```text
/// Error {
///     code=404;
///     message="Not Found: Your query produced no matching results.";
/// }
/// ```
pub(crate) fn erddap_message(body: &str) -> Option<&str> {
    let start = body.find("message=\"")? + "message=\"".len();
    let rest = &body[start..];
    let end = rest.rfind("\";").or_else(|| rest.rfind('"'))?;
    let msg = rest[..end].trim();
    if msg.is_empty() { None } else { Some(msg) }
}

/// What a 404 most likely means for the endpoint `url` points at.
fn not_found_hint(url: &str) -> &'static str {
    if url.contains("/griddap/") {
        "- The layer id may be wrong (see list_layers), or the constraints select no data"
    } else if url.contains("/info/") {
        "- The layer id may be wrong (see list_layers)"
    } else {
        "- The server URL may be wrong; it should end in `/erddap`"
    }
}

pub(crate) fn format_erddap_error(status: StatusCode, url: &str, body: &str) -> anyhow::Error {
    let message = erddap_message(body).unwrap_or_else(|| body.trim());

    if status == StatusCode::NOT_FOUND {
        return anyhow!(
            "ERDDAP returned 404 for ({})\n{}\n\nServer message: {}",
            url,
            not_found_hint(url),
            message
        );
    }

    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return anyhow!(
            "ERDDAP refused the request as too large (HTTP 413) for ({})\n\
             - Narrow the bounds or increase the step\n\nServer message: {}",
            url,
            message
        );
    }

    anyhow!("request failed: HTTP {} for url ({})\n{}", status, url, message)
}
