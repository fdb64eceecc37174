//! A small Rust client for the Bio-ORACLE ERDDAP server.
//!
//! This crate covers the usual griddap workflow:
//! list the layers the server offers, describe a subset with bounds and
//! strides, download the resulting file, and see what is already on disk.
//!
//! ## Quick start
//! - Optionally point the client at another server or data directory via environment
//!   variables (`BIOORACLE_URL`, `BIOORACLE_DATA_DIR`) or a `.biooraclerc` file
//!   (supported in the current directory and in your home directory).
//! - Build a [`ConstraintSet`] and call [`Client::download_layers`].
//!
//! ```no_run
//! use biooracle::{Client, ConstraintSet, DownloadRequest};
//! use serde_json::json;
//!
//! fn main() -> biooracle::Result<()> {
//!     let client = Client::from_env()?;
//!     let constraints = ConstraintSet::from_json(&json!({
//!         "time>=": "2000-01-01T00:00:00Z",
//!         "time<=": "2010-01-01T00:00:00Z",
//!         "latitude>=": 50.0,
//!         "latitude<=": 50.5,
//!         "longitude>=": 5.1,
//!         "longitude<=": 6.0
//!     }))?;
//!     let report = client.download_layers(
//!         ["thetao_baseline_2000_2019_depthsurf"],
//!         &DownloadRequest::new(constraints),
//!     )?;
//!     for (layer, err) in report.failed() {
//!         match std::error::Error::source(err) {
//!             Some(cause) => eprintln!("{layer}: {err}: {cause}"),
//!             None => eprintln!("{layer}: {err}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Logging goes through the [`log`] facade; install any logger to see it.

#![forbid(unsafe_code)]

mod catalog;
mod client;
mod config;
mod constraint;
mod error;
mod inventory;
mod query;
mod util;

pub use catalog::{KNOWN_SCENARIOS, KNOWN_VARIABLES, LayerFilter, LayerInfo, TimePeriod};
pub use client::{Client, DownloadReport, DownloadRequest, LayerOutcome};
pub use config::{ClientConfig, DEFAULT_SERVER_URL, config_path, update_setting};
pub use constraint::{
    ConstraintKey, ConstraintSet, ConstraintValue, Dimension, Operator, ValidatedConstraints,
    validate,
};
pub use error::{Error, Result};
pub use inventory::{LocalEntry, list_local_data, local_file_name};
pub use query::{ResponseFormat, SubsetQuery};
