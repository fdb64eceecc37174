use anyhow::Result;
use biooracle::{Client, ConstraintSet, DownloadRequest, LayerFilter, ResponseFormat, TimePeriod};
use serde_json::json;

fn main() -> Result<()> {
    // RUST_LOG=info shows catalog and download progress.
    env_logger::init();

    let client = Client::from_env()?;

    let layers = client.list_layers_filtered(
        &LayerFilter::new()
            .variable("thetao")
            .time_period(TimePeriod::Present),
    )?;
    println!("{} present-day temperature layer(s)", layers.len());

    let constraints = ConstraintSet::from_json(&json!({
        "time>=": "2000-01-01T00:00:00Z",
        "time<=": "2010-01-01T12:00:00Z",
        "time_step": 100,
        "latitude>=": 0,
        "latitude<=": 10,
        "latitude_step": 100,
        "longitude>=": 0,
        "longitude<=": 10,
        "longitude_step": 1
    }))?;
    let request = DownloadRequest::new(constraints).with_format(ResponseFormat::Csv);

    let report = client.download_layers(["thetao_baseline_2000_2019_depthsurf"], &request)?;
    for (layer, path) in report.succeeded() {
        println!("{layer} -> {}", path.display());
    }
    for (layer, err) in report.failed() {
        eprintln!("{layer}: {err}");
        let mut cause = std::error::Error::source(err);
        while let Some(c) = cause {
            eprintln!("  caused by: {c}");
            cause = c.source();
        }
    }

    for entry in client.list_local_data()? {
        println!("{}\t{} bytes", entry.file_name, entry.size);
    }
    Ok(())
}
