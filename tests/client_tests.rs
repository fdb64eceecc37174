mod common;

use biooracle::{
    ConstraintSet, DownloadRequest, Error, LayerFilter, ResponseFormat, TimePeriod,
    local_file_name,
};
use common::{CATALOG, FakeErddap, Route, client_for, error_chain, surface_info, unreachable_url};
use serde_json::json;

const THETAO: &str = "thetao_baseline_2000_2019_depthsurf";
const SO: &str = "so_ssp585_2020_2100_depthsurf";

fn reference_request() -> DownloadRequest {
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
    }))
    .unwrap();
    DownloadRequest::new(constraints)
}

#[test]
fn lists_layers_in_server_order() {
    let server = FakeErddap::start(vec![Route::ok("/erddap/tabledap/allDatasets.json", CATALOG)]);
    let dir = tempfile::tempdir().unwrap();

    let layers = server.client(dir.path()).list_layers().unwrap();
    assert_eq!(layers, [THETAO, SO, "chl_baseline_2000_2018_depthmax"]);
    assert_eq!(server.requests(), ["/erddap/tabledap/allDatasets.json?datasetID"]);
}

#[test]
fn filtered_listing() {
    let server = FakeErddap::start(vec![Route::ok("/erddap/tabledap/allDatasets.json", CATALOG)]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let present = client
        .list_layers_filtered(&LayerFilter::new().time_period(TimePeriod::Present))
        .unwrap();
    assert_eq!(present, [THETAO, "chl_baseline_2000_2018_depthmax"]);

    let ssp = client
        .list_layers_filtered(&LayerFilter::new().scenario("SSP585"))
        .unwrap();
    assert_eq!(ssp, [SO]);
}

#[test]
fn unreachable_catalog_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let client = client_for(&unreachable_url(), dir.path());

    let err = client.list_layers().unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }), "{err:?}");
}

#[test]
fn unparsable_catalog_is_unavailable() {
    let server = FakeErddap::start(vec![Route::ok(
        "/erddap/tabledap/allDatasets.json",
        "<html>down for maintenance</html>",
    )]);
    let dir = tempfile::tempdir().unwrap();

    let err = server.client(dir.path()).list_layers().unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }), "{err:?}");
}

#[test]
fn server_error_on_catalog_is_unavailable() {
    let server = FakeErddap::start(vec![Route::status(
        "/erddap/tabledap/allDatasets.json",
        503,
        "Error {\n    code=503;\n    message=\"Catalog is being rebuilt\";\n}\n",
    )]);
    let dir = tempfile::tempdir().unwrap();

    let err = server.client(dir.path()).list_layers().unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }), "{err:?}");
    assert!(!err.to_string().contains("being rebuilt"));

    let chain = error_chain(&err);
    assert!(chain.contains("503"), "{chain}");
    assert_eq!(chain.matches("Catalog is being rebuilt").count(), 1, "{chain}");
}

#[test]
fn missing_layer_reports_server_message_once() {
    let server = FakeErddap::start(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let err = client.download_layer(THETAO, &reference_request()).unwrap_err();
    assert!(matches!(err, Error::DownloadFailed { .. }), "{err:?}");

    let chain = error_chain(&err);
    assert_eq!(chain.matches("Server message").count(), 1, "{chain}");
    assert_eq!(chain.matches("no such resource").count(), 1, "{chain}");
    assert!(chain.contains("list_layers"), "{chain}");
    assert!(!chain.contains("constraints"), "{chain}");
    assert_eq!(server.requests(), [format!("/erddap/info/{THETAO}/index.json")]);
}

#[test]
fn download_builds_griddap_url_and_persists_file() {
    let server = FakeErddap::start(vec![
        Route::ok(&format!("/erddap/info/{THETAO}/index.json"), surface_info("thetao_mean")),
        Route::ok(&format!("/erddap/griddap/{THETAO}.nc"), b"CDF\x01payload".to_vec()),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let path = client.download_layer(THETAO, &reference_request()).unwrap();
    assert_eq!(path, dir.path().join(format!("{THETAO}.nc")));
    assert_eq!(std::fs::read(&path).unwrap(), b"CDF\x01payload");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], format!("/erddap/info/{THETAO}/index.json"));
    assert_eq!(
        requests[1],
        format!(
            "/erddap/griddap/{THETAO}.nc?thetao_mean\
             [(2000-01-01T00:00:00Z):100:(2010-01-01T12:00:00Z)][(0):100:(10)][(0):1:(10)]"
        )
    );
}

#[test]
fn one_failing_layer_does_not_abort_the_batch() {
    let server = FakeErddap::start(vec![
        Route::ok(&format!("/erddap/info/{THETAO}/index.json"), surface_info("thetao_mean")),
        Route::ok(&format!("/erddap/griddap/{THETAO}.nc"), b"CDF".to_vec()),
        Route::ok(&format!("/erddap/info/{SO}/index.json"), surface_info("so_mean")),
        Route::status(
            &format!("/erddap/griddap/{SO}.nc"),
            500,
            "Error {\n    code=500;\n    message=\"Internal Server Error\";\n}\n",
        ),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let report = client.download_layers([THETAO, SO], &reference_request()).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.outcomes.len(), 2);

    let ok: Vec<&str> = report.succeeded().map(|(l, _)| l).collect();
    assert_eq!(ok, [THETAO]);

    let failed: Vec<(&str, &Error)> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, SO);
    assert!(
        matches!(failed[0].1, Error::DownloadFailed { layer, .. } if layer == SO),
        "{:?}",
        failed[0].1
    );

    let local = client.list_local_data().unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].file_name, local_file_name(THETAO, ResponseFormat::NetCdf));
    assert_eq!(local[0].layer, THETAO);
}

#[test]
fn invalid_constraints_send_no_requests() {
    let server = FakeErddap::start(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let constraints =
        ConstraintSet::from_json(&json!({"latitude>=": 10, "latitude<=": 0})).unwrap();
    let err = client
        .download_layers([THETAO, SO], &DownloadRequest::new(constraints))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }), "{err:?}");

    let constraints = ConstraintSet::from_json(&json!({"time_step": 0})).unwrap();
    let err = client
        .download_layer(THETAO, &DownloadRequest::new(constraints))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStep { .. }), "{err:?}");

    assert!(server.requests().is_empty());
    assert!(client.list_local_data().unwrap().is_empty());
}

#[test]
fn unsafe_layer_id_fails_without_request() {
    let server = FakeErddap::start(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    for layer in ["../escape", "thetao#x", "a?b", "a&b=c", "a b"] {
        let err = client.download_layer(layer, &reference_request()).unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { .. }), "{layer}: {err:?}");

        let err = client.layer_info(layer).unwrap_err();
        assert!(matches!(err, Error::InvalidLayerId { .. }), "{layer}: {err:?}");
    }
    assert!(server.requests().is_empty());
}

#[test]
fn failed_rename_leaves_no_partial_file() {
    let server = FakeErddap::start(vec![
        Route::ok(&format!("/erddap/info/{THETAO}/index.json"), surface_info("thetao_mean")),
        Route::ok(&format!("/erddap/griddap/{THETAO}.nc"), b"CDF".to_vec()),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    // A directory squatting on the target name makes the final rename fail.
    let blocker = dir.path().join(format!("{THETAO}.nc"));
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("keep"), b"").unwrap();

    let err = client.download_layer(THETAO, &reference_request()).unwrap_err();
    assert!(matches!(err, Error::DownloadFailed { .. }), "{err:?}");
    assert_eq!(server.requests().len(), 2);

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, [format!("{THETAO}.nc")]);
    assert!(blocker.is_dir());
}

#[test]
fn local_listing_before_and_after_download() {
    let server = FakeErddap::start(vec![
        Route::ok(&format!("/erddap/info/{THETAO}/index.json"), surface_info("thetao_mean")),
        Route::ok(
            &format!("/erddap/griddap/{THETAO}.csv"),
            "time,latitude,longitude,thetao_mean\n",
        ),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    assert!(client.list_local_data().unwrap().is_empty());

    let request = reference_request().with_format(ResponseFormat::Csv);
    client.download_layer(THETAO, &request).unwrap();
    // Same name on the second run; still one entry.
    client.download_layer(THETAO, &request).unwrap();

    let local = client.list_local_data().unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].file_name, format!("{THETAO}.csv"));
    assert_eq!(local[0].size, 36);
}

#[test]
fn unknown_variable_selection_is_reported_per_layer() {
    let server = FakeErddap::start(vec![Route::ok(
        &format!("/erddap/info/{THETAO}/index.json"),
        surface_info("thetao_mean"),
    )]);
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let request = reference_request().with_variables(["so_mean"]);
    let report = client.download_layers([THETAO], &request).unwrap();
    assert_eq!(report.failed().count(), 1);
    assert_eq!(server.requests().len(), 1);
}
