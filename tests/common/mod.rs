//! In-process stand-in for an ERDDAP server.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use biooracle::{Client, ClientConfig};

#[derive(Clone)]
pub struct Route {
    /// Request path without the query string.
    pub path: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl Route {
    pub fn ok(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(path: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            status,
            body: body.into(),
        }
    }
}

pub struct FakeErddap {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeErddap {
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/erddap", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                handle(stream, &routes, &log);
            }
        });

        Self { url, requests }
    }

    /// Request targets (path and query) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn client(&self, data_directory: &std::path::Path) -> Client {
        client_for(&self.url, data_directory)
    }
}

pub fn client_for(url: &str, data_directory: &std::path::Path) -> Client {
    Client::with_config(ClientConfig {
        url: url.to_string(),
        data_directory: data_directory.to_path_buf(),
        progress: false,
        ..ClientConfig::default()
    })
    .unwrap()
}

/// The error and every `source()` below it, joined by `: `.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut next = err.source();
    while let Some(cause) = next {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        next = cause.source();
    }
    text
}

/// A base URL nothing listens on.
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/erddap", addr)
}

fn handle(stream: TcpStream, routes: &[Route], log: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
        }
    }

    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    log.lock().unwrap().push(target.clone());

    let path = target.split('?').next().unwrap_or("");
    let (status, body) = match routes.iter().find(|r| r.path == path) {
        Some(r) => (r.status, r.body.clone()),
        None => (
            404,
            b"Error {\n    code=404;\n    message=\"Not Found: no such resource\";\n}\n".to_vec(),
        ),
    };

    let mut stream = stream;
    let head = format!(
        "HTTP/1.1 {} X\r\nContent-Length: {}\r\n\
         Content-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

pub const CATALOG: &str = r#"{
  "table": {
    "columnNames": ["datasetID"],
    "columnTypes": ["String"],
    "rows": [
      ["allDatasets"],
      ["thetao_baseline_2000_2019_depthsurf"],
      ["so_ssp585_2020_2100_depthsurf"],
      ["chl_baseline_2000_2018_depthmax"]
    ]
  }
}"#;

/// `info/<id>/index.json` body for a surface layer with one data variable.
pub fn surface_info(variable: &str) -> String {
    format!(
        r#"{{
  "table": {{
    "columnNames": ["Row Type", "Variable Name", "Attribute Name", "Data Type", "Value"],
    "rows": [
      ["attribute", "NC_GLOBAL", "title", "String", "Bio-Oracle layer"],
      ["dimension", "time", "", "double", "nValues=2"],
      ["dimension", "latitude", "", "double", "nValues=3600"],
      ["dimension", "longitude", "", "double", "nValues=7200"],
      ["variable", "{}", "", "float", "time, latitude, longitude"]
    ]
  }}
}}"#,
        variable
    )
}
