use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tfidx_core::analyzer::StandardAnalyzer;
use tfidx_core::config::{BuildConfig, SearchConfig};
use tfidx_core::ingest::IngestPipeline;
use tfidx_core::writer::IndexWriter;
use tower::ServiceExt;

fn build_tiny_index(dir: &Path) -> PathBuf {
    let docs = dir.join("docs");
    fs::create_dir_all(&docs).unwrap();
    let corpus = [
        ("1.txt", "Rust systems\nRust is great for systems programming. Memory safety without garbage collection.\n"),
        ("2.txt", "Learning notes\nLearning rust takes patience. The borrow checker teaches ownership.\n"),
        ("3.txt", "Gardening\nTomatoes need sunlight and water every morning.\n"),
    ];
    let files: Vec<PathBuf> = corpus
        .iter()
        .map(|(name, text)| {
            let path = docs.join(name);
            fs::write(&path, text).unwrap();
            path
        })
        .collect();

    let output = dir.join("index");
    let config = BuildConfig { base_dir: dir.to_path_buf(), ..BuildConfig::new(&output) };
    let writer = IndexWriter::create(&config).unwrap();
    IngestPipeline::new(config, Arc::new(StandardAnalyzer::new())).run(files, writer).unwrap();
    output
}

fn search_config(dir: &Path) -> SearchConfig {
    SearchConfig { doc_root: dir.to_path_buf(), ..SearchConfig::default() }
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());
    let app = server::build_app(index, search_config(dir.path())).unwrap();

    let (status, json) = call(app, "/search?q=rust%20systems").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"].as_u64().unwrap(), 1);
    assert_eq!(arr[1]["doc_id"].as_u64().unwrap(), 2);
    assert!(arr[0]["score"].as_f64().unwrap() > arr[1]["score"].as_f64().unwrap());
    assert!(arr[0]["snippet"].as_str().unwrap().contains("systems programming"));
}

#[tokio::test]
async fn unknown_terms_return_no_results() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());
    let app = server::build_app(index, search_config(dir.path())).unwrap();

    let (status, json) = call(app, "/search?q=zeppelin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"].as_u64().unwrap(), 0);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn doc_lookup_returns_metadata_and_text() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());
    let app = server::build_app(index, search_config(dir.path())).unwrap();

    let (status, json) = call(app.clone(), "/doc/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Gardening");
    assert_eq!(json["path"], "docs/3.txt");
    assert!(json["text"].as_str().unwrap().contains("Tomatoes"));

    let (status, json) = call(app, "/doc/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not found");
}

#[tokio::test]
async fn background_load_becomes_ready() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());
    let app = server::build_app_background(index, search_config(dir.path())).unwrap();

    let mut ready = false;
    for _ in 0..200 {
        let (status, json) = call(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        if json["status"] == "ready" {
            assert_eq!(json["documents"].as_u64().unwrap(), 3);
            ready = true;
            break;
        }
        assert_eq!(json["status"], "loading");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ready);

    let (status, _) = call(app, "/search?q=tomatoes").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_load_is_reported() {
    let dir = tempdir().unwrap();
    let app = server::build_app_background(dir.path().join("missing"), search_config(dir.path())).unwrap();

    let mut status_text = String::new();
    for _ in 0..200 {
        let (_, json) = call(app.clone(), "/health").await;
        status_text = json["status"].as_str().unwrap().to_string();
        if status_text != "loading" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status_text, "failed");

    let (status, _) = call(app, "/search?q=rust").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
