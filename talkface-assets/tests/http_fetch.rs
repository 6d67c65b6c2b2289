//! `HttpArchiveFetcher` against a local axum server.

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path as UrlPath;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use talkface_assets::fetcher::part_path;
use talkface_assets::{ArchiveFetcher, AssetError, AssetProvisioner, HttpArchiveFetcher};
use talkface_core::{AssetBundle, BundleName};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn zip_bytes() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file("may/aud.wav", opts).unwrap();
    zip.write_all(b"RIFF....WAVE").unwrap();
    zip.finish().unwrap().into_inner()
}

async fn archive(UrlPath(id): UrlPath<String>) -> Response {
    match id.as_str() {
        "good" => ([(header::CONTENT_TYPE, "application/zip")], zip_bytes()).into_response(),
        "interstitial" => Html("<html>virus scan warning</html>").into_response(),
        "empty" => ([(header::CONTENT_TYPE, "application/zip")], Vec::new()).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start_server() -> SocketAddr {
    let app = Router::new().route("/dl/{id}", get(archive));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn fetch(addr: SocketAddr, id: &str, dest: std::path::PathBuf) -> Result<(), AssetError> {
    let fetcher = HttpArchiveFetcher::new(format!("http://{addr}/dl/{{id}}"));
    let id = id.to_string();
    tokio::task::spawn_blocking(move || fetcher.fetch(&id, &dest))
        .await
        .unwrap()
}

#[tokio::test]
async fn download_lands_at_dest_without_part_file() {
    let addr = start_server().await;
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("May.zip");

    fetch(addr, "good", dest.clone()).await.expect("fetch");
    assert_eq!(std::fs::read(&dest).unwrap(), zip_bytes());
    assert!(!part_path(&dest).exists());
}

#[tokio::test]
async fn http_404_is_fetch_failed_and_stale_part_is_not_promoted() {
    let addr = start_server().await;
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("May.zip");
    std::fs::write(part_path(&dest), b"half a download").unwrap();

    let err = fetch(addr, "missing", dest.clone()).await.unwrap_err();
    match &err {
        AssetError::FetchFailed { remote_id, reason } => {
            assert_eq!(remote_id, "missing");
            assert!(reason.contains("404"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.exists());
    assert!(!part_path(&dest).exists());
}

#[tokio::test]
async fn html_interstitial_is_rejected() {
    let addr = start_server().await;
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("May.zip");

    let err = fetch(addr, "interstitial", dest.clone()).await.unwrap_err();
    assert!(matches!(err, AssetError::FetchFailed { .. }), "got: {err}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let addr = start_server().await;
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("May.zip");

    let err = fetch(addr, "empty", dest.clone()).await.unwrap_err();
    assert!(err.to_string().contains("empty download"), "got: {err}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn unreachable_host_is_fetch_failed() {
    let tmp = TempDir::new().unwrap();
    let fetcher = HttpArchiveFetcher::new("http://127.0.0.1:1/dl/{id}");
    let dest = tmp.path().join("May.zip");
    let err = tokio::task::spawn_blocking(move || fetcher.fetch("x", &dest))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, AssetError::FetchFailed { .. }), "got: {err}");
}

#[tokio::test]
async fn provisioner_end_to_end_over_http() {
    let addr = start_server().await;
    let tmp = TempDir::new().unwrap();
    let bundle = AssetBundle {
        name: BundleName::from("data-assets"),
        remote_id: "good".into(),
        local_dir: tmp.path().join("data").join("May"),
        sha256: None,
    };
    let fetcher = HttpArchiveFetcher::new(format!("http://{addr}/dl/{{id}}"));
    let provisioner = AssetProvisioner::new(Arc::new(fetcher));

    provisioner.ensure_one(&bundle).await.expect("ensure");
    assert!(bundle.local_dir.join("aud.wav").is_file());
    assert!(!bundle.archive_path().exists());
}
