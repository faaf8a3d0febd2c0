#![cfg(feature = "server")]

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use cloudiverse::layout::RankDir;
use cloudiverse::serve::{ServeArgs, router};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::net::TcpListener;

async fn spawn_preview(input: PathBuf) -> Result<String> {
    let args = ServeArgs {
        input,
        host: "127.0.0.1".into(),
        port: 0,
        rank_dir: RankDir::LeftRight,
        background_color: "white".into(),
    };
    let app = router(&args);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/input/architecture.json")
}

#[tokio::test]
async fn diagram_payload_is_read_only() -> Result<()> {
    let base = spawn_preview(fixture()).await?;
    let payload: Value = reqwest::get(format!("{base}/api/diagram?width=800&height=600"))
        .await?
        .json()
        .await?;

    assert_eq!(payload["interaction"]["nodesDraggable"], false);
    assert_eq!(payload["interaction"]["zoomOnScroll"], true);
    assert_eq!(payload["nodes"].as_array().map(Vec::len), Some(5));
    assert_eq!(payload["edges"].as_array().map(Vec::len), Some(4));
    assert!(payload["viewport"]["zoom"].as_f64().is_some_and(|z| (0.1..=2.0).contains(&z)));
    Ok(())
}

#[tokio::test]
async fn svg_and_png_endpoints_render() -> Result<()> {
    let base = spawn_preview(fixture()).await?;

    let svg = reqwest::get(format!("{base}/api/diagram/svg")).await?;
    assert_eq!(svg.headers()["content-type"], "image/svg+xml");
    assert!(svg.text().await?.contains("<svg"));

    let minimap = reqwest::get(format!("{base}/api/diagram/minimap")).await?.text().await?;
    assert!(minimap.contains("visible-area"));

    let png = reqwest::get(format!("{base}/api/diagram/png")).await?;
    assert_eq!(png.status(), reqwest::StatusCode::OK);
    assert!(png.bytes().await?.starts_with(b"\x89PNG"));
    Ok(())
}

#[tokio::test]
async fn edits_and_layout_changes_show_up() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("arch.json");
    fs::write(&input, r#"{"nodes": [], "edges": []}"#)?;
    let base = spawn_preview(input.clone()).await?;

    let png = reqwest::get(format!("{base}/api/diagram/png")).await?;
    assert_eq!(png.status(), reqwest::StatusCode::NO_CONTENT);

    fs::write(
        &input,
        json!({"nodes": [{"id": "a"}, {"id": "b"}], "edges": [{"from": "a", "to": "b"}]}).to_string(),
    )?;

    let client = reqwest::Client::new();
    let status = client
        .put(format!("{base}/api/diagram/layout"))
        .json(&json!({"rankDir": "TB"}))
        .send()
        .await?
        .status();
    assert_eq!(status, reqwest::StatusCode::NO_CONTENT);

    let payload: Value = reqwest::get(format!("{base}/api/diagram")).await?.json().await?;
    assert_eq!(payload["rankDir"], "TB");
    let a_y = payload["nodes"][0]["position"]["y"].as_f64();
    let b_y = payload["nodes"][1]["position"]["y"].as_f64();
    assert!(a_y < b_y, "top-to-bottom layout should stack a above b");
    Ok(())
}

#[tokio::test]
async fn service_lookup_never_misses() -> Result<()> {
    let base = spawn_preview(fixture()).await?;
    let lookup: Value = reqwest::get(format!("{base}/api/services/lambda")).await?.json().await?;
    assert_eq!(lookup["canonical"], "serverless_compute");

    let unknown: Value = reqwest::get(format!("{base}/api/services/flux")).await?.json().await?;
    assert_eq!(unknown["canonical"], Value::Null);
    assert_eq!(unknown["metadata"]["desc"], "No description available");
    Ok(())
}

#[tokio::test]
async fn concurrent_png_requests_leave_the_server_responsive() -> Result<()> {
    let base = spawn_preview(fixture()).await?;
    let client = reqwest::Client::new();

    let pngs: Vec<_> = (0..4)
        .map(|_| {
            let request = client.get(format!("{base}/api/diagram/png")).send();
            tokio::spawn(request)
        })
        .collect();

    let payload: Value = client
        .get(format!("{base}/api/diagram"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(payload["nodes"].as_array().map(Vec::len), Some(5));

    let mut bodies = Vec::new();
    for png in pngs {
        let response = png.await??;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        bodies.push(response.bytes().await?);
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    Ok(())
}
