use std::sync::Arc;

use minecollect::config::Config;
use minecollect::embedding::HashingEmbedder;
use minecollect::pipeline::Pipeline;
use minecollect::reader::SpanReader;
use serde_json::{json, Value};

async fn start() -> String {
    let pipeline = Pipeline::in_memory(
        &Config::default(),
        Arc::new(HashingEmbedder::new(64)),
        Arc::new(SpanReader::new()),
    )
    .await
    .unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(minecollect::server::serve(listener, Arc::new(pipeline)));
    base
}

#[tokio::test]
async fn ingest_then_ask_over_http() {
    let base = start().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let report: Value = client
        .post(format!("{base}/ingest"))
        .json(&json!({
            "source": "mine://fox",
            "content": "The quick brown fox jumps over the lazy dog.",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["chunks"], 1);

    let answer: Value = client
        .post(format!("{base}/ask"))
        .json(&json!({ "question": "What animal jumps?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["answers"][0]["text"], "fox");
    assert_eq!(answer["retrieved_count"], 1);

    let search: Value = client
        .get(format!("{base}/search"))
        .query(&[("q", "fox"), ("semantic_weight", "0")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["results"].as_array().unwrap().len(), 1);

    let similar: Value = client
        .post(format!("{base}/similar"))
        .json(&json!({ "query": "lazy dog", "k": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(similar["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn errors_carry_kind_and_status() {
    let base = start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/ask"))
        .json(&json!({ "question": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "invalid_query");

    let response = client
        .post(format!("{base}/ingest"))
        .json(&json!({ "source": "file:///memo.doc", "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "unsupported_format");
}
