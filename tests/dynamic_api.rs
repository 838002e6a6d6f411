mod common;

use axum::http::StatusCode;
use common::{api_key, backend, credential, grant, harness, MAX_BODY_BYTES, MAX_IMAGE_FIELD_BYTES};
use dbportal::{ControlStore, HttpVerb};
use serde_json::{json, Value};

const MISSING_ID: &str = "507f1f77bcf86cd799439011";

#[tokio::test]
async fn missing_unknown_and_inactive_keys_are_unauthorized() {
    let h = harness().await;

    h.server.get("/api/widgets").await.assert_status(StatusCode::UNAUTHORIZED);

    let (k, v) = api_key("dbp_not_a_real_key");
    h.server.get("/api/widgets").add_header(k, v).await.assert_status(StatusCode::UNAUTHORIZED);

    h.store.set_credential_active(h.credential.id, false).await.unwrap();
    let (k, v) = api_key(&h.credential.key);
    let res = h.server.get("/api/widgets").add_header(k, v).await;
    res.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(res.json::<Value>()["error"]["code"], json!("unauthorized"));
}

#[tokio::test]
async fn inactive_or_missing_endpoint_is_forbidden() {
    let h = harness().await;
    grant(&h.store, h.backend.id, "gadgets", HttpVerb::Get, false).await;

    let (k, v) = api_key(&h.credential.key);
    h.server.get("/api/gadgets").add_header(k, v).await.assert_status(StatusCode::FORBIDDEN);

    let (k, v) = api_key(&h.credential.key);
    h.server.get("/api/sprockets").add_header(k, v).await.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unsupported_backend_type_is_a_bad_request() {
    let h = harness().await;
    let redis = backend(h.owner, "redis");
    h.store.insert_backend(&redis).await.unwrap();
    let cred = credential(h.owner, redis.id);
    h.store.insert_credential(&cred).await.unwrap();
    grant(&h.store, redis.id, "widgets", HttpVerb::Get, true).await;

    let (k, v) = api_key(&cred.key);
    let res = h.server.get("/api/widgets").add_header(k, v).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>()["error"]["code"], json!("unsupported_backend"));
}

#[tokio::test]
async fn created_record_reads_back_with_timestamp() {
    let h = harness().await;

    let (k, v) = api_key(&h.credential.key);
    let res = h
        .server
        .post("/api/widgets")
        .add_header(k, v)
        .json(&json!({"name": "a", "qty": 3}))
        .await;
    res.assert_status(StatusCode::CREATED);
    let body: Value = res.json();
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["name"], json!("a"));

    let (k, v) = api_key(&h.credential.key);
    let res = h.server.get(&format!("/api/widgets/{id}")).add_header(k, v).await;
    res.assert_status_ok();
    let record: Value = res.json();
    assert_eq!(record["name"], json!("a"));
    assert_eq!(record["qty"], json!(3));
    assert_eq!(record["id"], json!(id));
    assert!(record["created_at"].is_string());
}

#[tokio::test]
async fn update_and_delete_change_the_record() {
    let h = harness().await;
    let (k, v) = api_key(&h.credential.key);
    let id = h
        .server
        .post("/api/widgets")
        .add_header(k, v)
        .json(&json!({"name": "a"}))
        .await
        .json::<Value>()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (k, v) = api_key(&h.credential.key);
    let res = h
        .server
        .put(&format!("/api/widgets/{id}"))
        .add_header(k, v)
        .json(&json!({"name": "b"}))
        .await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>()["data"]["name"], json!("b"));

    let (k, v) = api_key(&h.credential.key);
    let record: Value = h.server.get(&format!("/api/widgets/{id}")).add_header(k, v).await.json();
    assert_eq!(record["name"], json!("b"));
    assert!(record["updated_at"].is_string());

    let (k, v) = api_key(&h.credential.key);
    h.server.delete(&format!("/api/widgets/{id}")).add_header(k, v).await.assert_status_ok();

    let (k, v) = api_key(&h.credential.key);
    h.server
        .get(&format!("/api/widgets/{id}"))
        .add_header(k, v)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_id_is_not_found_and_nothing_changes() {
    let h = harness().await;
    let (k, v) = api_key(&h.credential.key);
    h.server.post("/api/widgets").add_header(k, v).json(&json!({"name": "a"})).await;

    let (k, v) = api_key(&h.credential.key);
    h.server
        .put(&format!("/api/widgets/{MISSING_ID}"))
        .add_header(k, v)
        .json(&json!({"name": "z"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    let (k, v) = api_key(&h.credential.key);
    h.server
        .delete(&format!("/api/widgets/{MISSING_ID}"))
        .add_header(k, v)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let (k, v) = api_key(&h.credential.key);
    let list: Value = h.server.get("/api/widgets").add_header(k, v).await.json();
    assert_eq!(list["total"], json!(1));
    assert_eq!(list["data"][0]["name"], json!("a"));
}

#[tokio::test]
async fn paging_clamps_and_counts_every_match() {
    let h = harness().await;
    for i in 0..15 {
        let (k, v) = api_key(&h.credential.key);
        let name = if i % 3 == 0 { format!("blue {i}") } else { format!("red {i}") };
        h.server
            .post("/api/widgets")
            .add_header(k, v)
            .json(&json!({"name": name, "rank": i}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let (k, v) = api_key(&h.credential.key);
    let list: Value = h.server.get("/api/widgets?limit=500&page=0").add_header(k, v).await.json();
    assert_eq!(list["limit"], json!(10));
    assert_eq!(list["page"], json!(1));
    assert_eq!(list["total"], json!(15));
    assert_eq!(list["data"].as_array().unwrap().len(), 10);

    let (k, v) = api_key(&h.credential.key);
    let list: Value = h
        .server
        .get("/api/widgets?search=blue&limit=2&sort=rank&order=desc")
        .add_header(k, v)
        .await
        .json();
    assert_eq!(list["total"], json!(5));
    let ranks: Vec<i64> = list["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["rank"].as_i64().unwrap())
        .collect();
    assert_eq!(ranks, vec![12, 9]);
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let h = harness().await;
    let (k, v) = api_key(&h.credential.key);
    h.server
        .post("/api/widgets")
        .add_header(k, v)
        .json(&json!([1, 2, 3]))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_payloads_are_rejected() {
    let h = harness().await;
    let image = format!("data:image/png;base64,{}", "A".repeat(MAX_IMAGE_FIELD_BYTES));
    let (k, v) = api_key(&h.credential.key);
    h.server
        .post("/api/widgets")
        .add_header(k, v)
        .json(&json!({"avatar": image}))
        .await
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    let (k, v) = api_key(&h.credential.key);
    h.server
        .post("/api/widgets")
        .add_header(k, v)
        .json(&json!({"bio": "A".repeat(MAX_BODY_BYTES * 2)}))
        .await
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    let (k, v) = api_key(&h.credential.key);
    let list: Value = h.server.get("/api/widgets").add_header(k, v).await.json();
    assert_eq!(list["total"], json!(0));
}

#[tokio::test]
async fn every_gated_request_is_logged() {
    let h = harness().await;
    let (k, v) = api_key(&h.credential.key);
    h.server.get("/api/widgets").add_header(k, v).await.assert_status_ok();
    let (k, v) = api_key(&h.credential.key);
    h.server.get("/api/gadgets").add_header(k, v).await.assert_status(StatusCode::FORBIDDEN);
    // no resolvable credential, nothing to attribute the entry to
    h.server.get("/api/widgets").await.assert_status(StatusCode::UNAUTHORIZED);

    let stats = h.logger.shutdown().await;
    assert_eq!(stats.written, 2);

    let logs = h.store.list_access_logs(h.credential.id, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    let mut codes: Vec<u16> = logs.iter().map(|l| l.status_code).collect();
    codes.sort();
    assert_eq!(codes, vec![200, 403]);
    assert!(logs.iter().all(|l| l.method == "GET"));
    let forbidden = logs.iter().find(|l| l.status_code == 403).unwrap();
    assert_eq!(forbidden.path, "/api/gadgets");
    assert!(forbidden.endpoint_id.is_none());
}
