//! End-to-end tests of the HTTP API against scratch and file-backed stores.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use keyshelf_core::Vault;
use keyshelf_server::config::{DatabaseLocation, ServerConfig};
use keyshelf_server::routes;
use keyshelf_server::state::AppState;
use keyshelf_storage::Store;

const BOUNDARY: &str = "keyshelf-test-boundary";

async fn app_with(config: ServerConfig) -> Router {
    let store = Store::open_in_memory().await.unwrap();
    routes::router(Arc::new(AppState::new(Vault::new(store), config)))
}

async fn file_app(dir: &std::path::Path) -> Router {
    let path = dir.join("keyshelf.db");
    let store = Store::open(&path).await.unwrap();
    let config = ServerConfig {
        database: DatabaseLocation::File(path.display().to_string()),
        ..ServerConfig::default()
    };
    routes::router(Arc::new(AppState::new(Vault::new(store), config)))
}

async fn app() -> Router {
    app_with(ServerConfig {
        database: DatabaseLocation::Memory,
        ..ServerConfig::default()
    })
    .await
}

async fn raw(app: &Router, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let (status, _, bytes) = raw(app, request).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn multipart(fields: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, filename, contents) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match filename {
            Some(f) => format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n"),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn upload(
    app: &Router,
    uri: &str,
    fields: &[(&str, Option<&str>, &[u8])],
) -> (StatusCode, Value) {
    let (content_type, body) = multipart(fields);
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let (status, _, bytes) = raw(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn create_project(app: &Router, name: &str) -> i64 {
    let (status, body) = send(app, "POST", "/projects", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn create_key(app: &Router, name: &str, project_id: Option<i64>) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/keys",
        Some(json!({ "name": name, "key": format!("{name}-secret"), "project_id": project_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

fn names(keys: &Value) -> Vec<&str> {
    keys.as_array()
        .unwrap()
        .iter()
        .map(|k| k["name"].as_str().unwrap())
        .collect()
}

// ── Basics ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok_with_security_headers() {
    let app = app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, headers, bytes) = raw(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn errors_use_the_json_body() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/keys/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], "key 42 not found");

    let (status, body) = send(&app, "GET", "/keys/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/keys", Some(json!({ "name": "ONLY_NAME" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "missing required field 'key'");

    let (status, _) = send(&app, "POST", "/projects", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/projects", Some(json!({ "name": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_body_is_413() {
    let app = app_with(ServerConfig {
        database: DatabaseLocation::Memory,
        max_upload_bytes: 64,
        ..ServerConfig::default()
    })
    .await;
    let (status, body) = send(
        &app,
        "POST",
        "/keys",
        Some(json!({ "name": "BIG", "key": "x".repeat(256) })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload_too_large");
}

// ── Projects and keys ────────────────────────────────────────────────

#[tokio::test]
async fn names_resolve_per_scope() {
    let app = app().await;
    let a = create_project(&app, "A").await;
    let b = create_project(&app, "B").await;
    create_key(&app, "X", Some(a)).await;
    create_key(&app, "X", Some(b)).await;
    let second = create_key(&app, "X", Some(a)).await;
    assert_eq!(second["name"], "X1");
    assert_eq!(second["position"], 1);

    let (status, keys) = send(&app, "GET", &format!("/keys?project_id={a}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&keys), vec!["X", "X1"]);

    let (_, all) = send(&app, "GET", "/keys?project_id=", None).await;
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn keys_never_expose_salts() {
    let app = app().await;
    let key = create_key(&app, "TOKEN", None).await;
    assert!(key.get("encryption_salt").is_none());
    assert_eq!(key["encrypted"], false);
    assert_eq!(key["key"], "TOKEN-secret");
}

#[tokio::test]
async fn project_rename_conflict_is_409() {
    let app = app().await;
    create_project(&app, "web").await;
    let batch = create_project(&app, "batch").await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/projects/{batch}"),
        Some(json!({ "name": "web" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/projects/{batch}"),
        Some(json!({ "name": "jobs" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "jobs");
}

#[tokio::test]
async fn key_update_patches_and_clears() {
    let app = app().await;
    let p = create_project(&app, "web").await;
    let key = create_key(&app, "TOKEN", None).await;
    let id = key["id"].as_i64().unwrap();
    send(
        &app,
        "PUT",
        &format!("/keys/{id}"),
        Some(json!({ "description": "prod", "used_with": "stripe" })),
    )
    .await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/keys/{id}"),
        Some(json!({ "name": "RENAMED", "description": null, "project_id": p })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "RENAMED");
    assert_eq!(body["description"], Value::Null);
    assert_eq!(body["used_with"], "stripe");
    assert_eq!(body["project_id"], p);
    assert_eq!(body["position"], 0);
}

#[tokio::test]
async fn reorder_within_and_across_scopes() {
    let app = app().await;
    let p = create_project(&app, "web").await;
    let ids: Vec<i64> = {
        let mut ids = Vec::new();
        for name in ["K0", "K1", "K2"] {
            ids.push(create_key(&app, name, Some(p)).await["id"].as_i64().unwrap());
        }
        ids
    };

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/keys/{}/reorder", ids[0]),
        Some(json!({ "new_position": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, keys) = send(&app, "GET", &format!("/keys?project_id={p}"), None).await;
    assert_eq!(names(&keys), vec!["K1", "K2", "K0"]);

    // Explicit null sends the key to the unassigned scope.
    let (status, moved) = send(
        &app,
        "PATCH",
        &format!("/keys/{}/reorder", ids[1]),
        Some(json!({ "new_position": 0, "project_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["project_id"], Value::Null);
    let (_, keys) = send(&app, "GET", &format!("/keys?project_id={p}"), None).await;
    assert_eq!(names(&keys), vec!["K2", "K0"]);

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/keys/{}/reorder", ids[2]),
        Some(json!({ "new_position": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn project_reorder_and_delete_unassigns() {
    let app = app().await;
    let a = create_project(&app, "A").await;
    let b = create_project(&app, "B").await;
    create_key(&app, "TOKEN", Some(a)).await;
    create_key(&app, "TOKEN", None).await;

    let (status, moved) = send(
        &app,
        "PATCH",
        &format!("/projects/{b}/reorder"),
        Some(json!({ "new_position": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["position"], 0);

    let (status, body) = send(&app, "DELETE", &format!("/projects/{a}"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["keys_unassigned"], 1);

    let (_, projects) = send(&app, "GET", "/projects", None).await;
    assert_eq!(projects[0]["name"], "B");
    assert_eq!(projects[0]["position"], 0);

    let (_, keys) = send(&app, "GET", "/keys", None).await;
    assert_eq!(names(&keys), vec!["TOKEN", "TOKEN1"]);
}

#[tokio::test]
async fn cascade_delete_and_scope_wide_deletes() {
    let app = app().await;
    let a = create_project(&app, "A").await;
    let b = create_project(&app, "B").await;
    create_key(&app, "ONE", Some(a)).await;
    create_key(&app, "TWO", Some(b)).await;
    create_key(&app, "THREE", Some(b)).await;
    create_key(&app, "LOOSE", None).await;

    let (_, body) = send(&app, "DELETE", &format!("/projects/{a}?delete_keys=true"), None).await;
    assert_eq!(body["keys_deleted"], 1);

    let (_, body) = send(&app, "DELETE", &format!("/projects/{b}/keys"), None).await;
    assert_eq!(body["count"], 2);

    let (_, body) = send(&app, "DELETE", "/keys", None).await;
    assert_eq!(body["count"], 1);

    let (status, _) = send(&app, "DELETE", "/projects/999/keys", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn move_and_copy_between_projects() {
    let app = app().await;
    let a = create_project(&app, "A").await;
    let b = create_project(&app, "B").await;
    let key = create_key(&app, "TOKEN", Some(a)).await;
    create_key(&app, "TOKEN", Some(b)).await;
    let id = key["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/keys/move",
        Some(json!({ "key_id": id, "target_project_id": b, "is_copy": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "key copied");
    assert_eq!(body["key"]["name"], "TOKEN1");
    assert_eq!(body["key"]["position"], 1);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/keys/{id}/project"),
        Some(json!({ "project_id": b })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "TOKEN2");

    let (_, keys) = send(&app, "GET", &format!("/keys?project_id={a}"), None).await;
    assert!(keys.as_array().unwrap().is_empty());
}

// ── Encryption ───────────────────────────────────────────────────────

#[tokio::test]
async fn encrypt_decrypt_single_key() {
    let app = app().await;
    let key = create_key(&app, "TOKEN", None).await;
    let id = key["id"].as_i64().unwrap();

    let (status, sealed) = send(
        &app,
        "POST",
        &format!("/keys/{id}/encrypt"),
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sealed["encrypted"], true);
    assert_ne!(sealed["key"], key["key"]);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/keys/{id}/decrypt"),
        Some(json!({ "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "decryption_failed");

    let (_, opened) = send(
        &app,
        "POST",
        &format!("/keys/{id}/decrypt"),
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(opened["key"], key["key"]);
}

#[tokio::test]
async fn batch_encryption_and_status() {
    let app = app().await;
    let p = create_project(&app, "web").await;
    create_key(&app, "A", Some(p)).await;
    create_key(&app, "B", Some(p)).await;
    create_key(&app, "C", None).await;

    let (status, _) = send(&app, "POST", "/keys/encrypt", Some(json!({ "project_id": p }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/keys/encrypt",
        Some(json!({ "password": "pw", "project_id": p })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert!(body["failed_keys"].as_array().unwrap().is_empty());

    let (_, status_body) = send(&app, "GET", "/keys/status", None).await;
    assert_eq!(
        status_body,
        json!({ "total": 3, "encrypted": 2, "unencrypted": 1 })
    );

    let (_, body) = send(
        &app,
        "POST",
        "/keys/decrypt",
        Some(json!({ "password": "nope", "project_id": p })),
    )
    .await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["failed_keys"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn moving_an_encrypted_key_needs_a_password() {
    let app = app().await;
    let p = create_project(&app, "web").await;
    let key = create_key(&app, "TOKEN", None).await;
    let id = key["id"].as_i64().unwrap();
    send(
        &app,
        "POST",
        &format!("/keys/{id}/encrypt"),
        Some(json!({ "password": "pw" })),
    )
    .await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/keys/move",
        Some(json!({ "key_id": id, "target_project_id": p })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/keys/move",
        Some(json!({ "key_id": id, "target_project_id": p, "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"]["encrypted"], true);
}

// ── Import / export ──────────────────────────────────────────────────

#[tokio::test]
async fn import_file_then_export() {
    let app = app().await;
    let p = create_project(&app, "web").await;

    let (status, body) = upload(
        &app,
        &format!("/projects/{p}/import-env"),
        &[("file", Some("prod.env"), b"API_KEY=abc\nDB_URL=\"postgres://x\"\n")],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["imported"], 2);
    assert_eq!(body["names"], json!(["API_KEY", "DB_URL"]));

    let request = Request::builder()
        .uri(format!("/export?format=json&project_id={p}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, bytes) = raw(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"api_keys_"));
    assert!(disposition.ends_with(".json\""));
    let exported: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(exported, json!({ "API_KEY": "abc", "DB_URL": "postgres://x" }));
}

#[tokio::test]
async fn import_rejects_unsupported_files() {
    let app = app().await;
    let p = create_project(&app, "web").await;
    let (status, body) = upload(
        &app,
        &format!("/projects/{p}/import-env"),
        &[("file", Some("notes.txt"), b"A=1")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains(".txt"));

    let (status, _) = upload(&app, &format!("/projects/{p}/import-env"), &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_of_encrypted_keys_needs_password() {
    let app = app().await;
    let key = create_key(&app, "TOKEN", None).await;
    let id = key["id"].as_i64().unwrap();
    send(
        &app,
        "POST",
        &format!("/keys/{id}/encrypt"),
        Some(json!({ "password": "pw" })),
    )
    .await;

    let (status, _) = send(&app, "GET", "/export?format=env", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/export?format=env&password=bad", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "decryption_failed");

    let request = Request::builder()
        .uri("/export?format=env&password=pw")
        .body(Body::empty())
        .unwrap();
    let (status, _, bytes) = raw(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap(), "TOKEN=TOKEN-secret\n");

    let (status, _) = send(&app, "GET", "/export?format=xml", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn os_env_import_is_opt_in() {
    let app = app().await;
    let p = create_project(&app, "ops").await;
    let (status, body) = send(&app, "POST", &format!("/projects/{p}/import-os-env"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let app = app_with(ServerConfig {
        database: DatabaseLocation::Memory,
        allow_os_env_import: true,
        ..ServerConfig::default()
    })
    .await;
    let p = create_project(&app, "ops").await;
    let (status, body) = send(&app, "POST", &format!("/projects/{p}/import-os-env"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body["imported"].as_u64().unwrap(),
        u64::try_from(body["names"].as_array().unwrap().len()).unwrap()
    );
    assert!(body["skipped"].is_array(), "{body}");
}

#[tokio::test]
async fn file_import_skips_unusable_names() {
    let app = app().await;
    let p = create_project(&app, "web").await;
    let (status, body) = upload(
        &app,
        &format!("/projects/{p}/import-env"),
        &[("file", Some("conf.json"), br#"{"": "blank", "GOOD": "1"}"#.as_slice())],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["imported"], 1);
    assert_eq!(body["names"], json!(["GOOD"]));
    assert_eq!(body["skipped"][0]["name"], "");
}

#[tokio::test]
async fn unfiltered_json_export_keeps_shared_names() {
    let app = app().await;
    let a = create_project(&app, "a").await;
    let b = create_project(&app, "b").await;
    create_key(&app, "X", Some(a)).await;
    create_key(&app, "X", Some(b)).await;
    create_key(&app, "X", None).await;

    let (status, body) = send(&app, "GET", "/export?format=json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_object().unwrap().len(), 3, "{body}");
}

#[tokio::test]
async fn list_unassigned_keys_only() {
    let app = app().await;
    let p = create_project(&app, "web").await;
    create_key(&app, "IN_PROJECT", Some(p)).await;
    create_key(&app, "LOOSE", None).await;

    let (status, keys) = send(&app, "GET", "/keys?unassigned=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&keys), vec!["LOOSE"]);

    let (status, _) = send(&app, "GET", &format!("/keys?unassigned=true&project_id={p}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Whole database ───────────────────────────────────────────────────

#[tokio::test]
async fn download_then_restore_and_merge() {
    restore_and_merge(app().await).await;
}

#[tokio::test]
async fn download_then_restore_and_merge_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    restore_and_merge(file_app(dir.path()).await).await;
}

async fn restore_and_merge(app: Router) {
    let p = create_project(&app, "web").await;
    create_key(&app, "TOKEN", Some(p)).await;

    let request = Request::builder().uri("/download-db").body(Body::empty()).unwrap();
    let (status, headers, dump) = raw(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("keyshelf_backup_"));
    assert!(dump.starts_with(b"SQLite format 3"));

    create_key(&app, "STRAY", None).await;

    let (status, body) = upload(
        &app,
        "/import-db",
        &[("import-mode", None, b"overwrite"), ("file", Some("backup.db"), dump.as_slice())],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["mode"], "overwrite");
    assert_eq!(body["keys"], 1);
    let (_, keys) = send(&app, "GET", "/keys", None).await;
    assert_eq!(names(&keys), vec!["TOKEN"]);

    let (status, body) = upload(
        &app,
        "/import-db",
        &[("file", Some("backup.db"), dump.as_slice()), ("import-mode", None, b"merge")],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["mode"], "merge");
    assert_eq!(body["projects_created"], 0);
    assert_eq!(body["keys_imported"], 1);
    let (_, keys) = send(&app, "GET", &format!("/keys?project_id={p}"), None).await;
    assert_eq!(names(&keys), vec!["TOKEN", "TOKEN1"]);
}

#[tokio::test]
async fn invalid_database_upload_changes_nothing() {
    let app = app().await;
    create_key(&app, "KEEP", None).await;

    let (status, _) = upload(
        &app,
        "/import-db",
        &[("file", Some("backup.db"), b"this is not sqlite at all, not even close")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = upload(&app, "/import-db", &[("file", Some("backup.json"), b"{}")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, keys) = send(&app, "GET", "/keys", None).await;
    assert_eq!(names(&keys), vec!["KEEP"]);
}
