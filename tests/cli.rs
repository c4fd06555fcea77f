use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

use serde_json::Value;
use tempfile::TempDir;

fn apiary_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("apiary");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
path = "{}/data/apiary.json"

[http]
timeout_secs = 5

[log]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("apiary.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_apiary(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = apiary_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run apiary binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_json(config_path: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, success) = run_apiary(config_path, args);
    assert!(success, "apiary {:?} failed: {}", args, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("apiary {:?} printed invalid JSON ({}): {}", args, e, stdout))
}

fn create(config_path: &Path, path: &str, kind: &str, data: Option<&str>) -> String {
    let mut args = vec!["create", path, "--kind", kind];
    if let Some(data) = data {
        args.push("--data");
        args.push(data);
    }
    run_json(config_path, &args)["id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Serve one canned HTTP response from a background thread.
fn serve_once(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        stream.write_all(response.as_bytes()).unwrap();
    });
    format!("http://{}", addr)
}

#[test]
fn test_kinds() {
    let (_tmp, config) = setup_test_env();
    let kinds = run_json(&config, &["kinds"]);
    let names: Vec<&str> = kinds
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k["kind"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 8);
    for expected in ["http", "sql", "grpc", "jq", "redis", "md", "sql-source", "http-source"] {
        assert!(names.contains(&expected), "missing kind {}", expected);
    }
}

#[test]
fn test_list_on_fresh_store_is_empty() {
    let (tmp, config) = setup_test_env();
    assert_eq!(run_json(&config, &["list"]), serde_json::json!([]));
    assert!(!tmp.path().join("data/apiary.json").exists());
}

#[test]
fn test_create_rename_get_delete() {
    let (tmp, config) = setup_test_env();

    let id = create(&config, "folder/a", "http", None);
    assert!(tmp.path().join("data/apiary.json").exists());

    let listed = run_json(&config, &["list"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["path"], "folder/a");
    assert_eq!(listed[0]["kind"], "http");
    assert_eq!(listed[0]["data"]["method"], "GET");

    run_json(&config, &["rename", &id, "folder/b"]);
    let got = run_json(&config, &["get", &id]);
    assert_eq!(got["id"], id.as_str());
    assert_eq!(got["path"], "folder/b");
    assert_eq!(got["kind"], "http");

    let deleted = run_json(&config, &["delete", &id]);
    assert_eq!(deleted["deleted"], true);
    let (_, stderr, success) = run_apiary(&config, &["get", &id]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);

    let again = run_json(&config, &["delete", &id]);
    assert_eq!(again["deleted"], false);
}

#[test]
fn test_create_with_data_and_update() {
    let (_tmp, config) = setup_test_env();
    let id = create(
        &config,
        "db/report",
        "sql",
        Some(r#"{"dsn": "postgres://localhost/app", "query": "select 1"}"#),
    );

    let got = run_json(&config, &["get", &id]);
    assert_eq!(got["data"]["database"], "postgres");
    assert_eq!(got["data"]["query"], "select 1");

    let data = r#"{"database": "sqlite", "dsn": "file:a.db", "query": "select 2"}"#;
    run_json(&config, &["update", &id, "--data", data]);
    let got = run_json(&config, &["get", &id]);
    assert_eq!(got["data"]["database"], "sqlite");
    assert_eq!(got["data"]["query"], "select 2");
}

#[test]
fn test_create_unknown_kind_fails() {
    let (tmp, config) = setup_test_env();
    let (_, stderr, success) = run_apiary(&config, &["create", "x", "--kind", "websocket"]);
    assert!(!success);
    assert!(stderr.contains("websocket"), "stderr: {}", stderr);
    assert!(!tmp.path().join("data/apiary.json").exists());
}

#[test]
fn test_list_tree_and_duplicate() {
    let (_tmp, config) = setup_test_env();
    let id = create(&config, "api/users/create", "http", Some(r#"{"method": "POST"}"#));
    let copy = run_json(&config, &["duplicate", &id])["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(copy, id);
    assert_eq!(run_json(&config, &["get", &copy])["path"], "api/users/create (1)");

    let listing = run_json(&config, &["list", "--tree"]);
    let users = &listing["tree"]["dirs"]["api"]["dirs"]["users"]["ids"];
    assert_eq!(users.as_array().unwrap().len(), 2);
    assert_eq!(listing["requests"][id.as_str()]["sub_kind"], "POST");
    assert_eq!(listing["requests"][id.as_str()]["kind"], "http");
}

#[test]
fn test_list_subset_with_missing_id_fails() {
    let (_tmp, config) = setup_test_env();
    let id = create(&config, "a", "md", None);
    let subset = run_json(&config, &["list", &id]);
    assert_eq!(subset.as_array().unwrap().len(), 1);

    let (_, _, success) = run_apiary(&config, &["list", &id, "missing"]);
    assert!(!success);
}

#[test]
fn test_perform_http_records_history() {
    let (_tmp, config) = setup_test_env();
    let base = serve_once(concat!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n",
        "Content-Length: 2\r\nConnection: close\r\n\r\nok",
    ));
    let data = format!(r#"{{"url": "{}/ping"}}"#, base);
    let id = create(&config, "api/ping", "http", Some(data.as_str()));

    let performed = run_json(&config, &["perform", &id]);
    assert_eq!(performed["response"]["code"], 200);
    assert_eq!(performed["response"]["body"], "ok");

    let got = run_json(&config, &["get", &id]);
    let responses = got["responses"].as_array().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["response"]["code"], 200);
}

#[test]
fn test_perform_without_executor_fails() {
    let (_tmp, config) = setup_test_env();
    let id = create(&config, "rpc/health", "grpc", None);
    let (_, stderr, success) = run_apiary(&config, &["perform", &id]);
    assert!(!success);
    assert!(stderr.contains("cannot be performed"), "stderr: {}", stderr);
    assert!(run_json(&config, &["get", &id])["responses"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn test_call_endpoint_records_nothing() {
    let (_tmp, config) = setup_test_env();
    let base = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 7\r\nConnection: close\r\n\r\nmissing",
    );
    let data = format!(
        r#"{{"serverUrl": "{}", "auth": {{"type": "bearer", "token": "t"}}}}"#,
        base
    );
    let source = create(&config, "sources/api", "http-source", Some(data.as_str()));

    let explored = run_json(
        &config,
        &["call", &source, "GET", "/pets/1", "--header", "Accept=application/json"],
    );
    assert_eq!(explored["response"]["code"], 404);
    assert_eq!(explored["response"]["body"], "missing");
    assert!(run_json(&config, &["get", &source])["responses"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn test_endpoints_and_example_from_spec_file() {
    let (_tmp, config) = setup_test_env();
    let spec = include_str!("../crates/apiary-core/tests/fixtures/petstore.json");
    let data = serde_json::json!({
        "serverUrl": "https://petstore.swagger.io/v2",
        "specSource": "file",
        "specData": spec,
    })
    .to_string();
    let source = create(&config, "sources/petstore", "http-source", Some(data.as_str()));

    let endpoints = run_json(&config, &["endpoints", &source]);
    let endpoints = endpoints.as_array().unwrap();
    assert_eq!(endpoints.len(), 7);
    assert_eq!(endpoints[0]["path"], "/pet");
    assert_eq!(endpoints[0]["method"], "POST");

    let example = run_json(&config, &["example", &source, "get", "/pet/findByStatus"]);
    assert_eq!(example["endpoint"]["query"][0]["key"], "status");
    assert_eq!(
        example["request"]["url"],
        "https://petstore.swagger.io/v2/pet/findByStatus?status=item1%2Citem2"
    );

    let (_, stderr, success) = run_apiary(&config, &["example", &source, "PUT", "/nowhere"]);
    assert!(!success);
    assert!(stderr.contains("/nowhere"), "stderr: {}", stderr);
}

#[test]
fn test_call_fills_path_params_and_query() {
    let (_tmp, config) = setup_test_env();
    let base = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok");
    let data = format!(r#"{{"serverUrl": "{}"}}"#, base);
    let source = create(&config, "sources/api", "http-source", Some(data.as_str()));

    let explored = run_json(
        &config,
        &[
            "call", &source, "GET", "/pet/{petId}", "--param", "petId=7", "--query", "full=yes",
        ],
    );
    assert_eq!(explored["response"]["code"], 200);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_apiary(&tmp.path().join("nope.toml"), &["list"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_completions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run_apiary(&tmp.path().join("nope.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("apiary"));
}
