//! Protocol framing and session lifecycle.

mod harness;

use serde_json::{json, Value};

use harness::TestClient;
use tether_jdi::fake::{FakeConnector, FakeJvm};
use tether_jdi::ThreadReference;

#[tokio::test]
async fn ping_round_trip() {
    let mut client = TestClient::start().await;
    client
        .send_raw(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
        .await;
    let response = client.read_message().await;
    assert_eq!(
        response,
        json!({ "jsonrpc": "2.0", "id": 1, "result": { "pong": true } })
    );
}

#[tokio::test]
async fn malformed_json_is_parse_error() {
    let mut client = TestClient::start().await;
    client.send_raw("{this is not json").await;
    let response = client.read_message().await;
    assert_eq!(response.pointer("/error/code").and_then(Value::as_i64), Some(-32700));
    assert_eq!(response["id"], Value::Null);
}

#[tokio::test]
async fn non_object_and_bad_version_are_invalid_requests() {
    let mut client = TestClient::start().await;

    client.send_raw("[1,2,3]").await;
    let response = client.read_message().await;
    assert_eq!(response.pointer("/error/code").and_then(Value::as_i64), Some(-32600));

    client
        .send_raw(r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#)
        .await;
    let response = client.read_message().await;
    assert_eq!(response.pointer("/error/code").and_then(Value::as_i64), Some(-32600));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let mut client = TestClient::start().await;
    let error = client.request_err("frobnicate", json!({})).await;
    assert_eq!(error["code"], -32601);
    assert!(error["message"].as_str().unwrap().contains("frobnicate"));
}

#[tokio::test]
async fn attach_detach_status_lifecycle() {
    let mut client = TestClient::start().await;

    let status = client.request("status", json!({})).await;
    assert_eq!(status["status"], "not_attached");

    let attached = client.attach().await;
    assert_eq!(attached["status"], "attached");
    assert_eq!(attached["vm_name"], "Fake JVM");
    assert_eq!(attached["thread_count"], 1);
    assert_eq!(attached["keep_suspended"], false);

    let status = client.request("status", json!({})).await;
    assert_eq!(status["status"], "attached");
    assert_eq!(status["mapping_loaded"], false);

    // A second attach must be refused while this one is live.
    let error = client.request_err("attach", json!({ "port": 5005 })).await;
    assert!(error["message"].as_str().unwrap().contains("already attached"));

    let detached = client.request("detach", json!({})).await;
    assert_eq!(detached["status"], "detached");

    let status = client.request("status", json!({})).await;
    assert_eq!(status["status"], "not_attached");

    // Operations now fail the attached-precondition.
    let error = client.request_err("list_threads", json!({})).await;
    assert!(error["message"].as_str().unwrap().contains("not attached"));
}

#[tokio::test]
async fn refused_attach_reports_app_not_debuggable() {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_stream);
    let connector = std::sync::Arc::new(FakeConnector::refusing("connection refused"));
    let _server =
        tokio::spawn(tether_bridge::server::run(server_read, server_write, connector, 4000));

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    let (client_read, mut client_write) = tokio::io::split(client_stream);
    let request = r#"{"jsonrpc":"2.0","id":1,"method":"attach","params":{"port":5005}}"#;
    client_write
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    let message = response.pointer("/error/message").and_then(Value::as_str).unwrap();
    assert!(message.contains("APP_NOT_DEBUGGABLE"), "{message}");
    assert!(message.contains("connection refused"), "{message}");
}

#[tokio::test]
async fn attach_validates_parameters() {
    let mut client = TestClient::start().await;

    let error = client.request_err("attach", json!({})).await;
    assert_eq!(error["code"], -32602);
    assert!(error["message"].as_str().unwrap().contains("port"));

    let error = client.request_err("attach", json!({ "port": -1 })).await;
    assert_eq!(error["code"], -32602);
}

#[tokio::test]
async fn attach_resumes_fully_suspended_vm_unless_asked_not_to() {
    let jvm = FakeJvm::new();
    jvm.thread("main").unwrap().suspend().unwrap();

    let mut client = TestClient::start_with(jvm).await;
    let attached = client.request("attach", json!({ "port": 5005 })).await;
    assert_eq!(attached["suspended"], false);
    assert!(!client.jvm.thread("main").unwrap().is_suspended());
}

#[tokio::test]
async fn attach_keep_suspended_leaves_threads_alone() {
    let jvm = FakeJvm::new();
    jvm.thread("main").unwrap().suspend().unwrap();

    let mut client = TestClient::start_with(jvm).await;
    let attached = client
        .request("attach", json!({ "port": 5005, "keep_suspended": true }))
        .await;
    assert_eq!(attached["suspended"], true);
    assert!(client.jvm.thread("main").unwrap().is_suspended());
}

#[tokio::test]
async fn shutdown_responds_then_closes() {
    let mut client = TestClient::start().await;
    let id = client.send("shutdown", json!({})).await;
    let response = client.read_response(id).await;
    assert_eq!(response["result"]["status"], "shutting_down");

    let result = client.server.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn list_threads_filters_daemons_and_truncates() {
    let jvm = FakeJvm::new();
    jvm.add_thread("worker-1", false);
    jvm.add_thread("binder-1", true);
    jvm.add_thread("binder-2", true);

    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    let listed = client.request("list_threads", json!({})).await;
    assert_eq!(listed["total_threads"], 2);
    assert_eq!(listed["shown_threads"], 2);
    assert_eq!(listed["truncated"], false);
    let names: Vec<&str> = listed["threads"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"main"));
    assert!(names.contains(&"worker-1"));
    assert!(!names.iter().any(|n| n.starts_with("binder")));

    let listed = client
        .request("list_threads", json!({ "include_daemon": true, "max_threads": 3 }))
        .await;
    assert_eq!(listed["total_threads"], 4);
    assert_eq!(listed["shown_threads"], 3);
    assert_eq!(listed["truncated"], true);

    let error = client
        .request_err("list_threads", json!({ "max_threads": 0 }))
        .await;
    assert_eq!(error["code"], -32602);
}

#[tokio::test]
async fn status_never_throws_after_disconnect() {
    let mut client = TestClient::start().await;
    client.attach().await;

    client.jvm.disconnect("transport closed");
    let event = client.read_event("vm_disconnected").await;
    assert_eq!(event["params"]["reason"], "device_disconnected");

    let status = client.request("status", json!({})).await;
    assert_eq!(status["status"], "disconnected");
    assert_eq!(status["reason"], "device_disconnected");

    // Delegated operations surface the disconnect reason.
    let error = client.request_err("list_threads", json!({})).await;
    assert!(error["message"]
        .as_str()
        .unwrap()
        .contains("VM is disconnected: device_disconnected"));

    // Detach is always allowed afterwards and fully resets.
    let detached = client.request("detach", json!({})).await;
    assert_eq!(detached["status"], "detached");
    let status = client.request("status", json!({})).await;
    assert_eq!(status["status"], "not_attached");
}
