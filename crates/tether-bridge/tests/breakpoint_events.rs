//! Breakpoint lifecycle: deferred resolution, conditions, logpoints,
//! exception breakpoints.

mod harness;

use serde_json::json;

use harness::{loc, TestClient};
use tether_jdi::fake::{FakeClass, FakeFrameData, FakeJvm, FakeObject};
use tether_jdi::{ThreadReference, Value as JdiValue};

fn target_class() -> std::sync::Arc<FakeClass> {
    FakeClass::new("app.Target")
        .method("handleRequest", 1, 5..=20)
        .build()
}

#[tokio::test]
async fn pending_breakpoint_resolves_on_class_prepare() {
    let mut client = TestClient::start().await;
    client.attach().await;

    let set = client
        .request("set_breakpoint", json!({ "class_pattern": "app.Target", "line": 10 }))
        .await;
    assert_eq!(set["status"], "pending");
    assert_eq!(set["breakpoint_id"], 1);
    assert_eq!(set["reason"], "class_not_loaded");
    assert_eq!(client.jvm.prepare_request_count(), 1);

    client.jvm.load_class(target_class());

    let resolved = client.read_event("breakpoint_resolved").await;
    assert_eq!(resolved["params"]["breakpoint_id"], 1);
    assert_eq!(resolved["params"]["location"], "app.Target:10");

    let listed = client.request("list_breakpoints", json!({})).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["breakpoints"][0]["status"], "set");
    assert_eq!(listed["breakpoints"][0]["location"], "app.Target:10");

    // The prepare request was consumed by the resolution.
    client.wait_until(|jvm| jvm.prepare_request_count() == 0).await;
    assert_eq!(client.jvm.breakpoint_request_count(), 1);
}

#[tokio::test]
async fn loaded_class_sets_immediately() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());

    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    let set = client
        .request("set_breakpoint", json!({ "class_pattern": "app.Target", "line": 10 }))
        .await;
    assert_eq!(set["status"], "set");
    assert_eq!(set["location"], "app.Target:10");
}

#[tokio::test]
async fn glob_patterns_match_loaded_classes() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());

    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    let set = client
        .request("set_breakpoint", json!({ "class_pattern": "app.*", "line": 10 }))
        .await;
    assert_eq!(set["status"], "set");
    assert_eq!(set["location"], "app.Target:10");
}

#[tokio::test]
async fn set_remove_round_trip_keeps_count() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());

    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    let before = client.request("list_breakpoints", json!({})).await;
    let set = client
        .request("set_breakpoint", json!({ "class_pattern": "app.Target", "line": 10 }))
        .await;
    let id = set["breakpoint_id"].as_i64().unwrap();
    let removed = client
        .request("remove_breakpoint", json!({ "breakpoint_id": id }))
        .await;
    assert_eq!(removed["status"], "removed");

    let after = client.request("list_breakpoints", json!({})).await;
    assert_eq!(before["count"], after["count"]);
    assert_eq!(client.jvm.breakpoint_request_count(), 0);

    let error = client
        .request_err("remove_breakpoint", json!({ "breakpoint_id": id }))
        .await;
    assert_eq!(error["code"], -32600);
}

#[tokio::test]
async fn breakpoint_ids_increase_across_kinds() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());

    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    let first = client
        .request("set_breakpoint", json!({ "class_pattern": "app.Target", "line": 10 }))
        .await;
    let second = client
        .request(
            "set_exception_breakpoint",
            json!({ "class_pattern": "*", "caught": true }),
        )
        .await;
    let third = client
        .request("set_breakpoint", json!({ "class_pattern": "app.Target", "line": 11 }))
        .await;

    assert_eq!(first["breakpoint_id"], 1);
    assert_eq!(second["breakpoint_id"], 2);
    assert_eq!(third["breakpoint_id"], 3);
}

#[tokio::test]
async fn invalid_breakpoint_parameters() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    let error = client
        .request_err("set_breakpoint", json!({ "class_pattern": "app.Target", "line": 0 }))
        .await;
    assert_eq!(error["code"], -32602);

    let error = client
        .request_err("set_breakpoint", json!({ "line": 10 }))
        .await;
    assert!(error["message"].as_str().unwrap().contains("class_pattern"));

    let error = client
        .request_err("remove_breakpoint", json!({ "breakpoint_id": 0 }))
        .await;
    assert_eq!(error["code"], -32602);
}

#[tokio::test]
async fn condition_syntax_errors_fail_upfront() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    for condition in ["attempts >", "x.y()", "name == \"abc"] {
        let error = client
            .request_err(
                "set_breakpoint",
                json!({ "class_pattern": "app.Target", "line": 10, "condition": condition }),
            )
            .await;
        assert_eq!(error["code"], -32602);
        assert!(
            error["message"].as_str().unwrap().contains("ERR_CONDITION_SYNTAX"),
            "{condition}: {}",
            error["message"]
        );
    }
}

#[tokio::test]
async fn plain_hit_stops_and_reports_locals() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    client
        .request("set_breakpoint", json!({ "class_pattern": "app.Target", "line": 10 }))
        .await;

    let thread = client.jvm.thread("main").unwrap();
    thread.set_frames(vec![FakeFrameData::new(loc("app.Target", "handleRequest", 1, 10))
        .local("attempts", JdiValue::Int(3))]);
    assert!(client.jvm.hit_breakpoint("main", "app.Target", 10));

    let hit = client.read_event("breakpoint_hit").await;
    assert_eq!(hit["params"]["breakpoint_id"], 1);
    assert_eq!(hit["params"]["status"], "stopped");
    assert_eq!(hit["params"]["thread"], "main");
    assert_eq!(hit["params"]["location"], "app.Target:10");
    assert_eq!(hit["params"]["method"], "handleRequest");
    assert_eq!(hit["params"]["locals"]["attempts"], 3);

    // The thread stays paused for inspection.
    assert!(client.jvm.thread("main").unwrap().is_suspended());

    // A hit is counted.
    let listed = client.request("list_breakpoints", json!({})).await;
    assert_eq!(listed["breakpoints"][0]["status"], "set");

    // Resume releases it.
    let resumed = client.request("resume", json!({ "thread_name": "main" })).await;
    assert_eq!(resumed["scope"], "thread");
    assert!(!client.jvm.thread("main").unwrap().is_suspended());
}

#[tokio::test]
async fn condition_false_auto_resumes_without_notification() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    client
        .request(
            "set_breakpoint",
            json!({
                "class_pattern": "app.Target",
                "line": 10,
                "condition": "helper.seed < 0",
            }),
        )
        .await;

    let helper = FakeObject::of("com.example.Helper")
        .field("seed", JdiValue::Int(7))
        .build();
    let thread = client.jvm.thread("main").unwrap();
    thread.set_frames(vec![FakeFrameData::new(loc("app.Target", "handleRequest", 1, 10))
        .local("helper", JdiValue::Object(helper))]);

    assert!(client.jvm.hit_breakpoint("main", "app.Target", 10));

    // The event loop must evaluate and resume; wait for the release.
    client
        .wait_until(|jvm| !jvm.thread("main").unwrap().is_suspended())
        .await;

    // No hit notification arrived: the next message is our ping response.
    let pong = client.request("ping", json!({})).await;
    assert_eq!(pong["pong"], true);
    assert!(!client.saw_event("breakpoint_hit"));
    assert!(!client.saw_event("breakpoint_condition_error"));
}

#[tokio::test]
async fn condition_true_stops_and_carries_the_condition() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    client
        .request(
            "set_breakpoint",
            json!({
                "class_pattern": "app.Target",
                "line": 10,
                "condition": "helper.seed >= 7 && !done",
            }),
        )
        .await;

    let helper = FakeObject::of("com.example.Helper")
        .field("seed", JdiValue::Int(7))
        .build();
    let thread = client.jvm.thread("main").unwrap();
    thread.set_frames(vec![FakeFrameData::new(loc("app.Target", "handleRequest", 1, 10))
        .local("helper", JdiValue::Object(helper))
        .local("done", JdiValue::Boolean(false))]);

    assert!(client.jvm.hit_breakpoint("main", "app.Target", 10));

    let hit = client.read_event("breakpoint_hit").await;
    assert_eq!(hit["params"]["condition"], "helper.seed >= 7 && !done");
    assert!(client.jvm.thread("main").unwrap().is_suspended());
}

#[tokio::test]
async fn condition_runtime_error_notifies_and_resumes() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    client
        .request(
            "set_breakpoint",
            json!({
                "class_pattern": "app.Target",
                "line": 10,
                "condition": "missingVar > 0",
            }),
        )
        .await;

    assert!(client.jvm.hit_breakpoint("main", "app.Target", 10));

    let error = client.read_event("breakpoint_condition_error").await;
    assert_eq!(error["params"]["breakpoint_id"], 1);
    assert_eq!(error["params"]["condition"], "missingVar > 0");
    assert!(error["params"]["error"]
        .as_str()
        .unwrap()
        .contains("missingVar"));
    assert_eq!(error["params"]["location"], "app.Target:10");

    client
        .wait_until(|jvm| !jvm.thread("main").unwrap().is_suspended())
        .await;
    assert!(!client.saw_event("breakpoint_hit"));
}

#[tokio::test]
async fn logpoints_format_and_never_suspend() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    client
        .request(
            "set_breakpoint",
            json!({
                "class_pattern": "app.Target",
                "line": 10,
                "log_message": "attempt {hitCount}: seed={helper.seed}",
            }),
        )
        .await;

    let helper = FakeObject::of("com.example.Helper")
        .field("seed", JdiValue::Int(7))
        .build();
    let thread = client.jvm.thread("main").unwrap();
    thread.set_frames(vec![FakeFrameData::new(loc("app.Target", "handleRequest", 1, 10))
        .local("helper", JdiValue::Object(helper))]);

    assert!(client.jvm.hit_breakpoint("main", "app.Target", 10));
    let first = client.read_event("logpoint_hit").await;
    assert_eq!(first["params"]["message"], "attempt 1: seed=7");
    assert_eq!(first["params"]["hit_count"], 1);
    assert_eq!(first["params"]["thread"], "main");

    client
        .wait_until(|jvm| !jvm.thread("main").unwrap().is_suspended())
        .await;

    assert!(client.jvm.hit_breakpoint("main", "app.Target", 10));
    let second = client.read_event("logpoint_hit").await;
    assert_eq!(second["params"]["message"], "attempt 2: seed=7");
    assert_eq!(second["params"]["hit_count"], 2);

    client
        .wait_until(|jvm| !jvm.thread("main").unwrap().is_suspended())
        .await;

    // Hit history is queryable and counted.
    let history = client
        .request("logpoint_history", json!({ "breakpoint_id": 1 }))
        .await;
    assert_eq!(history["count"], 2);
    assert_eq!(history["hits"][0]["hit_count"], 1);
    assert_eq!(history["hits"][1]["message"], "attempt 2: seed=7");

    let listed = client.request("list_breakpoints", json!({})).await;
    assert_eq!(listed["breakpoints"][0]["hit_count"], 2);
}

#[tokio::test]
async fn logpoint_captures_stack_when_asked() {
    let jvm = FakeJvm::new();
    jvm.add_class(target_class());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    client
        .request(
            "set_breakpoint",
            json!({
                "class_pattern": "app.Target",
                "line": 10,
                "log_message": "here",
                "capture_stack": true,
                "stack_max_frames": 2,
            }),
        )
        .await;

    let thread = client.jvm.thread("main").unwrap();
    thread.set_frames(vec![
        FakeFrameData::new(loc("app.Target", "handleRequest", 1, 10)),
        FakeFrameData::new(loc("app.Main", "dispatch", 0, 30)),
        FakeFrameData::new(loc("app.Main", "main", 1, 12)),
    ]);

    assert!(client.jvm.hit_breakpoint("main", "app.Target", 10));
    let hit = client.read_event("logpoint_hit").await;
    let stack = hit["params"]["stack"].as_array().unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0], "app.Target.handleRequest:10");
    assert_eq!(stack[1], "app.Main.dispatch:30");
}

#[tokio::test]
async fn exception_breakpoint_hit_carries_locations() {
    let jvm = FakeJvm::new();
    jvm.add_class(FakeClass::new("java.lang.IllegalStateException").build());
    let mut client = TestClient::start_with(jvm).await;
    client.attach().await;

    let set = client
        .request(
            "set_exception_breakpoint",
            json!({
                "class_pattern": "java.lang.IllegalStateException",
                "caught": true,
                "uncaught": false,
            }),
        )
        .await;
    assert_eq!(set["status"], "set");
    let bp_id = set["breakpoint_id"].as_i64().unwrap();

    let exception = FakeObject::of("java.lang.IllegalStateException")
        .field("detailMessage", JdiValue::Text("boom".to_string()))
        .build();
    assert!(client.jvm.throw_exception(
        "main",
        exception,
        loc("app.Target", "handleRequest", 1, 42),
        Some(loc("app.Target", "recover", 0, 50)),
    ));

    let hit = client.read_event("exception_hit").await;
    assert_eq!(hit["params"]["breakpoint_id"], bp_id);
    assert_eq!(hit["params"]["exception_class"], "java.lang.IllegalStateException");
    assert_eq!(hit["params"]["exception_message"], "boom");
    assert_eq!(hit["params"]["throw_location"], "app.Target:42");
    assert_eq!(hit["params"]["catch_location"], "app.Target:50");
    assert_eq!(hit["params"]["status"], "stopped");
    assert_eq!(hit["params"]["thread"], "main");

    assert!(client.jvm.thread("main").unwrap().is_suspended());
}

#[tokio::test]
async fn exception_breakpoint_requires_a_flag() {
    let mut client = TestClient::start().await;
    client.attach().await;

    let error = client
        .request_err(
            "set_exception_breakpoint",
            json!({ "class_pattern": "*", "caught": false, "uncaught": false }),
        )
        .await;
    assert_eq!(error["code"], -32602);
}

#[tokio::test]
async fn pending_exception_breakpoint_resolves_on_class_prepare() {
    let mut client = TestClient::start().await;
    client.attach().await;

    let set = client
        .request(
            "set_exception_breakpoint",
            json!({ "class_pattern": "app.CustomError", "caught": true, "uncaught": true }),
        )
        .await;
    assert_eq!(set["status"], "pending");
    let bp_id = set["breakpoint_id"].as_i64().unwrap();

    client.jvm.load_class(FakeClass::new("app.CustomError").build());

    let resolved = client.read_event("exception_breakpoint_resolved").await;
    assert_eq!(resolved["params"]["breakpoint_id"], bp_id);
    assert_eq!(resolved["params"]["class_pattern"], "app.CustomError");

    let listed = client.request("list_exception_breakpoints", json!({})).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["exception_breakpoints"][0]["status"], "set");
}
