//! Shared test client: a bridge server running over an in-memory duplex
//! stream, attached to a scriptable fake JVM.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use tether_bridge::server;
use tether_jdi::fake::{FakeConnector, FakeJvm};
use tether_jdi::Location;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn loc(class: &str, method: &str, arity: usize, line: u32) -> Location {
    Location {
        class_name: class.to_string(),
        method_name: method.to_string(),
        method_arity: arity,
        line,
    }
}

pub struct TestClient {
    pub jvm: FakeJvm,
    writer: WriteHalf<DuplexStream>,
    lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
    next_id: i64,
    /// Notifications skipped while waiting for a response.
    pub events: Vec<Value>,
    pub server: JoinHandle<anyhow::Result<()>>,
}

impl TestClient {
    pub async fn start() -> Self {
        Self::start_with(FakeJvm::new()).await
    }

    pub async fn start_with(jvm: FakeJvm) -> Self {
        let (client, server_stream) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_stream);
        let connector = Arc::new(FakeConnector::new(jvm.clone()));
        let server = tokio::spawn(server::run(server_read, server_write, connector, 4000));

        let (client_read, client_write) = tokio::io::split(client);
        Self {
            jvm,
            writer: client_write,
            lines: BufReader::new(client_read).lines(),
            next_id: 0,
            events: Vec::new(),
            server,
        }
    }

    /// Send a request and return its id without waiting for the response.
    pub async fn send(&mut self, method: &str, params: Value) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.send_raw(&message.to_string()).await;
        id
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write request");
    }

    pub async fn read_message(&mut self) -> Value {
        let line = tokio::time::timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for output")
            .expect("read line")
            .expect("server closed the stream");
        serde_json::from_str(&line).expect("output line is JSON")
    }

    pub async fn read_response(&mut self, id: i64) -> Value {
        for _ in 0..100 {
            let message = self.read_message().await;
            if message.get("id").and_then(Value::as_i64) == Some(id) {
                return message;
            }
            if message.get("method").and_then(Value::as_str) == Some("event") {
                self.events.push(message);
            }
        }
        panic!("no response for request {id}");
    }

    pub async fn read_event(&mut self, event_type: &str) -> Value {
        if let Some(index) = self.events.iter().position(|event| {
            event.pointer("/params/type").and_then(Value::as_str) == Some(event_type)
        }) {
            return self.events.remove(index);
        }
        for _ in 0..100 {
            let message = self.read_message().await;
            if message.pointer("/params/type").and_then(Value::as_str) == Some(event_type) {
                return message;
            }
            if message.get("method").and_then(Value::as_str) == Some("event") {
                self.events.push(message);
            }
        }
        panic!("no {event_type} event");
    }

    pub fn saw_event(&self, event_type: &str) -> bool {
        self.events.iter().any(|event| {
            event.pointer("/params/type").and_then(Value::as_str) == Some(event_type)
        })
    }

    /// Request + response in one go, asserting a `result` came back.
    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.send(method, params).await;
        let response = self.read_response(id).await;
        assert!(
            response.get("error").is_none(),
            "{method} failed: {response}"
        );
        response["result"].clone()
    }

    /// Request expected to fail; returns the error object.
    pub async fn request_err(&mut self, method: &str, params: Value) -> Value {
        let id = self.send(method, params).await;
        let response = self.read_response(id).await;
        response
            .get("error")
            .unwrap_or_else(|| panic!("{method} unexpectedly succeeded: {response}"))
            .clone()
    }

    pub async fn attach(&mut self) -> Value {
        self.request("attach", json!({ "port": 5005 })).await
    }

    /// Poll a fake-side condition until it holds (event-loop work is async).
    pub async fn wait_until(&self, mut check: impl FnMut(&FakeJvm) -> bool) {
        for _ in 0..200 {
            if check(&self.jvm) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within deadline");
    }
}
