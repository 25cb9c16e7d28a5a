//! Line-delimited JSON-RPC 2.0 framing.
//!
//! One JSON object per line on stdin/stdout. Requests carry integer ids;
//! asynchronous debugger events go out as id-less notifications with
//! `method:"event"`. Everything written to stdout funnels through a single
//! writer task so responses and notifications never interleave mid-payload.

use serde_json::{json, Map, Value};
use thiserror::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// `None` marks a notification; the caller gets no response either way.
    pub id: Option<i64>,
    pub method: String,
    pub params: Map<String, Value>,
}

/// Parse one input line into a request.
pub fn parse_request(line: &str) -> Result<RpcRequest, RpcError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| RpcError::parse_error(format!("invalid JSON: {err}")))?;

    let Value::Object(object) = value else {
        return Err(RpcError::invalid_request("request must be a JSON object"));
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(RpcError::invalid_request("missing or invalid jsonrpc version"));
    }

    let method = match object.get("method") {
        Some(Value::String(method)) => method.clone(),
        _ => return Err(RpcError::invalid_request("missing or invalid method")),
    };

    let id = match object.get("id") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_i64()
                .ok_or_else(|| RpcError::invalid_request("id must be an integer"))?,
        ),
    };

    let params = match object.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => return Err(RpcError::invalid_request("params must be an object")),
    };

    Ok(RpcRequest { id, method, params })
}

pub fn success_response(id: i64, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn error_response(id: Option<i64>, error: &RpcError) -> Value {
    let mut body = json!({ "code": error.code, "message": error.message });
    if let Some(data) = &error.data {
        body["data"] = data.clone();
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": body })
}

/// Build an `event` notification: `params.type` discriminates, the remaining
/// fields ride alongside it.
pub fn notification(event_type: &str, mut params: Map<String, Value>) -> Value {
    let mut full = Map::new();
    full.insert("type".to_string(), Value::String(event_type.to_string()));
    full.append(&mut params);
    json!({ "jsonrpc": "2.0", "method": "event", "params": Value::Object(full) })
}

/// Unwrap a `json!({..})` literal into notification params.
pub fn params_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ---------------------------------------------------------------------------
// Named parameter extraction

/// Accessors that name the offending parameter in every failure.
pub struct Params<'a>(pub &'a Map<String, Value>);

impl Params<'_> {
    fn missing(name: &str) -> RpcError {
        RpcError::invalid_params(format!("missing required parameter: {name}"))
    }

    fn wrong_type(name: &str, expected: &str) -> RpcError {
        RpcError::invalid_params(format!("parameter {name} must be {expected}"))
    }

    pub fn str(&self, name: &str) -> Result<&str, RpcError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Err(Self::missing(name)),
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(Self::wrong_type(name, "a string")),
        }
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, RpcError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(Self::wrong_type(name, "a string")),
        }
    }

    pub fn str_or(&self, name: &str, default: &'static str) -> Result<String, RpcError> {
        Ok(self.opt_str(name)?.unwrap_or(default).to_string())
    }

    pub fn i64(&self, name: &str) -> Result<i64, RpcError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Err(Self::missing(name)),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| Self::wrong_type(name, "an integer")),
        }
    }

    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>, RpcError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| Self::wrong_type(name, "an integer")),
        }
    }

    pub fn i64_or(&self, name: &str, default: i64) -> Result<i64, RpcError> {
        Ok(self.opt_i64(name)?.unwrap_or(default))
    }

    /// Required strictly-positive integer (ids, line numbers).
    pub fn positive_i64(&self, name: &str) -> Result<i64, RpcError> {
        let value = self.i64(name)?;
        if value <= 0 {
            return Err(RpcError::invalid_params(format!(
                "parameter {name} must be positive, got {value}"
            )));
        }
        Ok(value)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, RpcError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(Self::wrong_type(name, "a boolean")),
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64, RpcError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| Self::wrong_type(name, "a number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_request() {
        let request = parse_request(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(request.id, Some(1));
        assert_eq!(request.method, "ping");
        assert!(request.params.is_empty());
    }

    #[test]
    fn bad_json_is_parse_error() {
        let err = parse_request("{not json").unwrap_err();
        assert_eq!(err.code, PARSE_ERROR);
    }

    #[test]
    fn non_object_is_invalid_request() {
        let err = parse_request("[1,2]").unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn wrong_version_is_invalid_request() {
        let err = parse_request(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn non_integer_id_is_invalid_request() {
        let err =
            parse_request(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn absent_id_is_a_notification() {
        let request = parse_request(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(request.id.is_none());
    }

    #[test]
    fn missing_param_names_the_parameter() {
        let map = Map::new();
        let err = Params(&map).str("class_pattern").unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.contains("class_pattern"), "{}", err.message);
    }

    #[test]
    fn notification_shape() {
        let mut params = Map::new();
        params.insert("breakpoint_id".to_string(), json!(3));
        let value = notification("breakpoint_resolved", params);
        assert_eq!(value["method"], "event");
        assert_eq!(value["params"]["type"], "breakpoint_resolved");
        assert_eq!(value["params"]["breakpoint_id"], 3);
        assert!(value.get("id").is_none());
    }
}
