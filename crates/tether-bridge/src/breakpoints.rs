//! Line, conditional, logpoint and exception breakpoints.
//!
//! Breakpoints whose class is not loaded yet park behind a class-prepare
//! request and resolve when the class arrives. Hits are dispatched from the
//! event loop: conditions evaluate against the top frame, logpoints format
//! and auto-resume, everything else leaves the thread paused for inspection.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value as Json};

use tether_jdi::{
    ClassRef, Location, ObjectRef, RequestId, SuspendPolicy, ThreadRef,
};

use crate::condition::{self, ConditionOutcome, Expr};
use crate::inspect::{jdi_to_rpc, render_to_string, resolve_path, to_cond_value};
use crate::rpc::{params_object, Params, RpcError};
use crate::session::Session;
use crate::threads::build_stopped;

/// Ring size for per-logpoint hit history.
pub const LOGPOINT_HISTORY_CAP: usize = 256;

const DEFAULT_STACK_MAX_FRAMES: i64 = 10;
const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointStatus {
    Set,
    Pending,
}

impl BreakpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakpointStatus::Set => "set",
            BreakpointStatus::Pending => "pending",
        }
    }
}

#[derive(Clone)]
pub struct CompiledCondition {
    pub raw: String,
    pub expr: Expr,
}

#[derive(Clone, Serialize)]
pub struct LogpointHit {
    pub timestamp_ms: u64,
    pub location: String,
    pub thread: String,
    pub hit_count: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
}

pub struct Breakpoint {
    pub id: u32,
    pub class_pattern: String,
    pub line: u32,
    pub status: BreakpointStatus,
    pub location: Option<String>,
    pub request: Option<RequestId>,
    pub prepare_request: Option<RequestId>,
    pub condition: Option<CompiledCondition>,
    pub log_message: Option<String>,
    pub capture_stack: bool,
    pub stack_max_frames: usize,
    pub hit_count: u64,
    pub history: VecDeque<LogpointHit>,
}

impl Breakpoint {
    fn to_json(&self) -> Json {
        let mut entry = json!({
            "breakpoint_id": self.id,
            "class_pattern": self.class_pattern,
            "line": self.line,
            "status": self.status.as_str(),
            "capture_stack": self.capture_stack,
            "stack_max_frames": self.stack_max_frames,
        });
        if let Some(location) = &self.location {
            entry["location"] = json!(location);
        }
        if let Some(condition) = &self.condition {
            entry["condition"] = json!(condition.raw);
        }
        if let Some(log_message) = &self.log_message {
            entry["log_message"] = json!(log_message);
            entry["hit_count"] = json!(self.hit_count);
        }
        entry
    }
}

#[derive(Serialize)]
pub struct ExceptionBreakpoint {
    #[serde(rename = "breakpoint_id")]
    pub id: u32,
    pub class_pattern: String,
    pub caught: bool,
    pub uncaught: bool,
    pub status: BreakpointStatus,
    #[serde(skip)]
    pub request: Option<RequestId>,
    #[serde(skip)]
    pub prepare_request: Option<RequestId>,
}

/// Literal match unless the pattern carries `*`; globs become anchored
/// regexes with `.` escaped and `*` widened to `.*`.
pub fn class_matches(pattern: &str, class_name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == class_name;
    }
    match pattern_regex(pattern) {
        Some(regex) => regex.is_match(class_name),
        None => false,
    }
}

fn pattern_regex(pattern: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    regex::Regex::new(&format!("^{escaped}$")).ok()
}

fn matches_all_exceptions(pattern: &str) -> bool {
    pattern.is_empty() || pattern == "*"
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Session {
    // -----------------------------------------------------------------------
    // RPC surface

    pub fn set_breakpoint(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let class_pattern = params.str("class_pattern")?.to_string();
        let line = params.positive_i64("line")? as u32;
        let condition_raw = params
            .opt_str("condition")?
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let log_message = params
            .opt_str("log_message")?
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string);
        let capture_stack = params.bool_or("capture_stack", false)?;
        let stack_max_frames = params.i64_or("stack_max_frames", DEFAULT_STACK_MAX_FRAMES)?;
        if stack_max_frames <= 0 {
            return Err(RpcError::invalid_params(format!(
                "parameter stack_max_frames must be positive, got {stack_max_frames}"
            )));
        }

        let condition = condition_raw
            .map(|raw| {
                condition::parse(&raw)
                    .map(|expr| CompiledCondition { raw, expr })
                    .map_err(|err| {
                        RpcError::invalid_params(format!("ERR_CONDITION_SYNTAX: {err}"))
                    })
            })
            .transpose()?;

        let vm = self.vm()?;
        let id = self.state.lock().alloc_breakpoint_id();

        let resolved = resolve_line_location(&vm, &class_pattern, line)?;

        let manager = vm.event_request_manager();
        let mut breakpoint = Breakpoint {
            id,
            class_pattern: class_pattern.clone(),
            line,
            status: BreakpointStatus::Pending,
            location: None,
            request: None,
            prepare_request: None,
            condition,
            log_message,
            capture_stack,
            stack_max_frames: stack_max_frames as usize,
            hit_count: 0,
            history: VecDeque::new(),
        };

        let response = match resolved {
            Some(location) => {
                let request = manager
                    .create_breakpoint(&location, SuspendPolicy::EventThread)
                    .map_err(jdi_to_rpc)?;
                let display = location.display();
                breakpoint.status = BreakpointStatus::Set;
                breakpoint.location = Some(display.clone());
                breakpoint.request = Some(request);
                json!({
                    "status": "set",
                    "breakpoint_id": id,
                    "location": display,
                })
            }
            None => {
                let prepare = manager
                    .create_class_prepare(&class_pattern, SuspendPolicy::None)
                    .map_err(jdi_to_rpc)?;
                breakpoint.prepare_request = Some(prepare);
                json!({
                    "status": "pending",
                    "breakpoint_id": id,
                    "reason": "class_not_loaded",
                    "class_pattern": class_pattern,
                    "line": line,
                })
            }
        };

        self.state.lock().breakpoints.insert(id, breakpoint);
        Ok(response)
    }

    pub fn remove_breakpoint(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let id = params.positive_i64("breakpoint_id")? as u32;
        let (vm, breakpoint) = {
            let mut state = self.state.lock();
            let Some(breakpoint) = state.breakpoints.remove(&id) else {
                return Err(RpcError::invalid_request(format!("unknown breakpoint_id {id}")));
            };
            (state.vm.clone(), breakpoint)
        };

        // Request deletion is best effort: a stale request on a disconnected
        // VM must not make removal fail.
        if let Some(vm) = vm {
            let manager = vm.event_request_manager();
            if let Some(request) = breakpoint.request {
                let _ = manager.delete(request);
            }
            if let Some(prepare) = breakpoint.prepare_request {
                let _ = manager.delete(prepare);
            }
        }

        Ok(json!({ "status": "removed", "breakpoint_id": id }))
    }

    pub fn list_breakpoints(&self) -> Result<Json, RpcError> {
        let state = self.state.lock();
        let breakpoints: Vec<Json> = state.breakpoints.values().map(Breakpoint::to_json).collect();
        Ok(json!({ "count": breakpoints.len(), "breakpoints": breakpoints }))
    }

    pub fn set_exception_breakpoint(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let class_pattern = params.str_or("class_pattern", "*")?;
        let caught = params.bool_or("caught", false)?;
        let uncaught = params.bool_or("uncaught", false)?;
        if !caught && !uncaught {
            return Err(RpcError::invalid_params(
                "at least one of caught/uncaught must be true",
            ));
        }

        let vm = self.vm()?;
        let id = self.state.lock().alloc_breakpoint_id();
        let manager = vm.event_request_manager();

        let mut breakpoint = ExceptionBreakpoint {
            id,
            class_pattern: class_pattern.clone(),
            caught,
            uncaught,
            status: BreakpointStatus::Pending,
            request: None,
            prepare_request: None,
        };

        let response = if matches_all_exceptions(&class_pattern) {
            let request = manager
                .create_exception(None, caught, uncaught, SuspendPolicy::EventThread)
                .map_err(jdi_to_rpc)?;
            breakpoint.status = BreakpointStatus::Set;
            breakpoint.request = Some(request);
            json!({
                "status": "set",
                "breakpoint_id": id,
                "class_pattern": class_pattern,
                "caught": caught,
                "uncaught": uncaught,
            })
        } else {
            let loaded = vm.classes_by_name(&class_pattern).map_err(jdi_to_rpc)?;
            match loaded.first() {
                Some(class) => {
                    let request = manager
                        .create_exception(Some(class), caught, uncaught, SuspendPolicy::EventThread)
                        .map_err(jdi_to_rpc)?;
                    breakpoint.status = BreakpointStatus::Set;
                    breakpoint.request = Some(request);
                    json!({
                        "status": "set",
                        "breakpoint_id": id,
                        "class_pattern": class_pattern,
                        "caught": caught,
                        "uncaught": uncaught,
                    })
                }
                None => {
                    let prepare = manager
                        .create_class_prepare(&class_pattern, SuspendPolicy::None)
                        .map_err(jdi_to_rpc)?;
                    breakpoint.prepare_request = Some(prepare);
                    json!({
                        "status": "pending",
                        "breakpoint_id": id,
                        "reason": "class_not_loaded",
                        "class_pattern": class_pattern,
                        "caught": caught,
                        "uncaught": uncaught,
                    })
                }
            }
        };

        self.state.lock().exception_breakpoints.insert(id, breakpoint);
        Ok(response)
    }

    pub fn remove_exception_breakpoint(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let id = params.positive_i64("breakpoint_id")? as u32;
        let (vm, breakpoint) = {
            let mut state = self.state.lock();
            let Some(breakpoint) = state.exception_breakpoints.remove(&id) else {
                return Err(RpcError::invalid_request(format!(
                    "unknown exception breakpoint_id {id}"
                )));
            };
            (state.vm.clone(), breakpoint)
        };

        if let Some(vm) = vm {
            let manager = vm.event_request_manager();
            if let Some(request) = breakpoint.request {
                let _ = manager.delete(request);
            }
            if let Some(prepare) = breakpoint.prepare_request {
                let _ = manager.delete(prepare);
            }
        }

        Ok(json!({ "status": "removed", "breakpoint_id": id }))
    }

    pub fn list_exception_breakpoints(&self) -> Result<Json, RpcError> {
        let state = self.state.lock();
        let breakpoints: Vec<Json> = state
            .exception_breakpoints
            .values()
            .map(|bp| serde_json::to_value(bp).unwrap_or(Json::Null))
            .collect();
        Ok(json!({
            "count": breakpoints.len(),
            "exception_breakpoints": breakpoints,
        }))
    }

    pub fn logpoint_history(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let id = params.positive_i64("breakpoint_id")? as u32;
        let limit = params.i64_or("limit", DEFAULT_HISTORY_LIMIT)?;
        if limit <= 0 {
            return Err(RpcError::invalid_params(format!(
                "parameter limit must be positive, got {limit}"
            )));
        }

        let state = self.state.lock();
        let Some(breakpoint) = state.breakpoints.get(&id) else {
            return Err(RpcError::invalid_request(format!("unknown breakpoint_id {id}")));
        };
        let skip = breakpoint.history.len().saturating_sub(limit as usize);
        let hits: Vec<Json> = breakpoint
            .history
            .iter()
            .skip(skip)
            .map(|hit| serde_json::to_value(hit).unwrap_or(Json::Null))
            .collect();
        Ok(json!({
            "breakpoint_id": id,
            "count": hits.len(),
            "hits": hits,
        }))
    }

    // -----------------------------------------------------------------------
    // Event-loop dispatch (no session lock held by the caller)

    /// A class the VM just prepared: resolve any pending breakpoints on it.
    pub fn on_class_prepare(&self, class: &ClassRef) {
        let class_name = class.name();

        let pending_lines: Vec<(u32, u32)> = {
            let state = self.state.lock();
            state
                .breakpoints
                .values()
                .filter(|bp| {
                    bp.status == BreakpointStatus::Pending
                        && class_matches(&bp.class_pattern, &class_name)
                })
                .map(|bp| (bp.id, bp.line))
                .collect()
        };

        let vm = { self.state.lock().vm.clone() };
        let Some(vm) = vm else {
            return;
        };
        let manager = vm.event_request_manager();

        for (id, line) in pending_lines {
            let location = match class.locations_of_line(line) {
                Ok(locations) => locations.into_iter().next(),
                Err(err) => {
                    tracing::warn!(%err, class = %class_name, line, "line lookup failed");
                    None
                }
            };
            // The class matched but carries no code at this line; stay pending
            // in case another class matching the pattern does.
            let Some(location) = location else {
                continue;
            };
            let request = match manager.create_breakpoint(&location, SuspendPolicy::EventThread) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(%err, breakpoint_id = id, "deferred breakpoint failed");
                    continue;
                }
            };

            let display = location.display();
            let stale_prepare = {
                let mut state = self.state.lock();
                match state.breakpoints.get_mut(&id) {
                    Some(bp) => {
                        bp.status = BreakpointStatus::Set;
                        bp.location = Some(display.clone());
                        bp.request = Some(request);
                        bp.prepare_request.take()
                    }
                    // Removed while we were resolving; drop the new request.
                    None => {
                        let _ = manager.delete(request);
                        None
                    }
                }
            };
            if let Some(prepare) = stale_prepare {
                let _ = manager.delete(prepare);
            }

            self.notifier().event(
                "breakpoint_resolved",
                params_object(json!({
                    "breakpoint_id": id,
                    "location": display,
                })),
            );
        }

        // Exception breakpoints waiting on this class.
        let pending_exceptions: Vec<(u32, bool, bool)> = {
            let state = self.state.lock();
            state
                .exception_breakpoints
                .values()
                .filter(|bp| bp.status == BreakpointStatus::Pending && bp.class_pattern == class_name)
                .map(|bp| (bp.id, bp.caught, bp.uncaught))
                .collect()
        };

        for (id, caught, uncaught) in pending_exceptions {
            let request = match manager.create_exception(
                Some(class),
                caught,
                uncaught,
                SuspendPolicy::EventThread,
            ) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(%err, breakpoint_id = id, "deferred exception request failed");
                    continue;
                }
            };
            let (pattern, stale_prepare) = {
                let mut state = self.state.lock();
                match state.exception_breakpoints.get_mut(&id) {
                    Some(bp) => {
                        bp.status = BreakpointStatus::Set;
                        bp.request = Some(request);
                        (bp.class_pattern.clone(), bp.prepare_request.take())
                    }
                    None => {
                        let _ = manager.delete(request);
                        continue;
                    }
                }
            };
            if let Some(prepare) = stale_prepare {
                let _ = manager.delete(prepare);
            }
            self.notifier().event(
                "exception_breakpoint_resolved",
                params_object(json!({
                    "breakpoint_id": id,
                    "class_pattern": pattern,
                })),
            );
        }
    }

    /// Dispatch a breakpoint hit. Returns `true` when the thread must stay
    /// paused (a real stop); `false` asks the event loop to resume the set.
    pub fn on_breakpoint_event(
        &self,
        request_id: RequestId,
        thread: &ThreadRef,
        location: &Location,
    ) -> bool {
        let snapshot = {
            let state = self.state.lock();
            state
                .breakpoints
                .values()
                .find(|bp| bp.request == Some(request_id))
                .map(|bp| {
                    (
                        bp.id,
                        bp.condition.clone(),
                        bp.log_message.clone(),
                        bp.capture_stack,
                        bp.stack_max_frames,
                    )
                })
        };
        let Some((id, condition, log_message, capture_stack, stack_max_frames)) = snapshot else {
            // A request we no longer track; let the target run.
            return false;
        };

        let mapping = self.mapping();
        let display_location = display_location(mapping.as_deref(), location);

        if let Some(condition) = &condition {
            match self.evaluate_breakpoint_condition(thread, &condition.expr) {
                ConditionOutcome::True => {}
                ConditionOutcome::False => return false,
                ConditionOutcome::Error(error) => {
                    self.notifier().event(
                        "breakpoint_condition_error",
                        params_object(json!({
                            "breakpoint_id": id,
                            "condition": condition.raw,
                            "error": error,
                            "location": display_location,
                        })),
                    );
                    return false;
                }
            }
        }

        if let Some(template) = &log_message {
            self.dispatch_logpoint(
                id,
                template,
                thread,
                &display_location,
                capture_stack,
                stack_max_frames,
            );
            return false;
        }

        // A real stop: count it, freeze the thread, report.
        {
            let mut state = self.state.lock();
            if let Some(bp) = state.breakpoints.get_mut(&id) {
                bp.hit_count += 1;
            }
        }
        self.mark_thread_suspended(thread.unique_id());

        let mut params = match build_stopped(self, thread) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(%err, "stopped payload failed");
                params_object(json!({ "status": "stopped", "location": display_location }))
            }
        };
        params.insert("breakpoint_id".to_string(), json!(id));
        if let Some(condition) = condition {
            params.insert("condition".to_string(), json!(condition.raw));
        }
        self.notifier().event("breakpoint_hit", params);
        true
    }

    fn evaluate_breakpoint_condition(&self, thread: &ThreadRef, expr: &Expr) -> ConditionOutcome {
        let frame = match thread.frame(0) {
            Ok(frame) => frame,
            Err(err) => return ConditionOutcome::Error(format!("cannot read top frame: {err}")),
        };
        let mapping = self.mapping();
        let lookup = |handle: &str| self.lookup_object(handle);
        let resolver = |path: &[String]| {
            resolve_path(&frame, &path.join("."), &lookup, mapping.as_deref())
                .map(|value| to_cond_value(&value))
                .map_err(|err| err.message)
        };
        condition::evaluate_condition(expr, &resolver)
    }

    fn dispatch_logpoint(
        &self,
        id: u32,
        template: &str,
        thread: &ThreadRef,
        display_location: &str,
        capture_stack: bool,
        stack_max_frames: usize,
    ) {
        let hit_count = {
            let mut state = self.state.lock();
            match state.breakpoints.get_mut(&id) {
                Some(bp) => {
                    bp.hit_count += 1;
                    bp.hit_count
                }
                None => return,
            }
        };

        let mapping = self.mapping();
        let message = self.render_log_message(template, hit_count, thread, mapping.as_deref());

        let stack = if capture_stack {
            Some(self.capture_stack_frames(thread, stack_max_frames, mapping.as_deref()))
        } else {
            None
        };

        let hit = LogpointHit {
            timestamp_ms: now_ms(),
            location: display_location.to_string(),
            thread: thread.name(),
            hit_count,
            message: message.clone(),
            stack: stack.clone(),
        };

        {
            let mut state = self.state.lock();
            if let Some(bp) = state.breakpoints.get_mut(&id) {
                bp.history.push_back(hit);
                while bp.history.len() > LOGPOINT_HISTORY_CAP {
                    bp.history.pop_front();
                }
            }
        }

        let mut params = params_object(json!({
            "breakpoint_id": id,
            "message": message,
            "hit_count": hit_count,
            "location": display_location,
            "thread": thread.name(),
        }));
        if let Some(stack) = stack {
            params.insert("stack".to_string(), json!(stack));
        }
        self.notifier().event("logpoint_hit", params);
    }

    /// Substitute `{hitCount}` and `{path}` placeholders. Unresolvable paths
    /// render as `<unresolved:path>` so one bad placeholder does not swallow
    /// the message.
    fn render_log_message(
        &self,
        template: &str,
        hit_count: u64,
        thread: &ThreadRef,
        mapping: Option<&crate::mapping::Mapping>,
    ) -> String {
        let frame = thread.frame(0).ok();
        let lookup = |handle: &str| self.lookup_object(handle);

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            rest = &rest[open + 1..];
            let Some(close) = rest.find('}') else {
                out.push('{');
                break;
            };
            let placeholder = &rest[..close];
            rest = &rest[close + 1..];

            if placeholder == "hitCount" {
                out.push_str(&hit_count.to_string());
                continue;
            }
            let resolved = frame.as_ref().and_then(|frame| {
                resolve_path(frame, placeholder, &lookup, mapping)
                    .ok()
                    .map(|value| render_to_string(&value, mapping))
            });
            match resolved {
                Some(text) => out.push_str(&text),
                None => {
                    out.push_str("<unresolved:");
                    out.push_str(placeholder);
                    out.push('>');
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn capture_stack_frames(
        &self,
        thread: &ThreadRef,
        max_frames: usize,
        mapping: Option<&crate::mapping::Mapping>,
    ) -> Vec<String> {
        let Ok(frames) = thread.frames() else {
            return Vec::new();
        };
        frames
            .iter()
            .take(max_frames)
            .map(|frame| {
                let location = frame.location();
                let class = mapping
                    .and_then(|m| m.deobfuscate_class(&location.class_name))
                    .unwrap_or(&location.class_name);
                let method = mapping
                    .and_then(|m| {
                        m.deobfuscate_method(
                            &location.class_name,
                            &location.method_name,
                            Some(location.method_arity),
                        )
                    })
                    .unwrap_or(&location.method_name);
                format!("{class}.{method}:{}", location.line)
            })
            .collect()
    }

    /// Dispatch an exception hit; the thread always stays paused.
    pub fn on_exception_event(
        &self,
        request_id: RequestId,
        thread: &ThreadRef,
        exception: &ObjectRef,
        throw_location: &Location,
        catch_location: Option<&Location>,
    ) -> bool {
        let id = {
            let state = self.state.lock();
            state
                .exception_breakpoints
                .values()
                .find(|bp| bp.request == Some(request_id))
                .map(|bp| bp.id)
        };
        let Some(id) = id else {
            return false;
        };

        let mapping = self.mapping();
        let exception_class = exception
            .reference_type()
            .map(|class| class.name())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let exception_class = mapping
            .as_deref()
            .and_then(|m| m.deobfuscate_class(&exception_class).map(str::to_string))
            .unwrap_or(exception_class);
        let exception_message = exception
            .get_value("detailMessage")
            .ok()
            .flatten()
            .and_then(|value| match value {
                tether_jdi::Value::Text(text) => Some(text),
                _ => None,
            });

        self.mark_thread_suspended(thread.unique_id());

        let mut params = match build_stopped(self, thread) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(%err, "stopped payload failed");
                params_object(json!({ "status": "stopped" }))
            }
        };
        params.insert("breakpoint_id".to_string(), json!(id));
        params.insert("exception_class".to_string(), json!(exception_class));
        params.insert(
            "exception_message".to_string(),
            exception_message.map(Json::String).unwrap_or(Json::Null),
        );
        params.insert(
            "throw_location".to_string(),
            json!(display_location(mapping.as_deref(), throw_location)),
        );
        params.insert(
            "catch_location".to_string(),
            catch_location
                .map(|loc| Json::String(display_location(mapping.as_deref(), loc)))
                .unwrap_or(Json::Null),
        );
        self.notifier().event("exception_hit", params);
        true
    }
}

/// `<class>:<line>` with the class deobfuscated when a mapping is loaded.
pub fn display_location(mapping: Option<&crate::mapping::Mapping>, location: &Location) -> String {
    let class = mapping
        .and_then(|m| m.deobfuscate_class(&location.class_name))
        .unwrap_or(&location.class_name);
    format!("{class}:{}", location.line)
}

/// Find a location for `pattern`:`line` among already-loaded classes.
fn resolve_line_location(
    vm: &tether_jdi::VmHandle,
    pattern: &str,
    line: u32,
) -> Result<Option<Location>, RpcError> {
    let candidates: Vec<ClassRef> = if pattern.contains('*') {
        vm.all_classes()
            .map_err(jdi_to_rpc)?
            .into_iter()
            .filter(|class| class_matches(pattern, &class.name()))
            .collect()
    } else {
        vm.classes_by_name(pattern).map_err(jdi_to_rpc)?
    };

    for class in candidates {
        let locations = class.locations_of_line(line).map_err(jdi_to_rpc)?;
        if let Some(location) = locations.into_iter().next() {
            return Ok(Some(location));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_match_exactly() {
        assert!(class_matches("app.Target", "app.Target"));
        assert!(!class_matches("app.Target", "app.TargetKt"));
        // No glob: the dot is literal-compared, not a regex wildcard.
        assert!(!class_matches("app.Target", "appXTarget"));
    }

    #[test]
    fn glob_patterns_escape_dots() {
        assert!(class_matches("app.*", "app.Target"));
        assert!(class_matches("*.Target", "com.example.Target"));
        assert!(!class_matches("app.*", "appXTarget"));
        assert!(class_matches("*", "anything"));
    }

    #[test]
    fn all_exception_patterns() {
        assert!(matches_all_exceptions(""));
        assert!(matches_all_exceptions("*"));
        assert!(!matches_all_exceptions("java.lang.Error"));
    }
}
