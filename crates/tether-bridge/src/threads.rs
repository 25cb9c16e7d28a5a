//! Thread enumeration, stepping, resume scopes, and stack traces.

use std::time::Duration;

use serde_json::{json, Map, Value as Json};
use tokio::sync::oneshot;

use tether_jdi::{
    Location, StepDepth, StepSize, SuspendPolicy, ThreadRef, ThreadStatus, Value, VmHandle,
};

use crate::breakpoints::display_location;
use crate::budget::TokenBudget;
use crate::frame_filter::{self, FrameView};
use crate::inspect::{jdi_to_rpc, Inspector};
use crate::rpc::{Params, RpcError};
use crate::session::{PendingStep, Session, StepAction, ANR_WARNING_SECONDS};

/// JDI suspend counts are matched by repeated resumes; cap the loop so a
/// runaway counter cannot wedge the handler.
const MAX_RESUME_ITERATIONS: u32 = 32;

pub fn find_thread(vm: &VmHandle, name: &str) -> Result<ThreadRef, RpcError> {
    let threads = vm.all_threads().map_err(jdi_to_rpc)?;
    threads
        .into_iter()
        .find(|thread| thread.name() == name)
        .ok_or_else(|| RpcError::invalid_request(format!("thread not found: {name:?}")))
}

fn thread_state(thread: &ThreadRef) -> &'static str {
    if thread.is_suspended() {
        return "SUSPENDED";
    }
    match thread.status() {
        ThreadStatus::Running => "RUNNING",
        // Everything else is some flavor of parked.
        _ => "WAITING",
    }
}

fn is_daemon(thread: &ThreadRef) -> bool {
    matches!(thread.get_value("daemon"), Ok(Some(Value::Boolean(true))))
}

impl Session {
    pub fn list_threads(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let include_daemon = params.bool_or("include_daemon", false)?;
        let max_threads = params.i64_or("max_threads", 20)?;
        if max_threads <= 0 {
            return Err(RpcError::invalid_params(format!(
                "parameter max_threads must be positive, got {max_threads}"
            )));
        }

        let vm = self.vm()?;
        let threads = vm.all_threads().map_err(jdi_to_rpc)?;
        let eligible: Vec<ThreadRef> = threads
            .into_iter()
            .filter(|thread| include_daemon || !is_daemon(thread))
            .collect();

        let total = eligible.len();
        let shown: Vec<Json> = eligible
            .iter()
            .take(max_threads as usize)
            .map(|thread| {
                json!({
                    "name": thread.name(),
                    "state": thread_state(thread),
                    "daemon": is_daemon(thread),
                })
            })
            .collect();

        Ok(json!({
            "threads": shown,
            "total_threads": total,
            "shown_threads": shown.len(),
            "truncated": total > shown.len(),
            "include_daemon": include_daemon,
            "max_threads": max_threads,
        }))
    }

    pub async fn step(
        &self,
        action: StepAction,
        params: &Params<'_>,
    ) -> Result<Json, RpcError> {
        let thread_name = params.str_or("thread_name", "main")?;
        if thread_name.trim().is_empty() {
            return Err(RpcError::invalid_params("thread_name must not be blank"));
        }
        let timeout_seconds = params.f64_or("timeout_seconds", 10.0)?;
        if !(timeout_seconds > 0.0) {
            return Err(RpcError::invalid_params(format!(
                "parameter timeout_seconds must be positive, got {timeout_seconds}"
            )));
        }

        let vm = self.vm()?;
        {
            let state = self.state.lock();
            if state.active_step.is_some() {
                return Err(RpcError::invalid_request(
                    "another step is already in progress",
                ));
            }
        }

        let thread = find_thread(&vm, &thread_name)?;
        if !thread.is_suspended() {
            thread.suspend().map_err(jdi_to_rpc)?;
        }

        let manager = vm.event_request_manager();
        for stale in manager.step_requests_for_thread(thread.unique_id()) {
            let _ = manager.delete(stale);
        }

        let depth = match action {
            StepAction::Over => StepDepth::Over,
            StepAction::Into => StepDepth::Into,
            StepAction::Out => StepDepth::Out,
        };
        let request = manager
            .create_step(&thread, StepSize::Line, depth, 1, SuspendPolicy::EventThread)
            .map_err(jdi_to_rpc)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if state.active_step.is_some() {
                drop(state);
                let _ = manager.delete(request);
                return Err(RpcError::invalid_request(
                    "another step is already in progress",
                ));
            }
            state.active_step = Some(PendingStep {
                action,
                thread_name: thread_name.clone(),
                thread_uid: thread.unique_id(),
                request,
                completion: Some(tx),
            });
            // The thread is about to run again; object handles die with it.
            state.objects.invalidate();
        }

        self.clear_thread_suspended(thread.unique_id());
        thread.resume().map_err(jdi_to_rpc)?;

        match tokio::time::timeout(Duration::from_secs_f64(timeout_seconds), rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Ok(json!({
                "status": "timeout",
                "reason": format!("{} interrupted before completion", action.as_str()),
                "remediation": "re-attach the debugger and retry the step",
            })),
            Err(_elapsed) => {
                let ours = {
                    let mut state = self.state.lock();
                    match &state.active_step {
                        Some(step) if step.request == request => state.active_step.take(),
                        _ => None,
                    }
                };
                if ours.is_some() {
                    let _ = manager.delete(request);
                }
                Ok(json!({
                    "status": "timeout",
                    "reason": format!(
                        "{} did not complete within {timeout_seconds}s",
                        action.as_str()
                    ),
                    "remediation": "the thread may be blocked; resume it or set a breakpoint further ahead and continue",
                }))
            }
        }
    }

    /// A step event arrived: complete the pending step with a stopped payload.
    /// Returns `true` when the thread stays paused.
    pub fn on_step_event(
        &self,
        request_id: tether_jdi::RequestId,
        thread: &ThreadRef,
        _location: &Location,
    ) -> bool {
        let pending = {
            let mut state = self.state.lock();
            match &state.active_step {
                Some(step) if step.request == request_id => state.active_step.take(),
                _ => None,
            }
        };
        let Some(mut pending) = pending else {
            // Stale request from a cancelled step; clean it up and move on.
            if let Ok(vm) = self.vm() {
                let _ = vm.event_request_manager().delete(request_id);
            }
            return false;
        };

        if let Ok(vm) = self.vm() {
            let _ = vm.event_request_manager().delete(request_id);
        }

        self.mark_thread_suspended(thread.unique_id());
        let payload = match build_stopped(self, thread) {
            Ok(params) => Json::Object(params),
            Err(err) => {
                tracing::warn!(%err, "stopped payload failed after step");
                json!({ "status": "stopped", "thread": thread.name() })
            }
        };
        pending.complete(payload);
        true
    }

    pub fn resume(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let thread_name = params.opt_str("thread_name")?.map(str::to_string);
        let vm = self.vm()?;

        match thread_name {
            None => {
                vm.resume().map_err(jdi_to_rpc)?;
                {
                    let mut state = self.state.lock();
                    state.suspended_at.clear();
                    state.objects.invalidate();
                }
                Ok(json!({ "status": "resumed", "scope": "vm" }))
            }
            Some(name) => {
                let thread = find_thread(&vm, &name)?;
                for _ in 0..MAX_RESUME_ITERATIONS {
                    if !thread.is_suspended() {
                        break;
                    }
                    thread.resume().map_err(jdi_to_rpc)?;
                }
                {
                    let mut state = self.state.lock();
                    state.suspended_at.remove(&thread.unique_id());
                    state.objects.invalidate();
                }
                Ok(json!({ "status": "resumed", "scope": "thread", "thread": name }))
            }
        }
    }

    pub fn stack_trace(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let thread_name = params.str_or("thread_name", "main")?;
        let max_frames = params.i64_or("max_frames", 10)?;
        if max_frames <= 0 {
            return Err(RpcError::invalid_params(format!(
                "parameter max_frames must be positive, got {max_frames}"
            )));
        }

        let vm = self.vm()?;
        let thread = find_thread(&vm, &thread_name)?;
        if !thread.is_suspended() {
            return Err(RpcError::invalid_request(format!(
                "ERR_NOT_SUSPENDED: thread {thread_name:?} is not suspended; set a breakpoint or pause it first"
            )));
        }

        let frames = thread.frames().map_err(jdi_to_rpc)?;
        let locations: Vec<Location> = frames.iter().map(|frame| frame.location()).collect();
        let mapping = self.mapping();
        let views = frame_filter::collapse(&locations);

        let visible_total = views
            .iter()
            .filter(|view| matches!(view, FrameView::Visible { .. }))
            .count();

        let mut rendered = Vec::new();
        let mut shown = 0usize;
        for view in &views {
            match view {
                FrameView::Filtered { count } => {
                    rendered.push(json!({
                        "filtered": true,
                        "count": count,
                        "reason": "coroutine_internal",
                    }));
                }
                FrameView::Visible { index } => {
                    if shown >= max_frames as usize {
                        break;
                    }
                    let location = &locations[*index];
                    let class = mapping
                        .as_deref()
                        .and_then(|m| m.deobfuscate_class(&location.class_name))
                        .unwrap_or(&location.class_name);
                    let method = mapping
                        .as_deref()
                        .and_then(|m| {
                            m.deobfuscate_method(
                                &location.class_name,
                                &location.method_name,
                                Some(location.method_arity),
                            )
                        })
                        .unwrap_or(&location.method_name);
                    rendered.push(json!({
                        "index": index,
                        "class": class,
                        "method": method,
                        "line": location.line,
                    }));
                    shown += 1;
                }
            }
        }

        Ok(json!({
            "thread": thread_name,
            "frame_count": locations.len(),
            "frames": rendered,
            "shown_frames": shown,
            "truncated": visible_total > shown,
        }))
    }

    pub fn inspect_variable(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let thread_name = params.str_or("thread_name", "main")?;
        let frame_index = params.i64_or("frame_index", 0)?;
        if frame_index < 0 {
            return Err(RpcError::invalid_params(format!(
                "parameter frame_index must not be negative, got {frame_index}"
            )));
        }
        let path = params.str("variable_path")?.to_string();
        let depth = params.i64_or("depth", 1)?;
        if !(crate::inspect::MIN_DEPTH..=crate::inspect::MAX_DEPTH).contains(&depth) {
            return Err(RpcError::invalid_params(format!(
                "parameter depth must be between {} and {}, got {depth}",
                crate::inspect::MIN_DEPTH,
                crate::inspect::MAX_DEPTH
            )));
        }

        let vm = self.vm()?;
        let thread = find_thread(&vm, &thread_name)?;
        if !thread.is_suspended() {
            return Err(RpcError::invalid_request(format!(
                "ERR_NOT_SUSPENDED: thread {thread_name:?} is not suspended"
            )));
        }
        let frame = thread
            .frame(frame_index as usize)
            .map_err(|_| RpcError::invalid_params(format!("frame_index {frame_index} out of range")))?;

        let mapping = self.mapping();
        let lookup = |handle: &str| self.lookup_object(handle);
        let value = crate::inspect::resolve_path(&frame, &path, &lookup, mapping.as_deref())?;

        let mut budget = TokenBudget::new(self.default_max_tokens);
        let mut objects = |object: &tether_jdi::ObjectRef| self.object_handle(object);
        let rendered = crate::inspect::inspect_envelope(
            &value,
            depth as u32,
            &mut budget,
            mapping.as_deref(),
            &mut objects,
        )?;

        Ok(json!({
            "thread": thread_name,
            "frame_index": frame_index,
            "variable_path": path,
            "value": rendered,
            "token_usage_estimate": budget.token_usage_estimate(),
            "truncated": budget.truncated(),
        }))
    }

    pub fn evaluate(&self, params: &Params<'_>) -> Result<Json, RpcError> {
        let thread_name = params.str_or("thread_name", "main")?;
        let frame_index = params.i64_or("frame_index", 0)?;
        if frame_index < 0 {
            return Err(RpcError::invalid_params(format!(
                "parameter frame_index must not be negative, got {frame_index}"
            )));
        }
        let expression = params.str("expression")?.to_string();

        let vm = self.vm()?;
        let thread = find_thread(&vm, &thread_name)?;
        if !thread.is_suspended() {
            return Err(RpcError::invalid_request(format!(
                "ERR_NOT_SUSPENDED: thread {thread_name:?} is not suspended"
            )));
        }
        let frame = thread
            .frame(frame_index as usize)
            .map_err(|_| RpcError::invalid_params(format!("frame_index {frame_index} out of range")))?;

        let mapping = self.mapping();
        let lookup = |handle: &str| self.lookup_object(handle);
        let mut budget = TokenBudget::new(self.default_max_tokens);
        let mut objects = |object: &tether_jdi::ObjectRef| self.object_handle(object);
        let result = crate::inspect::evaluate_expression(
            &frame,
            &thread,
            &expression,
            &mut budget,
            &lookup,
            mapping.as_deref(),
            &mut objects,
        )?;

        Ok(json!({
            "thread": thread_name,
            "frame_index": frame_index,
            "expression": expression,
            "result": result,
            "token_usage_estimate": budget.token_usage_estimate(),
            "truncated": budget.truncated(),
        }))
    }
}

/// The shared "stopped" payload: where the thread is paused, the primary
/// frame's locals under the default token budget, and an ANR warning once
/// `main` has been held too long.
pub fn build_stopped(session: &Session, thread: &ThreadRef) -> Result<Map<String, Json>, RpcError> {
    let frames = thread.frames().map_err(jdi_to_rpc)?;
    let locations: Vec<Location> = frames.iter().map(|frame| frame.location()).collect();
    let mapping = session.mapping();

    let (primary, filtered_before) = frame_filter::primary_frame(&locations);
    let views = frame_filter::collapse(&locations);
    let collapsed: Vec<Json> = views
        .iter()
        .filter_map(|view| match view {
            FrameView::Filtered { count } => Some(json!({
                "filtered": true,
                "count": count,
                "reason": "coroutine_internal",
            })),
            FrameView::Visible { .. } => None,
        })
        .collect();

    let mut params = Map::new();
    params.insert("status".to_string(), json!("stopped"));
    params.insert("thread".to_string(), json!(thread.name()));

    if let Some(location) = locations.get(primary) {
        params.insert(
            "location".to_string(),
            json!(display_location(mapping.as_deref(), location)),
        );
        let method = mapping
            .as_deref()
            .and_then(|m| {
                m.deobfuscate_method(
                    &location.class_name,
                    &location.method_name,
                    Some(location.method_arity),
                )
            })
            .unwrap_or(&location.method_name);
        params.insert("method".to_string(), json!(method));
    }

    // Locals of the primary frame, inspected shallowly under the budget.
    let mut budget = TokenBudget::new(session.default_max_tokens);
    let mut locals = Map::new();
    if let Some(frame) = frames.get(primary) {
        let names = frame.visible_variables().map_err(jdi_to_rpc)?;
        let mut objects = |object: &tether_jdi::ObjectRef| session.object_handle(object);
        let mut inspector = Inspector {
            budget: &mut budget,
            mapping: mapping.as_deref(),
            objects: &mut objects,
        };
        for name in names {
            if !inspector.budget.try_consume(name.len() as u64 + 4) {
                break;
            }
            let value = frame.get_value(&name).map_err(jdi_to_rpc)?;
            let rendered = match value {
                Some(value) => inspector.inspect(&value, 1)?,
                None => Json::Null,
            };
            if inspector.budget.truncated() {
                break;
            }
            locals.insert(name, rendered);
        }
    }
    params.insert("locals".to_string(), Json::Object(locals));
    params.insert(
        "token_usage_estimate".to_string(),
        json!(budget.token_usage_estimate()),
    );
    params.insert("truncated".to_string(), json!(budget.truncated()));

    if !collapsed.is_empty() {
        params.insert("frame_filters".to_string(), json!(collapsed));
        params.insert("frames_filtered_before".to_string(), json!(filtered_before));
    }

    if thread.name() == "main" {
        if let Some(held) = session.suspended_for(thread.unique_id()) {
            if held.as_secs() >= ANR_WARNING_SECONDS {
                params.insert(
                    "warning".to_string(),
                    json!(format!(
                        "main thread has been suspended for {}s; resume soon to avoid an ANR",
                        held.as_secs()
                    )),
                );
            }
        }
    }

    Ok(params)
}
