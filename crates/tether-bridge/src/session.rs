//! Session state and the attach/detach/status facade.
//!
//! One session per process, one VM at a time. All mutable state lives behind
//! a single `parking_lot::Mutex`; the lock is held only for short state
//! transitions and never across a blocking JDI call or a notification send.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use tether_jdi::{JdiError, ObjectRef, RequestId, VmConnector, VmHandle};

use crate::breakpoints::{Breakpoint, ExceptionBreakpoint};
use crate::budget::DEFAULT_MAX_TOKENS;
use crate::mapping::Mapping;
use crate::object_registry::ObjectRegistry;
use crate::rpc::{notification, Params, RpcError};

/// Attach handshake deadline.
pub const ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

/// Continuous suspension of `main` beyond this triggers an ANR warning in
/// stopped payloads.
pub const ANR_WARNING_SECONDS: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Over,
    Into,
    Out,
}

impl StepAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StepAction::Over => "step_over",
            StepAction::Into => "step_into",
            StepAction::Out => "step_out",
        }
    }
}

/// The single in-flight step, if any. The issuing RPC handler parks on the
/// receiver half of `completion`; the event loop (step event or disconnect)
/// fulfills it.
pub struct PendingStep {
    pub action: StepAction,
    pub thread_name: String,
    pub thread_uid: u64,
    pub request: RequestId,
    pub completion: Option<oneshot::Sender<Value>>,
}

impl PendingStep {
    /// Resolve the waiting RPC handler; a handler that already timed out and
    /// dropped the receiver is fine.
    pub fn complete(&mut self, payload: Value) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(payload);
        }
    }

    pub fn interrupted_payload(&self, why: &str, remediation: &str) -> Value {
        json!({
            "status": "timeout",
            "reason": format!("{} interrupted: {why}", self.action.as_str()),
            "remediation": remediation,
        })
    }
}

pub struct EventLoopHandle {
    pub stop: Arc<AtomicBool>,
    pub join: Option<std::thread::JoinHandle<()>>,
}

#[derive(Default)]
pub struct SessionState {
    pub vm: Option<VmHandle>,
    pub event_loop: Option<EventLoopHandle>,
    pub disconnected: bool,
    pub disconnect_reason: Option<String>,
    pub mapping: Option<Arc<Mapping>>,
    pub breakpoints: BTreeMap<u32, Breakpoint>,
    pub exception_breakpoints: BTreeMap<u32, ExceptionBreakpoint>,
    pub next_breakpoint_id: u32,
    pub active_step: Option<PendingStep>,
    /// Thread unique id -> first moment we observed it suspended.
    pub suspended_at: HashMap<u64, Instant>,
    pub objects: ObjectRegistry,
}

impl SessionState {
    pub fn alloc_breakpoint_id(&mut self) -> u32 {
        self.next_breakpoint_id += 1;
        self.next_breakpoint_id
    }
}

/// Serialized write access to stdout. Cloneable; sends never block.
#[derive(Clone)]
pub struct Notifier {
    tx: UnboundedSender<Value>,
}

impl Notifier {
    pub fn new(tx: UnboundedSender<Value>) -> Self {
        Self { tx }
    }

    pub fn send_value(&self, value: Value) {
        // The writer task only disappears at shutdown; messages racing it are
        // intentionally dropped.
        let _ = self.tx.send(value);
    }

    pub fn event(&self, event_type: &str, params: Map<String, Value>) {
        self.send_value(notification(event_type, params));
    }
}

pub struct Session {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) notifier: Notifier,
    pub(crate) connector: Arc<dyn VmConnector>,
    pub(crate) default_max_tokens: u64,
}

impl Session {
    pub fn new(connector: Arc<dyn VmConnector>, notifier: Notifier) -> Arc<Self> {
        Self::with_max_tokens(connector, notifier, DEFAULT_MAX_TOKENS)
    }

    pub fn with_max_tokens(
        connector: Arc<dyn VmConnector>,
        notifier: Notifier,
        default_max_tokens: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::default()),
            notifier,
            connector,
            default_max_tokens,
        })
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// The attached, still-connected VM; the common precondition of every
    /// delegated operation.
    pub fn vm(&self) -> Result<VmHandle, RpcError> {
        let state = self.state.lock();
        let Some(vm) = state.vm.clone() else {
            return Err(RpcError::invalid_request("not attached to a VM"));
        };
        if state.disconnected {
            let reason = state
                .disconnect_reason
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            return Err(RpcError::invalid_request(format!(
                "VM is disconnected: {reason}"
            )));
        }
        Ok(vm)
    }

    pub fn mapping(&self) -> Option<Arc<Mapping>> {
        self.state.lock().mapping.clone()
    }

    /// Allocate (or reuse) the `obj_N` handle for an object reference.
    pub fn object_handle(&self, object: &ObjectRef) -> String {
        self.state.lock().objects.handle_for(object)
    }

    pub fn lookup_object(&self, handle: &str) -> Option<ObjectRef> {
        self.state.lock().objects.get(handle)
    }

    /// Resume-style operations invalidate every outstanding object handle.
    pub fn invalidate_objects(&self) {
        self.state.lock().objects.invalidate();
    }

    pub fn mark_thread_suspended(&self, thread_uid: u64) {
        let mut state = self.state.lock();
        state.suspended_at.entry(thread_uid).or_insert_with(Instant::now);
    }

    pub fn clear_thread_suspended(&self, thread_uid: u64) {
        self.state.lock().suspended_at.remove(&thread_uid);
    }

    pub fn suspended_for(&self, thread_uid: u64) -> Option<Duration> {
        self.state
            .lock()
            .suspended_at
            .get(&thread_uid)
            .map(|since| since.elapsed())
    }

    // -----------------------------------------------------------------------
    // attach / detach / status

    pub fn attach(self: &Arc<Self>, params: &Params<'_>) -> Result<Value, RpcError> {
        let host = params.str_or("host", "localhost")?;
        let port = params.positive_i64("port")?;
        let port = u16::try_from(port)
            .map_err(|_| RpcError::invalid_params(format!("parameter port out of range: {port}")))?;
        let keep_suspended = params.bool_or("keep_suspended", false)?;

        {
            let state = self.state.lock();
            if state.vm.is_some() {
                return Err(RpcError::invalid_request(
                    "already attached to a VM (detach first)",
                ));
            }
        }

        let vm = self
            .connector
            .attach(&host, port, ATTACH_TIMEOUT)
            .map_err(|err| match err {
                JdiError::AttachFailed(detail) => RpcError::invalid_request(format!(
                    "APP_NOT_DEBUGGABLE: cannot attach to {host}:{port}: {detail}"
                )),
                other => RpcError::internal(format!("attach failed: {other}")),
            })?;

        let vm_name = vm.name();
        let vm_version = vm.version();
        let threads = vm
            .all_threads()
            .map_err(|err| RpcError::internal(format!("cannot enumerate threads: {err}")))?;
        let thread_count = threads.len();
        let all_suspended = thread_count > 0 && threads.iter().all(|t| t.is_suspended());

        if all_suspended && !keep_suspended {
            if let Err(err) = vm.resume() {
                tracing::warn!(%err, "resume-on-attach failed");
            }
        }

        {
            let mut state = self.state.lock();
            // Stale caches from a previous attachment must not leak in.
            state.breakpoints.clear();
            state.exception_breakpoints.clear();
            state.objects = ObjectRegistry::new();
            state.suspended_at.clear();
            state.disconnected = false;
            state.disconnect_reason = None;
            state.vm = Some(vm.clone());
        }
        let handle = crate::event_loop::spawn(self.clone(), vm);
        self.state.lock().event_loop = Some(handle);

        tracing::info!(%host, port, thread_count, "attached");
        Ok(json!({
            "status": "attached",
            "vm_name": vm_name,
            "vm_version": vm_version,
            "thread_count": thread_count,
            "suspended": all_suspended && keep_suspended,
            "keep_suspended": keep_suspended,
        }))
    }

    pub fn detach(&self) -> Result<Value, RpcError> {
        let (vm, event_loop, pending_step, requests) = {
            let mut state = self.state.lock();
            let Some(vm) = state.vm.take() else {
                return Err(RpcError::invalid_request("not attached to a VM"));
            };
            let event_loop = state.event_loop.take();
            let pending_step = state.active_step.take();

            let mut requests: Vec<RequestId> = Vec::new();
            for bp in state.breakpoints.values() {
                requests.extend(bp.request);
                requests.extend(bp.prepare_request);
            }
            for bp in state.exception_breakpoints.values() {
                requests.extend(bp.request);
                requests.extend(bp.prepare_request);
            }
            state.breakpoints.clear();
            state.exception_breakpoints.clear();
            state.objects.invalidate();
            state.suspended_at.clear();
            state.disconnected = false;
            state.disconnect_reason = None;
            (vm, event_loop, pending_step, requests)
        };

        if let Some(mut step) = pending_step {
            step.complete(step.interrupted_payload(
                "debugger detached",
                "re-attach the debugger and retry the step",
            ));
        }

        if let Some(mut handle) = event_loop {
            handle.stop.store(true, Ordering::SeqCst);
            if let Some(join) = handle.join.take() {
                // The loop polls with a 500ms deadline, so this returns well
                // within the 2s stop grace.
                let _ = join.join();
            }
        }

        let manager = vm.event_request_manager();
        for request in requests {
            let _ = manager.delete(request);
        }
        vm.dispose();

        tracing::info!("detached");
        Ok(json!({ "status": "detached" }))
    }

    pub fn status(&self) -> Value {
        let (vm, disconnected, reason, bp_count, ex_count, mapping_loaded) = {
            let state = self.state.lock();
            (
                state.vm.clone(),
                state.disconnected,
                state.disconnect_reason.clone(),
                state.breakpoints.len(),
                state.exception_breakpoints.len(),
                state.mapping.is_some(),
            )
        };

        let Some(vm) = vm else {
            return json!({ "status": "not_attached" });
        };
        if disconnected {
            return json!({
                "status": "disconnected",
                "reason": reason.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let thread_count = vm.all_threads().map(|t| t.len()).unwrap_or(0);
        json!({
            "status": "attached",
            "vm_name": vm.name(),
            "vm_version": vm.version(),
            "thread_count": thread_count,
            "breakpoint_count": bp_count,
            "exception_breakpoint_count": ex_count,
            "mapping_loaded": mapping_loaded,
        })
    }

    // -----------------------------------------------------------------------
    // mapping

    pub fn load_mapping(&self, params: &Params<'_>) -> Result<Value, RpcError> {
        let path = params.str("path")?;
        let mapping = Mapping::load(std::path::Path::new(path))
            .map_err(|err| RpcError::invalid_params(format!("cannot load mapping {path}: {err}")))?;
        let class_count = mapping.class_count();
        let member_count = mapping.member_count();
        self.state.lock().mapping = Some(Arc::new(mapping));
        tracing::info!(path, class_count, member_count, "mapping loaded");
        Ok(json!({
            "status": "mapping_loaded",
            "path": path,
            "class_count": class_count,
            "member_count": member_count,
        }))
    }

    pub fn clear_mapping(&self) -> Result<Value, RpcError> {
        self.state.lock().mapping = None;
        Ok(json!({ "status": "mapping_cleared" }))
    }
}
