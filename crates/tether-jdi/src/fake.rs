//! Scriptable in-memory JVM.
//!
//! Implements the full capability surface of this crate without a socket, so
//! the bridge's integration tests can drive attach, breakpoints, stepping and
//! inspection deterministically. Tests hold a [`FakeJvm`] clone next to the
//! connector and inject events (`hit_breakpoint`, `complete_step`,
//! `throw_exception`, `disconnect`) at the moment they need them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{JdiError, Result};
use crate::event::{Event, EventQueue, EventSet};
use crate::types::{
    FieldInfo, Location, RequestId, StepDepth, StepSize, SuspendPolicy, ThreadStatus, Value,
};
use crate::vm::{
    ArrayReference, ClassRef, EventRequestManager, FrameRef, ObjectRef, ObjectReference,
    ReferenceType, StackFrame, ThreadRef, ThreadReference, Vm, VmConnector, VmHandle,
};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

/// Literal match with `*` wildcards, as used by class-prepare filters.
fn wildcard_match(pattern: &str, input: &str) -> bool {
    fn inner(p: &[u8], s: &[u8]) -> bool {
        match p.first() {
            None => s.is_empty(),
            Some(b'*') => {
                (0..=s.len()).any(|skip| inner(&p[1..], &s[skip..]))
            }
            Some(&c) => s.first() == Some(&c) && inner(&p[1..], &s[1..]),
        }
    }
    inner(pattern.as_bytes(), input.as_bytes())
}

// ---------------------------------------------------------------------------
// Classes

#[derive(Debug, Clone)]
struct FakeMethod {
    name: String,
    arity: usize,
    lines: Vec<u32>,
}

/// A class in the fake VM. Doubles as the reference type of fake objects.
pub struct FakeClass {
    name: String,
    methods: Vec<FakeMethod>,
    fields: Vec<FieldInfo>,
}

impl FakeClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        arity: usize,
        lines: impl IntoIterator<Item = u32>,
    ) -> Self {
        self.methods.push(FakeMethod {
            name: name.into(),
            arity,
            lines: lines.into_iter().collect(),
        });
        self
    }

    pub fn field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.push(FieldInfo {
            name: name.into(),
            type_name: type_name.into(),
            is_static: false,
        });
        self
    }

    pub fn static_field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.push(FieldInfo {
            name: name.into(),
            type_name: type_name.into(),
            is_static: true,
        });
        self
    }

    pub fn build(self) -> Arc<FakeClass> {
        Arc::new(self)
    }
}

impl ReferenceType for FakeClass {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn fields(&self) -> Result<Vec<FieldInfo>> {
        Ok(self.fields.clone())
    }

    fn locations_of_line(&self, line: u32) -> Result<Vec<Location>> {
        Ok(self
            .methods
            .iter()
            .filter(|m| m.lines.contains(&line))
            .map(|m| Location {
                class_name: self.name.clone(),
                method_name: m.name.clone(),
                method_arity: m.arity,
                line,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Objects and arrays

fn value_type_name(value: &Value) -> String {
    match value {
        Value::Null => "java.lang.Object".to_string(),
        Value::Boolean(_) => "boolean".to_string(),
        Value::Byte(_) => "byte".to_string(),
        Value::Short(_) => "short".to_string(),
        Value::Char(_) => "char".to_string(),
        Value::Int(_) => "int".to_string(),
        Value::Long(_) => "long".to_string(),
        Value::Float(_) => "float".to_string(),
        Value::Double(_) => "double".to_string(),
        Value::Text(_) => "java.lang.String".to_string(),
        Value::Array(a) => a.type_name(),
        Value::Object(o) => o
            .reference_type()
            .map(|c| c.name())
            .unwrap_or_else(|_| "java.lang.Object".to_string()),
    }
}

pub struct FakeObjectBuilder {
    class_name: String,
    fields: Vec<(String, Value)>,
    static_fields: Vec<(String, Value)>,
    to_string: Option<String>,
}

impl FakeObjectBuilder {
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn static_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.static_fields.push((name.into(), value));
        self
    }

    pub fn to_string_result(mut self, rendered: impl Into<String>) -> Self {
        self.to_string = Some(rendered.into());
        self
    }

    pub fn build(self) -> Arc<FakeObject> {
        let mut class = FakeClass::new(self.class_name);
        for (name, value) in &self.fields {
            class = class.field(name.clone(), value_type_name(value));
        }
        for (name, value) in &self.static_fields {
            class = class.static_field(name.clone(), value_type_name(value));
        }
        Arc::new(FakeObject {
            uid: next_uid(),
            class: class.build(),
            fields: Mutex::new(self.fields),
            static_fields: self.static_fields,
            to_string: self.to_string,
            collected: AtomicBool::new(false),
        })
    }
}

pub struct FakeObject {
    uid: u64,
    class: Arc<FakeClass>,
    fields: Mutex<Vec<(String, Value)>>,
    static_fields: Vec<(String, Value)>,
    to_string: Option<String>,
    collected: AtomicBool,
}

impl FakeObject {
    pub fn of(class_name: impl Into<String>) -> FakeObjectBuilder {
        FakeObjectBuilder {
            class_name: class_name.into(),
            fields: Vec::new(),
            static_fields: Vec::new(),
            to_string: None,
        }
    }

    /// Simulate garbage collection: every subsequent read fails with
    /// [`JdiError::ObjectCollected`].
    pub fn collect(&self) {
        self.collected.store(true, Ordering::SeqCst);
    }

    pub fn set_field(&self, name: &str, value: Value) {
        let mut fields = self.fields.lock().unwrap();
        if let Some(slot) = fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            fields.push((name.to_string(), value));
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.collected.load(Ordering::SeqCst) {
            Err(JdiError::ObjectCollected)
        } else {
            Ok(())
        }
    }
}

impl ObjectReference for FakeObject {
    fn unique_id(&self) -> u64 {
        self.uid
    }

    fn reference_type(&self) -> Result<ClassRef> {
        self.check_live()?;
        Ok(self.class.clone() as ClassRef)
    }

    fn get_value(&self, field: &str) -> Result<Option<Value>> {
        self.check_live()?;
        let fields = self.fields.lock().unwrap();
        if let Some((_, value)) = fields.iter().find(|(n, _)| n == field) {
            return Ok(Some(value.clone()));
        }
        Ok(self
            .static_fields
            .iter()
            .find(|(n, _)| n == field)
            .map(|(_, v)| v.clone()))
    }

    fn invoke_to_string(&self, thread: &ThreadRef) -> Result<Option<String>> {
        self.check_live()?;
        if !thread.is_suspended() {
            return Err(JdiError::ThreadNotSuspended);
        }
        Ok(self.to_string.clone())
    }
}

pub struct FakeArray {
    uid: u64,
    type_name: String,
    elements: Mutex<Vec<Value>>,
}

impl FakeArray {
    pub fn new(type_name: impl Into<String>, elements: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            uid: next_uid(),
            type_name: type_name.into(),
            elements: Mutex::new(elements),
        })
    }
}

impl ArrayReference for FakeArray {
    fn unique_id(&self) -> u64 {
        self.uid
    }

    fn type_name(&self) -> String {
        self.type_name.clone()
    }

    fn length(&self) -> Result<usize> {
        Ok(self.elements.lock().unwrap().len())
    }

    fn get_values(&self, start: usize, count: usize) -> Result<Vec<Value>> {
        let elements = self.elements.lock().unwrap();
        let end = (start + count).min(elements.len());
        if start > elements.len() {
            return Err(JdiError::Protocol("array read out of bounds".to_string()));
        }
        Ok(elements[start..end].to_vec())
    }
}

// ---------------------------------------------------------------------------
// Threads and frames

#[derive(Clone)]
pub struct FakeFrameData {
    location: Location,
    locals: Vec<(String, Value)>,
}

impl FakeFrameData {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            locals: Vec::new(),
        }
    }

    pub fn local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.push((name.into(), value));
        self
    }
}

pub struct FakeThread {
    name: String,
    uid: u64,
    daemon: bool,
    status: Mutex<ThreadStatus>,
    suspend_count: Mutex<i32>,
    frames: Mutex<Vec<FakeFrameData>>,
    thread_class: Arc<FakeClass>,
}

impl FakeThread {
    fn new(name: &str, daemon: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            uid: next_uid(),
            daemon,
            status: Mutex::new(ThreadStatus::Running),
            suspend_count: Mutex::new(0),
            frames: Mutex::new(Vec::new()),
            thread_class: FakeClass::new("java.lang.Thread")
                .field("daemon", "boolean")
                .build(),
        })
    }

    pub fn set_frames(&self, frames: Vec<FakeFrameData>) {
        *self.frames.lock().unwrap() = frames;
    }

    pub fn set_status(&self, status: ThreadStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn suspend_count(&self) -> i32 {
        *self.suspend_count.lock().unwrap()
    }

    fn bump_suspend(&self) {
        *self.suspend_count.lock().unwrap() += 1;
    }

    fn drop_suspend(&self) {
        let mut count = self.suspend_count.lock().unwrap();
        *count = (*count - 1).max(0);
    }
}

impl ThreadReference for FakeThread {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn unique_id(&self) -> u64 {
        self.uid
    }

    fn status(&self) -> ThreadStatus {
        *self.status.lock().unwrap()
    }

    fn is_suspended(&self) -> bool {
        self.suspend_count() > 0
    }

    fn suspend(&self) -> Result<()> {
        self.bump_suspend();
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.drop_suspend();
        Ok(())
    }

    fn frames(&self) -> Result<Vec<FrameRef>> {
        if !self.is_suspended() {
            return Err(JdiError::ThreadNotSuspended);
        }
        let frames = self.frames.lock().unwrap();
        Ok(frames
            .iter()
            .map(|data| Arc::new(FakeFrame { data: data.clone() }) as FrameRef)
            .collect())
    }

    fn frame(&self, index: usize) -> Result<FrameRef> {
        let frames = self.frames()?;
        frames
            .get(index)
            .cloned()
            .ok_or_else(|| JdiError::Protocol(format!("frame index {index} out of range")))
    }

    fn reference_type(&self) -> Result<ClassRef> {
        Ok(self.thread_class.clone() as ClassRef)
    }

    fn get_value(&self, field: &str) -> Result<Option<Value>> {
        if field == "daemon" {
            return Ok(Some(Value::Boolean(self.daemon)));
        }
        Ok(None)
    }
}

struct FakeFrame {
    data: FakeFrameData,
}

impl StackFrame for FakeFrame {
    fn location(&self) -> Location {
        self.data.location.clone()
    }

    fn visible_variables(&self) -> Result<Vec<String>> {
        Ok(self.data.locals.iter().map(|(n, _)| n.clone()).collect())
    }

    fn get_value(&self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .data
            .locals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone()))
    }
}

// ---------------------------------------------------------------------------
// Event requests and the queue

#[derive(Debug, Clone)]
struct BreakpointReq {
    id: RequestId,
    location: Location,
}

#[derive(Debug, Clone)]
struct PrepareReq {
    id: RequestId,
    pattern: String,
}

#[derive(Debug, Clone)]
struct ExceptionReq {
    id: RequestId,
    class_name: Option<String>,
    caught: bool,
    uncaught: bool,
}

#[derive(Debug, Clone)]
struct StepReq {
    id: RequestId,
    thread_uid: u64,
    #[allow(dead_code)]
    depth: StepDepth,
}

#[derive(Default)]
struct RequestTable {
    next_id: RequestId,
    breakpoints: Vec<BreakpointReq>,
    prepares: Vec<PrepareReq>,
    exceptions: Vec<ExceptionReq>,
    steps: Vec<StepReq>,
}

impl RequestTable {
    fn alloc(&mut self) -> RequestId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
struct QueueState {
    sets: Mutex<VecDeque<EventSet>>,
    cond: Condvar,
    disconnected: AtomicBool,
}

struct FakeQueue {
    state: Arc<QueueState>,
}

impl EventQueue for FakeQueue {
    fn remove(&self, timeout: Duration) -> Result<Option<EventSet>> {
        let mut sets = self.state.sets.lock().unwrap();
        if let Some(set) = sets.pop_front() {
            return Ok(Some(set));
        }
        if self.state.disconnected.load(Ordering::SeqCst) {
            return Err(JdiError::Disconnected);
        }
        let (mut sets, _timed_out) = self.state.cond.wait_timeout(sets, timeout).unwrap();
        if let Some(set) = sets.pop_front() {
            return Ok(Some(set));
        }
        if self.state.disconnected.load(Ordering::SeqCst) {
            return Err(JdiError::Disconnected);
        }
        Ok(None)
    }
}

struct FakeRequests {
    inner: Arc<VmInner>,
}

impl EventRequestManager for FakeRequests {
    fn create_breakpoint(&self, location: &Location, _policy: SuspendPolicy) -> Result<RequestId> {
        self.inner.check_connected()?;
        let mut table = self.inner.requests.lock().unwrap();
        let id = table.alloc();
        table.breakpoints.push(BreakpointReq {
            id,
            location: location.clone(),
        });
        Ok(id)
    }

    fn create_class_prepare(
        &self,
        class_pattern: &str,
        _policy: SuspendPolicy,
    ) -> Result<RequestId> {
        self.inner.check_connected()?;
        let mut table = self.inner.requests.lock().unwrap();
        let id = table.alloc();
        table.prepares.push(PrepareReq {
            id,
            pattern: class_pattern.to_string(),
        });
        Ok(id)
    }

    fn create_exception(
        &self,
        class: Option<&ClassRef>,
        caught: bool,
        uncaught: bool,
        _policy: SuspendPolicy,
    ) -> Result<RequestId> {
        self.inner.check_connected()?;
        let mut table = self.inner.requests.lock().unwrap();
        let id = table.alloc();
        table.exceptions.push(ExceptionReq {
            id,
            class_name: class.map(|c| c.name()),
            caught,
            uncaught,
        });
        Ok(id)
    }

    fn create_step(
        &self,
        thread: &ThreadRef,
        _size: StepSize,
        depth: StepDepth,
        _count: i32,
        _policy: SuspendPolicy,
    ) -> Result<RequestId> {
        self.inner.check_connected()?;
        let mut table = self.inner.requests.lock().unwrap();
        let id = table.alloc();
        table.steps.push(StepReq {
            id,
            thread_uid: thread.unique_id(),
            depth,
        });
        Ok(id)
    }

    fn delete(&self, request: RequestId) -> Result<()> {
        let mut table = self.inner.requests.lock().unwrap();
        table.breakpoints.retain(|r| r.id != request);
        table.prepares.retain(|r| r.id != request);
        table.exceptions.retain(|r| r.id != request);
        table.steps.retain(|r| r.id != request);
        Ok(())
    }

    fn step_requests_for_thread(&self, thread_unique_id: u64) -> Vec<RequestId> {
        let table = self.inner.requests.lock().unwrap();
        table
            .steps
            .iter()
            .filter(|r| r.thread_uid == thread_unique_id)
            .map(|r| r.id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// The VM

struct VmInner {
    name: String,
    version: String,
    classes: Mutex<Vec<Arc<FakeClass>>>,
    threads: Mutex<Vec<Arc<FakeThread>>>,
    requests: Mutex<RequestTable>,
    queue: Arc<QueueState>,
    disposed: AtomicBool,
}

impl VmInner {
    fn check_connected(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) || self.queue.disconnected.load(Ordering::SeqCst) {
            Err(JdiError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn push_set(&self, set: EventSet) {
        self.queue.sets.lock().unwrap().push_back(set);
        self.queue.cond.notify_all();
    }
}

#[derive(Clone)]
pub struct FakeJvm {
    inner: Arc<VmInner>,
}

impl FakeJvm {
    /// A fake VM with a single non-daemon `main` thread and no classes.
    pub fn new() -> Self {
        let jvm = Self {
            inner: Arc::new(VmInner {
                name: "Fake JVM".to_string(),
                version: "17.0".to_string(),
                classes: Mutex::new(Vec::new()),
                threads: Mutex::new(Vec::new()),
                requests: Mutex::new(RequestTable::default()),
                queue: Arc::new(QueueState::default()),
                disposed: AtomicBool::new(false),
            }),
        };
        jvm.add_thread("main", false);
        jvm
    }

    pub fn add_thread(&self, name: &str, daemon: bool) -> Arc<FakeThread> {
        let thread = FakeThread::new(name, daemon);
        self.inner.threads.lock().unwrap().push(thread.clone());
        thread
    }

    pub fn thread(&self, name: &str) -> Option<Arc<FakeThread>> {
        self.inner
            .threads
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Register a class without firing class-prepare (it was "already loaded"
    /// when the debugger attached).
    pub fn add_class(&self, class: Arc<FakeClass>) {
        self.inner.classes.lock().unwrap().push(class);
    }

    /// Register a class and fire `ClassPrepare` at every matching prepare
    /// request, as if the target had just loaded it.
    pub fn load_class(&self, class: Arc<FakeClass>) {
        self.add_class(class.clone());
        let matching: Vec<RequestId> = {
            let table = self.inner.requests.lock().unwrap();
            table
                .prepares
                .iter()
                .filter(|r| wildcard_match(&r.pattern, &class.name))
                .map(|r| r.id)
                .collect()
        };
        for request_id in matching {
            self.inner.push_set(EventSet::new(
                vec![Event::ClassPrepare {
                    request_id,
                    class: class.clone() as ClassRef,
                }],
                None,
            ));
        }
    }

    /// Fire a breakpoint event if a breakpoint request covers the location.
    ///
    /// Suspends the thread (event-thread policy) and, if the thread has no
    /// scripted frames, installs a single frame at the hit location.
    pub fn hit_breakpoint(&self, thread_name: &str, class: &str, line: u32) -> bool {
        let request = {
            let table = self.inner.requests.lock().unwrap();
            table
                .breakpoints
                .iter()
                .find(|r| r.location.class_name == class && r.location.line == line)
                .cloned()
        };
        let Some(request) = request else {
            return false;
        };
        let Some(thread) = self.thread(thread_name) else {
            return false;
        };

        if thread.frames.lock().unwrap().is_empty() {
            thread.set_frames(vec![FakeFrameData::new(request.location.clone())]);
        }
        thread.bump_suspend();
        let resume_target = thread.clone();
        self.inner.push_set(EventSet::new(
            vec![Event::Breakpoint {
                request_id: request.id,
                thread: thread as ThreadRef,
                location: request.location,
            }],
            Some(Box::new(move || resume_target.drop_suspend())),
        ));
        true
    }

    /// Complete a pending step request on the thread, if any.
    pub fn complete_step(&self, thread_name: &str, location: Location) -> bool {
        let Some(thread) = self.thread(thread_name) else {
            return false;
        };
        let request = {
            let table = self.inner.requests.lock().unwrap();
            table
                .steps
                .iter()
                .find(|r| r.thread_uid == thread.uid)
                .cloned()
        };
        let Some(request) = request else {
            return false;
        };

        thread.set_frames(vec![FakeFrameData::new(location.clone())]);
        thread.bump_suspend();
        let resume_target = thread.clone();
        self.inner.push_set(EventSet::new(
            vec![Event::Step {
                request_id: request.id,
                thread: thread as ThreadRef,
                location,
            }],
            Some(Box::new(move || resume_target.drop_suspend())),
        ));
        true
    }

    /// Fire an exception event if a matching exception request is registered.
    pub fn throw_exception(
        &self,
        thread_name: &str,
        exception: Arc<FakeObject>,
        throw_location: Location,
        catch_location: Option<Location>,
    ) -> bool {
        let caught = catch_location.is_some();
        let class_name = exception.class.name.clone();
        let request = {
            let table = self.inner.requests.lock().unwrap();
            table
                .exceptions
                .iter()
                .find(|r| {
                    let class_ok = match &r.class_name {
                        None => true,
                        Some(filter) => filter == &class_name,
                    };
                    let flag_ok = if caught { r.caught } else { r.uncaught };
                    class_ok && flag_ok
                })
                .cloned()
        };
        let Some(request) = request else {
            return false;
        };
        let Some(thread) = self.thread(thread_name) else {
            return false;
        };

        if thread.frames.lock().unwrap().is_empty() {
            thread.set_frames(vec![FakeFrameData::new(throw_location.clone())]);
        }
        thread.bump_suspend();
        let resume_target = thread.clone();
        self.inner.push_set(EventSet::new(
            vec![Event::Exception {
                request_id: request.id,
                thread: thread as ThreadRef,
                exception: exception as ObjectRef,
                throw_location,
                catch_location,
            }],
            Some(Box::new(move || resume_target.drop_suspend())),
        ));
        true
    }

    /// Drop the connection: queues a `VmDisconnect` event, then the queue
    /// reports [`JdiError::Disconnected`] forever after.
    pub fn disconnect(&self, detail: &str) {
        self.inner.push_set(EventSet::new(
            vec![Event::VmDisconnect {
                detail: detail.to_string(),
            }],
            None,
        ));
        self.inner.queue.disconnected.store(true, Ordering::SeqCst);
        self.inner.queue.cond.notify_all();
    }

    // Request-table inspection for assertions.

    pub fn breakpoint_request_count(&self) -> usize {
        self.inner.requests.lock().unwrap().breakpoints.len()
    }

    pub fn prepare_request_count(&self) -> usize {
        self.inner.requests.lock().unwrap().prepares.len()
    }

    pub fn exception_request_count(&self) -> usize {
        self.inner.requests.lock().unwrap().exceptions.len()
    }

    pub fn step_request_count(&self) -> usize {
        self.inner.requests.lock().unwrap().steps.len()
    }
}

impl Default for FakeJvm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm for FakeJvm {
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn version(&self) -> String {
        self.inner.version.clone()
    }

    fn all_threads(&self) -> Result<Vec<ThreadRef>> {
        self.inner.check_connected()?;
        Ok(self
            .inner
            .threads
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.clone() as ThreadRef)
            .collect())
    }

    fn all_classes(&self) -> Result<Vec<ClassRef>> {
        self.inner.check_connected()?;
        Ok(self
            .inner
            .classes
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.clone() as ClassRef)
            .collect())
    }

    fn classes_by_name(&self, name: &str) -> Result<Vec<ClassRef>> {
        self.inner.check_connected()?;
        Ok(self
            .inner
            .classes
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.clone() as ClassRef)
            .collect())
    }

    fn event_queue(&self) -> Arc<dyn EventQueue> {
        Arc::new(FakeQueue {
            state: self.inner.queue.clone(),
        })
    }

    fn event_request_manager(&self) -> Arc<dyn EventRequestManager> {
        Arc::new(FakeRequests {
            inner: self.inner.clone(),
        })
    }

    fn resume(&self) -> Result<()> {
        self.inner.check_connected()?;
        for thread in self.inner.threads.lock().unwrap().iter() {
            thread.drop_suspend();
        }
        Ok(())
    }

    fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.queue.cond.notify_all();
    }
}

/// Connector handing out a pre-built [`FakeJvm`], or refusing the attach.
pub struct FakeConnector {
    vm: Option<FakeJvm>,
    refuse: Option<String>,
}

impl FakeConnector {
    pub fn new(vm: FakeJvm) -> Self {
        Self {
            vm: Some(vm),
            refuse: None,
        }
    }

    pub fn refusing(message: impl Into<String>) -> Self {
        Self {
            vm: None,
            refuse: Some(message.into()),
        }
    }
}

impl VmConnector for FakeConnector {
    fn attach(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<VmHandle> {
        if let Some(message) = &self.refuse {
            return Err(JdiError::AttachFailed(message.clone()));
        }
        match &self.vm {
            Some(vm) => Ok(Arc::new(vm.clone())),
            None => Err(JdiError::AttachFailed("no VM configured".to_string())),
        }
    }
}
