//! Capability traits over the Java Debug Interface.
//!
//! The bridge never talks JDWP wire format directly; it consumes these traits.
//! Transports implement them against a live VM, and the in-memory fake
//! (`crate::fake`) implements them for tests. All methods are synchronous:
//! real transports are expected to answer quickly or fail, and the one
//! genuinely blocking operation (the event queue poll) takes an explicit
//! deadline.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::event::EventQueue;
use crate::types::{
    FieldInfo, Location, RequestId, StepDepth, StepSize, SuspendPolicy, ThreadStatus, Value,
};

pub type VmHandle = Arc<dyn Vm>;
pub type ThreadRef = Arc<dyn ThreadReference>;
pub type FrameRef = Arc<dyn StackFrame>;
pub type ObjectRef = Arc<dyn ObjectReference>;
pub type ArrayRef = Arc<dyn ArrayReference>;
pub type ClassRef = Arc<dyn ReferenceType>;

/// Socket-level attach capability.
pub trait VmConnector: Send + Sync {
    fn attach(&self, host: &str, port: u16, timeout: Duration) -> Result<VmHandle>;
}

pub trait Vm: Send + Sync {
    fn name(&self) -> String;
    fn version(&self) -> String;

    fn all_threads(&self) -> Result<Vec<ThreadRef>>;
    fn all_classes(&self) -> Result<Vec<ClassRef>>;
    fn classes_by_name(&self, name: &str) -> Result<Vec<ClassRef>>;

    fn event_queue(&self) -> Arc<dyn EventQueue>;
    fn event_request_manager(&self) -> Arc<dyn EventRequestManager>;

    /// Resume every thread in the VM (decrements each suspend count once).
    fn resume(&self) -> Result<()>;

    /// Release the connection. Safe to call more than once.
    fn dispose(&self);
}

pub trait ThreadReference: Send + Sync {
    fn name(&self) -> String;
    fn unique_id(&self) -> u64;
    fn status(&self) -> ThreadStatus;
    fn is_suspended(&self) -> bool;

    fn suspend(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;

    fn frames(&self) -> Result<Vec<FrameRef>>;
    fn frame(&self, index: usize) -> Result<FrameRef>;

    /// The thread object's own class (`java.lang.Thread` or a subclass).
    fn reference_type(&self) -> Result<ClassRef>;

    /// Read an instance field off the thread object itself, e.g. `daemon`.
    fn get_value(&self, field: &str) -> Result<Option<Value>>;
}

pub trait StackFrame: Send + Sync {
    fn location(&self) -> Location;

    /// Names of the locals visible at the current code index.
    fn visible_variables(&self) -> Result<Vec<String>>;
    fn get_value(&self, name: &str) -> Result<Option<Value>>;
}

pub trait ObjectReference: Send + Sync {
    fn unique_id(&self) -> u64;
    fn reference_type(&self) -> Result<ClassRef>;
    fn get_value(&self, field: &str) -> Result<Option<Value>>;

    /// Invoke the zero-argument `toString()` on the given (suspended) thread.
    ///
    /// Returns `Ok(None)` when the object's class declares no such method and
    /// the caller should fall back to its own textual rendering.
    fn invoke_to_string(&self, thread: &ThreadRef) -> Result<Option<String>>;
}

pub trait ArrayReference: Send + Sync {
    fn unique_id(&self) -> u64;
    /// Source-style element type name with `[]` suffix, e.g. `int[]`.
    fn type_name(&self) -> String;
    fn length(&self) -> Result<usize>;
    fn get_values(&self, start: usize, count: usize) -> Result<Vec<Value>>;
}

pub trait ReferenceType: Send + Sync {
    fn name(&self) -> String;
    fn fields(&self) -> Result<Vec<FieldInfo>>;
    /// Executable locations on the given source line, empty when the line has
    /// no code.
    fn locations_of_line(&self, line: u32) -> Result<Vec<Location>>;
}

pub trait EventRequestManager: Send + Sync {
    fn create_breakpoint(&self, location: &Location, policy: SuspendPolicy) -> Result<RequestId>;

    fn create_class_prepare(&self, class_pattern: &str, policy: SuspendPolicy)
        -> Result<RequestId>;

    /// `class` of `None` matches every exception type.
    fn create_exception(
        &self,
        class: Option<&ClassRef>,
        caught: bool,
        uncaught: bool,
        policy: SuspendPolicy,
    ) -> Result<RequestId>;

    fn create_step(
        &self,
        thread: &ThreadRef,
        size: StepSize,
        depth: StepDepth,
        count: i32,
        policy: SuspendPolicy,
    ) -> Result<RequestId>;

    fn delete(&self, request: RequestId) -> Result<()>;

    /// Live step requests filtered on the given thread, used to clear stale
    /// requests before registering a new one.
    fn step_requests_for_thread(&self, thread_unique_id: u64) -> Vec<RequestId>;
}
