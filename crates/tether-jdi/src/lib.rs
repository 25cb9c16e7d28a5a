//! Capability-level facade over the Java Debug Interface.
//!
//! This crate defines the narrow set of VM capabilities the Tether bridge
//! consumes (attach, threads, frames, values, event requests, event queue)
//! without committing to a wire transport. Two implementations ship here:
//!
//! - [`socket`]: the TCP attach path (handshake only for now).
//! - [`fake`]: a scriptable in-memory JVM used by integration tests, behind
//!   the `fake-jvm` feature.

mod error;
pub mod event;
pub mod socket;
mod types;
mod vm;

#[cfg(any(test, feature = "fake-jvm"))]
pub mod fake;

pub use error::{JdiError, Result};
pub use event::{Event, EventQueue, EventSet};
pub use types::{
    FieldInfo, Location, RequestId, StepDepth, StepSize, SuspendPolicy, ThreadStatus, Value,
};
pub use vm::{
    ArrayRef, ArrayReference, ClassRef, EventRequestManager, FrameRef, ObjectRef, ObjectReference,
    ReferenceType, StackFrame, ThreadRef, ThreadReference, Vm, VmConnector, VmHandle,
};
