//! Asynchronous VM events and the queue that delivers them.

use std::time::Duration;

use crate::error::Result;
use crate::types::{Location, RequestId};
use crate::vm::{ClassRef, ObjectRef, ThreadRef};

#[derive(Clone)]
pub enum Event {
    Breakpoint {
        request_id: RequestId,
        thread: ThreadRef,
        location: Location,
    },
    ClassPrepare {
        request_id: RequestId,
        class: ClassRef,
    },
    Step {
        request_id: RequestId,
        thread: ThreadRef,
        location: Location,
    },
    Exception {
        request_id: RequestId,
        thread: ThreadRef,
        exception: ObjectRef,
        throw_location: Location,
        catch_location: Option<Location>,
    },
    VmDisconnect {
        detail: String,
    },
    VmDeath,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Breakpoint { request_id, location, .. } => {
                write!(f, "Breakpoint(req={request_id}, {})", location.display())
            }
            Event::ClassPrepare { request_id, class } => {
                write!(f, "ClassPrepare(req={request_id}, {})", class.name())
            }
            Event::Step { request_id, location, .. } => {
                write!(f, "Step(req={request_id}, {})", location.display())
            }
            Event::Exception { request_id, throw_location, .. } => {
                write!(f, "Exception(req={request_id}, {})", throw_location.display())
            }
            Event::VmDisconnect { detail } => write!(f, "VmDisconnect({detail})"),
            Event::VmDeath => write!(f, "VmDeath"),
        }
    }
}

/// A batch of events delivered together by the VM.
///
/// Dropping the set without calling [`EventSet::resume`] leaves the suspended
/// thread(s) paused; that is how breakpoint and step stops keep the target
/// stopped for inspection.
pub struct EventSet {
    pub events: Vec<Event>,
    resumer: Option<Box<dyn FnOnce() + Send>>,
}

impl EventSet {
    pub fn new(events: Vec<Event>, resumer: Option<Box<dyn FnOnce() + Send>>) -> Self {
        Self { events, resumer }
    }

    /// Let the thread(s) suspended by this event set continue.
    pub fn resume(mut self) {
        if let Some(resume) = self.resumer.take() {
            resume();
        }
    }
}

pub trait EventQueue: Send + Sync {
    /// Block for at most `timeout` waiting for the next event set.
    ///
    /// `Ok(None)` means the deadline elapsed with nothing to deliver;
    /// [`crate::JdiError::Disconnected`] means the connection is gone and no
    /// further events will ever arrive.
    fn remove(&self, timeout: Duration) -> Result<Option<EventSet>>;
}
