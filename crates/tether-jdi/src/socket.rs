//! TCP attach transport.
//!
//! Currently this implements only the initial `JDWP-Handshake` exchange.
//! Higher-level capabilities (threads, classes, event requests) are stubbed
//! behind [`JdiError::NotImplemented`] while the wire protocol is filled out;
//! integration tests run against [`crate::fake`] instead.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{JdiError, Result};
use crate::event::{EventQueue, EventSet};
use crate::types::{Location, RequestId, StepDepth, StepSize, SuspendPolicy};
use crate::vm::{
    ClassRef, EventRequestManager, ThreadRef, Vm, VmConnector, VmHandle,
};

const HANDSHAKE: &[u8] = b"JDWP-Handshake";

pub struct SocketConnector;

impl VmConnector for SocketConnector {
    fn attach(&self, host: &str, port: u16, timeout: Duration) -> Result<VmHandle> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|err| JdiError::AttachFailed(format!("unable to resolve {host}:{port}: {err}")))?
            .next()
            .ok_or_else(|| JdiError::AttachFailed(format!("unable to resolve {host}:{port}")))?;

        let mut stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|err| JdiError::AttachFailed(err.to_string()))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        perform_handshake(&mut stream)?;
        tracing::info!(%addr, "JDWP handshake complete");

        Ok(Arc::new(SocketVm { _stream: stream }))
    }
}

fn perform_handshake(stream: &mut TcpStream) -> Result<()> {
    stream
        .write_all(HANDSHAKE)
        .and_then(|()| stream.flush())
        .map_err(|err| JdiError::AttachFailed(format!("handshake write failed: {err}")))?;

    let mut reply = [0u8; HANDSHAKE.len()];
    stream
        .read_exact(&mut reply)
        .map_err(|err| JdiError::AttachFailed(format!("handshake read failed: {err}")))?;
    if reply != HANDSHAKE {
        return Err(JdiError::AttachFailed(
            "target is not a debuggable JVM (bad handshake reply)".to_string(),
        ));
    }
    Ok(())
}

struct SocketVm {
    _stream: TcpStream,
}

impl Vm for SocketVm {
    fn name(&self) -> String {
        "JDWP target".to_string()
    }

    fn version(&self) -> String {
        "unknown".to_string()
    }

    fn all_threads(&self) -> Result<Vec<ThreadRef>> {
        Err(JdiError::NotImplemented)
    }

    fn all_classes(&self) -> Result<Vec<ClassRef>> {
        Err(JdiError::NotImplemented)
    }

    fn classes_by_name(&self, _name: &str) -> Result<Vec<ClassRef>> {
        Err(JdiError::NotImplemented)
    }

    fn event_queue(&self) -> Arc<dyn EventQueue> {
        Arc::new(StubQueue)
    }

    fn event_request_manager(&self) -> Arc<dyn EventRequestManager> {
        Arc::new(StubRequests)
    }

    fn resume(&self) -> Result<()> {
        Err(JdiError::NotImplemented)
    }

    fn dispose(&self) {}
}

struct StubQueue;

impl EventQueue for StubQueue {
    fn remove(&self, timeout: Duration) -> Result<Option<EventSet>> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}

struct StubRequests;

impl EventRequestManager for StubRequests {
    fn create_breakpoint(&self, _location: &Location, _policy: SuspendPolicy) -> Result<RequestId> {
        Err(JdiError::NotImplemented)
    }

    fn create_class_prepare(
        &self,
        _class_pattern: &str,
        _policy: SuspendPolicy,
    ) -> Result<RequestId> {
        Err(JdiError::NotImplemented)
    }

    fn create_exception(
        &self,
        _class: Option<&ClassRef>,
        _caught: bool,
        _uncaught: bool,
        _policy: SuspendPolicy,
    ) -> Result<RequestId> {
        Err(JdiError::NotImplemented)
    }

    fn create_step(
        &self,
        _thread: &ThreadRef,
        _size: StepSize,
        _depth: StepDepth,
        _count: i32,
        _policy: SuspendPolicy,
    ) -> Result<RequestId> {
        Err(JdiError::NotImplemented)
    }

    fn delete(&self, _request: RequestId) -> Result<()> {
        Ok(())
    }

    fn step_requests_for_thread(&self, _thread_unique_id: u64) -> Vec<RequestId> {
        Vec::new()
    }
}
