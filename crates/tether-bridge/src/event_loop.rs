//! Background consumer of the VM event queue.
//!
//! One dedicated OS thread per attachment: the queue poll is a blocking call
//! with a 500ms deadline, which doubles as the stop-flag check interval. The
//! loop takes the session lock only inside the dispatch handlers, never while
//! parked on the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use tether_jdi::{Event, EventQueue, EventSet, JdiError, VmHandle};

use crate::rpc::params_object;
use crate::session::{EventLoopHandle, Session};

const POLL_DEADLINE: Duration = Duration::from_millis(500);

pub fn spawn(session: Arc<Session>, vm: VmHandle) -> EventLoopHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let queue = vm.event_queue();
    let join = std::thread::Builder::new()
        .name("jdi-events".to_string())
        .spawn(move || run(session, queue, stop_flag))
        .expect("failed to spawn event-loop thread");
    EventLoopHandle {
        stop,
        join: Some(join),
    }
}

fn run(session: Arc<Session>, queue: Arc<dyn EventQueue>, stop: Arc<AtomicBool>) {
    tracing::debug!("event loop started");
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match queue.remove(POLL_DEADLINE) {
            Ok(None) => continue,
            Ok(Some(set)) => {
                if dispatch_set(&session, set) {
                    break;
                }
            }
            Err(JdiError::Disconnected) => {
                session.handle_disconnect("VM disconnected");
                break;
            }
            Err(err) => {
                // Anything unexpected off the queue means the connection is
                // no longer trustworthy; normalize it as a disconnect.
                tracing::warn!(%err, "event queue failure");
                session.handle_disconnect(&err.to_string());
                break;
            }
        }
    }
    tracing::debug!("event loop stopped");
}

/// Dispatch one event set. Returns `true` when the loop must exit
/// (disconnect observed).
fn dispatch_set(session: &Session, set: EventSet) -> bool {
    let mut keep_paused = false;
    let mut disconnect_detail: Option<String> = None;

    for event in &set.events {
        match event {
            Event::ClassPrepare { class, .. } => session.on_class_prepare(class),
            Event::Breakpoint {
                request_id,
                thread,
                location,
            } => {
                keep_paused |= session.on_breakpoint_event(*request_id, thread, location);
            }
            Event::Step {
                request_id,
                thread,
                location,
            } => {
                keep_paused |= session.on_step_event(*request_id, thread, location);
            }
            Event::Exception {
                request_id,
                thread,
                exception,
                throw_location,
                catch_location,
            } => {
                keep_paused |= session.on_exception_event(
                    *request_id,
                    thread,
                    exception,
                    throw_location,
                    catch_location.as_ref(),
                );
            }
            Event::VmDisconnect { detail } => disconnect_detail = Some(detail.clone()),
            Event::VmDeath => disconnect_detail = Some("VM death".to_string()),
        }
    }

    if let Some(detail) = disconnect_detail {
        session.handle_disconnect(&detail);
        return true;
    }

    if keep_paused {
        // Notification went out already; dropping the set keeps the thread
        // frozen for the inspection that follows.
        drop(set);
    } else {
        set.resume();
    }
    false
}

/// Map a raw disconnect detail onto the coarse reason taxonomy.
pub fn normalize_disconnect_reason(detail: &str) -> &'static str {
    let lower = detail.to_lowercase();
    if ["transport", "device offline", "connection reset"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return "device_disconnected";
    }
    if ["killed", "terminated", "force stop"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return "app_killed";
    }
    "app_crashed"
}

impl Session {
    /// Enter the disconnected sub-state: resolve the active step, flush
    /// per-suspension bookkeeping, and tell the client. Idempotent.
    pub fn handle_disconnect(&self, detail: &str) {
        let reason = normalize_disconnect_reason(detail);
        let pending_step = {
            let mut state = self.state.lock();
            if state.disconnected {
                return;
            }
            state.disconnected = true;
            state.disconnect_reason = Some(reason.to_string());
            state.suspended_at.clear();
            state.objects.invalidate();
            state.active_step.take()
        };

        if let Some(mut step) = pending_step {
            step.complete(step.interrupted_payload(
                "VM disconnected",
                "re-attach the debugger once the app is running again",
            ));
        }

        tracing::info!(reason, detail, "VM disconnected");
        self.notifier().event(
            "vm_disconnected",
            params_object(json!({ "reason": reason, "detail": detail })),
        );
    }
}
