//! Tether: a JDWP debug bridge for automation agents.
//!
//! A single-process sidecar that attaches to one JVM (typically an Android
//! app) and exposes structured, token-bounded debugging over line-delimited
//! JSON-RPC 2.0 on stdio: breakpoints (conditional, logpoint, exception),
//! stepping, stack and value inspection with stable object handles, and
//! ProGuard/R8 mapping-aware name translation. Logs go to stderr; stdout
//! carries nothing but the protocol.

pub mod breakpoints;
pub mod budget;
pub mod condition;
pub mod event_loop;
pub mod frame_filter;
pub mod inspect;
pub mod mapping;
pub mod object_registry;
pub mod rpc;
pub mod server;
pub mod session;
pub mod threads;
