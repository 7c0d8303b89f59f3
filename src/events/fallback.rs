//! Process-wide fallback event handler
//!
//! Events raised outside any configured run (for example from a detached
//! task) are routed here. The slot is a single lock-guarded registry with
//! explicit install, query and reset operations.

use parking_lot::{const_mutex, Mutex};
use std::io::Write;
use tracing::debug;

use crate::error::ConfigError;

use super::abi;
use super::{Event, EventContext, EventHandler};

static FALLBACK: Mutex<Option<EventHandler>> = const_mutex(None);

/// Install `handler`, returning the one it replaced
pub fn install(handler: EventHandler) -> Option<EventHandler> {
    debug!("Installing fallback event handler");
    FALLBACK.lock().replace(handler)
}

/// Install a handler writing ABI records to `writer`
pub fn install_abi_writer<W>(writer: W, version: u32) -> Result<Option<EventHandler>, ConfigError>
where
    W: Write + Send + 'static,
{
    Ok(install(abi::abi_handler(writer, version)?))
}

pub fn current() -> Option<EventHandler> {
    FALLBACK.lock().clone()
}

/// Remove the installed handler
pub fn reset() -> Option<EventHandler> {
    FALLBACK.lock().take()
}

/// Deliver `event` to the fallback handler; returns false if none is installed
pub fn post(event: &Event) -> bool {
    // Call outside the lock so a handler may itself post.
    let Some(handler) = current() else {
        debug!("Dropping {} event: no fallback handler", event.kind);
        return false;
    };
    handler(event, &EventContext::default());
    true
}
