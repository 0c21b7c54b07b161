/// Terminal outcomes of the pipeline and their NDJSON encoding.
///
/// The alerter turns a classified observation into an [`Alert`] and hands it
/// to an [`AlertSink`]. Event lines use `heapless`/`serde-json-core` so the
/// same encoding works on the firmware without an allocator.
use core::fmt;

use heapless::Vec;
use serde::Serialize;

use crate::observation::{NetworkObservation, SafetyFlag, Ssid};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized event line
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized event lines
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

/// What the alerter reports for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// The device is on an allow-listed network.
    SafeConnection(Ssid),
    /// The device is on a network that is not trusted, or could not be
    /// identified.
    Unauthorized(Ssid),
}

impl Alert {
    /// `Unknown` maps to `Unauthorized`: an unclassified observation must
    /// never produce a safe confirmation.
    pub fn from_observation(obs: &NetworkObservation) -> Self {
        match obs.safety {
            SafetyFlag::Safe => Alert::SafeConnection(obs.ssid.clone()),
            SafetyFlag::Unsafe | SafetyFlag::Unknown => Alert::Unauthorized(obs.ssid.clone()),
        }
    }

    pub fn ssid(&self) -> &Ssid {
        match self {
            Alert::SafeConnection(ssid) | Alert::Unauthorized(ssid) => ssid,
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Alert::SafeConnection(_))
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::SafeConnection(ssid) => write!(f, "connected to safe network {ssid}"),
            Alert::Unauthorized(ssid) => write!(f, "unauthorized network alert {ssid}"),
        }
    }
}

/// Destination for alerter output.
pub trait AlertSink {
    fn emit(&mut self, alert: &Alert);
}

/// Sink that writes alerts to the `log` facade under the `alerter` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn emit(&mut self, alert: &Alert) {
        if alert.is_safe() {
            log::info!(target: "alerter", "{}", alert);
        } else {
            log::warn!(target: "alerter", "{}", alert);
        }
    }
}

/// Event lines written by the daemon and firmware.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum EventMessage<'a> {
    /// Final verdict for one observation
    #[serde(rename = "verdict")]
    Verdict {
        ssid: &'a Ssid,
        /// "safe" or "unsafe"
        verdict: &'static str,
        /// Milliseconds since start
        ts: u32,
    },
    /// Periodic pipeline status
    #[serde(rename = "status")]
    Status {
        /// Uptime in seconds
        uptime: u32,
        observed: u32,
        /// Observations dropped on a full link (monitor→classifier, classifier→alerter)
        dropped: [u32; 2],
        /// Starvation resets per link
        starved: [u32; 2],
        safe: u32,
        alerts: u32,
        board: &'static str,
        version: &'static str,
    },
}

impl<'a> EventMessage<'a> {
    pub fn verdict(alert: &'a Alert, ts: u32) -> Self {
        EventMessage::Verdict {
            ssid: alert.ssid(),
            verdict: if alert.is_safe() { "safe" } else { "unsafe" },
            ts,
        }
    }
}

/// Serialize an event to JSON bytes and write to the output buffer.
/// Returns the number of bytes written including the trailing newline,
/// or None if the event does not fit.
pub fn serialize_message(msg: &EventMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) if len < buf.len() => {
            buf[len] = b'\n';
            Some(len + 1)
        }
        _ => None,
    }
}

/// Serialize into a fresh [`MsgBuffer`].
pub fn encode_message(msg: &EventMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok()?;
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}
