//! WiFiGuard library — allow-list guard for the connected wireless network.
//!
//! A three-stage pipeline: the **monitor** polls the associated SSID, the
//! **classifier** checks it against a fixed allow-list, and the **alerter**
//! reports either a safe connection or an unauthorized network. Stages are
//! coupled only through two single-slot links, each paired with a coalescing
//! wake signal, and every stage pulses a watchdog that restarts the whole
//! process when one of them stalls.
//!
//! The library is organized in two layers:
//! - **Layer 1** (`no_std`, no allocator): `observation`, `allowlist`,
//!   `classifier`, `alert`, `source`, `watchdog`, `config`, `board`.
//! - **Layer 2** (feature `std`): `link`, `stage`, `stats`, `supervisor`,
//!   `pipeline`. The threaded runtime shared by the host daemon and the
//!   ESP-IDF firmware.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod alert;
pub mod allowlist;
pub mod board;
pub mod classifier;
pub mod config;
pub mod observation;
pub mod source;
pub mod watchdog;

#[cfg(feature = "std")]
pub mod link;
#[cfg(feature = "std")]
pub mod pipeline;
#[cfg(feature = "std")]
pub mod stage;
#[cfg(feature = "std")]
pub mod stats;
#[cfg(feature = "std")]
pub mod supervisor;
