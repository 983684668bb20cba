//! Free-space probe.
//!
//! Free-byte queries can take a long time on the device, so they run in one
//! low-priority background task. The foreground reads the last cached value
//! without blocking; freshness is best effort.

mod probe;

use std::time::Duration;

use serde::Serialize;

pub use probe::{FreeSpaceProbe, ProbePhase};

/// Default wait between two probe rounds.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound [`FreeSpaceProbe::pause_now`] waits for the task to park.
pub const PAUSE_ACK_TIMEOUT: Duration = Duration::from_millis(10);

/// Last known free space of one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeSpaceReading {
    pub bytes: u64,
    /// `false` until a query for this device has succeeded once.
    pub ok: bool,
    /// Time since the value was stored.
    #[serde(skip)]
    pub age: Option<Duration>,
}

/// Read side of the probe, as seen by the transfer engine.
pub trait FreeSpaceView: Send + Sync {
    /// Non-blocking read of the cached value.
    fn reading(&self, device: &str) -> FreeSpaceReading;

    /// Asks for a new round as soon as possible.
    fn request_refresh(&self);
}

/// Control side used by the foreground around blocking work.
pub trait ProbeControl: FreeSpaceView {
    fn set_presence(&self, presence: &[(&str, bool)]);

    fn probe_opposite_of(&self, picked: &str);

    /// Returns `true` if the probe is parked (or not running).
    fn pause_now(&self) -> bool;

    fn resume(&self);
}
