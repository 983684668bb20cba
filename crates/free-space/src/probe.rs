//! Background probe task and its shared state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use kfe_storage::FreeSpaceSource;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{DEFAULT_INTERVAL, FreeSpaceReading, FreeSpaceView, PAUSE_ACK_TIMEOUT, ProbeControl};

/// How often a paused task checks whether it may resume.
const PAUSE_POLL: Duration = Duration::from_millis(5);

/// What the background task is doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbePhase {
    #[default]
    Idle,
    Probing,
    Paused,
}

#[derive(Debug)]
struct Slot {
    device: String,
    present: bool,
    bytes: u64,
    ok: bool,
    updated: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    slots: Vec<Slot>,
    phase: ProbePhase,
    paused: bool,
    paused_ack: bool,
    pending: bool,
}

impl State {
    fn slot_mut(&mut self, device: &str) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.device == device)
    }
}

struct Shared {
    source: Arc<dyn FreeSpaceSource>,
    state: Mutex<State>,
    wake: Notify,
    interval: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Free-space probe service.
///
/// Owns one tokio task (after [`start`](Self::start)) that is the only
/// writer of the readings. Readers take a short lock and never wait on I/O.
pub struct FreeSpaceProbe {
    shared: Arc<Shared>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl FreeSpaceProbe {
    /// Creates a probe for `devices`, all initially absent.
    pub fn new<I, S>(source: Arc<dyn FreeSpaceSource>, devices: I, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = devices
            .into_iter()
            .map(|device| Slot {
                device: device.into(),
                present: false,
                bytes: 0,
                ok: false,
                updated: None,
            })
            .collect();
        let interval = if interval.is_zero() { DEFAULT_INTERVAL } else { interval };
        Self {
            shared: Arc::new(Shared {
                source,
                state: Mutex::new(State {
                    slots,
                    ..State::default()
                }),
                wake: Notify::new(),
                interval,
            }),
            cancel: Mutex::new(None),
        }
    }

    fn cancel_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns the background task on the current tokio runtime.
    ///
    /// Restarts the task if it is already running.
    pub fn start(&self) {
        let mut slot = self.cancel_slot();
        if let Some(cancel) = slot.take() {
            cancel.cancel();
        }
        let cancel = CancellationToken::new();
        *slot = Some(cancel.clone());
        self.shared.lock().pending = true;

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            probe_loop(shared, cancel).await;
        });
        tracing::info!(interval_ms = self.shared.interval.as_millis() as u64, "free-space probe started");
    }

    /// Stops the background task.
    pub fn stop(&self) {
        if let Some(cancel) = self.cancel_slot().take() {
            cancel.cancel();
            self.shared.lock().phase = ProbePhase::Idle;
            tracing::info!("free-space probe stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_slot().is_some()
    }

    pub fn phase(&self) -> ProbePhase {
        self.shared.lock().phase
    }

    /// Sets which devices are probed and asks for a refresh.
    ///
    /// Devices the probe was not created with are ignored.
    pub fn set_presence(&self, presence: &[(&str, bool)]) {
        {
            let mut state = self.shared.lock();
            for (device, present) in presence {
                if let Some(slot) = state.slot_mut(device) {
                    slot.present = *present;
                }
            }
        }
        self.request_refresh();
    }

    /// Starts probing the device other than `picked` as well.
    pub fn probe_opposite_of(&self, picked: &str) {
        let opposite = {
            let mut state = self.shared.lock();
            let slot = state.slots.iter_mut().find(|s| s.device != picked);
            slot.map(|slot| {
                slot.present = true;
                slot.device.clone()
            })
        };
        if let Some(device) = opposite {
            tracing::debug!(picked, device = %device, "probing opposite device");
            self.request_refresh();
        }
    }

    /// Asks the task to park and waits briefly for it to confirm.
    ///
    /// Returns `true` if the task acknowledged (or is not running). On
    /// `false` the caller proceeds anyway; a query may still be in flight.
    pub fn pause_now(&self) -> bool {
        {
            let mut state = self.shared.lock();
            state.paused = true;
            state.paused_ack = false;
        }
        if !self.is_running() {
            return true;
        }
        self.shared.wake.notify_one();

        let deadline = Instant::now() + PAUSE_ACK_TIMEOUT;
        loop {
            if self.shared.lock().paused_ack {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::debug!("free-space probe did not acknowledge pause in time");
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn resume(&self) {
        {
            let mut state = self.shared.lock();
            state.paused = false;
            state.paused_ack = false;
        }
        self.shared.wake.notify_one();
    }

    /// Last cached reading of `device`.
    pub fn get(&self, device: &str) -> FreeSpaceReading {
        let state = self.shared.lock();
        state
            .slots
            .iter()
            .find(|s| s.device == device)
            .map(|slot| FreeSpaceReading {
                bytes: slot.bytes,
                ok: slot.ok,
                age: slot.updated.map(|at| at.elapsed()),
            })
            .unwrap_or_default()
    }
}

impl FreeSpaceView for FreeSpaceProbe {
    fn reading(&self, device: &str) -> FreeSpaceReading {
        self.get(device)
    }

    fn request_refresh(&self) {
        self.shared.lock().pending = true;
        self.shared.wake.notify_one();
    }
}

impl ProbeControl for FreeSpaceProbe {
    fn set_presence(&self, presence: &[(&str, bool)]) {
        FreeSpaceProbe::set_presence(self, presence)
    }

    fn probe_opposite_of(&self, picked: &str) {
        FreeSpaceProbe::probe_opposite_of(self, picked)
    }

    fn pause_now(&self) -> bool {
        FreeSpaceProbe::pause_now(self)
    }

    fn resume(&self) {
        FreeSpaceProbe::resume(self)
    }
}

impl Drop for FreeSpaceProbe {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Parks while paused, otherwise waits for a refresh request or the
/// interval and probes every present device.
async fn probe_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let paused = {
            let mut state = shared.lock();
            if state.paused {
                state.paused_ack = true;
                state.phase = ProbePhase::Paused;
            } else {
                state.phase = ProbePhase::Idle;
            }
            state.paused
        };
        if paused {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(PAUSE_POLL) => continue,
            }
        }

        let pending = std::mem::take(&mut shared.lock().pending);
        if !pending {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = shared.wake.notified() => {}
                _ = tokio::time::sleep(shared.interval) => {}
            }
            let mut state = shared.lock();
            if state.paused {
                continue;
            }
            state.pending = false;
        }

        probe_round(&shared, &cancel).await;
    }
}

async fn probe_round(shared: &Arc<Shared>, cancel: &CancellationToken) {
    let devices: Vec<String> = {
        let mut state = shared.lock();
        state.phase = ProbePhase::Probing;
        state
            .slots
            .iter()
            .filter(|s| s.present)
            .map(|s| s.device.clone())
            .collect()
    };

    for device in devices {
        if cancel.is_cancelled() || shared.lock().paused {
            return;
        }
        let source = Arc::clone(&shared.source);
        let query = device.clone();
        let result = tokio::task::spawn_blocking(move || source.free_bytes(&query)).await;
        match result {
            Ok(Ok(bytes)) => {
                if let Some(slot) = shared.lock().slot_mut(&device) {
                    slot.bytes = bytes;
                    slot.ok = true;
                    slot.updated = Some(Instant::now());
                }
                tracing::debug!(device = %device, bytes, "free space probed");
            }
            Ok(Err(e)) => {
                tracing::warn!(device = %device, error = %e, "free space query failed");
            }
            Err(e) => {
                tracing::warn!(device = %device, error = %e, "free space query task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubSource {
        free: Mutex<HashMap<String, u64>>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn set(&self, device: &str, bytes: u64) {
            self.free.lock().unwrap().insert(device.to_string(), bytes);
        }
    }

    impl FreeSpaceSource for StubSource {
        fn free_bytes(&self, device: &str) -> io::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.free
                .lock()
                .unwrap()
                .get(device)
                .copied()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such device"))
        }
    }

    fn probe(source: &Arc<StubSource>, interval: Duration) -> FreeSpaceProbe {
        FreeSpaceProbe::new(source.clone(), ["ms0:/", "ef0:/"], interval)
    }

    async fn wait_for(probe: &FreeSpaceProbe, device: &str, bytes: u64) -> bool {
        for _ in 0..200 {
            let reading = probe.get(device);
            if reading.ok && reading.bytes == bytes {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn unknown_before_first_probe() {
        let source = Arc::new(StubSource::default());
        let probe = probe(&source, DEFAULT_INTERVAL);
        let reading = probe.get("ms0:/");
        assert!(!reading.ok);
        assert_eq!(reading.age, None);
        assert!(!probe.get("xx0:/").ok);
        assert!(!probe.is_running());
        assert!(probe.pause_now());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn probes_present_devices_only() {
        let source = Arc::new(StubSource::default());
        source.set("ms0:/", 5_000);
        source.set("ef0:/", 9_000);
        let probe = probe(&source, Duration::from_secs(60));
        probe.start();
        probe.set_presence(&[("ms0:/", true), ("ef0:/", false)]);

        assert!(wait_for(&probe, "ms0:/", 5_000).await);
        assert!(probe.get("ms0:/").age.is_some());
        assert!(!probe.get("ef0:/").ok);
        probe.stop();
        assert!(!probe.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refresh_request_updates_value() {
        let source = Arc::new(StubSource::default());
        source.set("ms0:/", 1_000);
        let probe = probe(&source, Duration::from_secs(60));
        probe.set_presence(&[("ms0:/", true)]);
        probe.start();
        assert!(wait_for(&probe, "ms0:/", 1_000).await);

        source.set("ms0:/", 2_000);
        probe.request_refresh();
        assert!(wait_for(&probe, "ms0:/", 2_000).await);
        probe.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn paused_probe_does_not_query() {
        let source = Arc::new(StubSource::default());
        source.set("ms0:/", 1_000);
        let probe = probe(&source, Duration::from_secs(60));
        probe.set_presence(&[("ms0:/", true)]);
        probe.start();
        assert!(wait_for(&probe, "ms0:/", 1_000).await);

        let acked = tokio::task::block_in_place(|| probe.pause_now());
        assert!(acked);
        assert_eq!(probe.phase(), ProbePhase::Paused);

        source.set("ms0:/", 3_000);
        let calls = source.calls.load(Ordering::SeqCst);
        probe.request_refresh();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
        assert_eq!(probe.get("ms0:/").bytes, 1_000);

        probe.resume();
        assert!(wait_for(&probe, "ms0:/", 3_000).await);
        probe.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn opposite_device_gets_probed() {
        let source = Arc::new(StubSource::default());
        source.set("ms0:/", 10);
        source.set("ef0:/", 20);
        let probe = probe(&source, Duration::from_secs(60));
        probe.start();
        probe.probe_opposite_of("ms0:/");
        assert!(wait_for(&probe, "ef0:/", 20).await);
        assert!(!probe.get("ms0:/").ok);
        probe.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_query_keeps_unknown() {
        let source = Arc::new(StubSource::default());
        let probe = probe(&source, Duration::from_secs(60));
        probe.set_presence(&[("ms0:/", true)]);
        probe.start();
        for _ in 0..50 {
            if source.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(source.calls.load(Ordering::SeqCst) > 0);
        assert!(!probe.get("ms0:/").ok);
        probe.stop();
    }
}
