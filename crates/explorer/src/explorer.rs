//! Explorer controller.

use std::sync::Arc;

use kfe_cache::DeviceCache;
use kfe_catalog::{CategoryOrder, DEVICE_EF0, DEVICE_MS0, ScanSnapshot, device_of};
use kfe_free_space::{FreeSpaceProbe, FreeSpaceReading, ProbeControl};
use kfe_naming::{EnforceReport, enforce_category_scheme_for_device};
use kfe_scanner::{MetadataReader, ScanOptions, Scanner};
use kfe_settings::{Settings, SettingsStore};
use kfe_storage::Storage;
use kfe_transfer::{BatchOutcome, DEFAULT_BUFFER_SIZE, Operation, Progress, SourceItem, TransferEngine};

use crate::error::ExplorerError;
use crate::selection::Selection;
use crate::state::{OperationState, Plan};

/// Static wiring of an [`Explorer`].
#[derive(Debug, Clone)]
pub struct ExplorerOptions {
    /// Device roots the explorer manages.
    pub devices: Vec<String>,
    /// Device holding the settings file.
    pub settings_device: String,
    /// Category order used while numbering is off.
    pub category_order: CategoryOrder,
    pub buffer_size: usize,
}

impl Default for ExplorerOptions {
    fn default() -> Self {
        Self {
            devices: vec![DEVICE_MS0.to_string(), DEVICE_EF0.to_string()],
            settings_device: DEVICE_MS0.to_string(),
            category_order: CategoryOrder::Alphabetical,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Settings the user can change from the explorer; `None` keeps the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub prefix: Option<bool>,
    pub catsort: Option<bool>,
    pub show_uncategorized: Option<bool>,
}

/// Ties the services together for one foreground session.
///
/// Owns the snapshot cache, the settings store, the transfer engine, the
/// checked-item selection and the operation state machine. The free-space
/// probe is shared with its background task.
pub struct Explorer<P: ProbeControl = FreeSpaceProbe> {
    devices: Vec<String>,
    fallback_order: CategoryOrder,
    settings: SettingsStore,
    current: Settings,
    cache: DeviceCache,
    engine: TransferEngine,
    probe: Arc<P>,
    state: OperationState,
    selection: Selection,
}

impl<P: ProbeControl> Explorer<P> {
    pub fn new(
        options: ExplorerOptions,
        storage: Arc<dyn Storage>,
        metadata: Arc<dyn MetadataReader>,
        probe: Arc<P>,
    ) -> Result<Self, ExplorerError> {
        let settings = SettingsStore::new(Arc::clone(&storage), &options.settings_device)?;
        let current = settings.load();
        let scanner = Scanner::new(Arc::clone(&storage), metadata);
        let mut explorer = Self {
            devices: options.devices,
            fallback_order: options.category_order,
            settings,
            current,
            cache: DeviceCache::new(scanner),
            engine: TransferEngine::new(storage).with_buffer_size(options.buffer_size),
            probe,
            state: OperationState::default(),
            selection: Selection::default(),
        };
        for device in explorer.devices.clone() {
            explorer.refresh_scan_options(&device);
        }
        tracing::debug!(devices = ?explorer.devices, settings = ?explorer.current, "explorer ready");
        Ok(explorer)
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Configured devices that are currently mounted.
    pub fn present_devices(&self) -> Vec<&str> {
        self.devices
            .iter()
            .map(String::as_str)
            .filter(|device| self.engine.storage().is_dir(device))
            .collect()
    }

    pub fn settings(&self) -> Settings {
        self.current
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    pub fn probe(&self) -> &Arc<P> {
        &self.probe
    }

    fn check_device(&self, device: &str) -> Result<(), ExplorerError> {
        if self.devices.iter().any(|d| d == device) {
            Ok(())
        } else {
            Err(ExplorerError::UnknownDevice(device.to_string()))
        }
    }

    fn refresh_scan_options(&mut self, device: &str) {
        let options = ScanOptions {
            blacklist: self.settings.blacklist(device),
            order: self.current.category_order(self.fallback_order),
        };
        self.cache.set_scan_options(device, options);
    }

    // -----------------------------------------------------------------------
    // Browsing
    // -----------------------------------------------------------------------

    /// Snapshot of `device`, rescanned first if dirty.
    ///
    /// The free-space probe is paused for the duration of a rescan.
    pub fn open_device(&mut self, device: &str) -> Result<&ScanSnapshot, ExplorerError> {
        self.check_device(device)?;
        if self.cache.is_dirty(device) {
            if !self.probe.pause_now() {
                tracing::debug!(device, "rescanning while the probe is still busy");
            }
            self.cache.ensure_fresh(device);
            self.probe.resume();
            if let Some(snapshot) = self.cache.snapshot(device) {
                self.selection.retain_in(device, snapshot);
            }
        }
        Ok(self.cache.ensure_fresh(device))
    }

    /// Looks `path` up in its device's snapshot.
    pub fn resolve_source(&mut self, path: &str) -> Result<SourceItem, ExplorerError> {
        let missing = || ExplorerError::NotInCatalog(path.to_string());
        let device = device_of(path).ok_or_else(missing)?;
        self.open_device(device)?
            .item(path)
            .map(|item| SourceItem::new(item.path.clone(), item.kind))
            .ok_or_else(missing)
    }

    pub fn icon_for(&mut self, path: &str) -> Option<Arc<[u8]>> {
        self.cache.icon_for(path)
    }

    pub fn free_space(&self, device: &str) -> FreeSpaceReading {
        self.probe.reading(device)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Starts `op` on the checked items, or on `focused` when none are checked.
    pub fn begin(&mut self, op: Operation, focused: Option<SourceItem>) -> Result<&OperationState, ExplorerError> {
        let sources = self.selection.sources(focused);
        self.state.begin(op, sources)?;
        if op.needs_destination() {
            let presence: Vec<(&str, bool)> = self
                .devices
                .iter()
                .map(|d| (d.as_str(), self.engine.storage().is_dir(d)))
                .collect();
            self.probe.set_presence(&presence);
        }
        tracing::debug!(?op, phase = self.state.phase(), "operation started");
        Ok(&self.state)
    }

    /// Picks the destination device and returns its category names.
    pub fn pick_device(&mut self, device: &str) -> Result<Vec<String>, ExplorerError> {
        self.check_device(device)?;
        self.state.pick_device(device)?;
        self.probe.probe_opposite_of(device);
        Ok(self.open_device(device)?.category_names().to_vec())
    }

    pub fn pick_category(&mut self, category: &str) -> Result<(), ExplorerError> {
        self.state.pick_category(category)?;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), ExplorerError> {
        self.state.back()?;
        Ok(())
    }

    /// Runs the confirmed plan and returns to idle.
    ///
    /// The selection is cleared once the batch has run; a preflight refusal
    /// keeps it so the user can pick another destination.
    pub fn confirm(&mut self, progress: &mut dyn FnMut(Progress<'_>)) -> Result<BatchOutcome, ExplorerError> {
        let plan = self.state.confirm()?;
        let result = self.execute(&plan, progress);
        self.state.finish()?;
        match &result {
            Ok(outcome) => {
                self.selection.clear();
                tracing::info!(summary = %outcome.summary(), "operation finished");
            }
            Err(e) => tracing::warn!(error = %e, "operation refused"),
        }
        result
    }

    fn execute(&mut self, plan: &Plan, progress: &mut dyn FnMut(Progress<'_>)) -> Result<BatchOutcome, ExplorerError> {
        let space = self.probe.as_ref();
        match (plan.op, &plan.destination) {
            (Operation::Delete, _) => Ok(self
                .engine
                .perform_delete(&mut self.cache, space, &plan.sources, progress)),
            (Operation::Move, Some(dest)) => Ok(self.engine.perform_move(
                &mut self.cache,
                space,
                &plan.sources,
                &dest.device,
                &dest.category,
                progress,
            )?),
            (Operation::Copy, Some(dest)) => Ok(self.engine.perform_copy(
                &mut self.cache,
                space,
                &plan.sources,
                &dest.device,
                &dest.category,
                progress,
            )?),
            (op, None) => Err(ExplorerError::MissingDestination(op)),
        }
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Saves `change` and, when the naming scheme changed, enforces it on
    /// every mounted device.
    ///
    /// Returns one report per enforced device.
    pub fn apply_settings(&mut self, change: SettingsChange) -> Result<Vec<(String, EnforceReport)>, ExplorerError> {
        let mut next = self.current;
        if let Some(prefix) = change.prefix {
            next.prefix = u32::from(prefix);
        }
        if let Some(catsort) = change.catsort {
            next.catsort = u32::from(catsort);
        }
        if let Some(show) = change.show_uncategorized {
            next.uncategorized = u32::from(show);
        }
        if next == self.current {
            return Ok(Vec::new());
        }
        self.settings.save(&next)?;
        let scheme_changed = next.naming_scheme() != self.current.naming_scheme();
        self.current = next;
        tracing::info!(settings = ?next, "settings saved");

        let mut reports = Vec::new();
        let devices: Vec<String> = self.present_devices().into_iter().map(str::to_string).collect();
        for device in devices {
            if scheme_changed {
                let report = self.enforce_device(&device)?;
                reports.push((device, report));
            } else {
                self.refresh_scan_options(&device);
            }
        }
        Ok(reports)
    }

    /// Re-reads the settings file.
    pub fn reload_settings(&mut self) -> Settings {
        self.current = self.settings.load();
        for device in self.devices.clone() {
            self.refresh_scan_options(&device);
        }
        self.current
    }

    /// Brings `device`'s category folders in line with the current scheme
    /// and replays the renames on the cached snapshot.
    pub fn enforce_device(&mut self, device: &str) -> Result<EnforceReport, ExplorerError> {
        self.check_device(device)?;
        let blacklist = self.settings.blacklist(device);

        self.probe.pause_now();
        let report = enforce_category_scheme_for_device(
            self.engine.storage().as_ref(),
            device,
            self.current.naming_scheme(),
            &blacklist,
        );
        self.probe.resume();

        self.refresh_scan_options(device);
        if report.is_clean() {
            for (from, to) in report.category_renames() {
                self.cache.rename_category(device, &from, &to);
            }
        } else {
            self.cache.mark_dirty(device);
        }
        if report.changed() {
            self.selection.clear();
        }
        Ok(report)
    }

    /// Replaces `device`'s blacklist; the device rescans on next open.
    pub fn set_blacklist(&mut self, device: &str, blacklist: &kfe_catalog::Blacklist) -> Result<(), ExplorerError> {
        self.check_device(device)?;
        self.settings.save_blacklist(device, blacklist)?;
        self.refresh_scan_options(device);
        Ok(())
    }

    pub fn reload_blacklist(&mut self, device: &str) -> Result<(), ExplorerError> {
        self.check_device(device)?;
        self.settings.reload_blacklist(device);
        self.refresh_scan_options(device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kfe_catalog::{Blacklist, ItemKind};
    use kfe_free_space::FreeSpaceView;
    use kfe_scanner::NoMetadata;
    use kfe_storage::HostStorage;

    #[derive(Default)]
    struct StubProbe {
        pauses: AtomicUsize,
        resumes: AtomicUsize,
        opposite: Mutex<Vec<String>>,
    }

    impl FreeSpaceView for StubProbe {
        fn reading(&self, _device: &str) -> FreeSpaceReading {
            FreeSpaceReading::default()
        }

        fn request_refresh(&self) {}
    }

    impl ProbeControl for StubProbe {
        fn set_presence(&self, _presence: &[(&str, bool)]) {}

        fn probe_opposite_of(&self, picked: &str) {
            self.opposite.lock().unwrap().push(picked.to_string());
        }

        fn pause_now(&self) -> bool {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn resume(&self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn explorer(tmp: &tempfile::TempDir) -> (Arc<HostStorage>, Explorer<StubProbe>) {
        let s = Arc::new(HostStorage::new([
            ("ms0:/", tmp.path().join("ms0")),
            ("ef0:/", tmp.path().join("ef0")),
        ]));
        s.create_dir_all("ms0:/ISO/RPG").unwrap();
        s.create_dir_all("ef0:/ISO").unwrap();
        s.write_file("ms0:/ISO/RPG/a.iso", b"aaaa").unwrap();
        s.write_file("ms0:/ISO/b.iso", b"bb").unwrap();
        let explorer = Explorer::new(
            ExplorerOptions::default(),
            s.clone(),
            Arc::new(NoMetadata),
            Arc::new(StubProbe::default()),
        )
        .unwrap();
        (s, explorer)
    }

    #[test]
    fn rescans_pause_the_probe() {
        let tmp = tempfile::tempdir().unwrap();
        let (_s, mut ex) = explorer(&tmp);
        assert_eq!(ex.open_device("ms0:/").unwrap().len(), 2);
        ex.open_device("ms0:/").unwrap();
        assert_eq!(ex.probe().pauses.load(Ordering::SeqCst), 1);
        assert_eq!(ex.probe().resumes.load(Ordering::SeqCst), 1);
        assert!(matches!(ex.open_device("xx0:/"), Err(ExplorerError::UnknownDevice(_))));
    }

    #[test]
    fn copy_of_focused_item_runs_to_idle() {
        let tmp = tempfile::tempdir().unwrap();
        let (s, mut ex) = explorer(&tmp);
        let focused = ex.resolve_source("ms0:/ISO/b.iso").unwrap();

        ex.begin(Operation::Copy, Some(focused)).unwrap();
        assert!(ex.pick_device("ef0:/").unwrap().is_empty());
        assert_eq!(ex.probe().opposite.lock().unwrap().as_slice(), ["ef0:/"]);
        ex.pick_category("").unwrap();
        let outcome = ex.confirm(&mut |_| {}).unwrap();

        assert_eq!(outcome.summary(), "Copied 1");
        assert!(ex.state().is_idle());
        assert_eq!(s.read_file("ef0:/ISO/b.iso").unwrap(), b"bb");
        assert!(ex.cache().snapshot("ef0:/").unwrap().contains("ef0:/ISO/b.iso"));
    }

    #[test]
    fn checked_items_win_over_focus() {
        let tmp = tempfile::tempdir().unwrap();
        let (s, mut ex) = explorer(&tmp);
        ex.open_device("ms0:/").unwrap();
        ex.selection_mut().check("ms0:/ISO/RPG/a.iso", ItemKind::IsoFile);
        let focused = SourceItem::new("ms0:/ISO/b.iso", ItemKind::IsoFile);

        ex.begin(Operation::Delete, Some(focused)).unwrap();
        let outcome = ex.confirm(&mut |_| {}).unwrap();
        assert_eq!(outcome.summary(), "Deleted 1");
        assert!(s.exists("ms0:/ISO/b.iso"));
        assert!(!s.exists("ms0:/ISO/RPG/a.iso"));
        assert!(ex.selection().is_empty());
    }

    #[test]
    fn unknown_path_is_not_in_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let (_s, mut ex) = explorer(&tmp);
        assert!(matches!(
            ex.resolve_source("ms0:/ISO/missing.iso"),
            Err(ExplorerError::NotInCatalog(_))
        ));
        assert!(matches!(ex.begin(Operation::Move, None), Err(ExplorerError::Transition(_))));
    }

    #[test]
    fn catsort_renumbers_and_patches_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let (s, mut ex) = explorer(&tmp);
        s.create_dir_all("ms0:/ISO/Action").unwrap();
        ex.open_device("ms0:/").unwrap();
        let scans_before = ex.probe().pauses.load(Ordering::SeqCst);

        let reports = ex
            .apply_settings(SettingsChange {
                catsort: Some(true),
                ..SettingsChange::default()
            })
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert!(s.is_dir("ms0:/ISO/01Action"));
        assert!(s.exists("ms0:/ISO/02RPG/a.iso"));
        assert_eq!(ex.settings().catsort, 1);

        assert!(!ex.cache().is_dirty("ms0:/"));
        let snap = ex.open_device("ms0:/").unwrap();
        assert_eq!(snap.category_names(), ["01Action", "02RPG"]);
        assert!(snap.contains("ms0:/ISO/02RPG/a.iso"));
        // Two enforcer passes, no rescan of the patched device.
        assert_eq!(ex.probe().pauses.load(Ordering::SeqCst), scans_before + 2);
    }

    #[test]
    fn unchanged_settings_do_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (s, mut ex) = explorer(&tmp);
        let reports = ex.apply_settings(SettingsChange::default()).unwrap();
        assert!(reports.is_empty());
        assert!(!s.exists("ms0:/seplugins/gclite/settings.bin"));
    }

    #[test]
    fn blacklist_change_forces_rescan() {
        let tmp = tempfile::tempdir().unwrap();
        let (s, mut ex) = explorer(&tmp);
        assert!(ex.open_device("ms0:/").unwrap().category("RPG").is_some());

        ex.set_blacklist("ms0:/", &Blacklist::new(["rpg"])).unwrap();
        assert!(ex.cache().is_dirty("ms0:/"));
        assert!(s.exists("ms0:/seplugins/gclite/blacklist.txt"));
        let snap = ex.open_device("ms0:/").unwrap();
        assert!(snap.category("RPG").is_none());
        assert!(!snap.contains("ms0:/ISO/RPG/a.iso"));
    }
}
