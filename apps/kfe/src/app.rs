//! Command execution.
//!
//! The probe runs on the tokio runtime; everything else is blocking file
//! work and runs on a blocking thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use kfe_catalog::{GameItem, ScanSnapshot, UNCATEGORIZED};
use kfe_explorer::{Explorer, ExplorerOptions};
use kfe_free_space::FreeSpaceProbe;
use kfe_scanner::NoMetadata;
use kfe_storage::HostStorage;
use kfe_transfer::{Operation, Progress};

use crate::cli::{Command, USAGE};
use crate::config::Config;

/// How long a command waits for the first free-space readings.
const FIRST_READING_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(config: Config, command: Command) -> anyhow::Result<()> {
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let storage = Arc::new(HostStorage::new(config.devices.iter()));
    let devices = storage.devices();
    let probe = Arc::new(FreeSpaceProbe::new(
        storage.clone(),
        devices.clone(),
        Duration::from_secs(config.probe_interval_secs),
    ));

    if command.needs_probe() {
        let presence: Vec<(&str, bool)> = devices
            .iter()
            .map(|d| (d.as_str(), storage.is_present(d)))
            .collect();
        probe.set_presence(&presence);
        probe.start();
        wait_for_readings(&probe, &devices, &storage).await;
    }

    let options = ExplorerOptions {
        devices,
        settings_device: config.settings_device.clone(),
        category_order: config.category_order.into(),
        buffer_size: config.buffer_size(),
    };
    let explorer = Explorer::new(options, storage, Arc::new(NoMetadata), probe.clone())?;

    let result = tokio::task::spawn_blocking(move || execute(explorer, command))
        .await
        .context("command task panicked")?;
    probe.stop();
    result
}

/// Waits until every mounted device has a reading, or the timeout.
async fn wait_for_readings(probe: &FreeSpaceProbe, devices: &[String], storage: &HostStorage) {
    let deadline = Instant::now() + FIRST_READING_TIMEOUT;
    loop {
        let pending = devices
            .iter()
            .filter(|d| storage.is_present(d) && !probe.get(d).ok)
            .count();
        if pending == 0 {
            return;
        }
        if Instant::now() >= deadline {
            tracing::warn!(pending, "free space still unknown, continuing");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn execute(mut explorer: Explorer, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Help => println!("{USAGE}"),
        Command::Scan { device, json } => {
            let show_uncategorized = explorer.settings().show_uncategorized();
            let snapshot = explorer.open_device(&device)?;
            if json {
                println!("{}", serde_json::to_string_pretty(snapshot)?);
            } else {
                print_snapshot(snapshot, show_uncategorized);
            }
        }
        Command::Free { device } => {
            let reading = explorer.free_space(&device);
            if reading.ok {
                println!("{device} {} bytes free ({})", reading.bytes, human_bytes(reading.bytes));
            } else {
                anyhow::bail!("free space of {device} is unknown");
            }
        }
        Command::Transfer {
            op,
            device,
            category,
            paths,
        } => {
            for path in &paths {
                let source = explorer.resolve_source(path)?;
                explorer.selection_mut().check(&source.path, source.kind);
            }
            explorer.begin(op, None)?;
            explorer.pick_device(&device)?;
            explorer.pick_category(&category)?;
            report(op, explorer.confirm(&mut progress_printer())?);
        }
        Command::Delete { paths } => {
            for path in &paths {
                let source = explorer.resolve_source(path)?;
                explorer.selection_mut().check(&source.path, source.kind);
            }
            explorer.begin(Operation::Delete, None)?;
            report(Operation::Delete, explorer.confirm(&mut progress_printer())?);
        }
        Command::Enforce { device } => {
            let report = explorer.enforce_device(&device)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                anyhow::bail!("{} folder(s) could not be renamed", report.failures);
            }
        }
        Command::Settings { change } => {
            let reports = explorer.apply_settings(change)?;
            let settings = explorer.settings();
            let scheme = settings.naming_scheme();
            println!(
                "prefix={} catsort={} uncategorized={}",
                on_off(scheme.prefix),
                on_off(scheme.numbered),
                on_off(settings.show_uncategorized()),
            );
            for (device, report) in reports {
                println!(
                    "{device}: {} renamed, {} normalized, {} failed",
                    report.renames.len(),
                    report.normalized.len(),
                    report.failures
                );
            }
        }
    }
    Ok(())
}

fn report(op: Operation, outcome: kfe_transfer::BatchOutcome) {
    eprintln!();
    println!("{}", outcome.summary());
    if !outcome.is_clean() {
        tracing::warn!(?op, failed = outcome.failed, "some items failed");
    }
}

/// Prints whole-percent progress steps to stderr.
fn progress_printer() -> impl FnMut(Progress<'_>) {
    let mut last: Option<(String, u64)> = None;
    move |p: Progress<'_>| {
        let percent = (p.fraction() * 100.0) as u64;
        let changed = last
            .as_ref()
            .is_none_or(|(label, shown)| label != p.label || *shown != percent);
        if changed {
            eprint!("\r{:<40} {percent:>3}%", p.label);
            last = Some((p.label.to_string(), percent));
        }
    }
}

fn print_snapshot(snapshot: &ScanSnapshot, show_uncategorized: bool) {
    for name in snapshot.category_names() {
        let items = snapshot.category(name).unwrap_or_default();
        println!("{name} ({})", items.len());
        print_items(items);
    }
    if show_uncategorized || !snapshot.has_categories() {
        let items = snapshot.uncategorized();
        println!("{UNCATEGORIZED} ({})", items.len());
        print_items(items);
    }
}

fn print_items(items: &[GameItem]) {
    for item in items {
        println!("  {:<40} {:>10}  {}", item.display_name(), human_bytes(item.size_bytes), item.path);
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
