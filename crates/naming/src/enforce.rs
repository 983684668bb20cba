use std::collections::{BTreeMap, BTreeSet};

use kfe_catalog::{
    Blacklist, MAX_ORDINAL, NamingScheme, format_category_name_from_base, join, parse_ordinal,
    strip_category_prefixes,
};
use kfe_scanner::{CategoryFolder, category_candidates};
use kfe_storage::Storage;

use crate::merge::merge_dirs;
use crate::{EnforceReport, FolderRename};

fn alpha_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Chooses one ordinal per base name.
///
/// `groups` maps each base name to the on-disk names found for it. Bases
/// are visited alphabetically; each keeps the smallest existing ordinal in
/// `1..=N` that no earlier base claimed. When `numbered`, the remaining
/// bases take the lowest free ordinals in the same order, so the result is
/// a permutation of `1..=N`. Numbering stops at [`MAX_ORDINAL`]: bases
/// past it get 0 and stay unnumbered. Otherwise every ordinal is 0.
pub fn assign_ordinals(groups: &BTreeMap<String, Vec<String>>, numbered: bool) -> Vec<(String, u32)> {
    let mut bases: Vec<&String> = groups.keys().collect();
    bases.sort_by(|a, b| alpha_cmp(a, b));
    if !numbered {
        return bases.into_iter().map(|base| (base.clone(), 0)).collect();
    }

    let total = u32::try_from(bases.len()).unwrap_or(u32::MAX).min(MAX_ORDINAL);
    let mut claimed = BTreeSet::new();
    let mut chosen: Vec<(String, Option<u32>)> = Vec::with_capacity(bases.len());
    for base in &bases {
        let existing: BTreeSet<u32> = groups[*base]
            .iter()
            .filter_map(|name| parse_ordinal(name))
            .filter(|ordinal| (1..=total).contains(ordinal))
            .collect();
        let pick = existing.into_iter().find(|ordinal| !claimed.contains(ordinal));
        if let Some(ordinal) = pick {
            claimed.insert(ordinal);
        }
        chosen.push(((*base).clone(), pick));
    }

    let mut free = (1..=total).filter(|ordinal| !claimed.contains(ordinal));
    chosen
        .into_iter()
        .map(|(base, pick)| {
            let ordinal = pick.or_else(|| free.next()).unwrap_or(0);
            (base, ordinal)
        })
        .collect()
}

/// Renames and merges the category folders of `device` to match `scheme`.
///
/// Blacklisted folders are not numbered; they are renamed to their bare
/// base name when that name is free. Failures are logged and counted in
/// the report; the pass always runs to the end.
pub fn enforce_category_scheme_for_device(
    storage: &dyn Storage,
    device: &str,
    scheme: NamingScheme,
    blacklist: &Blacklist,
) -> EnforceReport {
    let candidates = category_candidates(storage, device, blacklist);
    let mut report = EnforceReport::default();

    let mut by_base: BTreeMap<String, Vec<&CategoryFolder>> = BTreeMap::new();
    for folder in candidates.iter().filter(|c| !c.blacklisted) {
        by_base
            .entry(strip_category_prefixes(&folder.name).to_string())
            .or_default()
            .push(folder);
    }
    let names: BTreeMap<String, Vec<String>> = by_base
        .iter()
        .map(|(base, folders)| (base.clone(), folders.iter().map(|f| f.name.clone()).collect()))
        .collect();
    let ordinals = assign_ordinals(&names, scheme.numbered);
    if scheme.numbered {
        report.unnumbered = ordinals
            .iter()
            .filter(|(_, ordinal)| *ordinal == 0)
            .map(|(base, _)| base.clone())
            .collect();
        if !report.unnumbered.is_empty() {
            tracing::warn!(
                device,
                count = report.unnumbered.len(),
                max = MAX_ORDINAL,
                "too many categories to number, extra ones left unnumbered"
            );
        }
    }

    for (base, ordinal) in &ordinals {
        let wanted = format_category_name_from_base(base, *ordinal, scheme);
        let mut by_root: BTreeMap<&str, Vec<&CategoryFolder>> = BTreeMap::new();
        for &folder in by_base.get(base).into_iter().flatten() {
            by_root.entry(folder.root_dir.as_str()).or_default().push(folder);
        }
        for (root_dir, mut variants) in by_root {
            variants.sort_by(|a, b| a.name.cmp(&b.name));
            enforce_root(storage, root_dir, &wanted, *ordinal, &variants, &mut report);
        }
    }

    report.ordinals = ordinals;

    for folder in candidates.iter().filter(|c| c.blacklisted) {
        normalize_blacklisted(storage, folder, &mut report);
    }

    tracing::info!(
        device,
        categories = report.ordinals.len(),
        renames = report.renames.len(),
        failures = report.failures,
        "category scheme enforced"
    );
    report
}

/// Makes one root hold exactly one folder named `wanted` for a base.
fn enforce_root(
    storage: &dyn Storage,
    root_dir: &str,
    wanted: &str,
    ordinal: u32,
    variants: &[&CategoryFolder],
    report: &mut EnforceReport,
) {
    let primary = variants
        .iter()
        .position(|v| v.name == wanted)
        .or_else(|| {
            (ordinal > 0)
                .then(|| variants.iter().position(|v| parse_ordinal(&v.name) == Some(ordinal)))
                .flatten()
        })
        .unwrap_or(0);
    let Some(primary_folder) = variants.get(primary) else {
        return;
    };
    let target = join(root_dir, wanted);

    if primary_folder.name != wanted {
        if storage.exists(&target) {
            tracing::warn!(from = %primary_folder.path(), to = %target, "rename target already exists");
            report.failures += 1;
            return;
        }
        match storage.rename(&primary_folder.path(), &target) {
            Ok(()) => {
                tracing::info!(from = %primary_folder.path(), to = %target, "category folder renamed");
                report.renames.push(FolderRename {
                    root_dir: root_dir.to_string(),
                    from: primary_folder.name.clone(),
                    to: wanted.to_string(),
                    merged: false,
                });
            }
            Err(e) => {
                tracing::warn!(from = %primary_folder.path(), to = %target, error = %e, "category rename failed");
                report.failures += 1;
                return;
            }
        }
    }

    for (i, variant) in variants.iter().enumerate() {
        if i == primary {
            continue;
        }
        let source = variant.path();
        if merge_dirs(storage, &source, &target).is_err() {
            report.failures += 1;
        }
        tracing::info!(from = %source, to = %target, "category folders merged");
        report.renames.push(FolderRename {
            root_dir: root_dir.to_string(),
            from: variant.name.clone(),
            to: wanted.to_string(),
            merged: true,
        });
    }
}

fn normalize_blacklisted(storage: &dyn Storage, folder: &CategoryFolder, report: &mut EnforceReport) {
    let base = strip_category_prefixes(&folder.name);
    if base == folder.name || base.is_empty() {
        return;
    }
    let target = join(&folder.root_dir, base);
    if storage.exists(&target) {
        tracing::debug!(from = %folder.path(), to = %target, "blacklisted folder left as is, name taken");
        return;
    }
    match storage.rename(&folder.path(), &target) {
        Ok(()) => {
            tracing::info!(from = %folder.path(), to = %target, "blacklisted folder normalized");
            report.normalized.push(FolderRename {
                root_dir: folder.root_dir.clone(),
                from: folder.name.clone(),
                to: base.to_string(),
                merged: false,
            });
        }
        Err(e) => {
            tracing::warn!(from = %folder.path(), error = %e, "blacklisted folder rename failed");
            report.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfe_storage::HostStorage;
    use kfe_storage::testing::{FaultyStorage, Op};
    use std::sync::Arc;

    const NUMBERED: NamingScheme = NamingScheme {
        prefix: false,
        numbered: true,
    };

    fn groups(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(base, names)| (base.to_string(), names.iter().map(|n| n.to_string()).collect()))
            .collect()
    }

    fn host(tmp: &tempfile::TempDir, dirs: &[&str]) -> Arc<HostStorage> {
        let s = Arc::new(HostStorage::new([("ms0:/", tmp.path())]));
        for dir in dirs {
            s.create_dir_all(dir).unwrap();
        }
        s
    }

    fn dir_names(s: &HostStorage, dir: &str) -> Vec<String> {
        let mut names: Vec<String> = s
            .read_dir(dir)
            .unwrap()
            .into_iter()
            .filter(|e| e.is_dir)
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn ordinals_keep_valid_and_fill_gaps() {
        let assigned = assign_ordinals(
            &groups(&[
                ("Action", &["03Action"]),
                ("Puzzle", &["Puzzle"]),
                ("RPG", &["01RPG", "05RPG"]),
            ]),
            true,
        );
        assert_eq!(
            assigned,
            vec![
                ("Action".to_string(), 3),
                ("Puzzle".to_string(), 2),
                ("RPG".to_string(), 1),
            ]
        );
    }

    #[test]
    fn duplicate_ordinals_go_to_first_alphabetical_base() {
        let assigned = assign_ordinals(
            &groups(&[("beta", &["01beta"]), ("Alpha", &["01Alpha"]), ("Gamma", &["07Gamma"])]),
            true,
        );
        assert_eq!(
            assigned,
            vec![
                ("Alpha".to_string(), 1),
                ("beta".to_string(), 2),
                ("Gamma".to_string(), 3),
            ]
        );
    }

    #[test]
    fn ordinals_are_zero_when_unnumbered() {
        let assigned = assign_ordinals(&groups(&[("RPG", &["01RPG"]), ("A", &["A"])]), false);
        assert_eq!(assigned, vec![("A".to_string(), 0), ("RPG".to_string(), 0)]);
    }

    #[test]
    fn ordinals_form_a_permutation() {
        let names = [
            ("a", &["09a", "02a"][..]),
            ("b", &["02b"][..]),
            ("c", &["c"][..]),
            ("d", &["01d", "CAT_01d"][..]),
            ("e", &["99e"][..]),
        ];
        let assigned = assign_ordinals(&groups(&names), true);
        let mut ordinals: Vec<u32> = assigned.iter().map(|(_, o)| *o).collect();
        ordinals.sort();
        assert_eq!(ordinals, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn numbering_stops_at_two_digits() {
        let bases: Vec<String> = (0..101).map(|i| format!("cat{i:03}")).collect();
        let mut names: Vec<(&str, &[&str])> = bases.iter().map(|b| (b.as_str(), &[][..])).collect();
        names.push(("aaa", &["42aaa"][..]));
        let assigned = assign_ordinals(&groups(&names), true);

        assert_eq!(assigned.len(), 102);
        assert_eq!(assigned[0], ("aaa".to_string(), 42));
        let mut numbered: Vec<u32> = assigned.iter().map(|(_, o)| *o).filter(|o| *o > 0).collect();
        numbered.sort();
        assert_eq!(numbered, (1..=MAX_ORDINAL).collect::<Vec<_>>());
        let unnumbered: Vec<&str> = assigned.iter().filter(|(_, o)| *o == 0).map(|(b, _)| b.as_str()).collect();
        assert_eq!(unnumbered, ["cat098", "cat099", "cat100"]);
    }

    #[test]
    fn categories_past_99_are_reported_unnumbered() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs: Vec<String> = (0..100).map(|i| format!("ms0:/ISO/c{i:03}")).collect();
        let s = host(&tmp, &dirs.iter().map(String::as_str).collect::<Vec<_>>());

        let report = enforce_category_scheme_for_device(s.as_ref(), "ms0:/", NUMBERED, &Blacklist::default());

        assert!(report.is_clean());
        assert_eq!(report.unnumbered, ["c099"]);
        assert!(s.is_dir("ms0:/ISO/01c000"));
        assert!(s.is_dir("ms0:/ISO/99c098"));
        assert!(s.is_dir("ms0:/ISO/c099"));
    }

    #[test]
    fn collision_merges_into_lowest_valid_ordinal() {
        let tmp = tempfile::tempdir().unwrap();
        let s = host(&tmp, &["ms0:/ISO/01RPG", "ms0:/ISO/05RPG", "ms0:/ISO/Action", "ms0:/ISO/Puzzle"]);
        s.write_file("ms0:/ISO/01RPG/a.iso", b"keep").unwrap();
        s.write_file("ms0:/ISO/05RPG/a.iso", b"drop").unwrap();
        s.write_file("ms0:/ISO/05RPG/b.iso", b"moved").unwrap();

        let report = enforce_category_scheme_for_device(s.as_ref(), "ms0:/", NUMBERED, &Blacklist::default());

        assert!(report.is_clean());
        assert_eq!(dir_names(&s, "ms0:/ISO"), ["01RPG", "02Action", "03Puzzle"]);
        assert_eq!(s.read_file("ms0:/ISO/01RPG/a.iso").unwrap(), b"keep");
        assert_eq!(s.read_file("ms0:/ISO/01RPG/b.iso").unwrap(), b"moved");
        assert!(report.renames.iter().any(|r| r.from == "05RPG" && r.to == "01RPG" && r.merged));
    }

    #[test]
    fn base_spanning_roots_gets_one_ordinal() {
        let tmp = tempfile::tempdir().unwrap();
        let s = host(&tmp, &["ms0:/ISO/RPG", "ms0:/PSP/GAME/CAT_RPG/App", "ms0:/PSP/GAME/Zeta"]);
        s.write_file("ms0:/PSP/GAME/CAT_RPG/App/EBOOT.PBP", b"").unwrap();
        let scheme = NamingScheme {
            prefix: true,
            numbered: true,
        };

        let report = enforce_category_scheme_for_device(s.as_ref(), "ms0:/", scheme, &Blacklist::default());

        assert_eq!(report.ordinals, vec![("RPG".to_string(), 1), ("Zeta".to_string(), 2)]);
        assert_eq!(dir_names(&s, "ms0:/ISO"), ["01CAT_RPG"]);
        assert_eq!(dir_names(&s, "ms0:/PSP/GAME"), ["01CAT_RPG", "02CAT_Zeta"]);
        assert!(s.exists("ms0:/PSP/GAME/01CAT_RPG/App/EBOOT.PBP"));
        assert_eq!(
            report.category_renames(),
            vec![
                ("RPG".to_string(), "01CAT_RPG".to_string()),
                ("CAT_RPG".to_string(), "01CAT_RPG".to_string()),
                ("Zeta".to_string(), "02CAT_Zeta".to_string()),
            ]
        );
    }

    #[test]
    fn turning_everything_off_strips_names() {
        let tmp = tempfile::tempdir().unwrap();
        let s = host(&tmp, &["ms0:/ISO/01CAT_RPG", "ms0:/ISO/CAT_02Action"]);
        let report =
            enforce_category_scheme_for_device(s.as_ref(), "ms0:/", NamingScheme::default(), &Blacklist::default());
        assert!(report.is_clean());
        assert_eq!(dir_names(&s, "ms0:/ISO"), ["Action", "RPG"]);
    }

    #[test]
    fn app_folders_and_video_are_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let s = host(&tmp, &["ms0:/PSP/GAME/MyApp", "ms0:/ISO/VIDEO"]);
        s.write_file("ms0:/PSP/GAME/MyApp/EBOOT.PBP", b"").unwrap();
        let report = enforce_category_scheme_for_device(s.as_ref(), "ms0:/", NUMBERED, &Blacklist::default());
        assert!(!report.changed());
        assert!(s.is_dir("ms0:/PSP/GAME/MyApp"));
        assert!(s.is_dir("ms0:/ISO/VIDEO"));
    }

    #[test]
    fn blacklisted_folders_are_normalized_not_numbered() {
        let tmp = tempfile::tempdir().unwrap();
        let s = host(&tmp, &["ms0:/ISO/01CAT_Foo_test", "ms0:/ISO/RPG"]);
        let report = enforce_category_scheme_for_device(s.as_ref(), "ms0:/", NUMBERED, &Blacklist::new(["_test"]));
        assert_eq!(report.ordinals, vec![("RPG".to_string(), 1)]);
        assert_eq!(dir_names(&s, "ms0:/ISO"), ["01RPG", "Foo_test"]);
        assert_eq!(report.normalized.len(), 1);
        assert!(report.category_renames().iter().all(|(from, _)| from != "01CAT_Foo_test"));
    }

    #[test]
    fn rename_failure_is_counted() {
        let tmp = tempfile::tempdir().unwrap();
        let faulty = FaultyStorage::new(host(&tmp, &["ms0:/ISO/RPG", "ms0:/ISO/Action"]));
        faulty.fail(Op::Rename, "ms0:/ISO/RPG");
        let report = enforce_category_scheme_for_device(&faulty, "ms0:/", NUMBERED, &Blacklist::default());
        assert_eq!(report.failures, 1);
        assert!(faulty.is_dir("ms0:/ISO/01Action"));
        assert!(faulty.is_dir("ms0:/ISO/RPG"));
    }
}
