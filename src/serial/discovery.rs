/// Enumeration of serial devices bound to a USB driver
use log::{debug, info};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::models::SensorKind;

/// Find the devices that use the same driver as the given sensor's USB bridge
///
/// # Returns
/// Sorted device names (e.g. `ttyUSB0`), empty when nothing is attached
pub fn find_sensor_devices(kind: SensorKind) -> Vec<String> {
    find_devices(Path::new(kind.driver_root()), kind.device_pattern(), kind)
}

/// Match `pattern` under `root` and return the sorted set of basenames
///
/// `pattern` is a `/` separated glob where each segment may use `*` and `?`.
/// Identical filesystem state always yields identical ordering, so picking
/// the first entry is reproducible.
///
/// # Arguments
/// * `root` - Driver directory to search
/// * `pattern` - Glob relative to `root`
/// * `kind` - Sensor the devices are for, used for logging
pub fn find_devices(root: &Path, pattern: &str, kind: SensorKind) -> Vec<String> {
    let paths = glob_paths(root, pattern);

    if !paths.is_empty() {
        info!("Found {} devices at paths:", kind);
        for path in &paths {
            info!("\t{}", path.display());
        }
    }

    paths
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Pick the device to bind: an explicit override wins, then the first found
pub fn select_device(device_override: Option<&str>, discovered: &[String]) -> Option<String> {
    match device_override {
        Some(device) => Some(device.to_string()),
        None => {
            let device = discovered.first()?;
            info!("Defaulting to first device: {}", device);
            Some(device.clone())
        }
    }
}

fn glob_paths(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let mut current = vec![root.to_path_buf()];

    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for dir in &current {
            if !has_wildcard(segment) {
                let candidate = dir.join(segment);
                if candidate.exists() {
                    next.push(candidate);
                }
                continue;
            }

            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                // Hidden entries are only matched by an explicit leading dot
                if name.starts_with('.') && !segment.starts_with('.') {
                    continue;
                }
                if wildcard_match(segment, &name) {
                    next.push(entry.path());
                }
            }
        }
        current = next;
    }

    current.sort();
    current
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

/// Shell-style match supporting `*` (any run) and `?` (one character)
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
