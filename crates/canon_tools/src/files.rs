#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const INTRINSIC_PREFIX: &str = "intrinsic_calibration";
pub const PARAMS_PREFIX: &str = "method_params";
pub const SECONDARY_DIR: &str = "secondary";

/// The two primary configuration files a deployment carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub intrinsic: PathBuf,
    pub params: PathBuf,
}

fn matches_prefix(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix) && name.ends_with(".json")
}

fn json_entries(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), String> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let entries =
        fs::read_dir(dir).map_err(|e| format!("cannot read config dir {}: {e}", dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            files.push(path);
        }
    }
    Ok((files, dirs))
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Enforces the deployment file discipline: exactly one primary intrinsic
/// file and one primary method-parameters file at the top level of the
/// config directory. Duplicates may exist only under `secondary/`.
pub fn enforce_file_discipline(config_dir: &Path) -> Result<ConfigPaths, String> {
    let (files, dirs) = json_entries(config_dir)?;

    let mut intrinsic: Vec<PathBuf> = Vec::new();
    let mut params: Vec<PathBuf> = Vec::new();
    for path in files {
        let name = file_name(&path);
        if matches_prefix(name, INTRINSIC_PREFIX) {
            intrinsic.push(path);
        } else if matches_prefix(name, PARAMS_PREFIX) {
            params.push(path);
        }
    }

    for dir in dirs {
        if file_name(&dir) == SECONDARY_DIR {
            continue;
        }
        let (nested, _) = json_entries(&dir)?;
        for path in nested {
            let name = file_name(&path);
            if matches_prefix(name, INTRINSIC_PREFIX) || matches_prefix(name, PARAMS_PREFIX) {
                return Err(format!(
                    "calibration config {} found outside the primary dir and {SECONDARY_DIR}/",
                    path.display()
                ));
            }
        }
    }

    match (intrinsic.len(), params.len()) {
        (1, 1) => Ok(ConfigPaths {
            intrinsic: intrinsic.remove(0),
            params: params.remove(0),
        }),
        (i, p) => Err(format!(
            "expected exactly one primary {INTRINSIC_PREFIX}*.json and one {PARAMS_PREFIX}*.json, \
             found {i} and {p}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"{}").unwrap();
    }

    #[test]
    fn at_files_01_single_primaries_pass() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "intrinsic_calibration_v3.json");
        write(dir.path(), "method_params_v3.json");
        let paths = enforce_file_discipline(dir.path()).unwrap();
        assert!(paths.intrinsic.ends_with("intrinsic_calibration_v3.json"));
        assert!(paths.params.ends_with("method_params_v3.json"));
    }

    #[test]
    fn at_files_02_duplicate_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "intrinsic_calibration_v3.json");
        write(dir.path(), "intrinsic_calibration_v4.json");
        write(dir.path(), "method_params_v3.json");
        assert!(enforce_file_discipline(dir.path()).is_err());
    }

    #[test]
    fn at_files_03_secondary_copies_are_permitted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "intrinsic_calibration_v3.json");
        write(dir.path(), "method_params_v3.json");
        let secondary = dir.path().join(SECONDARY_DIR);
        fs::create_dir(&secondary).unwrap();
        write(&secondary, "intrinsic_calibration_v2.json");
        write(&secondary, "method_params_v2.json");
        assert!(enforce_file_discipline(dir.path()).is_ok());
    }

    #[test]
    fn at_files_04_copies_outside_secondary_fail() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "intrinsic_calibration_v3.json");
        write(dir.path(), "method_params_v3.json");
        let stash = dir.path().join("backup");
        fs::create_dir(&stash).unwrap();
        write(&stash, "intrinsic_calibration_v2.json");
        assert!(enforce_file_discipline(dir.path()).is_err());
    }

    #[test]
    fn at_files_05_missing_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "method_params_v3.json");
        assert!(enforce_file_discipline(dir.path()).is_err());
    }
}
