#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn fixture_path(file: &str) -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("idyll-markup")
        .join("tests")
        .join("fixtures")
        .join(file)
}

/// Write `contents` to a fresh file in the temp dir and return its path.
pub fn temp_file(tag: &str, contents: &str) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("idyll_{tag}_{pid}_{nanos}.xml"));
    fs::write(&path, contents).unwrap();
    path
}
