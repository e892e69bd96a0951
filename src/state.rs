use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Last known open ports per host, as stored in the state file.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct PersistedState {
    pub hosts: BTreeMap<String, Vec<u16>>,
}

impl PersistedState {
    /// Open ports recorded for `host`; an unknown host has none.
    pub fn open_ports(&self, host: &str) -> &[u16] {
        self.hosts.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_open_ports(&mut self, host: &str, mut ports: Vec<u16>) {
        ports.sort_unstable();
        ports.dedup();
        self.hosts.insert(host.to_string(), ports);
    }

    fn normalize(mut self) -> Self {
        for ports in self.hosts.values_mut() {
            ports.sort_unstable();
            ports.dedup();
        }
        self
    }
}

/// Load the state file. A missing, unreadable or corrupt file yields an empty state.
pub fn load_state(path: impl AsRef<Path>) -> PersistedState {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("no state file at {}, starting fresh", path.display());
            return PersistedState::default();
        }
        Err(e) => {
            warn!("failed to read state file {}: {e}", path.display());
            return PersistedState::default();
        }
    };
    match serde_json::from_str::<PersistedState>(&content) {
        Ok(state) => state.normalize(),
        Err(e) => {
            warn!("ignoring corrupt state file {}: {e}", path.display());
            PersistedState::default()
        }
    }
}

/// Write the state as pretty JSON to a temporary sibling file, sync it, then
/// rename it over `path`. The previous file stays intact until the rename.
pub fn save_state(path: impl AsRef<Path>, state: &PersistedState) -> Result<()> {
    let path = path.as_ref();
    let tmp = tmp_path(path);

    let f = File::create(&tmp)
        .with_context(|| format!("failed to create temp state file: {}", tmp.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, state).context("failed to serialize state")?;
    w.write_all(b"\n")?;
    let f = w
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("failed to flush temp state file: {}", tmp.display()))?;
    f.sync_all()
        .with_context(|| format!("failed to sync temp state file: {}", tmp.display()))?;
    drop(f);

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to replace state file {} with {}",
            path.display(),
            tmp.display()
        )
    })?;

    // the rename itself is only durable once the directory entry is on disk
    if let Err(e) = sync_parent_dir(path) {
        warn!(
            "state file {} replaced but its directory was not synced: {e}",
            path.display()
        );
    }
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// `<path>.tmp`, next to the target so the rename stays on one filesystem.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
