//! Where offloaded screenshots live.
//!
//! The offload stage writes decoded payloads through a [`PayloadStore`] and
//! the vision tool reads them back. [`PayloadSlot`] is the default: one file
//! in the workspace, overwritten by every capture. [`KeyedPayloadStore`]
//! keeps every capture under its own id for runs where captures must not
//! clobber each other.
//!
//! Writes go to a temp file next to the target and are renamed into place,
//! so a reader sees either the previous capture or the new one, never a
//! partial file.

use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// File name of the single-slot store inside a workspace.
pub const DEFAULT_SLOT_FILE: &str = "current_screenshot.png";

/// Errors from decoding or persisting a captured payload.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write capture to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read capture from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Storage for captured payloads.
pub trait PayloadStore: Send + Sync {
    /// Persist `bytes` as the newest capture and return where it was written.
    fn store(&self, bytes: &[u8]) -> Result<PathBuf, CaptureError>;

    /// Bytes of the newest capture, or `None` if nothing has been stored.
    fn latest(&self) -> Result<Option<Vec<u8>>, CaptureError>;
}

/// Decode a classified payload fragment into raw bytes.
///
/// A data-URI header (`data:image/png;base64,`) is dropped by splitting on the
/// first comma; whitespace (line-wrapped base64) is ignored.
pub fn decode_payload(fragment: &str) -> Result<Vec<u8>, CaptureError> {
    let encoded = fragment
        .split_once(',')
        .map_or(fragment, |(_, data)| data);
    let cleaned: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(cleaned)?)
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
    let write_err = |source| CaptureError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, bytes).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CaptureError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CaptureError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── PayloadSlot ────────────────────────────────────────────────────

/// A single, overwritten capture file.
#[derive(Debug, Clone)]
pub struct PayloadSlot {
    path: PathBuf,
}

impl PayloadSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The slot at `<workspace>/current_screenshot.png`.
    pub fn in_workspace(workspace: impl AsRef<Path>) -> Self {
        Self::new(workspace.as_ref().join(DEFAULT_SLOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PayloadStore for PayloadSlot {
    fn store(&self, bytes: &[u8]) -> Result<PathBuf, CaptureError> {
        write_atomic(&self.path, bytes)?;
        debug!("Stored {} bytes in {}", bytes.len(), self.path.display());
        Ok(self.path.clone())
    }

    fn latest(&self) -> Result<Option<Vec<u8>>, CaptureError> {
        read_optional(&self.path)
    }
}

// ── KeyedPayloadStore ──────────────────────────────────────────────

/// One file per capture under a directory, with the newest tracked.
///
/// Capture ids are sequential (`capture-0001`, `capture-0002`, ...) within
/// the lifetime of the store. Safe to share between concurrently running
/// tools: `latest` only ever moves to a higher id, so a slow write never
/// replaces a newer capture that finished first.
#[derive(Debug)]
pub struct KeyedPayloadStore {
    dir: PathBuf,
    next_id: AtomicU64,
    /// Highest finished capture id and its path.
    latest: Mutex<Option<(u64, PathBuf)>>,
}

impl KeyedPayloadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_id: AtomicU64::new(1),
            latest: Mutex::new(None),
        }
    }

    /// Path of the capture with the given id.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    /// Bytes of a specific capture.
    pub fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CaptureError> {
        read_optional(&self.path_for(id))
    }
}

impl PayloadStore for KeyedPayloadStore {
    fn store(&self, bytes: &[u8]) -> Result<PathBuf, CaptureError> {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("capture-{seq:04}");
        let path = self.path_for(&id);
        write_atomic(&path, bytes)?;
        debug!("Stored {} bytes as {id}", bytes.len());

        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        if latest.as_ref().is_none_or(|(current, _)| seq > *current) {
            *latest = Some((seq, path.clone()));
        }
        Ok(path)
    }

    fn latest(&self) -> Result<Option<Vec<u8>>, CaptureError> {
        let path = self
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(_, path)| path.clone());
        match path {
            Some(p) => read_optional(&p),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_data_uri_header() {
        let bytes = decode_payload("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn decode_accepts_bare_and_wrapped_base64() {
        assert_eq!(decode_payload("aGVs\nbG8=").unwrap(), b"hello");
        assert_eq!(decode_payload("aGVsbG8=\r\n").unwrap(), b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_payload("data:image/png;base64,!!!not base64!!!").unwrap_err();
        assert!(matches!(err, CaptureError::Decode(_)));
    }

    #[test]
    fn slot_is_empty_until_first_store() {
        let dir = tempfile::tempdir().unwrap();
        let slot = PayloadSlot::in_workspace(dir.path());
        assert!(slot.latest().unwrap().is_none());
    }

    #[test]
    fn slot_overwrites_previous_capture() {
        let dir = tempfile::tempdir().unwrap();
        let slot = PayloadSlot::in_workspace(dir.path().join("nested"));

        let first = slot.store(b"first").unwrap();
        let second = slot.store(b"second").unwrap();

        assert_eq!(first, second);
        assert_eq!(first, dir.path().join("nested").join(DEFAULT_SLOT_FILE));
        assert_eq!(slot.latest().unwrap().unwrap(), b"second");
        // No temp file left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn keyed_store_keeps_every_capture() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedPayloadStore::new(dir.path());
        assert!(store.latest().unwrap().is_none());

        let a = store.store(b"one").unwrap();
        let b = store.store(b"two").unwrap();

        assert_ne!(a, b);
        assert_eq!(store.latest().unwrap().unwrap(), b"two");
        assert_eq!(store.get("capture-0001").unwrap().unwrap(), b"one");
        assert!(store.get("capture-9999").unwrap().is_none());
    }

    #[test]
    fn keyed_store_latest_is_highest_id_under_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyedPayloadStore::new(dir.path());

        std::thread::scope(|scope| {
            for thread in 0..8u8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..50usize {
                        // Mix slow and fast writes so they finish out of order.
                        let len = if i % 2 == 0 { 200_000 } else { 10 };
                        store.store(&vec![thread; len]).unwrap();
                    }
                });
            }
        });

        let newest = store.get("capture-0400").unwrap().unwrap();
        assert_eq!(store.latest().unwrap().unwrap(), newest);
        assert!(store.get("capture-0401").unwrap().is_none());
    }
}
