use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    time::Duration,
};

use crate::{
    error::{DeckError, DeckResult},
    model::ChartElement,
};

pub mod decode;

/// Capability for fetching an external bitmap resource by opaque reference.
///
/// Returns the resource's *encoded* bytes (PNG, JPEG, ...); decoding happens
/// in the compositor via [`decode::decode_image`]. A per-resource failure is
/// an error result, never a panic.
pub trait ResourceLoader {
    fn load_image(&self, reference: &str) -> DeckResult<Vec<u8>>;
}

/// Delegated sub-renderer that turns a chart specification into encoded
/// image bytes at the requested pixel size.
pub trait ChartRasterizer {
    fn rasterize(&self, chart: &ChartElement, width: u32, height: u32) -> DeckResult<Vec<u8>>;
}

/// Loader for `data:image/...;base64,` references, the form the host editor
/// stores pasted and converted images in.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataUrlLoader;

impl ResourceLoader for DataUrlLoader {
    fn load_image(&self, reference: &str) -> DeckResult<Vec<u8>> {
        let rest = reference
            .strip_prefix("data:")
            .ok_or_else(|| DeckError::resource("reference is not a data URL"))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| DeckError::resource("data URL has no payload"))?;
        if !meta.ends_with(";base64") {
            return Err(DeckError::resource("data URL is not base64-encoded"));
        }
        decode_base64(payload)
    }
}

/// Loader resolving store-relative paths beneath a fixed root directory.
#[derive(Clone, Debug)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceLoader for FsLoader {
    fn load_image(&self, reference: &str) -> DeckResult<Vec<u8>> {
        let norm = normalize_rel_path(reference)?;
        let p = self.root.join(Path::new(&norm));
        std::fs::read(&p)
            .map_err(|e| DeckError::resource(format!("failed to read '{}': {e}", p.display())))
    }
}

/// Normalize and validate store-relative resource paths.
///
/// The normalized result uses `/` separators, removes `.` segments, and
/// rejects absolute paths or parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> DeckResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(DeckError::validation("resource paths must be relative"));
    }
    if s.is_empty() {
        return Err(DeckError::validation("resource path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(DeckError::validation(
                "resource paths must not contain '..'",
            ));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(DeckError::validation(
            "resource path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}

/// Wraps a loader with a per-resource wall-clock deadline so one hung fetch
/// cannot stall the rest of a render. The inner load runs on a worker thread;
/// deadline expiry is reported as an ordinary resource failure.
pub struct DeadlineLoader {
    inner: Arc<dyn ResourceLoader + Send + Sync>,
    timeout: Duration,
}

impl DeadlineLoader {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(inner: Arc<dyn ResourceLoader + Send + Sync>) -> Self {
        Self::with_timeout(inner, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(inner: Arc<dyn ResourceLoader + Send + Sync>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl ResourceLoader for DeadlineLoader {
    fn load_image(&self, reference: &str) -> DeckResult<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let reference = reference.to_string();
        std::thread::spawn(move || {
            // Receiver may be gone if the deadline already expired.
            let _ = tx.send(inner.load_image(&reference));
        });
        match rx.recv_timeout(self.timeout) {
            Ok(res) => res,
            Err(_) => Err(DeckError::resource(format!(
                "resource load exceeded deadline of {:?}",
                self.timeout
            ))),
        }
    }
}

fn decode_base64(payload: &str) -> DeckResult<Vec<u8>> {
    use base64::Engine as _;

    // Data URL payloads are a single token; any embedded whitespace came
    // from document reformatting and is not significant.
    let compact: String = payload.split_ascii_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| DeckError::resource(format!("invalid base64 payload: {e}")))
}
