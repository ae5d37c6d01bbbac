use std::path::PathBuf;

/// Events emitted while an image is pulled.
///
/// Rendering is the caller's concern; the client only reports what
/// happened. Blob events are keyed by digest since layer downloads may
/// interleave.
#[derive(Debug, Clone)]
pub enum PullEvent {
    /// The concrete manifest was fetched and decoded.
    ManifestResolved { reference: String, layers: usize },

    /// A blob download is starting; `total` is the descriptor's size.
    BlobStarted { digest: String, total: u64 },

    /// Bytes written so far for a blob, absolute.
    BlobProgress { digest: String, transferred: u64 },

    /// A blob was fully written to disk.
    BlobFinished { digest: String },

    /// Config and all layers are on disk.
    Complete { config_path: PathBuf },
}

/// Callback invoked for every [`PullEvent`].
pub type ProgressFn = Box<dyn Fn(PullEvent) + Send + Sync>;
