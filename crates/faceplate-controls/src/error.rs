use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pipeline stages, as reported by cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Components,
    Bands,
    Blobs,
    Circles,
    Promote,
    PostFilter,
    Suppress,
    Columns,
    Labels,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Preprocess => "preprocess",
            Stage::Components => "components",
            Stage::Bands => "bands",
            Stage::Blobs => "blobs",
            Stage::Circles => "circles",
            Stage::Promote => "promote",
            Stage::PostFilter => "post-filter",
            Stage::Suppress => "suppress",
            Stage::Columns => "columns",
            Stage::Labels => "labels",
        };
        f.write_str(name)
    }
}

/// Errors returned by a cancellable detection run.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("detection cancelled before stage {stage}")]
    Cancelled { stage: Stage },
}

/// Cooperative cancellation flag shared between a caller and a running
/// detection.
///
/// Clones share the same flag. The pipeline polls it between stages and
/// between bands of the circle search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the flag is set.
    pub fn check(&self, stage: Stage) -> Result<(), DetectError> {
        if self.is_cancelled() {
            Err(DetectError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}
