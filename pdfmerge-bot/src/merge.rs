//! Merge execution and artifact lifecycle.
//!
//! A merge attempt materializes every input in a per-job scratch directory,
//! concatenates them in arrival order into a collision-free output path, and
//! removes every artifact it created once the output has been delivered (or
//! immediately, on any failure).

use crate::session::AttachmentRef;
use crate::traits::{ChatTransport, TransportError};
use pdfmerge_common::config::MergeConfig;
use pdfmerge_common::logging::generate_span_id;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Upper bound on numeric-suffix attempts when picking an output name.
/// Keeps a read-only or full filesystem from turning into an infinite loop.
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// Merge failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no documents to merge")]
    NoInput,

    #[error("total declared size {total_bytes} exceeds the {limit_bytes} byte limit")]
    TotalSizeExceeded { total_bytes: u64, limit_bytes: u64 },

    #[error("failed to fetch document {file_id}: {source}")]
    Fetch {
        file_id: String,
        #[source]
        source: TransportError,
    },

    #[error("merge I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Merge Primitive
// ============================================================================

/// Ordered concatenation of input artifacts into one output artifact.
///
/// `append` registers inputs in merge order; `write` streams them into the
/// output path in that order.
pub struct StreamMerger {
    parts: Vec<PathBuf>,
}

impl StreamMerger {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Register the next input artifact. Order of calls is output order.
    pub fn append(&mut self, path: &Path) {
        self.parts.push(path.to_path_buf());
    }

    /// Stream every appended artifact into `output`, in append order.
    pub async fn write(&self, output: &Path) -> std::io::Result<()> {
        let mut out = tokio::fs::File::create(output).await?;
        for part in &self.parts {
            let mut input = tokio::fs::File::open(part).await?;
            tokio::io::copy(&mut input, &mut out).await?;
        }
        out.flush().await?;
        Ok(())
    }
}

impl Default for StreamMerger {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Merge Job
// ============================================================================

/// Tracks every artifact created during one merge attempt.
///
/// Nothing in `created` may outlive the job: the executor discards it on any
/// failure, and [`MergedArtifact::cleanup`] discards it after delivery.
#[derive(Debug)]
struct MergeJob {
    dir: PathBuf,
    created: Vec<PathBuf>,
}

impl MergeJob {
    async fn create(work_dir: &Path) -> std::io::Result<Self> {
        let dir = work_dir.join(format!("job-{}", generate_span_id()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            created: Vec::new(),
        })
    }

    /// Remove every created artifact and the scratch directory.
    ///
    /// Removal failures are logged and swallowed; they cannot affect the
    /// correctness of an already-determined merge outcome.
    async fn discard(self) {
        for path in &self.created {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove merge artifact"
                    );
                }
            }
        }
        if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Failed to remove merge scratch directory"
                );
            }
        }
    }
}

/// A finished merge: the output artifact plus everything to remove after
/// delivery.
#[derive(Debug)]
pub struct MergedArtifact {
    output_path: PathBuf,
    merged_count: usize,
    job: MergeJob,
}

impl MergedArtifact {
    /// Location of the merged output.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Number of documents merged.
    pub fn merged_count(&self) -> usize {
        self.merged_count
    }

    /// Remove the per-input artifacts and the output artifact.
    ///
    /// Call only after the output has been delivered (or delivery abandoned).
    pub async fn cleanup(self) {
        self.job.discard().await;
    }
}

// ============================================================================
// Output naming
// ============================================================================

/// Pick an output path that does not collide with any file on disk.
///
/// Starts from the canonical name and appends `_1`, `_2`, ... before the
/// extension until a free name is found, up to [`MAX_SUFFIX_ATTEMPTS`].
pub async fn unique_output_path(dir: &Path, canonical_name: &str) -> std::io::Result<PathBuf> {
    let candidate = dir.join(canonical_name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let (stem, extension) = match canonical_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (canonical_name, String::new()),
    };

    for suffix in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = dir.join(format!("{stem}_{suffix}{extension}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free output name for {canonical_name} after {MAX_SUFFIX_ATTEMPTS} attempts"),
    ))
}

// ============================================================================
// Merge Executor
// ============================================================================

/// Fetches the accepted documents and merges them into one output artifact.
pub struct MergeExecutor {
    transport: Arc<dyn ChatTransport>,
    config: MergeConfig,
}

impl MergeExecutor {
    pub fn new(transport: Arc<dyn ChatTransport>, config: MergeConfig) -> Self {
        Self { transport, config }
    }

    /// Execute a merge over the drained session sequence.
    ///
    /// Both guards run before any network or file I/O, so a rejected merge
    /// touches neither the transport nor the disk. On failure every artifact
    /// created so far has been removed by the time this returns.
    pub async fn execute(&self, refs: &[AttachmentRef]) -> Result<MergedArtifact, MergeError> {
        if refs.is_empty() {
            return Err(MergeError::NoInput);
        }

        let total_bytes: u64 = refs.iter().map(|r| r.size_bytes).sum();
        if total_bytes > self.config.max_total_size_bytes {
            return Err(MergeError::TotalSizeExceeded {
                total_bytes,
                limit_bytes: self.config.max_total_size_bytes,
            });
        }

        let mut job = MergeJob::create(&self.config.work_dir).await?;

        match self.run(refs, &mut job).await {
            Ok(output_path) => {
                tracing::info!(
                    output = %output_path.display(),
                    merged_count = refs.len(),
                    "Merge completed"
                );
                Ok(MergedArtifact {
                    output_path,
                    merged_count: refs.len(),
                    job,
                })
            }
            Err(e) => {
                job.discard().await;
                Err(e)
            }
        }
    }

    async fn run(&self, refs: &[AttachmentRef], job: &mut MergeJob) -> Result<PathBuf, MergeError> {
        let mut merger = StreamMerger::new();

        // Arrival order is the final document order.
        for (index, attachment) in refs.iter().enumerate() {
            let bytes = self
                .transport
                .download_document(&attachment.file_id)
                .await
                .map_err(|source| MergeError::Fetch {
                    file_id: attachment.file_id.clone(),
                    source,
                })?;

            let path = job.dir.join(format!("input_{index}.pdf"));
            tokio::fs::write(&path, &bytes).await?;
            job.created.push(path.clone());
            merger.append(&path);
        }

        let output_path = unique_output_path(&self.config.work_dir, &self.config.output_name).await?;
        job.created.push(output_path.clone());
        merger.write(&output_path).await?;

        Ok(output_path)
    }
}

// ============================================================================
// Tests
// ============================================================================
