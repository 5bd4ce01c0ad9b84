//! Attachment acceptance decisions.

use crate::message::DocumentInfo;
use crate::session::{SessionSnapshot, SessionState};
use pdfmerge_common::config::MergeConfig;

/// Why an attachment was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No collection in progress; the caller surfaces "invalid command"
    NotCollecting,
    /// Declared size exceeds the per-file limit
    FileTooLarge,
    /// The session already holds the maximum number of files
    LimitReached,
}

/// Outcome of evaluating a candidate attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Record the attachment and emit progress feedback
    Accept,
    /// Not an accepted document type; say nothing
    Ignore,
    /// Refuse with a reason the caller turns into a reply
    Reject(RejectReason),
}

/// Decides whether an incoming attachment is acceptable.
///
/// Pure function of the session snapshot and the candidate; all limits come
/// from configuration.
pub struct AttachmentValidator {
    limits: MergeConfig,
}

impl AttachmentValidator {
    pub fn new(limits: MergeConfig) -> Self {
        Self { limits }
    }

    /// Evaluate a candidate against the current session snapshot.
    ///
    /// Checks run in a fixed order: session state, document type, per-file
    /// size, then file count.
    pub fn evaluate(&self, snapshot: &SessionSnapshot, candidate: &DocumentInfo) -> Verdict {
        if snapshot.state != SessionState::Collecting {
            return Verdict::Reject(RejectReason::NotCollecting);
        }

        if !candidate.is_pdf() {
            return Verdict::Ignore;
        }

        if candidate.size_bytes > self.limits.max_file_size_bytes {
            return Verdict::Reject(RejectReason::FileTooLarge);
        }

        if snapshot.count >= self.limits.max_files {
            return Verdict::Reject(RejectReason::LimitReached);
        }

        Verdict::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PDF_MIME_TYPE;

    fn validator() -> AttachmentValidator {
        AttachmentValidator::new(MergeConfig::default())
    }

    fn collecting(count: usize) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState::Collecting,
            count,
            cumulative_bytes: 0,
        }
    }

    fn pdf(size_bytes: u64) -> DocumentInfo {
        DocumentInfo {
            file_id: "f".into(),
            mime_type: Some(PDF_MIME_TYPE.into()),
            size_bytes,
            file_name: None,
        }
    }

    #[test]
    fn test_rejects_when_not_collecting() {
        let snapshot = SessionSnapshot {
            state: SessionState::Idle,
            count: 0,
            cumulative_bytes: 0,
        };
        assert_eq!(
            validator().evaluate(&snapshot, &pdf(1024)),
            Verdict::Reject(RejectReason::NotCollecting)
        );
    }

    #[test]
    fn test_state_check_precedes_type_check() {
        // A non-PDF outside a session is an invalid command, not a silent drop
        let snapshot = SessionSnapshot {
            state: SessionState::Idle,
            count: 0,
            cumulative_bytes: 0,
        };
        let doc = DocumentInfo {
            mime_type: Some("image/png".into()),
            ..pdf(1024)
        };
        assert_eq!(
            validator().evaluate(&snapshot, &doc),
            Verdict::Reject(RejectReason::NotCollecting)
        );
    }

    #[test]
    fn test_ignores_non_pdf_while_collecting() {
        let doc = DocumentInfo {
            mime_type: Some("text/plain".into()),
            ..pdf(1024)
        };
        assert_eq!(validator().evaluate(&collecting(0), &doc), Verdict::Ignore);

        let doc = DocumentInfo {
            mime_type: None,
            ..pdf(1024)
        };
        assert_eq!(validator().evaluate(&collecting(0), &doc), Verdict::Ignore);
    }

    #[test]
    fn test_rejects_oversize_file() {
        let six_mib = 6 * 1024 * 1024;
        assert_eq!(
            validator().evaluate(&collecting(0), &pdf(six_mib)),
            Verdict::Reject(RejectReason::FileTooLarge)
        );
    }

    #[test]
    fn test_accepts_at_size_boundary() {
        let five_mib = 5 * 1024 * 1024;
        assert_eq!(
            validator().evaluate(&collecting(0), &pdf(five_mib)),
            Verdict::Accept
        );
    }

    #[test]
    fn test_rejects_when_limit_reached() {
        assert_eq!(
            validator().evaluate(&collecting(5), &pdf(1024)),
            Verdict::Reject(RejectReason::LimitReached)
        );
    }

    #[test]
    fn test_size_check_precedes_count_check() {
        // An oversize file at the count limit reports the size problem
        let six_mib = 6 * 1024 * 1024;
        assert_eq!(
            validator().evaluate(&collecting(5), &pdf(six_mib)),
            Verdict::Reject(RejectReason::FileTooLarge)
        );
    }

    #[test]
    fn test_accepts_below_limits() {
        assert_eq!(
            validator().evaluate(&collecting(4), &pdf(1024)),
            Verdict::Accept
        );
    }

    #[test]
    fn test_custom_limits() {
        let limits = MergeConfig {
            max_files: 2,
            max_file_size_bytes: 1024,
            ..MergeConfig::default()
        };
        let validator = AttachmentValidator::new(limits);
        assert_eq!(
            validator.evaluate(&collecting(0), &pdf(2048)),
            Verdict::Reject(RejectReason::FileTooLarge)
        );
        assert_eq!(
            validator.evaluate(&collecting(2), &pdf(512)),
            Verdict::Reject(RejectReason::LimitReached)
        );
    }
}
