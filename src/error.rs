//! Typed pipeline errors.

use thiserror::Error;

/// Errors surfaced by pipeline stages.
///
/// Stage failures propagate to the orchestrator through the stage task
/// results instead of being absorbed where they occur. Each failure carries
/// the sequence position it is attributed to.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A channel was dropped before its end-of-stream marker arrived.
    #[error("channel closed before end-of-stream marker")]
    ChannelClosed,

    /// The per-batch transformation failed.
    #[error("transform failed for batch {sequence}: {reason}")]
    Transform { sequence: u64, reason: anyhow::Error },

    /// The durable write for an artifact failed.
    #[error("persist failed for artifact {sequence}: {reason}")]
    Persist { sequence: u64, reason: anyhow::Error },
}

impl PipelineError {
    /// Sequence number the error is attributed to, if any.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            PipelineError::ChannelClosed => None,
            PipelineError::Transform { sequence, .. }
            | PipelineError::Persist { sequence, .. } => Some(*sequence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_display() {
        let err = PipelineError::Transform {
            sequence: 2,
            reason: anyhow::anyhow!("bad factor"),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch 2"));
        assert!(msg.contains("bad factor"));
    }

    #[test]
    fn test_persist_error_display() {
        let err = PipelineError::Persist {
            sequence: 3,
            reason: anyhow::anyhow!("disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("artifact 3"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_error_sequence() {
        assert_eq!(PipelineError::ChannelClosed.sequence(), None);
        let err = PipelineError::Transform {
            sequence: 7,
            reason: anyhow::anyhow!("x"),
        };
        assert_eq!(err.sequence(), Some(7));
    }
}
