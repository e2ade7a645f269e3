use serde::{Deserialize, Serialize};

use crate::{
    error::{CheckpointError, FinportResult},
    state::{CheckpointSeq, SearchState},
};

/// Schema version written into every checkpoint. Bump on any incompatible
/// change to [`SearchState`] so stale checkpoints are rejected instead of
/// silently misread.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// The unit that crosses invocation boundaries: a versioned, sequence-tagged
/// wrapper around the full [`SearchState`].
///
/// The sequence number is duplicated outside the state so the transport can
/// enforce at-most-once delivery without decoding the whole payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    pub version: u32,
    pub seq: CheckpointSeq,
    pub state: SearchState,
}

/// Serializes and deserializes the full resumable state.
///
/// The wire format is JSON: checkpoints travel through external transports
/// and occasionally need a human to read them.
pub struct CheckpointCodec;

impl CheckpointCodec {
    pub fn encode(state: &SearchState) -> FinportResult<String> {
        let envelope = CheckpointEnvelope {
            version: CHECKPOINT_SCHEMA_VERSION,
            seq: state.checkpoint_seq,
            state: state.clone(),
        };
        serde_json::to_string(&envelope)
            .map_err(|e| CheckpointError::Encode(e).into())
    }

    pub fn decode(raw: &str) -> FinportResult<SearchState> {
        // Probe the version first; a full decode of a foreign schema would
        // produce a misleading field-level error.
        #[derive(Deserialize)]
        struct VersionProbe {
            version: u32,
        }
        let probe: VersionProbe =
            serde_json::from_str(raw).map_err(CheckpointError::Decode)?;
        if probe.version != CHECKPOINT_SCHEMA_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: probe.version,
                supported: CHECKPOINT_SCHEMA_VERSION,
            }
            .into());
        }

        let envelope: CheckpointEnvelope =
            serde_json::from_str(raw).map_err(CheckpointError::Decode)?;
        Ok(envelope.state)
    }
}
