//! Attack kind implementations (§4.G–§4.I). Each submodule owns the shape of
//! its recover command and is responsible for applying and reversing exactly
//! one [`crate::model::AttackKind`].

pub mod disk;
pub mod process;
pub mod stress;

use serde::{Deserialize, Serialize};

use crate::error::ChaosError;
use crate::model::AttackKind;

/// Wire envelope for `experiments.recover_command` (§9). Each handler owns
/// the shape of `data`; the dispatcher only reads `kind`/`schema_version` to
/// route recovery without caring about the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverEnvelope {
    pub schema_version: u32,
    pub kind: AttackKind,
    pub data: serde_json::Value,
}

impl RecoverEnvelope {
    pub fn new(kind: AttackKind, data: serde_json::Value) -> Self {
        Self { schema_version: 1, kind, data }
    }

    pub fn encode(&self) -> Result<String, ChaosError> {
        serde_json::to_string(self).map_err(|e| ChaosError::Internal(format!("recover command encode: {e}")))
    }

    pub fn decode(raw: &str) -> Result<Self, ChaosError> {
        serde_json::from_str(raw)
            .map_err(|e| ChaosError::Internal(format!("recover command decode: {e}")))
    }
}
