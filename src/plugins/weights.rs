//! Per-layer neural weight persistence.
//!
//! Weights are stored as little-endian f32 blobs alongside the SHA-256 hex digest
//! of the weight blob. Every read re-verifies the digest; a mismatch is reported
//! as `IntegrityFailure` and the stored row is left untouched.

use crate::core::crypto;
use crate::core::error::HivekeepError;
use crate::core::time;
use crate::plugins::agents::{AgentStore, OpKind, map_constraint};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

pub const COMPRESSION_NONE: &str = "none";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralWeights {
    pub agent_id: String,
    pub layer_index: i64,
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
    pub checksum: String,
    pub updated_at: i64,
    pub compression: String,
}

struct StoredLayer {
    agent_id: String,
    layer_index: i64,
    weights: Vec<u8>,
    biases: Vec<u8>,
    checksum: String,
    updated_at: i64,
    compression: String,
}

pub fn encode_f32_le(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Trailing bytes that do not fill a value are dropped.
pub fn decode_f32_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredLayer> {
    Ok(StoredLayer {
        agent_id: row.get(0)?,
        layer_index: row.get(1)?,
        weights: row.get(2)?,
        biases: row.get(3)?,
        checksum: row.get(4)?,
        updated_at: row.get(5)?,
        compression: row.get(6)?,
    })
}

const WEIGHT_COLUMNS: &str =
    "agent_id, layer_index, weights, biases, checksum, updated_at, compression";

impl AgentStore {
    /// Validates and persists one layer, replacing any previous row for the
    /// same `(agent_id, layer_index)`.
    pub fn save_neural_weights(
        &self,
        agent_id: &str,
        layer_index: i64,
        weights: &[f32],
        biases: &[f32],
    ) -> Result<NeuralWeights, HivekeepError> {
        const OP: &str = "save_neural_weights";
        if layer_index < 0 {
            return Err(HivekeepError::rejected(OP, "layer index must be non-negative"));
        }
        self.gate().check_identifier(OP, agent_id, self.caller())?;

        let checked_weights = self
            .gate()
            .validate_numeric_tensor(weights, Some(self.caller()));
        if !checked_weights.accepted {
            return Err(HivekeepError::rejected(OP, checked_weights.reasons()));
        }
        let checked_biases = self
            .gate()
            .validate_numeric_tensor(biases, Some(self.caller()));
        if !checked_biases.accepted {
            return Err(HivekeepError::rejected(OP, checked_biases.reasons()));
        }

        let weight_blob = encode_f32_le(&checked_weights.sanitized);
        let bias_blob = encode_f32_le(&checked_biases.sanitized);
        let checksum = crypto::sha256_hex(&weight_blob);
        let updated_at = time::now_ms();

        self.run(OP, OpKind::Write, |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO neural_weights(agent_id, layer_index, weights, biases, checksum, updated_at, compression)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    agent_id,
                    layer_index,
                    weight_blob,
                    bias_blob,
                    checksum,
                    updated_at,
                    COMPRESSION_NONE
                ],
            )
            .map_err(|e| map_constraint(e, agent_id))?;
            Ok(())
        })?;

        Ok(NeuralWeights {
            agent_id: agent_id.to_string(),
            layer_index,
            weights: checked_weights.sanitized,
            biases: checked_biases.sanitized,
            checksum,
            updated_at,
            compression: COMPRESSION_NONE.to_string(),
        })
    }

    /// All layers for an agent in layer order, each verified against its checksum.
    pub fn load_neural_weights(&self, agent_id: &str) -> Result<Vec<NeuralWeights>, HivekeepError> {
        const OP: &str = "load_neural_weights";
        self.gate().check_identifier(OP, agent_id, self.caller())?;
        let stored = self.run(OP, OpKind::Read, |conn| {
            let sql = format!(
                "SELECT {} FROM neural_weights WHERE agent_id = ?1 ORDER BY layer_index",
                WEIGHT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![agent_id], stored_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        stored.into_iter().map(|s| self.verify_layer(s)).collect()
    }

    pub fn get_layer_weights(
        &self,
        agent_id: &str,
        layer_index: i64,
    ) -> Result<Option<NeuralWeights>, HivekeepError> {
        const OP: &str = "get_layer_weights";
        self.gate().check_identifier(OP, agent_id, self.caller())?;
        let stored = self.run(OP, OpKind::Read, |conn| {
            let sql = format!(
                "SELECT {} FROM neural_weights WHERE agent_id = ?1 AND layer_index = ?2",
                WEIGHT_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![agent_id, layer_index], stored_from_row)
                .optional()?)
        })?;
        stored.map(|s| self.verify_layer(s)).transpose()
    }

    fn verify_layer(&self, stored: StoredLayer) -> Result<NeuralWeights, HivekeepError> {
        let checked = self
            .gate()
            .validate_weight_blob(&stored.weights, &stored.checksum, Some(self.caller()));
        if checked.digest_mismatch() {
            return Err(HivekeepError::IntegrityFailure {
                agent_id: stored.agent_id,
                layer_index: stored.layer_index,
                expected: stored.checksum,
                actual: crypto::sha256_hex(&stored.weights),
            });
        }
        if !checked.violations.is_empty() {
            tracing::debug!(
                agent_id = %stored.agent_id,
                layer = stored.layer_index,
                score = checked.score,
                "weight blob passed digest check with heuristic findings"
            );
        }
        Ok(NeuralWeights {
            weights: decode_f32_le(&stored.weights),
            biases: decode_f32_le(&stored.biases),
            agent_id: stored.agent_id,
            layer_index: stored.layer_index,
            checksum: stored.checksum,
            updated_at: stored.updated_at,
            compression: stored.compression,
        })
    }
}
