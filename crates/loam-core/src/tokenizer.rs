use loam_tuning::{TuneError, TuneResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Token id space: the 256 byte values plus one BOS marker.
pub const BYTE_VOCAB: usize = 256;
pub const BOS_ID: usize = 256;
pub const VOCAB_SIZE: usize = BYTE_VOCAB + 1;

/// Byte-level tokenizer. Model-independent by construction: every UTF-8
/// string maps onto the same fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteTokenizer {
    kind: String,
    vocab_size: usize,
    bos_id: usize,
}

impl Default for ByteTokenizer {
    fn default() -> Self {
        Self { kind: "byte".to_string(), vocab_size: VOCAB_SIZE, bos_id: BOS_ID }
    }
}

impl ByteTokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Encode with a leading BOS, truncated to `max_len` tokens.
    #[must_use]
    pub fn encode(&self, text: &str, max_len: usize) -> Vec<usize> {
        let mut ids = Vec::with_capacity((text.len() + 1).min(max_len));
        ids.push(self.bos_id);
        for b in text.bytes() {
            if ids.len() >= max_len {
                break;
            }
            ids.push(b as usize);
        }
        ids
    }

    /// Decode token ids back to text; BOS is dropped, invalid UTF-8 sequences
    /// are replaced.
    #[must_use]
    pub fn decode(&self, ids: &[usize]) -> String {
        let bytes: Vec<u8> = ids
            .iter()
            .filter(|&&id| id < BYTE_VOCAB)
            .map(|&id| id as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn save(&self, path: &Path) -> TuneResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> TuneResult<Self> {
        if !path.exists() {
            return Err(TuneError::NotFound(format!(
                "tokenizer file missing: {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path)?;
        let tok: Self = serde_json::from_slice(&bytes)?;
        if tok.kind != "byte" {
            return Err(TuneError::Artifact(format!(
                "unsupported tokenizer kind: {}",
                tok.kind
            )));
        }
        if tok.vocab_size != VOCAB_SIZE || tok.bos_id != BOS_ID {
            return Err(TuneError::Artifact(format!(
                "tokenizer vocab mismatch: vocab_size {} bos_id {}",
                tok.vocab_size, tok.bos_id
            )));
        }
        Ok(tok)
    }
}
