//! Core data models shared by the comparison workflow and the record store.

use serde::{Deserialize, Serialize};

/// A completion together with the parameters that produced it.
///
/// Serialized field order matches the on-disk record format. Every field
/// has a default so records written by older versions (or by hand) still
/// load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CompletionRecord {
    pub system_message: String,
    pub user_prompt: String,
    /// Generated text, or an `Error: ...` message when the call failed.
    pub completion: String,
    pub data_file1: String,
    pub data_file2: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub model: Option<String>,
    /// `YYYYMMDD_HHMMSS`, assigned when the record is first saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}
