//! Input files: item batches and recorded judge responses.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rubricgate_core::{Candidate, EvaluationContext};
use serde::Deserialize;
use serde_json::Value;

/// One entry of an items file.
///
/// ```json
/// [
///   {
///     "id": "q-001",
///     "type_tag": "multiple_choice",
///     "kind": "standalone",
///     "item": {"question": "...", "choices": ["..."], "answer": "..."},
///     "context": {"difficulty": "easy", "domain_tags": ["algebra"]}
///   },
///   {
///     "id": "r-001",
///     "type_tag": "reading",
///     "kind": "with_passage",
///     "passage": "...",
///     "items": [{"question": "...", "answer": "..."}]
///   }
/// ]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ItemEntry {
    pub id: String,
    #[serde(flatten)]
    pub candidate: Candidate,
    #[serde(default)]
    pub context: EvaluationContext,
}

pub fn load_items(path: &Path) -> Result<Vec<ItemEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read items file {:?}", path))?;
    let items: Vec<ItemEntry> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse items file {:?}", path))?;

    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = items.iter().find(|e| !seen.insert(e.id.as_str())) {
        anyhow::bail!("Duplicate item id '{}' in {:?}", dup.id, path);
    }
    Ok(items)
}

/// Recorded judge output per item id, in attempt order. Entries may be raw
/// strings or JSON objects; objects are re-serialised before parsing.
pub fn load_responses(path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read responses file {:?}", path))?;
    let raw: HashMap<String, Vec<Value>> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse responses file {:?}", path))?;

    Ok(raw
        .into_iter()
        .map(|(id, values)| {
            let payloads = values
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            (id, payloads)
        })
        .collect())
}
