//! Domain types shared across the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV row for an entity. `(entity_code, date)` is the natural
/// unique key in the price store; an upsert replaces the whole row, never
/// merges fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

/// A tracked security, annotated with its per-run priority flag.
///
/// Entity codes are owned by the external listing source; only the ordering
/// and the priority annotation belong to this engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub code: String,
    pub is_priority: bool,
}

impl Entity {
    pub fn new(code: impl Into<String>, is_priority: bool) -> Self {
        Self {
            code: code.into(),
            is_priority,
        }
    }
}
