//! Parquet price store with Hive-style partitioning.
//!
//! Layout: `{data_dir}/entity={CODE}/{year}.parquet`
//!
//! - Upserts merge by date within each year partition; an incoming record
//!   replaces the stored row for that date wholesale.
//! - Writes are atomic (write to .tmp, rename into place).
//! - Corrupt partitions are quarantined on load ({filename}.quarantined).
//! - A `meta.json` sidecar per entity records date range, row count, and a
//!   blake3 content hash.

use super::StoreError;
use crate::record::PriceRecord;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Metadata sidecar for one entity's stored history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMeta {
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    pub updated_at: chrono::NaiveDateTime,
}

/// Aggregate stats for an entity, used by gap reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
    pub row_count: usize,
}

pub struct PriceStore {
    data_dir: PathBuf,
}

impl PriceStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn entity_dir(&self, code: &str) -> PathBuf {
        self.data_dir.join(format!("entity={code}"))
    }

    fn year_path(&self, code: &str, year: i32) -> PathBuf {
        self.entity_dir(code).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, code: &str) -> PathBuf {
        self.entity_dir(code).join("meta.json")
    }

    /// Upsert records for an entity.
    ///
    /// Records are merged into their year partitions by date; dates already
    /// present are overwritten with the incoming row. Safe to repeat — the
    /// same upsert twice leaves the store byte-identical.
    pub fn upsert(&self, code: &str, records: &[PriceRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let dir = self.entity_dir(code);
        fs::create_dir_all(&dir)?;

        let mut by_year: BTreeMap<i32, Vec<&PriceRecord>> = BTreeMap::new();
        for rec in records {
            by_year.entry(rec.date.year()).or_default().push(rec);
        }

        for (year, new_rows) in &by_year {
            let path = self.year_path(code, *year);

            // Merge with the existing partition, new rows winning on date.
            let mut merged: BTreeMap<NaiveDate, PriceRecord> = BTreeMap::new();
            if path.exists() {
                for rec in load_and_validate_parquet(&path)? {
                    merged.insert(rec.date, rec);
                }
            }
            for rec in new_rows {
                merged.insert(rec.date, (*rec).clone());
            }

            let rows: Vec<&PriceRecord> = merged.values().collect();
            let df = records_to_dataframe(&rows)?;
            let tmp_path = path.with_extension("parquet.tmp");
            write_parquet(&df, &tmp_path)?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                StoreError::Io(e)
            })?;
        }

        self.rewrite_meta(code)
    }

    /// Load all stored records for an entity, sorted by date ascending.
    pub fn load(&self, code: &str) -> Result<Vec<PriceRecord>, StoreError> {
        let dir = self.entity_dir(code);
        if !dir.exists() {
            return Err(StoreError::NoData {
                code: code.to_string(),
            });
        }

        let mut all = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            match load_and_validate_parquet(&path) {
                Ok(records) => all.extend(records),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    warn!(path = %path.display(), error = %e, "quarantining corrupt partition");
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        if all.is_empty() {
            return Err(StoreError::NoData {
                code: code.to_string(),
            });
        }

        all.sort_by_key(|r| r.date);
        Ok(all)
    }

    /// Stored dates for an entity in ascending order; empty when nothing is
    /// stored yet (a brand-new entity is not an error for the sync loop).
    pub fn dates(&self, code: &str) -> Result<Vec<NaiveDate>, StoreError> {
        match self.load(code) {
            Ok(records) => Ok(records.into_iter().map(|r| r.date).collect()),
            Err(StoreError::NoData { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Most recent stored date, `None` for a brand-new entity.
    pub fn last_date(&self, code: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.dates(code)?.last().copied())
    }

    /// Earliest/latest stored date + row count, `None` when nothing stored.
    pub fn stats(&self, code: &str) -> Result<Option<StoreStats>, StoreError> {
        let dates = self.dates(code)?;
        Ok(match (dates.first(), dates.last()) {
            (Some(&earliest), Some(&latest)) => Some(StoreStats {
                earliest,
                latest,
                row_count: dates.len(),
            }),
            _ => None,
        })
    }

    /// Entity codes with stored history, in lexical order.
    pub fn list_entities(&self) -> Result<Vec<String>, StoreError> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }
        let mut codes = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(code) = name.strip_prefix("entity=") {
                codes.push(code.to_string());
            }
        }
        codes.sort();
        Ok(codes)
    }

    pub fn meta(&self, code: &str) -> Option<PriceMeta> {
        let content = fs::read_to_string(self.meta_path(code)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn rewrite_meta(&self, code: &str) -> Result<(), StoreError> {
        let records = self.load(code)?;
        let meta = PriceMeta {
            code: code.to_string(),
            start_date: records.first().map(|r| r.date).unwrap(),
            end_date: records.last().map(|r| r.date).unwrap(),
            row_count: records.len(),
            data_hash: blake3::hash(&serde_json::to_vec(&records)?).to_hex().to_string(),
            updated_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_string_pretty(&meta)?;
        fs::write(self.meta_path(code), json)?;
        Ok(())
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn records_to_dataframe(records: &[&PriceRecord]) -> Result<DataFrame, StoreError> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    let opens: Vec<f64> = records.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = records.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = records.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    let adj_closes: Vec<f64> = records.iter().map(|r| r.adj_close).collect();
    let volumes: Vec<u64> = records.iter().map(|r| r.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("adj_close".into(), adj_closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file = fs::File::create(path)?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<PriceRecord>, StoreError> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read parquet: {e}")))?;

    if df.height() == 0 {
        return Err(StoreError::Validation("empty parquet file".into()));
    }

    for col_name in ["date", "open", "high", "low", "close", "adj_close", "volume"] {
        if df.column(col_name).is_err() {
            return Err(StoreError::Validation(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_records(&df)
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<PriceRecord>, StoreError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| StoreError::Parquet(format!("column read: {e}")))
    };

    let date_ca = col("date")?
        .date()
        .map_err(|e| StoreError::Parquet(format!("date column type: {e}")))?
        .clone();
    let open_ca = col("open")?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("open column type: {e}")))?
        .clone();
    let high_ca = col("high")?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("high column type: {e}")))?
        .clone();
    let low_ca = col("low")?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("low column type: {e}")))?
        .clone();
    let close_ca = col("close")?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("close column type: {e}")))?
        .clone();
    let adj_ca = col("adj_close")?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("adj_close column type: {e}")))?
        .clone();
    let vol_ca = col("volume")?
        .u64()
        .map_err(|e| StoreError::Parquet(format!("volume column type: {e}")))?
        .clone();

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let mut records = Vec::with_capacity(df.height());

    for i in 0..df.height() {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| StoreError::Parquet(format!("null date at row {i}")))?;
        records.push(PriceRecord {
            date: epoch + chrono::Duration::days(date_days as i64),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            adj_close: adj_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
        });
    }

    Ok(records)
}
