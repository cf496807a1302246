//! Stooq provider — the fallback source in the default chain.
//!
//! Stooq serves daily history as plain CSV (`Date,Open,High,Low,Close,Volume`).
//! It carries no adjusted close, so `adj_close` is mirrored from `close`;
//! an upsert from a later Yahoo fetch overwrites the whole row anyway.
//! Stooq is stricter about call frequency than Yahoo, hence the longer
//! minimum interval.

use super::circuit_breaker::CircuitBreaker;
use super::{HistoryProvider, ProviderError};
use crate::record::PriceRecord;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct StooqRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: Option<u64>,
}

pub struct StooqProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    min_interval: Duration,
}

impl StooqProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            circuit_breaker,
            min_interval: Duration::from_millis(2000),
        }
    }

    fn csv_url(code: &str, start: NaiveDate, end: NaiveDate) -> String {
        // Stooq expects lowercase symbols with a market suffix; US tickers
        // without a suffix get ".us".
        let symbol = if code.contains('.') {
            code.to_lowercase()
        } else {
            format!("{}.us", code.to_lowercase())
        };
        format!(
            "https://stooq.com/q/d/l/?s={symbol}\
             &d1={}&d2={}&i=d",
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
        )
    }

    fn parse_csv(code: &str, body: &str) -> Result<Vec<PriceRecord>, ProviderError> {
        // Stooq answers unknown symbols with a bare "No data" body.
        if body.trim().eq_ignore_ascii_case("no data") {
            return Err(ProviderError::EntityNotFound {
                code: code.to_string(),
            });
        }

        let mut reader = csv::Reader::from_reader(body.as_bytes());
        let mut records = Vec::new();

        for row in reader.deserialize::<StooqRow>() {
            let row = row.map_err(|e| {
                ProviderError::ResponseFormatChanged(format!("CSV parse for {code}: {e}"))
            })?;
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|e| {
                ProviderError::ResponseFormatChanged(format!(
                    "bad date '{}' for {code}: {e}",
                    row.date
                ))
            })?;
            records.push(PriceRecord {
                date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                adj_close: row.close,
                volume: row.volume.unwrap_or(0),
            });
        }

        Ok(records)
    }
}

impl HistoryProvider for StooqProvider {
    fn name(&self) -> &str {
        "stooq"
    }

    fn min_call_interval(&self) -> Duration {
        self.min_interval
    }

    fn fetch_history(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, ProviderError> {
        if !self.circuit_breaker.allow() {
            return Err(ProviderError::CircuitBreakerTripped);
        }

        let url = Self::csv_url(code, start, end);
        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ProviderError::NetworkUnreachable(e.to_string())
            } else {
                ProviderError::Other(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            return Err(ProviderError::CircuitBreakerTripped);
        }
        if !status.is_success() {
            self.circuit_breaker.on_failure();
            return Err(ProviderError::Other(format!("HTTP {status} for {code}")));
        }

        let body = resp
            .text()
            .map_err(|e| ProviderError::ResponseFormatChanged(e.to_string()))?;

        let records = Self::parse_csv(code, &body)?;
        self.circuit_breaker.on_success();
        Ok(records)
    }
}
