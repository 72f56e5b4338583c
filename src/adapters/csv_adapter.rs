//! CSV file bar source.
//!
//! Reads `<SYMBOL>.csv` from a directory. The header must name a
//! `timestamp` (or `date`) column and a `close` column; `open` is used when
//! present and any other columns are ignored.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::domain::bar::{Bar, parse_timestamp};
use crate::domain::error::RevtraderError;
use crate::ports::bar_source::{BarRequest, BarSource};

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Columns {
    timestamp: usize,
    open: Option<usize>,
    close: usize,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    fn columns(headers: &csv::StringRecord) -> Result<Columns, RevtraderError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let timestamp = find(&["timestamp", "date", "time"])
            .ok_or_else(|| RevtraderError::malformed("CSV header has no timestamp column"))?;
        let close = find(&["close"])
            .ok_or_else(|| RevtraderError::malformed("CSV header has no close column"))?;
        Ok(Columns {
            timestamp,
            open: find(&["open"]),
            close,
        })
    }

    fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Result<Bar, RevtraderError> {
        let field = |idx: usize, name: &str| {
            record
                .get(idx)
                .map(str::trim)
                .ok_or_else(|| RevtraderError::malformed(format!("missing {name} column")))
        };

        let raw_ts = field(cols.timestamp, "timestamp")?;
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| RevtraderError::malformed(format!("invalid timestamp {raw_ts:?}")))?;

        let raw_close = field(cols.close, "close")?;
        let close: f64 = raw_close
            .parse()
            .map_err(|_| RevtraderError::malformed(format!("invalid close {raw_close:?}")))?;

        let open = match cols.open {
            Some(idx) => {
                let raw = field(idx, "open")?;
                if raw.is_empty() {
                    None
                } else {
                    Some(raw.parse::<f64>().map_err(|_| {
                        RevtraderError::malformed(format!("invalid open {raw:?}"))
                    })?)
                }
            }
            None => None,
        };

        Ok(Bar {
            timestamp,
            open,
            close,
        })
    }
}

impl BarSource for CsvAdapter {
    fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, RevtraderError> {
        let path = self.csv_path(&request.symbol);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no CSV file for symbol");
                return Err(RevtraderError::NoData {
                    symbol: request.symbol.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| RevtraderError::malformed(format!("{}: {e}", path.display())))?
            .clone();
        let cols = Self::columns(&headers)?;

        let mut bars = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let parsed = result
                .map_err(|e| RevtraderError::malformed(format!("CSV parse error: {e}")))
                .and_then(|record| Self::parse_row(&record, &cols));
            match parsed {
                Ok(bar) if bar.timestamp >= request.start && bar.timestamp <= request.end => {
                    bars.push(bar)
                }
                Ok(_) => {}
                Err(e) => warn!(
                    symbol = %request.symbol,
                    row = line + 2,
                    error = %e,
                    "skipping CSV row"
                ),
            }
        }

        bars.sort_by_key(|b| b.timestamp);
        bars.truncate(request.limit);
        Ok(bars)
    }
}
