//! CSV bar feed.
//!
//! Columns (header required): `start_dt, end_dt, open, high, low, close`
//! and an optional `volume`. Timestamps are RFC 3339 in UTC; rows must be
//! ascending by `end_dt` unless the feed is built with `auto_sort`, in which
//! case the file is read eagerly and sorted.

use super::source::{EventSource, SourceFeed};
use super::FeedError;
use crate::domain::{Bar, BarType, Event, Ohlcv};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct BarRow {
    start_dt: String,
    end_dt: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

enum Mode {
    Streaming { reader: csv::Reader<Box<dyn Read>>, last_end: Option<DateTime<Utc>> },
    Sorted(VecDeque<Event>),
}

pub struct CsvBarSource {
    bar_type: BarType,
    mode: Mode,
    enforce_order: bool,
}

impl CsvBarSource {
    pub fn from_reader(reader: impl Read + 'static, bar_type: BarType, auto_sort: bool) -> Result<Self, FeedError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(Box::new(reader) as Box<dyn Read>);
        let mut source =
            Self { bar_type, mode: Mode::Streaming { reader, last_end: None }, enforce_order: !auto_sort };
        if auto_sort {
            let mut events = Vec::new();
            while let Some(event) = source.read_row()? {
                events.push(event);
            }
            events.sort_by_key(Event::sort_key);
            source.mode = Mode::Sorted(events.into());
        }
        Ok(source)
    }

    pub fn from_path(path: impl AsRef<Path>, bar_type: BarType, auto_sort: bool) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| FeedError::Source(format!("{}: {e}", path.display())))?;
        Self::from_reader(file, bar_type, auto_sort)
    }

    pub fn bar_type(&self) -> &BarType {
        &self.bar_type
    }

    /// Next row as a bar event; streaming mode enforces ascending `end_dt`.
    fn read_row(&mut self) -> Result<Option<Event>, FeedError> {
        let Mode::Streaming { reader, last_end } = &mut self.mode else {
            return Ok(None);
        };
        let mut record = csv::StringRecord::new();
        let has_row = reader
            .read_record(&mut record)
            .map_err(|e| FeedError::Csv { line: line_of(&e), reason: e.to_string() })?;
        if !has_row {
            return Ok(None);
        }
        let line = record.position().map_or(0, |p| p.line());
        let headers = reader.headers().map_err(|e| FeedError::Csv { line, reason: e.to_string() })?.clone();
        let row: BarRow = record
            .deserialize(Some(&headers))
            .map_err(|e| FeedError::Csv { line, reason: e.to_string() })?;
        let bar = parse_bar(&row, &self.bar_type).map_err(|reason| FeedError::Csv { line, reason })?;

        match *last_end {
            Some(previous) if self.enforce_order && bar.end_dt() < previous => {
                return Err(FeedError::Unsorted { previous, next: bar.end_dt() });
            }
            _ => {}
        }
        *last_end = Some(bar.end_dt());
        Ok(Some(Event::bar(bar, true)))
    }
}

fn line_of(err: &csv::Error) -> u64 {
    err.position().map_or(0, |p| p.line())
}

fn parse_bar(row: &BarRow, bar_type: &BarType) -> Result<Bar, String> {
    let time = |field: &str, value: &str| -> Result<DateTime<Utc>, String> {
        let dt = DateTime::parse_from_rfc3339(value).map_err(|e| format!("{field} {value:?}: {e}"))?;
        if dt.offset().local_minus_utc() != 0 {
            return Err(format!("{field} {value:?}: timestamps must be UTC"));
        }
        Ok(dt.with_timezone(&Utc))
    };
    let number = |field: &str, value: &str| {
        Decimal::from_str(value).map_err(|e| format!("{field} {value:?}: {e}"))
    };
    let values = Ohlcv {
        open: number("open", &row.open)?,
        high: number("high", &row.high)?,
        low: number("low", &row.low)?,
        close: number("close", &row.close)?,
        volume: match row.volume.as_deref() {
            Some(v) if !v.is_empty() => number("volume", v)?,
            _ => Decimal::ZERO,
        },
    };
    Bar::new(bar_type.clone(), time("start_dt", &row.start_dt)?, time("end_dt", &row.end_dt)?, values)
        .map_err(|e| e.to_string())
}

impl EventSource for CsvBarSource {
    fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        match &mut self.mode {
            Mode::Sorted(events) => Ok(events.pop_front()),
            Mode::Streaming { .. } => self.read_row(),
        }
    }

    fn close(&mut self) {
        self.mode = Mode::Sorted(VecDeque::new());
    }
}

pub type CsvBarFeed = SourceFeed<CsvBarSource>;

impl CsvBarFeed {
    pub fn from_path(path: impl AsRef<Path>, bar_type: BarType, auto_sort: bool) -> Result<Self, FeedError> {
        Ok(Self::from_source(CsvBarSource::from_path(path, bar_type, auto_sort)?))
    }

    pub fn from_reader(reader: impl Read + 'static, bar_type: BarType, auto_sort: bool) -> Result<Self, FeedError> {
        Ok(Self::from_source(CsvBarSource::from_reader(reader, bar_type, auto_sort)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BarPeriod;
    use crate::feed::EventFeed;
    use rust_decimal_macros::dec;
    use std::io::{Cursor, Write};

    const HEADER: &str = "start_dt,end_dt,open,high,low,close,volume\n";

    fn bar_type() -> BarType {
        BarType::new("SPY", BarPeriod::minutes(1).unwrap())
    }

    fn row(minute: u32, close: &str) -> String {
        format!(
            "2024-01-02T14:{:02}:00Z,2024-01-02T14:{:02}:00Z,{close},{close},{close},{close},100\n",
            minute - 1,
            minute
        )
    }

    fn feed(body: &str, auto_sort: bool) -> Result<CsvBarFeed, FeedError> {
        CsvBarFeed::from_reader(Cursor::new(format!("{HEADER}{body}")), bar_type(), auto_sort)
    }

    #[test]
    fn streams_bars_in_order() {
        let mut feed = feed(&format!("{}{}", row(31, "100.5"), row(32, "101")), false).unwrap();
        let first = feed.pop().unwrap().unwrap();
        let bar = &first.as_bar().unwrap().bar;
        assert_eq!(bar.close(), dec!(100.5));
        assert_eq!(bar.volume(), dec!(100));
        assert_eq!(first.dt_event(), bar.end_dt());
        assert!(feed.pop().unwrap().is_some());
        assert!(feed.pop().unwrap().is_none());
        assert!(feed.is_finished());
    }

    #[test]
    fn unsorted_rows_fail_unless_auto_sorted() {
        let body = format!("{}{}", row(32, "101"), row(31, "100"));
        let mut streaming = feed(&body, false).unwrap();
        streaming.pop().unwrap();
        assert!(matches!(streaming.pop(), Err(FeedError::Unsorted { .. })));

        let mut sorted = feed(&body, true).unwrap();
        let first = sorted.pop().unwrap().unwrap();
        assert_eq!(first.as_bar().unwrap().bar.close(), dec!(100));
    }

    #[test]
    fn volume_column_is_optional() {
        let body = "start_dt,end_dt,open,high,low,close\n2024-01-02T14:30:00Z,2024-01-02T14:31:00Z,1,2,1,2\n";
        let mut feed = CsvBarFeed::from_reader(Cursor::new(body.to_string()), bar_type(), false).unwrap();
        let event = feed.pop().unwrap().unwrap();
        assert_eq!(event.as_bar().unwrap().bar.volume(), dec!(0));
    }

    #[test]
    fn invalid_rows_report_their_line() {
        let body = "2024-01-02T14:30:00Z,2024-01-02T14:31:00Z,1,0.5,1,1,10\n";
        let mut feed = feed(body, false).unwrap();
        assert!(matches!(feed.pop(), Err(FeedError::Csv { line: 2, .. })));

        let body = "yesterday,2024-01-02T14:31:00Z,1,1,1,1,10\n";
        let mut feed = self::feed(body, false).unwrap();
        assert!(matches!(feed.pop(), Err(FeedError::Csv { .. })));
    }

    #[test]
    fn non_utc_offsets_are_rejected() {
        let body = "2024-01-02T16:30:00+02:00,2024-01-02T16:31:00+02:00,1,1,1,1,10\n";
        let mut feed = feed(body, false).unwrap();
        assert!(matches!(feed.pop(), Err(FeedError::Csv { line: 2, reason }) if reason.contains("UTC")));

        let body = "2024-01-02T14:30:00+00:00,2024-01-02T14:31:00+00:00,1,1,1,1,10\n";
        let mut feed = self::feed(body, false).unwrap();
        assert!(feed.pop().unwrap().is_some());
    }

    #[test]
    fn reads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{HEADER}{}", row(31, "10")).unwrap();
        let mut feed = CsvBarFeed::from_path(file.path(), bar_type(), false).unwrap();
        assert!(feed.peek().unwrap().is_some());
        assert!(CsvBarFeed::from_path("/nonexistent/bars.csv", bar_type(), false).is_err());
    }
}
