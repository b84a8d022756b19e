// src/store.rs
//! Durable tracker file.
//!
//! One CSV row per tracker under the header
//! `link,channel_id,last_check_time,last_item_ids`. Timestamps are unix seconds
//! with a microsecond fraction; `last_item_ids` is `|`-joined.
//!
//! The store never saves on its own: callers mutate their working set and then
//! call [`TrackerStore::save_all`], which replaces the whole file atomically.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use metrics::counter;
use tempfile::NamedTempFile;

use crate::tracker::{ChannelId, SeenIds, Tracker};

pub const HEADER: [&str; 4] = ["link", "channel_id", "last_check_time", "last_item_ids"];

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("tracker file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tracker file {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("tracker file {}: unexpected header {found:?}", .path.display())]
    Header { path: PathBuf, found: Vec<String> },
    #[error("tracker file {} line {line}: invalid {field} {value:?}: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Unix seconds with a six digit fraction, e.g. `1743887965.250000`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!("{}.{:06}", ts.timestamp(), ts.timestamp_subsec_micros())
}

/// Accepts integer or fractional unix seconds; digits past microseconds are dropped.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
    let secs: i64 = secs.parse().ok()?;
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = frac.chars().take(6).collect();
    while digits.len() < 6 {
        digits.push('0');
    }
    let micros: u32 = digits.parse().ok()?;
    DateTime::from_timestamp(secs, micros * 1_000)
}

#[derive(Debug, Clone)]
pub struct TrackerStore {
    path: PathBuf,
}

impl TrackerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> PersistenceError {
        PersistenceError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    /// Read every tracker. A missing file is created with just the header.
    /// Any malformed row fails the whole load.
    pub fn load(&self) -> Result<Vec<Tracker>, PersistenceError> {
        if !self.path.exists() {
            tracing::info!(target: "store", path = %self.path.display(), "tracker file missing, creating");
            self.save_all(&[])?;
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;

        let header = reader.headers().map_err(|e| self.csv_err(e))?.clone();
        if header.iter().map(str::trim).ne(HEADER.iter().copied()) {
            return Err(PersistenceError::Header {
                path: self.path.clone(),
                found: header.iter().map(str::to_string).collect(),
            });
        }

        let mut keys = HashSet::new();
        let mut out = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| self.csv_err(e))?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let malformed = |field: &'static str, value: &str, reason: &str| {
                PersistenceError::Malformed {
                    path: self.path.clone(),
                    line,
                    field,
                    value: value.to_string(),
                    reason: reason.to_string(),
                }
            };

            let link = record.get(0).unwrap_or_default().trim();
            let channel = record.get(1).unwrap_or_default();
            let checked = record.get(2).unwrap_or_default();
            let ids = record.get(3).unwrap_or_default();

            if link.is_empty() {
                return Err(malformed("link", link, "empty"));
            }
            let destination: ChannelId = channel
                .parse()
                .map_err(|e: std::num::ParseIntError| malformed("channel_id", channel, &e.to_string()))?;
            let last_checked_at = parse_timestamp(checked)
                .ok_or_else(|| malformed("last_check_time", checked, "not a unix timestamp"))?;
            if !keys.insert((link.to_string(), destination)) {
                return Err(malformed("link", link, "duplicate tracker for this channel"));
            }

            out.push(Tracker::new(
                link,
                destination,
                last_checked_at,
                SeenIds::decode(ids),
            ));
        }

        tracing::info!(target: "store", count = out.len(), path = %self.path.display(), "loaded trackers");
        Ok(out)
    }

    /// Replace the file with exactly `trackers`.
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the target,
    /// so readers see either the old or the new content.
    pub fn save_all(&self, trackers: &[Tracker]) -> Result<(), PersistenceError> {
        let result = self.write_atomically(trackers);
        match &result {
            Ok(()) => {
                counter!("tracker_store_saves_total").increment(1);
                tracing::debug!(target: "store", count = trackers.len(), "saved trackers");
            }
            Err(_) => counter!("tracker_store_save_errors_total").increment(1),
        }
        result
    }

    fn write_atomically(&self, trackers: &[Tracker]) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.io_err(e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_err(e))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(HEADER).map_err(|e| self.csv_err(e))?;
            for t in trackers {
                writer
                    .write_record([
                        t.query().to_string(),
                        t.destination().to_string(),
                        format_timestamp(t.last_checked_at()),
                        t.seen().encode(),
                    ])
                    .map_err(|e| self.csv_err(e))?;
            }
            writer.flush().map_err(|e| self.io_err(e))?;
        }
        tmp.as_file_mut().flush().map_err(|e| self.io_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_format_and_parse() {
        let ts = Utc.timestamp_opt(1_743_887_965, 250_000_000).unwrap();
        assert_eq!(format_timestamp(ts), "1743887965.250000");
        assert_eq!(parse_timestamp("1743887965.250000"), Some(ts));
        assert_eq!(parse_timestamp("1743887965.25"), Some(ts));
        assert_eq!(
            parse_timestamp("1743887965"),
            Some(Utc.timestamp_opt(1_743_887_965, 0).unwrap())
        );
        // Extra precision from other writers is truncated to micros.
        assert_eq!(
            parse_timestamp("1743887965.2500009"),
            Some(ts)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("12.3e4"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn missing_file_is_created_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trackers.csv");
        let store = TrackerStore::new(&path);
        assert!(store.load().unwrap().is_empty());
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), "link,channel_id,last_check_time,last_item_ids");
    }

    #[test]
    fn unparsable_channel_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trackers.csv");
        fs::write(
            &path,
            "link,channel_id,last_check_time,last_item_ids\n\
             https://m.test/a,1,1700000000.0,1|2\n\
             https://m.test/b,general,1700000000.0,\n",
        )
        .unwrap();
        let err = TrackerStore::new(&path).load().unwrap_err();
        match err {
            PersistenceError::Malformed { line, field, .. } => {
                assert_eq!(line, 3);
                assert_eq!(field, "channel_id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trackers.csv");
        fs::write(&path, "url,channel\nhttps://m.test/a,1\n").unwrap();
        assert!(matches!(
            TrackerStore::new(&path).load(),
            Err(PersistenceError::Header { .. })
        ));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trackers.csv");
        let store = TrackerStore::new(&path);
        let t = Tracker::new(
            "https://m.test/catalog?q=a,b",
            ChannelId(9),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            SeenIds::decode("x|y"),
        );
        store.save_all(&[t.clone()]).unwrap();
        store.save_all(&[t.clone()]).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.load().unwrap(), vec![t]);
    }
}
