//! # File Storage
//!
//! Appends frames to files under a log directory, one file per
//! `max_records_per_file` records. Only the newest `max_files_to_keep` files
//! are retained.
//!
//! Files are named `telemetry_<YYYYmmdd_HHMMSS>_<seq>.<ext>` so that a name
//! sort is also a creation-order sort.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::StorageDriver;
use crate::error::{FlightError, Result};
use crate::telemetry::decoder::decode_frame;
use crate::telemetry::protocol::TelemetryRecord;

const FILE_PREFIX: &str = "telemetry_";

/// On-disk record format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Raw frames back to back
    Binary,
    /// One decoded record per line
    #[default]
    Jsonl,
}

impl LogFormat {
    pub fn extension(self) -> &'static str {
        match self {
            LogFormat::Binary => "bin",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

/// One line of a JSON Lines log
#[derive(Debug, Serialize)]
struct LogLine<'a> {
    logged_at: String,
    #[serde(flatten)]
    record: &'a TelemetryRecord,
}

/// Rotating file storage
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    format: LogFormat,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current: Option<PathBuf>,
    records_in_file: usize,
    sequence: u32,
}

impl FileStorage {
    pub fn new(
        dir: impl Into<PathBuf>,
        format: LogFormat,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Self {
        Self {
            dir: dir.into(),
            format,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            current: None,
            records_in_file: 0,
            sequence: 0,
        }
    }

    /// File currently being written
    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Closes the current file and starts the next one
    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            self.format.extension()
        );
        self.sequence = self.sequence.wrapping_add(1);

        let path = self.dir.join(name);
        let file = File::create(&path)?;
        debug!("Opened log file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current = Some(path);
        self.records_in_file = 0;

        // The new file is already usable
        if let Err(e) = self.prune() {
            warn!("Failed to remove old log files: {}", e);
        }
        Ok(())
    }

    /// Deletes the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files = log_files(&self.dir, self.format)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for old in files.into_iter().take(excess) {
            debug!("Removing old log file {}", old.display());
            fs::remove_file(&old)?;
        }

        Ok(())
    }

    fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = match self.format {
            LogFormat::Binary => None,
            LogFormat::Jsonl => {
                let record = decode_frame(bytes)?;
                let line = LogLine {
                    logged_at: Utc::now().to_rfc3339(),
                    record: &record,
                };
                Some(serde_json::to_string(&line)?)
            }
        };

        if let Some(writer) = self.writer.as_mut() {
            match line {
                Some(line) => writeln!(writer, "{}", line)?,
                None => writer.write_all(bytes)?,
            }
            writer.flush()?;
        }

        self.records_in_file += 1;
        Ok(())
    }
}

impl StorageDriver for FileStorage {
    fn init(&mut self) -> bool {
        let result = fs::create_dir_all(&self.dir)
            .map_err(FlightError::from)
            .and_then(|_| self.rotate());

        match result {
            Ok(()) => {
                info!(
                    "Logging {:?} frames to {}",
                    self.format,
                    self.dir.display()
                );
                true
            }
            Err(e) => {
                warn!("Cannot use log directory {}: {}", self.dir.display(), e);
                false
            }
        }
    }

    fn append(&mut self, bytes: &[u8]) -> bool {
        match self.write_record(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("Log append failed: {}", e);
                false
            }
        }
    }
}

/// Log files of `format` in `dir`
fn log_files(dir: &Path, format: LogFormat) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(FILE_PREFIX))
            && path.extension().and_then(|ext| ext.to_str()) == Some(format.extension());

        if matches {
            files.push(path);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{SensorHealth, Snapshot};
    use crate::telemetry::encoder::TelemetryEncoder;
    use crate::telemetry::protocol::{SystemStatus, TELEMETRY_FRAME_SIZE};
    use tempfile::tempdir;

    fn frame(uptime_ms: u32) -> Vec<u8> {
        let snapshot = Snapshot {
            uptime_ms,
            altimeter_hpa: Some(1002.0),
            gps: None,
            imu: None,
            link_quality: 3,
            health: SensorHealth {
                altimeter: true,
                ..SensorHealth::default()
            },
        };
        TelemetryEncoder::new()
            .encode(&snapshot, SystemStatus::default())
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_binary_append() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path(), LogFormat::Binary, 100, 5);

        assert!(storage.init());
        assert!(storage.append(&frame(100)));
        assert!(storage.append(&frame(200)));

        let path = storage.current_file().unwrap().to_path_buf();
        let contents = fs::read(&path).unwrap();
        assert_eq!(contents.len(), 2 * TELEMETRY_FRAME_SIZE);
        assert_eq!(&contents[..TELEMETRY_FRAME_SIZE], frame(100).as_slice());
        assert_eq!(path.extension().unwrap(), "bin");
    }

    #[test]
    fn test_jsonl_append() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path(), LogFormat::Jsonl, 100, 5);

        assert!(storage.init());
        assert!(storage.append(&frame(4200)));

        let contents = fs::read_to_string(storage.current_file().unwrap()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["uptime_ms"], 4200);
        assert_eq!(value["tx_packets"], 3);
        assert_eq!(value["status"]["altimeter_ok"], true);
        assert!(value["logged_at"].is_string());
    }

    #[test]
    fn test_jsonl_rejects_non_frame() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path(), LogFormat::Jsonl, 100, 5);

        assert!(storage.init());
        assert!(!storage.append(&[1, 2, 3]));
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path(), LogFormat::Binary, 2, 3);

        assert!(storage.init());
        for n in 0..10 {
            assert!(storage.append(&frame(n * 100)));
        }

        // 10 records at 2 per file = 5 files, of which the newest 3 remain
        let mut files = log_files(dir.path(), LogFormat::Binary).unwrap();
        files.sort();
        assert_eq!(files.len(), 3);
        assert_eq!(files.last().map(PathBuf::as_path), storage.current_file());

        let newest = fs::read(files.last().unwrap()).unwrap();
        assert_eq!(&newest[TELEMETRY_FRAME_SIZE..], frame(900).as_slice());
    }

    #[test]
    fn test_prune_failure_keeps_logging() {
        let dir = tempdir().unwrap();
        // Sorts oldest and cannot be removed as a file
        let stuck = dir.path().join(format!("{}00000000_000000_0000.bin", FILE_PREFIX));
        fs::create_dir(&stuck).unwrap();

        let mut storage = FileStorage::new(dir.path(), LogFormat::Binary, 1, 1);
        assert!(storage.init());
        assert!(storage.append(&frame(100)));
        assert!(storage.append(&frame(200)));

        assert!(stuck.is_dir());
        let current = fs::read(storage.current_file().unwrap()).unwrap();
        assert_eq!(current, frame(200));
    }

    #[test]
    fn test_init_fails_on_unusable_dir() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let mut storage = FileStorage::new(blocker.join("logs"), LogFormat::Binary, 10, 2);
        assert!(!storage.init());
        assert!(!storage.append(&frame(0)));
    }

    #[test]
    fn test_log_format_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }

        let w: Wrapper = toml::from_str("format = \"binary\"").unwrap();
        assert_eq!(w.format, LogFormat::Binary);
        let w: Wrapper = toml::from_str("format = \"jsonl\"").unwrap();
        assert_eq!(w.format, LogFormat::Jsonl);
        assert!(toml::from_str::<Wrapper>("format = \"csv\"").is_err());
    }
}
