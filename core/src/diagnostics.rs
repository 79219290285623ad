//! Append-only CSV log of estimator cycles
//!
//! When [`EstimatorConfig::diagnostic_log`](crate::EstimatorConfig) is set, the estimator writes
//! one [`DiagnosticRecord`] per predictor cycle: the wall-clock time of the cycle, the attitude
//! and rates it used, the NED acceleration it integrated, and the resulting velocity and
//! position. The header row is only written when the file is new or empty, so repeated runs
//! append to the same log.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub wall_clock: DateTime<Utc>,
    pub timestamp_ns: u64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    pub p_radps: f64,
    pub q_radps: f64,
    pub r_radps: f64,
    pub acc_n_mps2: f64,
    pub acc_e_mps2: f64,
    pub acc_d_mps2: f64,
    pub vel_n_mps: f64,
    pub vel_e_mps: f64,
    pub vel_d_mps: f64,
    pub pos_n_m: f64,
    pub pos_e_m: f64,
    pub pos_d_m: f64,
}
impl DiagnosticRecord {
    /// Reads every record of a diagnostic log.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }
}

pub struct DiagnosticLog {
    path: PathBuf,
    writer: csv::Writer<std::fs::File>,
}
impl DiagnosticLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);
        Ok(DiagnosticLog { path, writer })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Append one record and flush it to disk.
    pub fn write(&mut self, record: &DiagnosticRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn record(timestamp_ns: u64) -> DiagnosticRecord {
        DiagnosticRecord {
            wall_clock: Utc::now(),
            timestamp_ns,
            roll_deg: 1.0,
            pitch_deg: -2.0,
            yaw_deg: 90.0,
            p_radps: 0.01,
            q_radps: 0.0,
            r_radps: -0.01,
            acc_n_mps2: 0.1,
            acc_e_mps2: 0.0,
            acc_d_mps2: 0.0,
            vel_n_mps: 1.0,
            vel_e_mps: 0.5,
            vel_d_mps: 0.0,
            pos_n_m: 10.0,
            pos_e_m: 5.0,
            pos_d_m: -1.0,
        }
    }

    #[test]
    fn appends_across_reopen_with_single_header() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().with_extension("csv");

        let mut log = DiagnosticLog::open(&path).unwrap();
        log.write(&record(1)).unwrap();
        log.write(&record(2)).unwrap();
        drop(log);

        let mut log = DiagnosticLog::open(&path).unwrap();
        assert_eq!(log.path(), path.as_path());
        log.write(&record(3)).unwrap();
        drop(log);

        let records = DiagnosticRecord::from_csv(&path).unwrap();
        let stamps: Vec<u64> = records.iter().map(|r| r.timestamp_ns).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert_eq!(records[2].yaw_deg, 90.0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("wall_clock").count(), 1);
        std::fs::remove_file(&path).ok();
    }
}
