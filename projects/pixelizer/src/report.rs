// Job report persisted as JSON next to (or instead of) the log output

use crate::pipeline::types::JobMode;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Summary of one finished job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: JobMode,
    /// Only present for anonymize jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces_found: Option<bool>,
    /// 1 for still images.
    pub frames: usize,
    pub workers: usize,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub fn new(
        input: &Path,
        output: &Path,
        mode: JobMode,
        faces_found: Option<bool>,
        frames: usize,
        workers: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            mode,
            faces_found,
            frames,
            workers,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
        tracing::info!("Report written to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_shape() {
        let report = JobReport::new(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            JobMode::Pixelize {
                pixel_size: 8,
                color_depth: Some(16),
            },
            None,
            120,
            4,
            Duration::from_millis(1500),
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["mode"]["mode"], "pixelize");
        assert_eq!(value["mode"]["color_depth"], 16);
        assert_eq!(value["elapsed_ms"], 1500);
        assert!(value.get("faces_found").is_none());
    }

    #[test]
    fn test_report_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = JobReport::new(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            JobMode::Anonymize,
            Some(false),
            40,
            4,
            Duration::from_secs(2),
        );
        report.write(&path).unwrap();
        let loaded: JobReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }
}
