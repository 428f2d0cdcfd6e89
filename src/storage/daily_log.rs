/// Append-only CSV logs partitioned by calendar day
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use time::Date;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::SensorError;
use crate::utils::format_date;

/// Destination for formatted records
#[async_trait]
pub trait RecordSink: Send {
    /// Append one record to the destination for `date`
    async fn append(&mut self, date: Date, record: &str) -> Result<(), SensorError>;
}

/// Writes `<prefix>_<YYYY-MM-DD>.csv` files in one directory
///
/// The date is recomputed by the caller for every record, so a new file
/// starts at local midnight without any rotation task.
#[derive(Debug, Clone)]
pub struct DailyLogSink {
    dir: PathBuf,
    prefix: String,
    dir_ready: bool,
}

impl DailyLogSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            dir_ready: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: Date) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", self.prefix, format_date(date)))
    }
}

#[async_trait]
impl RecordSink for DailyLogSink {
    async fn append(&mut self, date: Date, record: &str) -> Result<(), SensorError> {
        if !self.dir_ready {
            tokio::fs::create_dir_all(&self.dir).await?;
            self.dir_ready = true;
        }

        let mut line = record.trim_end_matches(['\r', '\n']).to_string();
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(date))
            .await?;
        // Single write per record so an interrupted process never leaves half a line
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[tokio::test]
    async fn creates_directory_lazily_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("logs");
        let mut sink = DailyLogSink::new(&out, "wind");
        assert!(!out.exists());

        let day = date!(2024 - 06 - 01);
        sink.append(day, "a,1").await.unwrap();
        sink.append(day, "b,2\n").await.unwrap();

        let path = out.join("wind_2024-06-01.csv");
        assert_eq!(sink.path_for(day), path);
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "a,1\nb,2\n");
    }

    #[tokio::test]
    async fn new_day_starts_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DailyLogSink::new(dir.path(), "voc");

        sink.append(date!(2024 - 12 - 31), "late").await.unwrap();
        sink.append(date!(2025 - 01 - 01), "early").await.unwrap();

        let first = tokio::fs::read_to_string(dir.path().join("voc_2024-12-31.csv"))
            .await
            .unwrap();
        let second = tokio::fs::read_to_string(dir.path().join("voc_2025-01-01.csv"))
            .await
            .unwrap();
        assert_eq!(first, "late\n");
        assert_eq!(second, "early\n");
    }

    #[tokio::test]
    async fn existing_records_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purpleair_2024-06-01.csv");
        tokio::fs::write(&path, "old\n").await.unwrap();

        let mut sink = DailyLogSink::new(dir.path(), "purpleair");
        sink.append(date!(2024 - 06 - 01), "new").await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "old\nnew\n");
    }
}
