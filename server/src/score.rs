//! Final score persistence
//!
//! Scores are recorded once per occupant when a match ends. Recording is
//! best effort: the controller logs failures and carries on.

use log::info;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub trait ScoreSink: Send + Sync {
    fn record(&mut self, name: &str, score: u32) -> io::Result<()>;
}

/// Writes scores to the log only
#[derive(Debug, Default)]
pub struct LogScoreSink;

impl ScoreSink for LogScoreSink {
    fn record(&mut self, name: &str, score: u32) -> io::Result<()> {
        info!("Final score for {}: {}", name, score);
        Ok(())
    }
}

/// Appends `name<TAB>score` lines to a file
#[derive(Debug)]
pub struct FileScoreSink {
    path: PathBuf,
}

impl FileScoreSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScoreSink for FileScoreSink {
    fn record(&mut self, name: &str, score: u32) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}\t{}", name, score)?;
        info!("Recorded score {} for {} in {}", score, name, self.path.display());
        Ok(())
    }
}

/// In-memory sink; clones share the same record list
#[derive(Debug, Clone, Default)]
pub struct MemoryScoreSink {
    entries: Arc<Mutex<Vec<(String, u32)>>>,
}

impl MemoryScoreSink {
    pub fn entries(&self) -> Vec<(String, u32)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl ScoreSink for MemoryScoreSink {
    fn record(&mut self, name: &str, score: u32) -> io::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "score list poisoned"))?;
        entries.push((name.to_string(), score));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_memory_sink_shares_entries() {
        let sink = MemoryScoreSink::default();
        let mut writer = sink.clone();

        assert_ok!(writer.record("ada", 30));
        assert_ok!(writer.record("grace", 0));

        assert_eq!(
            sink.entries(),
            vec![("ada".to_string(), 30), ("grace".to_string(), 0)]
        );
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let path =
            std::env::temp_dir().join(format!("snake-scores-{}.tsv", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut sink = FileScoreSink::new(&path);
        assert_ok!(sink.record("ada", 30));
        assert_ok!(sink.record("grace", 15));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "ada\t30\ngrace\t15\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_file_sink_reports_unwritable_path() {
        let path = std::env::temp_dir()
            .join(format!("snake-missing-{}", std::process::id()))
            .join("scores.tsv");
        let mut sink = FileScoreSink::new(path);
        assert_err!(sink.record("ada", 10));
    }

    #[test]
    fn test_log_sink_never_fails() {
        let mut sink = LogScoreSink;
        assert_ok!(sink.record("ada", 10));
    }
}
