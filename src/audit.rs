//! Best-effort audit sink for serialized execution results.
//!
//! Successful workflow runs write their provenance artifact here. A
//! sink failure is logged and never fails the run.

use crate::provenance::ExecutionResult;
use crate::types::RunId;
use std::path::{Path, PathBuf};

/// Destination for serialized execution results.
pub trait AuditSink: Send + Sync {
    /// Persists one run's artifact, returning where it landed.
    fn write(&self, run_id: &RunId, result: &ExecutionResult) -> std::io::Result<PathBuf>;
}

/// Writes one pretty-printed JSON file per run into a directory.
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default location: `<cache dir>/toolgate/audit`.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("toolgate")
            .join("audit")
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for JsonDirSink {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl AuditSink for JsonDirSink {
    fn write(&self, run_id: &RunId, result: &ExecutionResult) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("workflow-{run_id}.json"));
        std::fs::write(&path, result.to_json_pretty())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_writes_one_file_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirSink::new(dir.path().to_path_buf());
        let run_id = RunId::generate();
        let result = ExecutionResult {
            returned: json!(42),
            calls: vec![],
        };

        let path = sink.write(&run_id, &result).unwrap();
        assert!(path.exists());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["returned"], json!(42));
        assert_eq!(written["data_flow"]["nodes"], json!([]));
    }

    #[test]
    fn test_unwritable_dir_errors() {
        let sink = JsonDirSink::new(PathBuf::from("/dev/null/not-a-dir"));
        let result = ExecutionResult {
            returned: json!(null),
            calls: vec![],
        };
        assert!(sink.write(&RunId::generate(), &result).is_err());
    }
}
