use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::EvidenceRecord;
use crate::errors::ForgeError;

/// Where a run's evidence records come from. Loaded once during Preprocessing.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn load(&self) -> Result<Vec<EvidenceRecord>, ForgeError>;

    /// Location shown in logs and failure reports.
    fn describe(&self) -> String;
}

/// Reads the JSON array written by the offline evidence parser.
pub struct JsonFileEvidenceSource {
    path: PathBuf,
}

impl JsonFileEvidenceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EvidenceSource for JsonFileEvidenceSource {
    async fn load(&self) -> Result<Vec<EvidenceRecord>, ForgeError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ForgeError::Configuration(format!(
                "Evidence source {} could not be read: {e}",
                self.path.display()
            ))
        })?;

        let records: Vec<EvidenceRecord> = serde_json::from_str(&raw).map_err(|e| {
            ForgeError::Configuration(format!(
                "Evidence source {} is not a valid record set: {e}",
                self.path.display()
            ))
        })?;

        info!(
            "Loaded {} evidence records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureCategory;
    use crate::testing::record;

    #[tokio::test]
    async fn test_json_source_reads_record_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.json");
        let records = vec![record("ev-1", "Payroll migration", &["Workday"])];
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let loaded = JsonFileEvidenceSource::new(&path).load().await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileEvidenceSource::new(dir.path().join("missing.json"));

        let err = source.load().await.unwrap_err();
        assert_eq!(err.category(), FailureCategory::Configuration);
        assert!(err.to_string().contains("missing.json"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_configuration_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();

        let err = JsonFileEvidenceSource::new(&path).load().await.unwrap_err();
        assert_eq!(err.category(), FailureCategory::Configuration);
    }
}
