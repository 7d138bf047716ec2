use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::BYTES_PER_KB;
use crate::error::{Result, SortError};
use crate::external_sort::constants::*;

/// Where sorted lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTransport {
    #[default]
    File,
    Passthrough,
    FileAndPassthrough,
}

impl DataTransport {
    pub fn writes_file(&self) -> bool {
        matches!(self, DataTransport::File | DataTransport::FileAndPassthrough)
    }

    pub fn uses_passthrough(&self) -> bool {
        matches!(self, DataTransport::Passthrough | DataTransport::FileAndPassthrough)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Folder for sorted, duplicate and merge-purge output. Defaults to the
    /// source file's folder.
    pub destination_folder: Option<PathBuf>,
    /// Folder the staging store is created in. Defaults to the destination.
    pub temp_directory: Option<PathBuf>,
    pub max_batch_size: usize,
    pub return_duplicates: bool,
    pub transport: DataTransport,
    pub cache_capacity_mb: usize,
    pub io_buffer_size_kb: usize,
    pub progress_log_interval: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            destination_folder: None,
            temp_directory: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            return_duplicates: false,
            transport: DataTransport::File,
            cache_capacity_mb: DEFAULT_CACHE_CAPACITY_MB,
            io_buffer_size_kb: DEFAULT_IO_BUFFER_SIZE_KB,
            progress_log_interval: PROGRESS_REPORT_INTERVAL_RECORDS,
        }
    }
}

impl SortConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size < MIN_MAX_BATCH_SIZE || self.max_batch_size > MAX_MAX_BATCH_SIZE {
            return Err(SortError::invalid(format!(
                "Max batch size must be between {} and {}",
                MIN_MAX_BATCH_SIZE, MAX_MAX_BATCH_SIZE
            )));
        }

        if self.cache_capacity_mb < MIN_CACHE_CAPACITY_MB
            || self.cache_capacity_mb > MAX_CACHE_CAPACITY_MB
        {
            return Err(SortError::invalid(format!(
                "Cache capacity must be between {} and {} MB",
                MIN_CACHE_CAPACITY_MB, MAX_CACHE_CAPACITY_MB
            )));
        }

        if self.io_buffer_size_kb < MIN_IO_BUFFER_SIZE_KB
            || self.io_buffer_size_kb > MAX_IO_BUFFER_SIZE_KB
        {
            return Err(SortError::invalid(format!(
                "IO buffer size must be between {} and {} KB",
                MIN_IO_BUFFER_SIZE_KB, MAX_IO_BUFFER_SIZE_KB
            )));
        }

        if let Some(folder) = &self.destination_folder {
            if !folder.is_dir() {
                return Err(SortError::DestinationNotFound(folder.clone()));
            }
        }

        if let Some(folder) = &self.temp_directory {
            if !folder.is_dir() {
                return Err(SortError::DestinationNotFound(folder.clone()));
            }
        }

        Ok(())
    }

    pub fn with_destination(mut self, folder: impl Into<PathBuf>) -> Self {
        self.destination_folder = Some(folder.into());
        self
    }

    pub fn with_duplicates(mut self, return_duplicates: bool) -> Self {
        self.return_duplicates = return_duplicates;
        self
    }

    pub fn with_transport(mut self, transport: DataTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Destination folder for outputs derived from `source_path`.
    pub fn destination_for(&self, source_path: &Path) -> PathBuf {
        match &self.destination_folder {
            Some(folder) => folder.clone(),
            None => source_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn staging_directory(&self, destination: &Path) -> PathBuf {
        self.temp_directory
            .clone()
            .unwrap_or_else(|| destination.to_path_buf())
    }

    pub fn io_buffer_size_bytes(&self) -> usize {
        self.io_buffer_size_kb * BYTES_PER_KB
    }

    pub fn output_buffer_size_bytes(&self) -> usize {
        OUTPUT_BUFFER_SIZE_KB * BYTES_PER_KB
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        let config = SortConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_batch_size, 250_000);
        assert_eq!(config.transport, DataTransport::File);
    }

    #[test]
    fn test_batch_size_bounds() {
        let config = SortConfig::default().with_max_batch_size(0);
        assert!(config.validate().is_err());

        let config = SortConfig::default().with_max_batch_size(i32::MAX as usize + 1);
        assert!(config.validate().is_err());

        let config = SortConfig::default().with_max_batch_size(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_io_buffer_bounds() {
        let mut config = SortConfig::default();
        config.io_buffer_size_kb = 0;
        assert!(config.validate().is_err());

        config.io_buffer_size_kb = usize::MAX;
        assert!(config.validate().is_err());

        config.io_buffer_size_kb = MAX_IO_BUFFER_SIZE_KB;
        assert!(config.validate().is_ok());
        assert_eq!(config.io_buffer_size_bytes(), MAX_IO_BUFFER_SIZE_KB * 1024);
    }

    #[test]
    fn test_oversized_io_buffer_in_config_file_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sort.json");
        std::fs::write(&path, format!(r#"{{"io_buffer_size_kb": {}}}"#, usize::MAX)).unwrap();
        assert!(SortConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_missing_destination_rejected() {
        let config = SortConfig::default().with_destination("/definitely/not/here");
        assert!(matches!(
            config.validate(),
            Err(SortError::DestinationNotFound(_))
        ));
    }

    #[test]
    fn test_destination_defaults_to_source_folder() {
        let config = SortConfig::default();
        assert_eq!(
            config.destination_for(Path::new("/data/in/people.csv")),
            PathBuf::from("/data/in")
        );
        assert_eq!(config.destination_for(Path::new("people.csv")), PathBuf::from("."));
        assert_eq!(
            config.staging_directory(Path::new("/data/out")),
            PathBuf::from("/data/out")
        );
    }

    #[test]
    fn test_config_file_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sort.json");
        let config = SortConfig::default()
            .with_duplicates(true)
            .with_transport(DataTransport::FileAndPassthrough);
        config.to_file(&path).unwrap();

        let loaded = SortConfig::from_file(&path).unwrap();
        assert!(loaded.return_duplicates);
        assert_eq!(loaded.transport, DataTransport::FileAndPassthrough);

        std::fs::write(&path, r#"{"max_batch_size": 10}"#).unwrap();
        let partial = SortConfig::from_file(&path).unwrap();
        assert_eq!(partial.max_batch_size, 10);
        assert_eq!(partial.cache_capacity_mb, DEFAULT_CACHE_CAPACITY_MB);
    }
}
