use std::path::{Path, PathBuf};

use basinio_store::DEFAULT_MIN_BYTES_TO_COMPRESS;
use serde::{Deserialize, Serialize};

/// Settings for one export pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Threads used for retrieval, merging and compression, including the
    /// calling thread.
    pub num_threads: usize,
    /// Gzip payloads before writing.
    pub compress: bool,
    /// Payloads of at most this many bytes are stored uncompressed.
    pub min_bytes_to_compress: usize,
    /// Cell-center maps and volumes and merge formation volumes before
    /// writing.
    pub center: bool,
    /// Appended to the XML file stem to name the blob directory.
    pub output_suffix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            compress: true,
            min_bytes_to_compress: DEFAULT_MIN_BYTES_TO_COMPRESS,
            center: false,
            output_suffix: "_output".into(),
        }
    }
}

impl ExportConfig {
    /// Name of the blob directory for `xml_path`, relative to its parent.
    pub fn output_dir_name(&self, xml_path: &Path) -> PathBuf {
        let stem = xml_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        PathBuf::from(format!("{stem}{}", self.output_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ExportConfig::default();
        assert_eq!(c.num_threads, 1);
        assert!(c.compress);
        assert_eq!(c.min_bytes_to_compress, 50);
        assert!(!c.center);
        assert_eq!(c.output_dir_name(Path::new("/tmp/run/project.xml")), PathBuf::from("project_output"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c: ExportConfig = toml::from_str("num_threads = 4\ncenter = true\n").unwrap();
        assert_eq!(c.num_threads, 4);
        assert!(c.center);
        assert!(c.compress);
        assert_eq!(c.output_suffix, "_output");
    }
}
