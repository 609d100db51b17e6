//! Runtime configuration for intake, decoding and the backing store.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::{IngestError, IngestResult};

pub const ENV_STORE_DIR: &str = "OFFERING_INGEST_STORE_DIR";
pub const ENV_COLLECTION: &str = "OFFERING_INGEST_COLLECTION";
pub const ENV_CHARSET: &str = "OFFERING_INGEST_CHARSET";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target collection for committed offerings
    pub collection: String,
    /// File extensions accepted at intake (without the dot)
    pub accepted_extensions: Vec<String>,
    /// Accept `.csv.gz` / `.csv.zst` uploads
    pub allow_compressed: bool,
    /// WHATWG encoding label of uploads
    pub charset: String,
    pub delimiter: char,
    pub max_upload_bytes: u64,
    /// Directory backing the file store
    pub store_dir: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            collection: "offerings".to_string(),
            accepted_extensions: vec!["csv".to_string()],
            allow_compressed: false,
            charset: "utf-8".to_string(),
            delimiter: ',',
            max_upload_bytes: 10 * 1024 * 1024,
            store_dir: PathBuf::from("./data"),
        }
    }
}

impl IngestConfig {
    pub fn from_toml_str(s: &str) -> IngestResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> IngestResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Environment variables win over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(ENV_STORE_DIR) {
            self.store_dir = PathBuf::from(dir);
        }
        if let Ok(collection) = env::var(ENV_COLLECTION) {
            self.collection = collection;
        }
        if let Ok(charset) = env::var(ENV_CHARSET) {
            self.charset = charset;
        }
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.collection.trim().is_empty() {
            return Err(invalid("collection", "must not be empty"));
        }
        if self.accepted_extensions.is_empty() {
            return Err(invalid("accepted_extensions", "at least one extension is required"));
        }
        self.delimiter_byte()?;
        if self.max_upload_bytes == 0 {
            return Err(invalid("max_upload_bytes", "must be greater than 0"));
        }
        self.encoding()?;
        Ok(())
    }

    pub fn encoding(&self) -> IngestResult<&'static encoding_rs::Encoding> {
        encoding_rs::Encoding::for_label(self.charset.trim().as_bytes())
            .ok_or_else(|| invalid("charset", &format!("unknown encoding '{}'", self.charset)))
    }

    /// The delimiter as the single byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> IngestResult<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(|b| b.is_ascii() && !matches!(b, b'"' | b'\n' | b'\r'))
            .ok_or_else(|| {
                invalid(
                    "delimiter",
                    "must be a single ASCII character other than a quote or line break",
                )
            })
    }
}

fn invalid(field: &str, message: &str) -> IngestError {
    IngestError::Config {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = IngestConfig::default();
        config.validate().unwrap();
        assert_eq!(config.collection, "offerings");
        assert_eq!(config.delimiter_byte().unwrap(), b',');
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            charset = "windows-1252"
            delimiter = ";"
            "#,
        )
        .unwrap();
        assert_eq!(config.encoding().unwrap(), encoding_rs::WINDOWS_1252);
        assert_eq!(config.delimiter_byte().unwrap(), b';');
        assert_eq!(config.accepted_extensions, vec!["csv".to_string()]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(IngestConfig::from_toml_str(r#"charset = "klingon""#).is_err());
        assert!(IngestConfig::from_toml_str(r#"delimiter = "é""#).is_err());
        assert!(IngestConfig::from_toml_str(r#"collection = "  ""#).is_err());
        assert!(IngestConfig::from_toml_str("max_upload_bytes = 0").is_err());
        assert!(IngestConfig::from_toml_str("accepted_extensions = []").is_err());
    }

    #[test]
    fn delimiter_built_in_code_is_checked() {
        for bad in ['é', '"', '\r', '€'] {
            let config = IngestConfig {
                delimiter: bad,
                ..Default::default()
            };
            let err = config.delimiter_byte().unwrap_err();
            assert!(
                matches!(&err, IngestError::Config { field, .. } if field == "delimiter"),
                "{bad:?}"
            );
        }
    }
}
