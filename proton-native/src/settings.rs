use std::collections::BTreeMap;

use log::debug;
use proton_error::{ProtonResult, proton_bail};
use proton_io::{ChunkSource, DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_SIZE, ResponseBuffer};
use proton_types::{DEFAULT_BLOCK_BYTES, InsertContextBuilder, set_read_format, set_write_format};
use serde::{Deserialize, Serialize};

/// Process level settings of the driver.
///
/// Every field has a default, so any subset can be given, e.g. from JSON:
///
/// ```
/// use proton_native::DriverSettings;
///
/// let settings = DriverSettings::from_json(r#"{"read_formats": {"IP*": "string"}}"#).unwrap();
/// assert_eq!(settings.chunk_size, 1 << 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverSettings {
    /// Read-ahead budget of a response buffer, in bytes.
    pub http_buffer_size: usize,
    /// Size of the chunks pulled from a blocking transport, in bytes.
    pub chunk_size: usize,
    /// Encoded size insert blocks are sized to, in bytes.
    pub insert_block_bytes: usize,
    /// Blocking transforms the async wrapper runs at once.
    pub dispatch_threads: usize,
    /// Default read formats, by type pattern.
    pub read_formats: BTreeMap<String, String>,
    /// Default write formats, by type pattern.
    pub write_formats: BTreeMap<String, String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            http_buffer_size: DEFAULT_BUFFER_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            insert_block_bytes: DEFAULT_BLOCK_BYTES,
            dispatch_threads: 1,
            read_formats: BTreeMap::new(),
            write_formats: BTreeMap::new(),
        }
    }
}

impl DriverSettings {
    pub fn from_json(text: &str) -> ProtonResult<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ProtonResult<()> {
        for (name, value) in [
            ("http_buffer_size", self.http_buffer_size),
            ("chunk_size", self.chunk_size),
            ("insert_block_bytes", self.insert_block_bytes),
            ("dispatch_threads", self.dispatch_threads),
        ] {
            if value == 0 {
                proton_bail!(Config: "{name} must be greater than zero");
            }
        }
        Ok(())
    }

    /// Add the default formats to the process wide format registry.
    ///
    /// Contexts capture the registry when they are built, so only contexts built afterwards see
    /// the new defaults.
    pub fn install(&self) -> ProtonResult<()> {
        self.validate()?;
        for (pattern, format) in &self.read_formats {
            set_read_format(pattern, format)?;
        }
        for (pattern, format) in &self.write_formats {
            set_write_format(pattern, format)?;
        }
        debug!(
            "installed {} read and {} write formats",
            self.read_formats.len(),
            self.write_formats.len()
        );
        Ok(())
    }

    /// A response buffer over `source` with the configured read-ahead.
    pub fn response_buffer<S: ChunkSource>(&self, source: S) -> ResponseBuffer<S> {
        ResponseBuffer::with_buffer_size(source, self.http_buffer_size)
    }

    /// Apply the insert block budget to a context builder.
    pub fn configure_insert(&self, builder: InsertContextBuilder) -> InsertContextBuilder {
        builder.block_bytes(self.insert_block_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = DriverSettings::from_json("{}").unwrap();
        assert_eq!(settings, DriverSettings::default());
        assert_eq!(settings.http_buffer_size, 10 << 20);
        assert_eq!(settings.insert_block_bytes, 2 << 20);
    }

    #[test]
    fn partial_json() {
        let settings = DriverSettings::from_json(
            r#"{"chunk_size": 4096, "write_formats": {"uuid": "string"}, "dispatch_threads": 4}"#,
        )
        .unwrap();
        assert_eq!(settings.chunk_size, 4096);
        assert_eq!(settings.dispatch_threads, 4);
        assert_eq!(settings.write_formats.get("uuid").map(String::as_str), Some("string"));
        assert_eq!(settings.http_buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn invalid_settings() {
        assert!(DriverSettings::from_json(r#"{"chunk_size": 0}"#).is_err());
        assert!(DriverSettings::from_json(r#"{"chunk_sise": 10}"#).is_err());
        let settings = DriverSettings {
            read_formats: BTreeMap::from([("uuid".to_string(), "hexadecimal".to_string())]),
            ..DriverSettings::default()
        };
        assert!(settings.install().is_err());
    }
}
