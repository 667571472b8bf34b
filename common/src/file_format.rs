use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|os_str| os_str.to_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_file_name(file_name: &str) -> FileFormatResult<Self> {
        let ext = get_file_extension(file_name).ok_or(FileExtensionError::MissingFileExtension)?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FileExtensionError::UnsupportedFileExtension(
                file_name.to_string(),
            ))
        }
    }
}

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> SerdeFormatResult<String> {
    Ok(match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    })
}

pub fn deserialize<T: DeserializeOwned>(
    serialized: &str,
    format: FileFormat,
) -> SerdeFormatResult<T> {
    Ok(match format {
        FileFormat::Yaml => serde_yml::from_str(serialized)?,
        FileFormat::Json => serde_json::from_str(serialized)?,
    })
}

/// Reads a YAML or JSON file, picking the format from its extension.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file_name = path.to_string_lossy();
    let format = FileFormat::from_file_name(&file_name)?;
    let text = std::fs::read_to_string(path)?;

    Ok(deserialize(&text, format)?)
}

pub fn save_file<T: Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    let file_name = path.to_string_lossy();
    let format = FileFormat::from_file_name(&file_name)?;
    std::fs::write(path, serialize(value, format)?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        dims: [i64; 3],
    }

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(FileFormat::from_file_name("a.yaml").unwrap(), FileFormat::Yaml);
        assert_eq!(FileFormat::from_file_name("a.YML").unwrap(), FileFormat::Yaml);
        assert_eq!(FileFormat::from_file_name("a.json").unwrap(), FileFormat::Json);
        assert!(matches!(
            FileFormat::from_file_name("a.toml"),
            Err(FileExtensionError::UnsupportedFileExtension(_))
        ));
        assert!(matches!(
            FileFormat::from_file_name("config"),
            Err(FileExtensionError::MissingFileExtension)
        ));
    }

    #[test]
    fn save_then_load_both_formats() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sample = Sample {
            name: "blocks".to_string(),
            dims: [4, 8, 16],
        };

        for name in ["sample.yaml", "sample.json"] {
            let path = dir.path().join(name);
            save_file(&sample, &path)?;
            let loaded: Sample = load_file(&path)?;
            assert_eq!(loaded, sample);
        }

        Ok(())
    }
}
