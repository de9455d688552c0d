use std::fs;
use std::path::Path;

use ent_core::{EntError, ErrorInfo};
use ent_fit::to_canonical_json_bytes;
use serde::{de::DeserializeOwned, Serialize};

fn serde_error(code: &str, err: impl ToString) -> EntError {
    EntError::Serde(ErrorInfo::new(code, err.to_string()))
}

pub(crate) fn io_error(code: &str, path: &Path, err: impl ToString) -> EntError {
    EntError::Io(ErrorInfo::new(code, err.to_string()).with_context("path", path.display()))
}

/// Deserializes a YAML payload into the requested type.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, EntError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}

/// Writes `value` as canonical JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EntError> {
    let bytes = to_canonical_json_bytes(value)?;
    fs::write(path, bytes).map_err(|err| io_error("json_write", path, err))
}
