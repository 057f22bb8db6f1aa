use std::fs;
use std::path::{Path, PathBuf};

use ns_core::ScriptError;

use crate::map_bundle_read;

pub(crate) fn resolve_bundle_path(raw: &str) -> Result<PathBuf, ScriptError> {
    let path = Path::new(raw);
    if !path.exists() {
        return Err(ScriptError::new(
            "CLI_BUNDLE_NOT_FOUND",
            format!("Bundle file not found: {}", raw),
        ));
    }
    if !path.is_file() {
        return Err(ScriptError::new(
            "CLI_BUNDLE_NOT_FILE",
            format!("Bundle path is not a file: {}", raw),
        ));
    }
    Ok(path.to_path_buf())
}

pub(crate) fn read_bundle_json(raw: &str) -> Result<String, ScriptError> {
    let path = resolve_bundle_path(raw)?;
    fs::read_to_string(path).map_err(map_bundle_read)
}
