use std::fmt::Display;

use ns_core::ScriptError;

fn map_error(code: &'static str, error: impl Display) -> ScriptError {
    ScriptError::new(code, error.to_string())
}

/// Prints the failure in the `KEY:value` result format and returns the exit code.
pub(crate) fn emit_error(error: anyhow::Error) -> i32 {
    let (code, message) = match error.downcast_ref::<ScriptError>() {
        Some(error) => (error.code.clone(), error.message.clone()),
        None => ("CLI_ERROR".to_string(), format!("{:#}", error)),
    };
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&message).unwrap_or_else(|_| "\"\"".to_string())
    );
    1
}

pub(crate) fn map_line_io(error: std::io::Error) -> ScriptError {
    map_error("CLI_LINE_IO", error)
}

pub(crate) fn map_bundle_read(error: std::io::Error) -> ScriptError {
    map_error("CLI_BUNDLE_READ", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(ScriptError::new("ERR", "failed").into());
        assert_eq!(code, 1);
        assert_eq!(emit_error(anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(
            map_line_io(std::io::Error::other("io")).code,
            "CLI_LINE_IO"
        );
        assert_eq!(
            map_bundle_read(std::io::Error::other("read")).code,
            "CLI_BUNDLE_READ"
        );
    }
}
