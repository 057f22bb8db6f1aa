use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Lower bound applied to a numeric input when the script gives none.
    pub input_min_value: i32,
    pub input_max_value: i32,
    pub max_steps_per_resume: usize,
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            input_min_value: 0,
            input_max_value: i32::MAX,
            max_steps_per_resume: 100_000,
            max_call_depth: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "inputMaxValue": 99 }"#).expect("config should parse");
        assert_eq!(config.input_max_value, 99);
        assert_eq!(config.input_min_value, 0);
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.max_steps_per_resume, 100_000);
    }
}
