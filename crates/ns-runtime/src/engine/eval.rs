use ns_core::{ScriptError, ScriptValue};
use rhai::{Dynamic, Scope};

use super::ScriptRuntime;
use crate::helpers::rhai_bridge::{dynamic_to_value, value_to_number};

impl ScriptRuntime {
    pub(super) fn run_code(&self, code: &str) -> Result<(), ScriptError> {
        let mut scope = Scope::new();
        self.rhai_engine
            .run_with_scope(&mut scope, code)
            .map_err(|error| {
                ScriptError::new("ENGINE_EVAL_ERROR", format!("Code eval failed: {}", error))
            })
    }

    pub(super) fn eval_expression(&self, expr: &str) -> Result<ScriptValue, ScriptError> {
        let mut scope = Scope::new();
        self.rhai_engine
            .eval_with_scope::<Dynamic>(&mut scope, &format!("({})", expr))
            .map_err(|error| {
                ScriptError::new(
                    "ENGINE_EVAL_ERROR",
                    format!("Expression eval failed: {}", error),
                )
            })
            .and_then(dynamic_to_value)
    }

    pub(super) fn eval_all(&self, exprs: &[String]) -> Result<Vec<ScriptValue>, ScriptError> {
        exprs
            .iter()
            .map(|expr| self.eval_expression(expr))
            .collect()
    }

    pub(super) fn eval_text(&self, expr: &str) -> Result<String, ScriptError> {
        self.eval_expression(expr).map(|value| value.to_text())
    }

    /// Booleans as-is, numbers by non-zero.
    pub(super) fn eval_condition(&self, expr: &str) -> Result<bool, ScriptError> {
        match self.eval_expression(expr)? {
            ScriptValue::Bool(value) => Ok(value),
            ScriptValue::Number(value) => Ok(value != 0.0),
            _ => Err(ScriptError::new(
                "ENGINE_BOOLEAN_EXPECTED",
                format!("Expression \"{}\" must evaluate to boolean.", expr),
            )),
        }
    }

    pub(super) fn eval_number(&self, expr: &str) -> Result<f64, ScriptError> {
        let value = self.eval_expression(expr)?;
        value_to_number(&value).ok_or_else(|| {
            ScriptError::new(
                "ENGINE_NUMBER_EXPECTED",
                format!(
                    "Expression \"{}\" must evaluate to number, got {}.",
                    expr,
                    value.type_name()
                ),
            )
        })
    }

    /// Writes through the raw-key path of the active frame.
    pub(super) fn assign(&self, raw: &str, value: ScriptValue) {
        let mut state = self.state.borrow_mut();
        let frame = state.stack.current_frame_id();
        state.vars.set_raw(raw, value, frame);
    }
}
