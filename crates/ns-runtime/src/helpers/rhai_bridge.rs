use ns_core::{ScriptError, ScriptTable, ScriptValue, TableKey};
use rhai::{Array, Dynamic, ImmutableString, Map, FLOAT, INT};

pub(crate) fn value_to_dynamic(value: &ScriptValue) -> Dynamic {
    match value {
        ScriptValue::Nil => Dynamic::UNIT,
        ScriptValue::Bool(value) => Dynamic::from_bool(*value),
        ScriptValue::Number(value) => number_to_dynamic(*value),
        ScriptValue::String(value) => Dynamic::from(value.clone()),
        ScriptValue::Table(table) => {
            let mut map = Map::new();
            for (key, value) in table.borrow().iter() {
                map.insert(key.to_string().into(), value_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

fn number_to_dynamic(value: f64) -> Dynamic {
    if value.fract() == 0.0 && value >= INT::MIN as f64 && value <= INT::MAX as f64 {
        Dynamic::from_int(value as INT)
    } else {
        Dynamic::from_float(value as FLOAT)
    }
}

pub(crate) fn dynamic_to_value(value: Dynamic) -> Result<ScriptValue, ScriptError> {
    if value.is_unit() {
        return Ok(ScriptValue::Nil);
    }
    if value.is::<bool>() {
        return Ok(ScriptValue::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(ScriptValue::Number(value.cast::<INT>() as f64));
    }
    if value.is::<FLOAT>() {
        return Ok(ScriptValue::Number(value.cast::<FLOAT>()));
    }
    if value.is::<ImmutableString>() {
        return Ok(ScriptValue::String(
            value.cast::<ImmutableString>().to_string(),
        ));
    }
    if value.is::<char>() {
        return Ok(ScriptValue::String(value.cast::<char>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut values = Vec::with_capacity(array.len());
        for item in array {
            values.push(dynamic_to_value(item)?);
        }
        return Ok(ScriptValue::table(ScriptTable::from_values(values)));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut table = ScriptTable::new();
        for (key, value) in map {
            table.set(TableKey::parse(key.as_str()), dynamic_to_value(value)?);
        }
        return Ok(ScriptValue::table(table));
    }

    Err(ScriptError::new(
        "ENGINE_VALUE_UNSUPPORTED",
        format!("Unsupported Rhai value type \"{}\".", value.type_name()),
    ))
}

pub(crate) fn dynamic_to_table_key(value: &Dynamic) -> Option<TableKey> {
    if value.is::<INT>() {
        return Some(TableKey::Index(value.clone().cast::<INT>()));
    }
    if value.is::<FLOAT>() {
        let number = value.clone().cast::<FLOAT>();
        if number.fract() == 0.0 {
            return Some(TableKey::Index(number as i64));
        }
        return None;
    }
    if value.is::<ImmutableString>() {
        return Some(TableKey::parse(
            value.clone().cast::<ImmutableString>().as_str(),
        ));
    }
    None
}

/// Numeric view used by control flow and counters; booleans count as 0/1.
pub(crate) fn value_to_number(value: &ScriptValue) -> Option<f64> {
    match value {
        ScriptValue::Number(value) => Some(*value),
        ScriptValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
        ScriptValue::String(value) => value.trim().parse::<f64>().ok(),
        ScriptValue::Nil | ScriptValue::Table(_) => None,
    }
}
