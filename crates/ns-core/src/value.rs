use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Shared, interior-mutable table living on the interpreter heap.
///
/// Cloning a `TableRef` aliases the same table, the way a script value
/// referring to a table does. Ownership that has to be accounted for goes
/// through the runtime heap handles instead.
pub type TableRef = Rc<RefCell<ScriptTable>>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableKey {
    Index(i64),
    Field(String),
}

impl TableKey {
    pub fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(Self::Index)
            .unwrap_or_else(|_| Self::Field(raw.to_string()))
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Field(name) => f.write_str(name),
        }
    }
}

impl From<i64> for TableKey {
    fn from(value: i64) -> Self {
        Self::Index(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptTable {
    entries: BTreeMap<TableKey, ScriptValue>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_ref() -> TableRef {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn from_values(values: impl IntoIterator<Item = ScriptValue>) -> Self {
        let mut table = Self::new();
        for (index, value) in values.into_iter().enumerate() {
            table.set(TableKey::Index(index as i64), value);
        }
        table
    }

    pub fn get(&self, key: &TableKey) -> Option<&ScriptValue> {
        self.entries.get(key)
    }

    /// Writing `Nil` removes the entry.
    pub fn set(&mut self, key: TableKey, value: ScriptValue) {
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableKey, &ScriptValue)> {
        self.entries.iter()
    }

    /// Highest non-negative integer index plus one, 0 for a table without one.
    /// Saturates at `i64::MAX`.
    pub fn array_size(&self) -> i64 {
        self.entries
            .keys()
            .filter_map(|key| match key {
                TableKey::Index(index) if *index >= 0 => Some(*index),
                _ => None,
            })
            .max()
            .map(|max| max.saturating_add(1))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScriptValue {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Table(TableRef),
}

impl ScriptValue {
    pub fn table(table: ScriptTable) -> Self {
        Self::Table(Rc::new(RefCell::new(table)))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Table(_) => "table",
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Nil => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => {
                if value.fract().abs() < f64::EPSILON {
                    (*value as i64).to_string()
                } else {
                    value.to_string()
                }
            }
            Self::String(value) => value.clone(),
            Self::Table(table) => format!("table({} entries)", table.borrow().len()),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
