use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use ns_core::{FrameId, ScriptTable, ScriptValue, TableKey};
use regex::Regex;
use tracing::warn;

use crate::heap::{Handle, Heap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarScope {
    Character,
    CharacterTemp,
    Account,
    AccountGlobal,
    Server,
    Npc,
    NpcTemp,
    Instance,
}

impl VarScope {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Character => "",
            Self::CharacterTemp => "@",
            Self::Account => "#",
            Self::AccountGlobal => "##",
            Self::Server => "$",
            Self::Npc => ".",
            Self::NpcTemp => ".@",
            Self::Instance => "'",
        }
    }

    /// Script-facing scope names, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "character" | "char" | "player" => Some(Self::Character),
            "character_temp" | "char_temp" | "player_temp" => Some(Self::CharacterTemp),
            "account" => Some(Self::Account),
            "account_global" | "global_account" | "account2" => Some(Self::AccountGlobal),
            "map_server" | "server" | "global" => Some(Self::Server),
            "npc" => Some(Self::Npc),
            "npc_temp" | "local" => Some(Self::NpcTemp),
            "instance" => Some(Self::Instance),
            _ => None,
        }
    }

    fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "@" => Self::CharacterTemp,
            "#" => Self::Account,
            "##" => Self::AccountGlobal,
            "$" => Self::Server,
            "." => Self::Npc,
            ".@" => Self::NpcTemp,
            "'" => Self::Instance,
            _ => Self::Character,
        }
    }
}

/// Largest index `setarray` writes to.
pub const MAX_ARRAY_INDEX: i64 = i32::MAX as i64;

/// Most slots a single `cleararray` fills.
pub const MAX_ARRAY_FILL: i64 = 65_536;

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\.@|\.|##|#|\$|@|')?(.*?)(\$)?$").expect("variable key regex must compile")
    })
}

/// Structured storage key. `.@` keys carry the frame that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableKey {
    pub scope: VarScope,
    pub name: String,
    pub is_string: bool,
    pub frame: Option<FrameId>,
}

impl VariableKey {
    pub fn new(scope: VarScope, name: impl Into<String>, is_string: bool) -> Self {
        Self {
            scope,
            name: name.into(),
            is_string,
            frame: None,
        }
    }

    /// Splits a raw script name such as `.@count` or `$@names$`.
    pub fn parse(raw: &str) -> Self {
        let Some(captures) = key_pattern().captures(raw) else {
            return Self::new(VarScope::Character, raw, false);
        };
        let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let name = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        Self::new(VarScope::from_prefix(prefix), name, captures.get(3).is_some())
    }

    pub fn in_frame(mut self, frame: Option<FrameId>) -> Self {
        if self.is_local_temp() {
            self.frame = frame;
        }
        self
    }

    pub fn with_string_suffix(&self, is_string: bool) -> Self {
        Self {
            is_string,
            ..self.clone()
        }
    }

    pub fn is_local_temp(&self) -> bool {
        self.scope == VarScope::NpcTemp
    }

    /// `$@name` arrays read as an empty table before first write.
    pub fn is_global_temp(&self) -> bool {
        self.scope == VarScope::Server && self.name.starts_with('@')
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.scope.prefix(), self.name)?;
        if self.is_string {
            f.write_str("$")?;
        }
        if let Some(frame) = self.frame {
            write!(f, "@frame{}", frame)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ScriptVariable {
    Number(f64),
    String(String),
    Boolean(bool),
    Table(Handle<RefCell<ScriptTable>>),
}

impl ScriptVariable {
    fn to_value(&self) -> ScriptValue {
        match self {
            Self::Number(value) => ScriptValue::Number(*value),
            Self::String(value) => ScriptValue::String(value.clone()),
            Self::Boolean(value) => ScriptValue::Bool(*value),
            Self::Table(handle) => ScriptValue::Table(handle.shared()),
        }
    }
}

#[derive(Debug, Default)]
pub struct VariableStore {
    heap: Heap,
    entries: HashMap<VariableKey, ScriptVariable>,
    constants: HashMap<String, f64>,
}

impl VariableStore {
    pub fn new(heap: Heap) -> Self {
        Self {
            heap,
            entries: HashMap::new(),
            constants: HashMap::new(),
        }
    }

    pub fn define_constant(&mut self, name: impl Into<String>, value: f64) {
        self.constants.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, key: &VariableKey) -> Option<ScriptValue> {
        self.entries.get(key).map(ScriptVariable::to_value)
    }

    /// Reads a key, falling back to the naming-convention default when unset.
    pub fn get(&self, key: &VariableKey) -> ScriptValue {
        self.lookup(key).unwrap_or_else(|| self.fallback(key))
    }

    fn fallback(&self, key: &VariableKey) -> ScriptValue {
        if key.is_string {
            return ScriptValue::String(String::new());
        }
        if key.is_global_temp() {
            return ScriptValue::table(ScriptTable::new());
        }
        let constant = self
            .constants
            .get(&key.to_string())
            .copied()
            .unwrap_or_default();
        ScriptValue::Number(constant)
    }

    /// Writes a key. `Nil` deletes it; the previous value is released first.
    pub fn store(&mut self, key: VariableKey, value: ScriptValue) {
        self.entries.remove(&key);
        let variable = match value {
            ScriptValue::Nil => return,
            ScriptValue::Number(value) => ScriptVariable::Number(value),
            ScriptValue::String(value) => ScriptVariable::String(value),
            ScriptValue::Bool(value) => ScriptVariable::Boolean(value),
            ScriptValue::Table(table) => ScriptVariable::Table(self.heap.pin(table)),
        };
        self.entries.insert(key, variable);
    }

    pub fn get_raw(&self, raw: &str, frame: Option<FrameId>) -> ScriptValue {
        self.get(&VariableKey::parse(raw).in_frame(frame))
    }

    pub fn set_raw(&mut self, raw: &str, value: ScriptValue, frame: Option<FrameId>) {
        self.store(VariableKey::parse(raw).in_frame(frame), value);
    }

    /// Scoped read. With an index the string slot wins when it exists,
    /// and a slot that is not a table reads as `Nil`.
    pub fn get_var(
        &self,
        scope: &str,
        name: &str,
        index: Option<&TableKey>,
        frame: Option<FrameId>,
    ) -> ScriptValue {
        let Some(scope) = VarScope::from_name(scope) else {
            return ScriptValue::Nil;
        };
        if name.is_empty() {
            return ScriptValue::Nil;
        }
        let num_key = VariableKey::new(scope, name, false).in_frame(frame);
        let str_key = num_key.with_string_suffix(true);

        if let Some(index) = index {
            let table_key = if self.entries.contains_key(&str_key) {
                &str_key
            } else {
                &num_key
            };
            return match self.entries.get(table_key) {
                Some(ScriptVariable::Table(table)) => {
                    table.borrow().get(index).cloned().unwrap_or_default()
                }
                _ => ScriptValue::Nil,
            };
        }

        self.lookup(&str_key)
            .or_else(|| self.lookup(&num_key))
            .unwrap_or_else(|| self.fallback(&num_key))
    }

    /// Scoped write. The value type picks the slot; an unindexed write
    /// clears the slot of the other type.
    pub fn set_var(
        &mut self,
        scope: &str,
        name: &str,
        value: ScriptValue,
        index: Option<TableKey>,
        frame: Option<FrameId>,
    ) {
        let Some(scope) = VarScope::from_name(scope) else {
            return;
        };
        if name.is_empty() {
            return;
        }
        let target = VariableKey::new(scope, name, value.is_string()).in_frame(frame);

        let Some(index) = index else {
            let other = target.with_string_suffix(!target.is_string);
            self.store(target, value);
            self.store(other, ScriptValue::Nil);
            return;
        };

        let table = match self.entries.get(&target) {
            Some(ScriptVariable::Table(table)) => table.shared(),
            _ => ScriptTable::new_ref(),
        };
        table.borrow_mut().set(index, value);
        self.store(target, ScriptValue::Table(table));
    }

    /// `target` may carry a `[start]` suffix selecting the first index.
    pub fn set_array(&mut self, target: &str, values: Vec<ScriptValue>, frame: Option<FrameId>) {
        let (name, start) = split_array_target(target);
        let key = VariableKey::parse(name).in_frame(frame);
        let table = self.table_for_write(&key);
        {
            let mut table = table.borrow_mut();
            for (offset, value) in values.into_iter().enumerate() {
                let index = i64::try_from(offset)
                    .ok()
                    .and_then(|offset| start.checked_add(offset))
                    .filter(|index| *index <= MAX_ARRAY_INDEX);
                let Some(index) = index else {
                    warn!(
                        array = target,
                        start,
                        offset,
                        "setarray index out of range, dropping the rest"
                    );
                    break;
                };
                table.set(TableKey::Index(index), value);
            }
        }
        self.store(key, ScriptValue::Table(table));
    }

    pub fn clear_array(&mut self, name: &str, value: ScriptValue, count: i64, frame: Option<FrameId>) {
        if count <= 0 {
            return;
        }
        let count = if count > MAX_ARRAY_FILL {
            warn!(array = name, count, limit = MAX_ARRAY_FILL, "cleararray count clamped");
            MAX_ARRAY_FILL
        } else {
            count
        };
        let key = VariableKey::parse(name).in_frame(frame);
        let table = self.table_for_write(&key);
        {
            let mut table = table.borrow_mut();
            for index in 0..count {
                table.set(TableKey::Index(index), value.clone());
            }
        }
        self.store(key, ScriptValue::Table(table));
    }

    pub fn array_size(&self, name: &str, frame: Option<FrameId>) -> i64 {
        match self.get_raw(name, frame) {
            ScriptValue::Table(table) => table.borrow().array_size(),
            _ => 0,
        }
    }

    fn table_for_write(&self, key: &VariableKey) -> ns_core::TableRef {
        match self.get(key) {
            ScriptValue::Table(table) => table,
            _ => ScriptTable::new_ref(),
        }
    }

    /// Drops every `.@` variable owned by a finished frame.
    pub fn release_frame(&mut self, frame: FrameId) {
        self.entries
            .retain(|key, _| !(key.is_local_temp() && key.frame == Some(frame)));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn split_array_target(target: &str) -> (&str, i64) {
    let Some(open) = target.find('[') else {
        return (target, 0);
    };
    let Some(close) = target[open + 1..].find(']').map(|offset| open + 1 + offset) else {
        return (target, 0);
    };
    if close == open + 1 {
        return (target, 0);
    }
    let start = target[open + 1..close].trim().parse::<i64>().unwrap_or(0);
    (&target[..open], start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (Heap, VariableStore) {
        let heap = Heap::new();
        (heap.clone(), VariableStore::new(heap))
    }

    #[test]
    fn parse_splits_prefix_name_and_suffix() {
        let key = VariableKey::parse(".@name$");
        assert_eq!(key.scope, VarScope::NpcTemp);
        assert_eq!(key.name, "name");
        assert!(key.is_string);

        let key = VariableKey::parse("##points");
        assert_eq!(key.scope, VarScope::AccountGlobal);
        assert!(!key.is_string);

        let key = VariableKey::parse("$@list");
        assert_eq!(key.scope, VarScope::Server);
        assert!(key.is_global_temp());

        let key = VariableKey::parse("zeny");
        assert_eq!(key.scope, VarScope::Character);
        assert_eq!(key.to_string(), "zeny");
    }

    #[test]
    fn frame_applies_only_to_local_temp_keys() {
        assert_eq!(VariableKey::parse(".@i").in_frame(Some(4)).frame, Some(4));
        assert_eq!(VariableKey::parse(".i").in_frame(Some(4)).frame, None);
    }

    #[test]
    fn set_then_get_round_trips_every_scope() {
        let (_, mut vars) = store();
        for scope in [
            "character",
            "char_temp",
            "account",
            "account2",
            "server",
            "npc",
            "local",
            "instance",
        ] {
            vars.set_var(scope, "value", ScriptValue::from(7), None, Some(1));
            vars.set_var(scope, "label", ScriptValue::from("x"), None, Some(1));
            assert_eq!(vars.get_var(scope, "value", None, Some(1)), ScriptValue::from(7));
            assert_eq!(vars.get_var(scope, "label", None, Some(1)), ScriptValue::from("x"));

            vars.set_var(scope, "value", ScriptValue::Nil, None, Some(1));
            assert_eq!(vars.get_var(scope, "value", None, Some(1)), ScriptValue::from(0));
        }
    }

    #[test]
    fn string_and_numeric_slots_are_independent() {
        let (_, mut vars) = store();
        vars.set_raw("name", ScriptValue::from(1), None);
        vars.set_raw("name$", ScriptValue::from("abc"), None);
        assert_eq!(vars.get_raw("name", None), ScriptValue::from(1));
        assert_eq!(vars.get_raw("name$", None), ScriptValue::from("abc"));
    }

    #[test]
    fn unindexed_set_var_clears_the_other_type_slot() {
        let (_, mut vars) = store();
        vars.set_var("npc", "mode", ScriptValue::from(3), None, None);
        vars.set_var("npc", "mode", ScriptValue::from("fast"), None, None);
        assert!(vars.lookup(&VariableKey::parse(".mode")).is_none());
        assert_eq!(vars.get_raw(".mode$", None), ScriptValue::from("fast"));
    }

    #[test]
    fn missing_keys_fall_back_by_convention() {
        let (_, mut vars) = store();
        vars.define_constant("MAX_LEVEL", 99.0);
        assert_eq!(vars.get_raw("unset$", None), ScriptValue::from(""));
        assert_eq!(vars.get_raw("MAX_LEVEL", None), ScriptValue::from(99));
        assert_eq!(vars.get_raw("unset", None), ScriptValue::from(0));
        match vars.get_raw("$@list", None) {
            ScriptValue::Table(table) => assert!(table.borrow().is_empty()),
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn unsupported_scope_is_a_no_op() {
        let (_, mut vars) = store();
        vars.set_var("guild", "x", ScriptValue::from(1), None, None);
        assert!(vars.is_empty());
        assert_eq!(vars.get_var("guild", "x", None, None), ScriptValue::Nil);
    }

    #[test]
    fn indexed_access_promotes_and_reads_tables() {
        let (heap, mut vars) = store();
        vars.set_var("server", "scores", ScriptValue::from(1), None, None);
        vars.set_var("server", "scores", ScriptValue::from(50), Some(TableKey::Index(2)), None);
        assert_eq!(heap.live_handles(), 1);
        assert_eq!(
            vars.get_var("server", "scores", Some(&TableKey::Index(2)), None),
            ScriptValue::from(50)
        );
        assert_eq!(vars.get_var("server", "scores", Some(&TableKey::Index(9)), None), ScriptValue::Nil);

        vars.set_var("server", "flat", ScriptValue::from(1), None, None);
        assert_eq!(vars.get_var("server", "flat", Some(&TableKey::Index(0)), None), ScriptValue::Nil);
    }

    #[test]
    fn overwriting_or_deleting_a_table_releases_its_handle() {
        let (heap, mut vars) = store();
        vars.set_raw("list", ScriptValue::table(ScriptTable::new()), None);
        assert_eq!(heap.live_handles(), 1);
        vars.set_raw("list", ScriptValue::table(ScriptTable::new()), None);
        assert_eq!(heap.live_handles(), 1);
        vars.set_raw("list", ScriptValue::from(1), None);
        assert_eq!(heap.live_handles(), 0);
        vars.set_raw("other", ScriptValue::table(ScriptTable::new()), None);
        vars.set_raw("other", ScriptValue::Nil, None);
        assert_eq!(heap.live_handles(), 0);
    }

    #[test]
    fn set_array_honors_start_offset() {
        let (_, mut vars) = store();
        vars.set_array(
            ".@items[2]",
            vec![ScriptValue::from(501), ScriptValue::from(502)],
            Some(3),
        );
        assert_eq!(vars.array_size(".@items", Some(3)), 4);
        assert_eq!(vars.array_size(".@items", Some(4)), 0);
        assert_eq!(
            vars.get_var("local", "items", Some(&TableKey::Index(3)), Some(3)),
            ScriptValue::from(502)
        );
    }

    #[test]
    fn clear_array_fills_count_slots() {
        let (_, mut vars) = store();
        vars.clear_array("$@slots", ScriptValue::from(0), 5, None);
        assert_eq!(vars.array_size("$@slots", None), 5);
        vars.clear_array("$@none", ScriptValue::from(0), 0, None);
        assert!(vars.lookup(&VariableKey::parse("$@none")).is_none());
    }

    #[test]
    fn set_array_stops_at_the_index_limit() {
        let (_, mut vars) = store();
        vars.set_array(
            "$@edge[2147483646]",
            vec![ScriptValue::from(1), ScriptValue::from(2), ScriptValue::from(3)],
            None,
        );
        assert_eq!(vars.array_size("$@edge", None), MAX_ARRAY_INDEX + 1);
        assert_eq!(
            vars.get_var("map_server", "@edge", Some(&TableKey::Index(MAX_ARRAY_INDEX)), None),
            ScriptValue::from(2)
        );

        vars.set_array(
            "$@far[9223372036854775807]",
            vec![ScriptValue::from(1), ScriptValue::from(2)],
            None,
        );
        assert_eq!(vars.array_size("$@far", None), 0);
    }

    #[test]
    fn array_size_of_the_largest_index_saturates() {
        let (_, mut vars) = store();
        let table = ScriptTable::new_ref();
        table
            .borrow_mut()
            .set(TableKey::Index(i64::MAX), ScriptValue::from(1));
        vars.set_raw("$@huge", ScriptValue::Table(table), None);
        assert_eq!(vars.array_size("$@huge", None), i64::MAX);
    }

    #[test]
    fn clear_array_clamps_huge_counts() {
        let (_, mut vars) = store();
        vars.clear_array("$@flags", ScriptValue::from(1), i64::MAX, None);
        assert_eq!(vars.array_size("$@flags", None), MAX_ARRAY_FILL);
    }

    #[test]
    fn release_frame_drops_only_that_frames_locals() {
        let (_, mut vars) = store();
        vars.set_raw(".@i", ScriptValue::from(1), Some(1));
        vars.set_raw(".@i", ScriptValue::from(2), Some(2));
        vars.set_raw(".count", ScriptValue::from(3), Some(1));
        vars.release_frame(1);
        assert_eq!(vars.get_raw(".@i", Some(1)), ScriptValue::from(0));
        assert_eq!(vars.get_raw(".@i", Some(2)), ScriptValue::from(2));
        assert_eq!(vars.get_raw(".count", Some(1)), ScriptValue::from(3));
    }
}
