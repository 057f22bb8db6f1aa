use std::collections::{BTreeMap, HashMap};

use ns_core::{NpcId, ScriptChunk};
use tracing::{debug, warn};

use crate::context::OwnerKey;
use crate::heap::Handle;

pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug)]
pub struct LabelBinding {
    pub name: String,
    pub code: Handle<ScriptChunk>,
    /// Numeric dispatch slot; negative or missing means none.
    pub position: Option<i32>,
}

#[derive(Debug)]
pub struct NpcDefinition {
    pub npc_id: NpcId,
    pub exname: String,
    pub main: Option<Handle<ScriptChunk>>,
    pub events: Vec<LabelBinding>,
    pub labels: Vec<LabelBinding>,
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub name: String,
    pub run: Option<Handle<ScriptChunk>>,
    pub labels: Vec<LabelBinding>,
}

/// One loaded owner and the entry points it holds.
#[derive(Debug)]
pub struct ScriptEntryRegistration {
    pub owner: OwnerKey,
    pub name: String,
    main: Option<Handle<ScriptChunk>>,
    events: HashMap<String, Handle<ScriptChunk>>,
    labels: HashMap<String, Handle<ScriptChunk>>,
    positions: BTreeMap<i32, String>,
}

impl ScriptEntryRegistration {
    fn new(owner: OwnerKey, name: String, main: Option<Handle<ScriptChunk>>) -> Self {
        Self {
            owner,
            name,
            main,
            events: HashMap::new(),
            labels: HashMap::new(),
            positions: BTreeMap::new(),
        }
    }

    pub fn main(&self) -> Option<&Handle<ScriptChunk>> {
        self.main.as_ref()
    }

    /// Events shadow labels of the same name.
    pub fn resolve(&self, label: &str) -> Option<&Handle<ScriptChunk>> {
        let key = normalize_name(label);
        self.events.get(&key).or_else(|| self.labels.get(&key))
    }

    /// Internal labels only, as reached by a sub-call.
    pub fn label(&self, label: &str) -> Option<&Handle<ScriptChunk>> {
        self.labels.get(&normalize_name(label))
    }

    pub fn label_at(&self, position: i32) -> Option<&str> {
        self.positions.get(&position).map(String::as_str)
    }

    pub fn handle_count(&self) -> usize {
        usize::from(self.main.is_some()) + self.events.len() + self.labels.len()
    }

    fn bind(&mut self, binding: LabelBinding, is_event: bool, indexed: bool) {
        let key = normalize_name(&binding.name);
        if indexed {
            if let Some(position) = binding.position.filter(|position| *position >= 0) {
                self.positions.insert(position, key.clone());
            }
        }
        if is_event {
            self.events.insert(key, binding.code);
        } else {
            self.labels.insert(key, binding.code);
        }
    }

    fn duplicate(&self, owner: OwnerKey, name: String) -> Self {
        Self {
            owner,
            name,
            main: self.main.as_ref().map(Handle::duplicate),
            events: self
                .events
                .iter()
                .map(|(key, handle)| (key.clone(), handle.duplicate()))
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(key, handle)| (key.clone(), handle.duplicate()))
                .collect(),
            positions: self.positions.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRef<'a> {
    Id(NpcId),
    Name(&'a str),
}

#[derive(Debug, Default)]
pub struct Registry {
    npcs: HashMap<NpcId, ScriptEntryRegistration>,
    npc_names: HashMap<String, NpcId>,
    functions: HashMap<String, ScriptEntryRegistration>,
}

impl Registry {
    /// Replaces any registration held by `definition.npc_id`.
    pub fn register_npc(&mut self, definition: NpcDefinition) -> bool {
        if definition.npc_id <= 0 || definition.exname.is_empty() {
            warn!(
                npc_id = definition.npc_id,
                exname = %definition.exname,
                "npc registration rejected: missing id or name"
            );
            return false;
        }

        self.unregister_npc(definition.npc_id);

        let owner = OwnerKey::Npc(definition.npc_id);
        let mut registration =
            ScriptEntryRegistration::new(owner, definition.exname.clone(), definition.main);
        for binding in definition.events {
            registration.bind(binding, true, true);
        }
        for binding in definition.labels {
            registration.bind(binding, false, true);
        }

        debug!(
            npc_id = definition.npc_id,
            exname = %definition.exname,
            handles = registration.handle_count(),
            "npc registered"
        );
        self.npc_names
            .insert(normalize_name(&definition.exname), definition.npc_id);
        self.npcs.insert(definition.npc_id, registration);
        true
    }

    pub fn register_function(&mut self, definition: FunctionDefinition) -> bool {
        let Some(run) = definition.run else {
            warn!(name = %definition.name, "function registration rejected: no entry point");
            return false;
        };
        if definition.name.is_empty() {
            warn!("function registration rejected: missing name");
            return false;
        }

        let key = normalize_name(&definition.name);
        self.functions.remove(&key);

        let owner = OwnerKey::Function(definition.name.clone());
        let mut registration = ScriptEntryRegistration::new(owner, definition.name, Some(run));
        for binding in definition.labels {
            registration.bind(binding, false, false);
        }
        debug!(name = %key, "function registered");
        self.functions.insert(key, registration);
        true
    }

    pub fn unregister_npc(&mut self, npc_id: NpcId) -> bool {
        let Some(registration) = self.npcs.remove(&npc_id) else {
            return false;
        };
        let key = normalize_name(&registration.name);
        if self.npc_names.get(&key) == Some(&npc_id) {
            self.npc_names.remove(&key);
        }
        true
    }

    pub fn unregister_function(&mut self, name: &str) -> bool {
        self.functions.remove(&normalize_name(name)).is_some()
    }

    /// Registers `target_id` with new handles over the source's code.
    pub fn clone_npc(&mut self, source_id: NpcId, target_id: NpcId, name: Option<&str>) -> bool {
        if target_id <= 0 {
            return false;
        }
        let Some(source) = self.npcs.get(&source_id) else {
            warn!(source_id, target_id, "npc clone rejected: unknown source");
            return false;
        };
        let name = name
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| source.name.clone());
        let clone = source.duplicate(OwnerKey::Npc(target_id), name.clone());

        self.unregister_npc(target_id);
        self.npc_names.insert(normalize_name(&name), target_id);
        self.npcs.insert(target_id, clone);
        true
    }

    pub fn npc(&self, npc_id: NpcId) -> Option<&ScriptEntryRegistration> {
        self.npcs.get(&npc_id)
    }

    pub fn npc_by_name(&self, name: &str) -> Option<&ScriptEntryRegistration> {
        self.npc_names
            .get(&normalize_name(name))
            .and_then(|id| self.npcs.get(id))
    }

    pub fn function(&self, name: &str) -> Option<&ScriptEntryRegistration> {
        self.functions.get(&normalize_name(name))
    }

    /// A name resolves npcs before functions.
    pub fn resolve_owner(&self, owner: OwnerRef<'_>) -> Option<&ScriptEntryRegistration> {
        match owner {
            OwnerRef::Id(npc_id) => self.npc(npc_id),
            OwnerRef::Name(name) => self.npc_by_name(name).or_else(|| self.function(name)),
        }
    }

    pub fn by_owner(&self, owner: &OwnerKey) -> Option<&ScriptEntryRegistration> {
        match owner {
            OwnerKey::Npc(npc_id) => self.npc(*npc_id),
            OwnerKey::Function(name) => self.function(name),
        }
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn clear(&mut self) {
        self.npcs.clear();
        self.npc_names.clear();
        self.functions.clear();
    }
}
