use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use ns_core::{
    FrameId, InstanceId, ObjectId, PlayerId, RuntimeConfig, ScriptChunk, ScriptError, ScriptValue,
};

use crate::context::{CallStack, ExecutionContext, WaitState};
use crate::heap::{Handle, Heap};
use crate::host::{EmptyHostFunctionRegistry, HostFunctionRegistry, SessionHost, TimerHandle, TimerHost};
use crate::pending::PendingInteractions;
use crate::registry::Registry;
use crate::variables::VariableStore;

mod bridge;
mod builtins;
mod callstack;
mod eval;
mod instance;
mod step;


pub use builtins::BUILTIN_NAMES;

/// Reply code passed to a menu that the player dismissed.
pub const MENU_CANCELLED: i32 = 0xff;

#[derive(Clone)]
pub struct ScriptRuntimeOptions {
    pub config: RuntimeConfig,
    pub session: Rc<RefCell<dyn SessionHost>>,
    pub timers: Rc<RefCell<dyn TimerHost>>,
    pub host_functions: Option<Rc<dyn HostFunctionRegistry>>,
}

/// State the rhai builtins reach into while a script runs.
#[derive(Debug, Default)]
pub(crate) struct ScriptState {
    pub(crate) vars: VariableStore,
    pub(crate) stack: CallStack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineStatus {
    Created,
    Running,
    Suspended,
    Dead,
}

#[derive(Debug)]
pub(crate) struct Coroutine {
    pub(crate) chunk: Handle<ScriptChunk>,
    pub(crate) pc: usize,
    pub(crate) status: CoroutineStatus,
}

#[derive(Debug)]
pub(crate) struct RuntimeInstance {
    pub(crate) id: InstanceId,
    pub(crate) coroutine: Handle<RefCell<Coroutine>>,
    pub(crate) timer: Option<TimerHandle>,
    pub(crate) display_name: String,
    /// Saved top frame; `None` only while the instance is being resumed.
    pub(crate) execution: Option<ExecutionContext>,
}

pub struct ScriptRuntime {
    config: RuntimeConfig,
    heap: Heap,
    registry: Registry,
    state: Rc<RefCell<ScriptState>>,
    session: Rc<RefCell<dyn SessionHost>>,
    timers: Rc<RefCell<dyn TimerHost>>,
    rhai_engine: rhai::Engine,
    instances: BTreeMap<InstanceId, RuntimeInstance>,
    pending: PendingInteractions,
    next_instance_id: InstanceId,
    next_frame_id: FrameId,
    steps_this_resume: usize,
}

impl ScriptRuntime {
    pub fn new(options: ScriptRuntimeOptions) -> Result<Self, ScriptError> {
        let host_functions: Rc<dyn HostFunctionRegistry> = options
            .host_functions
            .unwrap_or_else(|| Rc::new(EmptyHostFunctionRegistry::default()));

        if let Some(name) = host_functions
            .names()
            .iter()
            .find(|name| BUILTIN_NAMES.contains(&name.as_str()))
        {
            return Err(ScriptError::new(
                "ENGINE_HOST_FUNCTION_RESERVED",
                format!("hostFunctions cannot register reserved builtin name \"{}\".", name),
            ));
        }

        let heap = Heap::new();
        let state = Rc::new(RefCell::new(ScriptState {
            vars: VariableStore::new(heap.clone()),
            stack: CallStack::default(),
        }));
        let rhai_engine = builtins::build_engine(
            &state,
            host_functions,
            options.config.max_steps_per_resume,
        );

        Ok(Self {
            config: options.config,
            heap,
            registry: Registry::default(),
            state,
            session: options.session,
            timers: options.timers,
            rhai_engine,
            instances: BTreeMap::new(),
            pending: PendingInteractions::default(),
            next_instance_id: 1,
            next_frame_id: 1,
            steps_this_resume: 0,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn define_constant(&mut self, name: impl Into<String>, value: f64) {
        self.state.borrow_mut().vars.define_constant(name, value);
    }

    pub fn variable(&self, raw: &str) -> ScriptValue {
        self.state.borrow().vars.get_raw(raw, None)
    }

    pub fn set_variable(&mut self, raw: &str, value: ScriptValue) {
        self.state.borrow_mut().vars.set_raw(raw, value, None);
    }

    pub fn variable_count(&self) -> usize {
        self.state.borrow().vars.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances.keys().copied().collect()
    }

    pub fn instance_wait(&self, id: InstanceId) -> Option<WaitState> {
        self.instances
            .get(&id)
            .and_then(|instance| instance.execution.as_ref())
            .map(|context| context.wait.clone())
    }

    pub fn instance_name(&self, id: InstanceId) -> Option<&str> {
        self.instances
            .get(&id)
            .map(|instance| instance.display_name.as_str())
    }

    pub fn has_timer(&self, id: InstanceId) -> bool {
        self.instances
            .get(&id)
            .is_some_and(|instance| instance.timer.is_some())
    }

    pub fn pending_instance(&self, player_id: PlayerId, object_id: ObjectId) -> Option<InstanceId> {
        self.pending.lookup(player_id, object_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Wait of the instance routed to (player, object), if any.
    pub fn pending_wait(&self, player_id: PlayerId, object_id: ObjectId) -> Option<WaitState> {
        self.pending_instance(player_id, object_id)
            .and_then(|id| self.instance_wait(id))
    }

    pub fn call_depth(&self) -> usize {
        self.state.borrow().stack.len()
    }

    fn allocate_frame_id(&mut self) -> FrameId {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        id
    }

    /// Skips 0 and ids still in use after wrap-around.
    fn allocate_instance_id(&mut self) -> InstanceId {
        loop {
            let id = self.next_instance_id;
            self.next_instance_id = self.next_instance_id.wrapping_add(1);
            if self.next_instance_id == 0 {
                self.next_instance_id = 1;
            }
            if id != 0 && !self.instances.contains_key(&id) {
                return id;
            }
        }
    }
}
