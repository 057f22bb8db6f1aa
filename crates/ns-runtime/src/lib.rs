//! Embedded NPC script runtime: registry, variable store, call frames and
//! suspendable script instances driven by host callbacks.

mod context;
mod engine;
mod heap;
mod helpers;
pub mod host;
mod pending;
mod registry;
mod variables;

pub use context::{
    CallStack, ExecutionContext, InputRequest, OwnerKey, ScriptEnv, ScriptFailure, WaitState,
};
pub use engine::{
    CoroutineStatus, ScriptRuntime, ScriptRuntimeOptions, BUILTIN_NAMES, MENU_CANCELLED,
};
pub use heap::{Handle, Heap};
pub use host::{
    ActionContext, DetachOptions, EmptyHostFunctionRegistry, HostFunctionRegistry,
    InteractionState, RecordingSession, SessionHost, TickTimerQueue, TimerHandle, TimerHost,
};
pub use pending::PendingInteractions;
pub use registry::{
    normalize_name, FunctionDefinition, LabelBinding, NpcDefinition, OwnerRef, Registry,
    ScriptEntryRegistration,
};
pub use variables::{ScriptVariable, VarScope, VariableKey, VariableStore};
