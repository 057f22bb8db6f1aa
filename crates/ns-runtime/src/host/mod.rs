//! Collaborator interfaces the runtime calls out to.

mod session;
mod timer;

pub use session::{PlayerSession, RecordingSession, SessionEvent};
pub use timer::TickTimerQueue;

use ns_core::{InstanceId, ObjectId, PlayerId, ScriptError, ScriptValue};

/// A player's interaction target and command-restriction flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub npc_id: ObjectId,
    pub commands_disabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetachOptions {
    pub clear_overlay: bool,
    /// Set only when the restored target is empty.
    pub dequeue_event: bool,
}

pub trait SessionHost {
    fn player_exists(&self, player_id: PlayerId) -> bool;

    /// Makes `object_id` the player's interaction target and returns the
    /// state it replaced, or `None` when the player is not online.
    fn attach(&mut self, player_id: PlayerId, object_id: ObjectId) -> Option<InteractionState>;

    fn detach(
        &mut self,
        player_id: PlayerId,
        object_id: ObjectId,
        previous: InteractionState,
        options: DetachOptions,
    );

    fn show_message(&mut self, player_id: PlayerId, npc_id: ObjectId, text: &str);
    fn show_next(&mut self, player_id: PlayerId, npc_id: ObjectId);
    fn clear_dialog(&mut self, player_id: PlayerId, npc_id: ObjectId);
    fn show_close(&mut self, player_id: PlayerId, npc_id: ObjectId);
    fn show_menu(&mut self, player_id: PlayerId, npc_id: ObjectId, text: &str, option_count: usize);
    fn request_input(&mut self, player_id: PlayerId, npc_id: ObjectId, is_string: bool);

    // Recorded responses are consumed on read.
    fn take_menu_selection(&mut self, player_id: PlayerId) -> i32;
    fn take_input_amount(&mut self, player_id: PlayerId) -> i32;
    fn take_input_text(&mut self, player_id: PlayerId) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

pub trait TimerHost {
    /// Arranges for `wake_on_timer(instance)` after `delay_ticks`.
    fn schedule_once(&mut self, delay_ticks: u32, instance: InstanceId) -> Option<TimerHandle>;
    fn cancel(&mut self, handle: TimerHandle);
}

/// Who a game-action binding is acting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub player_id: PlayerId,
    pub object_id: ObjectId,
    pub owner_name: String,
}

pub trait HostFunctionRegistry {
    fn call(
        &self,
        context: &ActionContext,
        name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError>;
    fn names(&self) -> &[String];
}

#[derive(Debug, Default)]
pub struct EmptyHostFunctionRegistry {
    names: Vec<String>,
}

impl HostFunctionRegistry for EmptyHostFunctionRegistry {
    fn call(
        &self,
        _context: &ActionContext,
        _name: &str,
        _args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        Err(ScriptError::new(
            "ENGINE_HOST_FUNCTION_MISSING",
            "Host function registry is empty.",
        ))
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}
