use ns_core::{InstanceId, ObjectId, PlayerId, ScriptValue};
use tracing::{debug, warn};

use super::{ScriptRuntime, MENU_CANCELLED};
use crate::context::{InputRequest, WaitState};

/// Validity flag of an input reply: 1 above the bounds, -1 below, else 0.
fn input_flag(value: i64, request: &InputRequest) -> i32 {
    if value > i64::from(request.max) {
        1
    } else if value < i64::from(request.min) {
        -1
    } else {
        0
    }
}

impl ScriptRuntime {
    /// Delivers a player's reply to the instance waiting on
    /// (`player_id`, `object_id`). Returns false when nothing was waiting.
    pub fn continue_dialog(&mut self, player_id: PlayerId, object_id: ObjectId, closing: bool) -> bool {
        if object_id <= 0 {
            return false;
        }
        let Some(id) = self.pending.lookup(player_id, object_id) else {
            return false;
        };
        let Some(wait) = self.instance_wait(id) else {
            self.pending.remove(player_id, object_id);
            return true;
        };

        if matches!(wait, WaitState::AwaitingFinalCloseAck { .. }) {
            self.erase_instance(id, true);
            return true;
        }
        if closing && wait != WaitState::AwaitingCloseAck {
            debug!(instance = id, wait = wait.name(), "dialog closed by player");
            self.erase_instance(id, true);
            return true;
        }

        let args = match &wait {
            WaitState::AwaitingMenuChoice => {
                let selection = if closing {
                    MENU_CANCELLED
                } else {
                    self.session.borrow_mut().take_menu_selection(player_id)
                };
                vec![ScriptValue::from(selection)]
            }
            WaitState::AwaitingInput(request) => {
                vec![ScriptValue::from(self.store_input(id, player_id, request, closing))]
            }
            _ => Vec::new(),
        };

        self.pending.remove_if(player_id, object_id, id);
        self.clear_instance_wait(id);
        self.resume_instance_internal(id, args)
    }

    /// Writes the recorded reply into the input variable and returns its
    /// validity flag. Numbers are stored clamped to the bounds.
    fn store_input(
        &mut self,
        id: InstanceId,
        player_id: PlayerId,
        request: &InputRequest,
        closing: bool,
    ) -> i32 {
        let frame = self
            .instances
            .get(&id)
            .and_then(|instance| instance.execution.as_ref())
            .map(|context| context.frame_id);

        let (value, flag) = if request.is_string {
            let text = if closing {
                String::new()
            } else {
                self.session.borrow_mut().take_input_text(player_id)
            };
            let flag = input_flag(text.chars().count() as i64, request);
            (ScriptValue::String(text), flag)
        } else {
            let amount = if closing {
                0
            } else {
                self.session.borrow_mut().take_input_amount(player_id)
            };
            let flag = input_flag(i64::from(amount), request);
            let stored = amount.clamp(request.min, request.max);
            (ScriptValue::from(stored), flag)
        };

        self.state
            .borrow_mut()
            .vars
            .set_raw(&request.var, value, frame);
        flag
    }

    /// Called by the timer host once a sleep has elapsed.
    pub fn wake_on_timer(&mut self, id: InstanceId) -> bool {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.timer = None;
        }
        self.resume_instance(id)
    }

    /// Resumes an instance with no arguments, whatever it waits on.
    pub fn resume_instance(&mut self, id: InstanceId) -> bool {
        let Some(instance) = self.instances.get_mut(&id) else {
            return false;
        };
        if let Some(timer) = instance.timer.take() {
            self.timers.borrow_mut().cancel(timer);
        }
        if let Some(context) = instance.execution.as_ref() {
            let (player_id, object_id) = (context.player_id, context.object_id);
            self.pending.remove_if(player_id, object_id, id);
        }
        self.clear_instance_wait(id);
        self.resume_instance_internal(id, Vec::new())
    }

    /// Tears down every instance and empties the registry and variables.
    pub fn shutdown_all(&mut self) {
        let ids = self.instance_ids();
        if !ids.is_empty() {
            warn!(count = ids.len(), "shutting down live instances");
        }
        for id in ids {
            self.erase_instance(id, false);
        }
        self.pending.clear();
        self.registry.clear();
        let mut state = self.state.borrow_mut();
        state.vars.clear();
        state.stack.clear();
    }

    fn clear_instance_wait(&mut self, id: InstanceId) {
        if let Some(context) = self
            .instances
            .get_mut(&id)
            .and_then(|instance| instance.execution.as_mut())
        {
            context.clear_wait();
        }
    }
}
