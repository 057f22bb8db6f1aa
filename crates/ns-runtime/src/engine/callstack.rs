use ns_core::{ScriptChunk, ScriptError, ScriptValue};
use tracing::{debug, error, warn};

use super::step::Flow;
use super::ScriptRuntime;
use crate::context::{ExecutionContext, OwnerKey, ScriptEnv};
use crate::heap::Handle;

impl ScriptRuntime {
    /// Runs a label of the caller's own owner with a shared environment.
    pub(super) fn call_sub(
        &mut self,
        label: &str,
        args: &[String],
        into: Option<&str>,
    ) -> Result<(), ScriptError> {
        let values = self.eval_all(args)?;
        let caller = self.with_frame(|frame| {
            (
                frame.owner.clone(),
                frame.owner_name.clone(),
                frame.player_id,
                frame.object_id,
                frame.env.duplicate(),
                frame.function_name.clone(),
                frame.dialog_open,
            )
        })?;
        let (owner, owner_name, player_id, object_id, env, function_name, dialog_open) = caller;

        let Some(code) = self
            .registry
            .by_owner(&owner)
            .and_then(|entry| entry.label(label))
            .map(Handle::duplicate)
        else {
            warn!(owner = %owner, label, "callsub target not found");
            self.assign_return(into, Vec::new());
            return Ok(());
        };

        let frame = ExecutionContext {
            frame_id: self.allocate_frame_id(),
            owner,
            owner_name,
            routine: label.to_string(),
            player_id,
            object_id,
            env,
            function_name,
            args: self.pin_args(values),
            dialog_open,
            wait: Default::default(),
            attachment: None,
            resume_into: None,
            pc: 0,
        };
        let returned = self.run_nested(frame, &code)?;
        self.assign_return(into, returned);
        Ok(())
    }

    /// Runs a global function in a fresh environment.
    pub(super) fn call_func(
        &mut self,
        name: &str,
        args: &[String],
        into: Option<&str>,
    ) -> Result<(), ScriptError> {
        let values = self.eval_all(args)?;
        // The dialogue window is shared with the caller in both directions.
        let (player_id, object_id, dialog_open) =
            self.with_frame(|frame| (frame.player_id, frame.object_id, frame.dialog_open))?;

        let Some((function_name, code)) = self.registry.function(name).and_then(|entry| {
            entry
                .main()
                .map(|code| (entry.name.clone(), code.duplicate()))
        }) else {
            warn!(function = name, "callfunc target not found");
            self.assign_return(into, Vec::new());
            return Ok(());
        };

        let env = self.heap.alloc(ScriptEnv {
            player_id,
            object_id,
            owner_name: function_name.clone(),
        });
        let frame = ExecutionContext {
            frame_id: self.allocate_frame_id(),
            owner: OwnerKey::Function(function_name.clone()),
            owner_name: function_name.clone(),
            routine: "run".to_string(),
            player_id,
            object_id,
            env,
            function_name: Some(function_name),
            args: self.pin_args(values),
            dialog_open,
            wait: Default::default(),
            attachment: None,
            resume_into: None,
            pc: 0,
        };
        let returned = self.run_nested(frame, &code)?;
        self.assign_return(into, returned);
        Ok(())
    }

    fn pin_args(&self, values: Vec<ScriptValue>) -> Vec<Handle<ScriptValue>> {
        values
            .into_iter()
            .map(|value| self.heap.alloc(value))
            .collect()
    }

    /// Pushes `frame`, runs it to completion and pops it again. Failures
    /// inside the callee, and calls past `max_call_depth`, are logged and
    /// read as an empty return.
    fn run_nested(
        &mut self,
        frame: ExecutionContext,
        code: &Handle<ScriptChunk>,
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        let depth = self.state.borrow().stack.len();
        if depth >= self.config.max_call_depth {
            warn!(
                depth,
                limit = self.config.max_call_depth,
                routine = %frame.routine,
                "call depth exceeded, skipping nested call"
            );
            return Ok(Vec::new());
        }

        debug!(owner = %frame.owner, routine = %frame.routine, depth, "entering nested call");
        self.state.borrow_mut().stack.push(frame);
        let mut pc = 0;
        let result = self.execute(code.get(), &mut pc, true);

        let callee = self.state.borrow_mut().stack.pop();
        if let Some(callee) = callee {
            let dialog_open = callee.dialog_open;
            let _ = self.with_frame(|caller| caller.dialog_open = dialog_open);
            self.state.borrow_mut().vars.release_frame(callee.frame_id);
        }

        match result {
            Ok(Flow::Completed(values)) => Ok(values),
            Ok(Flow::Yielded) => Ok(Vec::new()),
            Err(failure) => {
                error!("nested call failed: {}", failure);
                Ok(Vec::new())
            }
        }
    }

    fn assign_return(&self, into: Option<&str>, values: Vec<ScriptValue>) {
        if let Some(into) = into {
            let first = values.into_iter().next().unwrap_or_default();
            self.assign(into, first);
        }
    }
}
