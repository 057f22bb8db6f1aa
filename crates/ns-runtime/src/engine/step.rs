use ns_core::{CloseMode, ObjectId, PlayerId, ScriptChunk, ScriptError, ScriptOp, ScriptValue};

use super::ScriptRuntime;
use crate::context::{ExecutionContext, InputRequest, ScriptFailure, WaitState};
use crate::variables::VariableKey;

/// How a frame's op list stopped running.
#[derive(Debug)]
pub(super) enum Flow {
    Completed(Vec<ScriptValue>),
    Yielded,
}

enum StepOutcome {
    Continue,
    Jump(usize),
    Yield,
    Return(Vec<ScriptValue>),
}

/// Menu options are the runs of non-colon characters.
pub(crate) fn count_menu_options(text: &str) -> usize {
    text.split(':').filter(|part| !part.is_empty()).count()
}

impl ScriptRuntime {
    /// Runs the active frame from `pc` until it returns or suspends.
    pub(super) fn execute(
        &mut self,
        chunk: &ScriptChunk,
        pc: &mut usize,
        nested: bool,
    ) -> Result<Flow, ScriptFailure> {
        loop {
            self.steps_this_resume += 1;
            if self.steps_this_resume > self.config.max_steps_per_resume {
                return Err(self.failure(ScriptError::new(
                    "ENGINE_GUARD_EXCEEDED",
                    format!(
                        "Execution exceeded {} steps in one resume.",
                        self.config.max_steps_per_resume
                    ),
                )));
            }

            self.sync_frame_pc(*pc);
            let Some(op) = chunk.ops.get(*pc) else {
                return Ok(Flow::Completed(Vec::new()));
            };

            match self.step(op).map_err(|error| self.failure(error))? {
                StepOutcome::Continue => *pc += 1,
                StepOutcome::Jump(target) => {
                    if target > chunk.ops.len() {
                        return Err(self.failure(ScriptError::new(
                            "ENGINE_JUMP_OUT_OF_RANGE",
                            format!(
                                "Jump target {} is outside \"{}\" ({} ops).",
                                target,
                                chunk.name,
                                chunk.ops.len()
                            ),
                        )));
                    }
                    *pc = target;
                }
                StepOutcome::Yield => {
                    *pc += 1;
                    if nested {
                        return Err(self.failure(ScriptError::new(
                            "ENGINE_YIELD_ACROSS_CALL",
                            "Cannot suspend inside a nested call.",
                        )));
                    }
                    return Ok(Flow::Yielded);
                }
                StepOutcome::Return(values) => return Ok(Flow::Completed(values)),
            }
        }
    }

    fn step(&mut self, op: &ScriptOp) -> Result<StepOutcome, ScriptError> {
        match op {
            ScriptOp::Code { code } => {
                self.run_code(code)?;
                Ok(StepOutcome::Continue)
            }
            ScriptOp::Mes { lines } => {
                let target = self.dialog_target();
                for line in lines {
                    let text = self.eval_text(line)?;
                    if let Some((player_id, npc_id)) = target {
                        self.session
                            .borrow_mut()
                            .show_message(player_id, npc_id, &text);
                    }
                }
                self.with_frame(|frame| frame.dialog_open = true)?;
                Ok(StepOutcome::Continue)
            }
            ScriptOp::Next => {
                if !self.with_frame(|frame| frame.dialog_open)? {
                    return Ok(StepOutcome::Continue);
                }
                let Some((player_id, npc_id)) = self.dialog_target() else {
                    return Ok(StepOutcome::Continue);
                };
                self.session.borrow_mut().show_next(player_id, npc_id);
                self.with_frame(|frame| frame.wait = WaitState::AwaitingNext)?;
                Ok(StepOutcome::Yield)
            }
            ScriptOp::Clear => {
                if self.with_frame(|frame| frame.dialog_open)? {
                    if let Some((player_id, npc_id)) = self.dialog_target() {
                        self.session.borrow_mut().clear_dialog(player_id, npc_id);
                    }
                }
                Ok(StepOutcome::Continue)
            }
            ScriptOp::Close { mode } => {
                let wait = match mode {
                    CloseMode::End => WaitState::AwaitingFinalCloseAck {
                        clear_overlay: false,
                    },
                    CloseMode::Keep => WaitState::AwaitingCloseAck,
                    CloseMode::ClearOverlay => WaitState::AwaitingFinalCloseAck {
                        clear_overlay: true,
                    },
                };
                self.with_frame(|frame| {
                    frame.dialog_open = false;
                    frame.wait = wait;
                })?;
                if let Some((player_id, npc_id)) = self.dialog_target() {
                    self.session.borrow_mut().show_close(player_id, npc_id);
                }
                Ok(StepOutcome::Yield)
            }
            ScriptOp::Select { options, into } => self.step_select(options, into.as_deref()),
            ScriptOp::Input {
                var,
                min,
                max,
                into,
            } => self.step_input(var, min.as_deref(), max.as_deref(), into.as_deref()),
            ScriptOp::Sleep { ticks } => {
                let ticks = self.eval_number(ticks)?;
                let ticks = if ticks <= 0.0 {
                    1
                } else {
                    ticks.min(f64::from(u32::MAX)) as u32
                };
                self.with_frame(|frame| frame.wait = WaitState::AwaitingSleep(ticks))?;
                Ok(StepOutcome::Yield)
            }
            ScriptOp::JumpUnless { when, target } => {
                if self.eval_condition(when)? {
                    Ok(StepOutcome::Continue)
                } else {
                    Ok(StepOutcome::Jump(*target))
                }
            }
            ScriptOp::Jump { target } => Ok(StepOutcome::Jump(*target)),
            ScriptOp::CallSub { label, args, into } => {
                self.call_sub(label, args, into.as_deref())?;
                Ok(StepOutcome::Continue)
            }
            ScriptOp::CallFunc { name, args, into } => {
                self.call_func(name, args, into.as_deref())?;
                Ok(StepOutcome::Continue)
            }
            ScriptOp::Return { values } => Ok(StepOutcome::Return(self.eval_all(values)?)),
            ScriptOp::End => Ok(StepOutcome::Return(Vec::new())),
        }
    }

    fn step_select(
        &mut self,
        options: &[String],
        into: Option<&str>,
    ) -> Result<StepOutcome, ScriptError> {
        let mut text = String::new();
        let mut count = 0usize;
        for (index, option) in options.iter().enumerate() {
            if index > 0 {
                text.push(':');
            }
            let value = self.eval_expression(option)?;
            if value.is_nil() {
                continue;
            }
            let part = value.to_text();
            count += count_menu_options(&part);
            text.push_str(&part);
        }
        let count = count.max(1);

        if let Some((player_id, npc_id)) = self.dialog_target().filter(|_| !text.is_empty()) {
            self.session
                .borrow_mut()
                .show_menu(player_id, npc_id, &text, count);
            self.with_frame(|frame| {
                frame.wait = WaitState::AwaitingMenuChoice;
                frame.resume_into = into.map(str::to_string);
            })?;
            return Ok(StepOutcome::Yield);
        }

        if let Some(into) = into {
            self.assign(into, ScriptValue::from(1));
        }
        Ok(StepOutcome::Continue)
    }

    fn step_input(
        &mut self,
        var: &str,
        min: Option<&str>,
        max: Option<&str>,
        into: Option<&str>,
    ) -> Result<StepOutcome, ScriptError> {
        let mut min = match min {
            Some(expr) => self.eval_number(expr)? as i32,
            None => self.config.input_min_value,
        };
        let mut max = match max {
            Some(expr) => self.eval_number(expr)? as i32,
            None => self.config.input_max_value,
        };
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }

        let is_string = VariableKey::parse(var).is_string;
        if let Some((player_id, npc_id)) = self.dialog_target() {
            self.session
                .borrow_mut()
                .request_input(player_id, npc_id, is_string);
        }
        self.with_frame(|frame| {
            frame.wait = WaitState::AwaitingInput(InputRequest {
                var: var.to_string(),
                is_string,
                min,
                max,
            });
            frame.resume_into = into.map(str::to_string);
        })?;
        Ok(StepOutcome::Yield)
    }

    /// Player and npc of the active frame when a dialogue can be shown.
    fn dialog_target(&self) -> Option<(PlayerId, ObjectId)> {
        let (player_id, npc_id) = {
            let state = self.state.borrow();
            let frame = state.stack.top()?;
            (frame.player_id, frame.npc_target())
        };
        if player_id <= 0 || npc_id == 0 || !self.session.borrow().player_exists(player_id) {
            return None;
        }
        Some((player_id, npc_id))
    }

    pub(super) fn with_frame<R>(
        &self,
        apply: impl FnOnce(&mut ExecutionContext) -> R,
    ) -> Result<R, ScriptError> {
        let mut state = self.state.borrow_mut();
        let frame = state.stack.top_mut().ok_or_else(|| {
            ScriptError::new("ENGINE_NO_ACTIVE_FRAME", "No execution context is active.")
        })?;
        Ok(apply(frame))
    }

    pub(super) fn failure(&self, error: ScriptError) -> ScriptFailure {
        ScriptFailure::new(error, self.state.borrow().stack.trace())
    }

    fn sync_frame_pc(&self, pc: usize) {
        if let Some(frame) = self.state.borrow_mut().stack.top_mut() {
            frame.pc = pc;
        }
    }
}
