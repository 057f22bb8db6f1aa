use std::cell::RefCell;

use ns_core::{InstanceId, NpcId, ObjectId, PlayerId, ScriptChunk, ScriptValue};
use tracing::{debug, error, warn};

use super::step::Flow;
use super::{Coroutine, CoroutineStatus, RuntimeInstance, ScriptRuntime};
use crate::context::{ExecutionContext, OwnerKey, ScriptEnv, WaitState};
use crate::heap::Handle;
use crate::host::DetachOptions;
use crate::registry::{normalize_name, FunctionDefinition, NpcDefinition, OwnerRef};

/// Splits `exname::label` into its normalized parts. A bare name is a label.
pub(crate) fn parse_event_name(raw: &str) -> Option<(Option<String>, String)> {
    if raw.is_empty() {
        return None;
    }
    match raw.split_once("::") {
        None => Some((None, normalize_name(raw))),
        Some((exname, label)) => {
            let label = normalize_name(label);
            if label.is_empty() {
                return None;
            }
            Some((Some(normalize_name(exname)), label))
        }
    }
}

impl ScriptRuntime {
    pub fn register_npc(&mut self, definition: NpcDefinition) -> bool {
        self.registry.register_npc(definition)
    }

    pub fn register_function(&mut self, definition: FunctionDefinition) -> bool {
        self.registry.register_function(definition)
    }

    pub fn unregister_npc(&mut self, npc_id: NpcId) -> bool {
        self.registry.unregister_npc(npc_id)
    }

    pub fn unregister_function(&mut self, name: &str) -> bool {
        self.registry.unregister_function(name)
    }

    pub fn clone_npc(&mut self, source_id: NpcId, target_id: NpcId, name: Option<&str>) -> bool {
        self.registry.clone_npc(source_id, target_id, name)
    }

    /// Starts `label` of `owner` (its main entry point when `label` is
    /// `None`) as a new instance and runs it to its first suspension.
    pub fn run_entry_point(
        &mut self,
        owner: OwnerRef<'_>,
        label: Option<&str>,
        player_id: PlayerId,
        object_id: ObjectId,
    ) -> bool {
        let Some(entry) = self.registry.resolve_owner(owner) else {
            warn!(?owner, "entry point owner not found");
            return false;
        };
        let code = match label {
            None => entry.main(),
            Some(label) => entry.resolve(label),
        };
        let Some(code) = code.map(Handle::duplicate) else {
            warn!(?owner, label, "entry point not found");
            return false;
        };
        let owner_key = entry.owner.clone();
        let owner_name = entry.name.clone();
        let routine = label.map(normalize_name).unwrap_or_else(|| "main".to_string());
        self.start_instance(owner_key, owner_name, routine, code, player_id, object_id)
    }

    /// Runs `exname::label`, resolving the owner by `object_id` first.
    pub fn run_event(&mut self, event_name: &str, player_id: PlayerId, object_id: ObjectId) -> bool {
        let Some((exname, label)) = parse_event_name(event_name) else {
            warn!(event_name, "malformed event name");
            return false;
        };

        let by_object = (object_id > 0)
            .then(|| self.registry.npc(object_id))
            .flatten();
        let entry = by_object.or_else(|| {
            exname
                .as_deref()
                .filter(|exname| !exname.is_empty())
                .and_then(|exname| self.registry.npc_by_name(exname))
        });
        let Some(entry) = entry else {
            debug!(event_name, object_id, "event owner not found");
            return false;
        };
        let Some(code) = entry.resolve(&label).map(Handle::duplicate) else {
            debug!(event_name, owner = %entry.owner, "event label not found");
            return false;
        };
        let owner_key = entry.owner.clone();
        let owner_name = entry.name.clone();
        self.start_instance(owner_key, owner_name, label, code, player_id, object_id)
    }

    /// Position 0 runs the main entry point, others go through the
    /// position index.
    pub fn run_npc(
        &mut self,
        npc_id: NpcId,
        exname: Option<&str>,
        position: i32,
        player_id: PlayerId,
        object_id: ObjectId,
    ) -> bool {
        let entry = self.registry.npc(npc_id).or_else(|| {
            exname
                .filter(|exname| !exname.is_empty())
                .and_then(|exname| self.registry.npc_by_name(exname))
        });
        let Some(entry) = entry else {
            debug!(npc_id, exname, "npc not found");
            return false;
        };

        let (routine, code) = if position == 0 {
            ("main".to_string(), entry.main())
        } else {
            match entry.label_at(position) {
                Some(label) => (label.to_string(), entry.resolve(label)),
                None => (String::new(), None),
            }
        };
        let Some(code) = code.map(Handle::duplicate) else {
            debug!(npc_id, position, "npc entry point not found");
            return false;
        };
        let owner_key = entry.owner.clone();
        let owner_name = entry.name.clone();
        self.start_instance(owner_key, owner_name, routine, code, player_id, object_id)
    }

    fn start_instance(
        &mut self,
        owner: OwnerKey,
        owner_name: String,
        routine: String,
        code: Handle<ScriptChunk>,
        player_id: PlayerId,
        object_id: ObjectId,
    ) -> bool {
        let id = self.allocate_instance_id();
        let env = self.heap.alloc(ScriptEnv {
            player_id,
            object_id,
            owner_name: owner_name.clone(),
        });
        let attachment = if player_id > 0 {
            self.session.borrow_mut().attach(player_id, object_id)
        } else {
            None
        };
        let function_name = match &owner {
            OwnerKey::Function(name) => Some(name.clone()),
            OwnerKey::Npc(_) => None,
        };

        let context = ExecutionContext {
            frame_id: self.allocate_frame_id(),
            owner,
            owner_name: owner_name.clone(),
            routine,
            player_id,
            object_id,
            env,
            function_name,
            args: Vec::new(),
            dialog_open: false,
            wait: WaitState::None,
            attachment,
            resume_into: None,
            pc: 0,
        };
        let coroutine = self.heap.alloc(RefCell::new(Coroutine {
            chunk: code,
            pc: 0,
            status: CoroutineStatus::Created,
        }));

        debug!(instance = id, owner = %context.owner, player_id, object_id, "instance started");
        self.instances.insert(
            id,
            RuntimeInstance {
                id,
                coroutine,
                timer: None,
                display_name: owner_name,
                execution: Some(context),
            },
        );
        self.resume_instance_internal(id, Vec::new())
    }

    /// Restores the saved frame, runs until the next suspension and sorts
    /// out the outcome.
    pub(super) fn resume_instance_internal(&mut self, id: InstanceId, args: Vec<ScriptValue>) -> bool {
        let Some(instance) = self.instances.get_mut(&id) else {
            return false;
        };
        let Some(mut context) = instance.execution.take() else {
            error!(instance = id, "instance is already running");
            return false;
        };
        let coroutine = instance.coroutine.duplicate();
        let (code, mut pc) = {
            let mut coroutine = coroutine.get().borrow_mut();
            coroutine.status = CoroutineStatus::Running;
            (coroutine.chunk.duplicate(), coroutine.pc)
        };

        context.clear_wait();
        let resume_into = context.resume_into.take();
        self.state.borrow_mut().stack.push(context);
        if let Some(into) = resume_into {
            self.assign(&into, args.into_iter().next().unwrap_or_default());
        }

        self.steps_this_resume = 0;
        let result = self.execute(code.get(), &mut pc, false);

        let mut frames = self.state.borrow_mut().stack.clear();
        let context = if frames.is_empty() {
            None
        } else {
            Some(frames.remove(0))
        };
        for stray in frames {
            self.state.borrow_mut().vars.release_frame(stray.frame_id);
        }

        let Some(instance) = self.instances.get_mut(&id) else {
            return false;
        };
        instance.execution = context;
        {
            let mut coroutine = coroutine.get().borrow_mut();
            coroutine.pc = pc;
            coroutine.status = match result {
                Ok(Flow::Yielded) => CoroutineStatus::Suspended,
                _ => CoroutineStatus::Dead,
            };
        }
        if instance.execution.is_none() {
            error!(instance = id, "execution stack underflow");
            self.erase_instance(id, true);
            return false;
        }

        match result {
            Ok(Flow::Completed(_)) => {
                debug!(instance = id, "instance finished");
                self.erase_instance(id, true);
                true
            }
            Ok(Flow::Yielded) => self.mark_instance_waiting(id),
            Err(failure) => {
                let name = self.instance_name(id).unwrap_or_default().to_string();
                error!(instance = id, npc = %name, "runtime error: {}", failure);
                self.erase_instance(id, true);
                false
            }
        }
    }

    /// Routes a suspended instance to the pending index or a timer.
    fn mark_instance_waiting(&mut self, id: InstanceId) -> bool {
        let Some(instance) = self.instances.get_mut(&id) else {
            return false;
        };
        if let Some(timer) = instance.timer.take() {
            self.timers.borrow_mut().cancel(timer);
        }
        let Some(context) = instance.execution.as_ref() else {
            return false;
        };
        let (player_id, object_id) = (context.player_id, context.object_id);
        let wait = context.wait.clone();
        self.pending.remove_if(player_id, object_id, id);

        match wait {
            WaitState::AwaitingSleep(ticks) => {
                let handle = self.timers.borrow_mut().schedule_once(ticks.max(1), id);
                let Some(handle) = handle else {
                    error!(instance = id, "timer scheduling failed");
                    self.erase_instance(id, true);
                    return false;
                };
                if let Some(instance) = self.instances.get_mut(&id) {
                    instance.timer = Some(handle);
                }
                debug!(instance = id, ticks, "instance sleeping");
                true
            }
            WaitState::None => {
                let name = self.instance_name(id).unwrap_or_default().to_string();
                error!(instance = id, npc = %name, "script yielded without wait state");
                self.erase_instance(id, true);
                false
            }
            wait => {
                if self.pending.register(player_id, object_id, id) {
                    debug!(instance = id, player_id, object_id, wait = wait.name(), "instance waiting");
                    return true;
                }
                self.erase_instance(id, true);
                if matches!(
                    wait,
                    WaitState::AwaitingCloseAck | WaitState::AwaitingFinalCloseAck { .. }
                ) {
                    return true;
                }
                warn!(instance = id, wait = wait.name(), "interaction wait without player or object");
                false
            }
        }
    }

    /// Tears an instance down. Unknown ids are ignored.
    pub fn erase_instance(&mut self, id: InstanceId, dequeue_event: bool) {
        let Some(mut instance) = self.instances.remove(&id) else {
            return;
        };
        if let Some(timer) = instance.timer.take() {
            self.timers.borrow_mut().cancel(timer);
        }
        if let Some(context) = instance.execution.take() {
            self.detach_player(&context, dequeue_event);
            self.pending
                .remove_if(context.player_id, context.object_id, instance.id);
            self.state.borrow_mut().vars.release_frame(context.frame_id);
        }
        instance.coroutine.get().borrow_mut().status = CoroutineStatus::Dead;
        debug!(instance = id, "instance erased");
    }

    fn detach_player(&self, context: &ExecutionContext, dequeue_event: bool) {
        let Some(previous) = context.attachment else {
            return;
        };
        if context.player_id <= 0 {
            return;
        }
        let options = DetachOptions {
            clear_overlay: context.wait.clears_overlay(),
            dequeue_event: dequeue_event && previous.npc_id == 0,
        };
        self.session
            .borrow_mut()
            .detach(context.player_id, context.object_id, previous, options);
    }
}
