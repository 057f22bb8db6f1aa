use std::fmt;

use ns_core::{FrameId, NpcId, ObjectId, PlayerId, ScriptError, ScriptValue};

use crate::heap::Handle;
use crate::host::InteractionState;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerKey {
    Npc(NpcId),
    Function(String),
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npc(id) => write!(f, "npc#{}", id),
            Self::Function(name) => write!(f, "function {}", name),
        }
    }
}

/// Script-visible environment object of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEnv {
    pub player_id: PlayerId,
    pub object_id: ObjectId,
    pub owner_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub var: String,
    pub is_string: bool,
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WaitState {
    #[default]
    None,
    AwaitingNext,
    AwaitingMenuChoice,
    AwaitingInput(InputRequest),
    AwaitingSleep(u32),
    AwaitingCloseAck,
    AwaitingFinalCloseAck { clear_overlay: bool },
}

impl WaitState {
    /// Waits routed through the pending-interaction index.
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            Self::AwaitingNext
                | Self::AwaitingMenuChoice
                | Self::AwaitingInput(_)
                | Self::AwaitingCloseAck
                | Self::AwaitingFinalCloseAck { .. }
        )
    }

    pub fn clears_overlay(&self) -> bool {
        matches!(
            self,
            Self::AwaitingFinalCloseAck {
                clear_overlay: true
            }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AwaitingNext => "next",
            Self::AwaitingMenuChoice => "menu",
            Self::AwaitingInput(_) => "input",
            Self::AwaitingSleep(_) => "sleep",
            Self::AwaitingCloseAck => "close2",
            Self::AwaitingFinalCloseAck { .. } => "close",
        }
    }
}

/// One call frame.
#[derive(Debug)]
pub struct ExecutionContext {
    pub frame_id: FrameId,
    pub owner: OwnerKey,
    pub owner_name: String,
    pub routine: String,
    pub player_id: PlayerId,
    pub object_id: ObjectId,
    pub env: Handle<ScriptEnv>,
    pub function_name: Option<String>,
    pub args: Vec<Handle<ScriptValue>>,
    pub dialog_open: bool,
    pub wait: WaitState,
    /// Prior interaction state of the attached player, restored on detach.
    pub attachment: Option<InteractionState>,
    /// Variable that receives the first resume argument.
    pub resume_into: Option<String>,
    pub pc: usize,
}

impl ExecutionContext {
    /// Object the dialogue is shown for: the acting object, else the owner npc.
    pub fn npc_target(&self) -> ObjectId {
        if self.object_id > 0 {
            return self.object_id;
        }
        match self.owner {
            OwnerKey::Npc(id) if id > 0 => id,
            _ => 0,
        }
    }

    pub fn arg(&self, index: usize) -> Option<ScriptValue> {
        self.args.get(index).map(|handle| handle.get().clone())
    }

    pub fn clear_wait(&mut self) {
        self.wait = WaitState::None;
    }
}

#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<ExecutionContext>,
}

impl CallStack {
    pub fn push(&mut self, context: ExecutionContext) {
        self.frames.push(context);
    }

    pub fn pop(&mut self) -> Option<ExecutionContext> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&ExecutionContext> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.frames.last_mut()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_frame_id(&self) -> Option<FrameId> {
        self.top().map(|frame| frame.frame_id)
    }

    /// One line per frame, innermost first.
    pub fn trace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                format!(
                    "at {} ({}) routine \"{}\" op {}",
                    frame.owner_name, frame.owner, frame.routine, frame.pc
                )
            })
            .collect()
    }

    pub fn clear(&mut self) -> Vec<ExecutionContext> {
        std::mem::take(&mut self.frames)
    }
}

/// A runtime error together with the call trace captured where it surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub error: ScriptError,
    pub trace: Vec<String>,
}

impl ScriptFailure {
    pub fn new(error: ScriptError, trace: Vec<String>) -> Self {
        Self { error, trace }
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for line in &self.trace {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}
