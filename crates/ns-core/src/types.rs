use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;

pub type PlayerId = i32;
pub type ObjectId = i32;
pub type NpcId = i32;
pub type InstanceId = u32;
pub type FrameId = u64;

/// One compiled entry point: a flat op list driven by a program counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptChunk {
    pub name: String,
    pub ops: Vec<ScriptOp>,
}

impl ScriptChunk {
    pub fn new(name: impl Into<String>, ops: Vec<ScriptOp>) -> Self {
        Self {
            name: name.into(),
            ops,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloseMode {
    #[default]
    End,
    Keep,
    ClearOverlay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ScriptOp {
    Code {
        code: String,
    },
    Mes {
        lines: Vec<String>,
    },
    Next,
    Clear,
    Close {
        #[serde(default)]
        mode: CloseMode,
    },
    Select {
        options: Vec<String>,
        #[serde(default)]
        into: Option<String>,
    },
    Input {
        var: String,
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
        #[serde(default)]
        into: Option<String>,
    },
    Sleep {
        ticks: String,
    },
    JumpUnless {
        when: String,
        target: usize,
    },
    Jump {
        target: usize,
    },
    CallSub {
        label: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        into: Option<String>,
    },
    CallFunc {
        name: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        into: Option<String>,
    },
    Return {
        #[serde(default)]
        values: Vec<String>,
    },
    End,
}

impl ScriptOp {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Code { .. } => "code",
            Self::Mes { .. } => "mes",
            Self::Next => "next",
            Self::Clear => "clear",
            Self::Close { .. } => "close",
            Self::Select { .. } => "select",
            Self::Input { .. } => "input",
            Self::Sleep { .. } => "sleep",
            Self::JumpUnless { .. } => "jumpUnless",
            Self::Jump { .. } => "jump",
            Self::CallSub { .. } => "callSub",
            Self::CallFunc { .. } => "callFunc",
            Self::Return { .. } => "return",
            Self::End => "end",
        }
    }

    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Self::JumpUnless { target, .. } | Self::Jump { target } => Some(*target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSource {
    pub name: String,
    #[serde(default)]
    pub position: Option<i32>,
    pub ops: Vec<ScriptOp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcDuplicate {
    pub id: NpcId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSource {
    pub id: NpcId,
    pub name: String,
    #[serde(default)]
    pub main: Option<Vec<ScriptOp>>,
    #[serde(default)]
    pub events: Vec<LabelSource>,
    #[serde(default)]
    pub labels: Vec<LabelSource>,
    #[serde(default)]
    pub duplicates: Vec<NpcDuplicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSource {
    pub name: String,
    pub run: Vec<ScriptOp>,
    #[serde(default)]
    pub labels: Vec<LabelSource>,
}

/// Loader output: everything one bundle file registers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptBundle {
    #[serde(default)]
    pub config: Option<RuntimeConfig>,
    #[serde(default)]
    pub npcs: Vec<NpcSource>,
    #[serde(default)]
    pub functions: Vec<FunctionSource>,
    #[serde(default)]
    pub constants: BTreeMap<String, f64>,
}
