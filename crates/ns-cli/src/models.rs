use ns_core::{NpcId, ObjectId, PlayerId};

/// Who the line driver talks as and which npc it talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DialogTarget {
    pub(crate) player_id: PlayerId,
    pub(crate) object_id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NpcSelector {
    Id(NpcId),
    Name(String),
}

impl NpcSelector {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.trim().parse::<NpcId>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineCommandAction {
    NotHandled,
    Continue,
    Close,
    Quit,
}
