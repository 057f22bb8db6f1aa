use std::collections::HashMap;

use ns_core::{ObjectId, PlayerId};

use super::{DetachOptions, InteractionState, SessionHost};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Attached {
        player_id: PlayerId,
        npc_id: ObjectId,
    },
    Detached {
        player_id: PlayerId,
        restored_npc: ObjectId,
        clear_overlay: bool,
        dequeued: bool,
    },
    Message {
        player_id: PlayerId,
        npc_id: ObjectId,
        text: String,
    },
    Next {
        player_id: PlayerId,
        npc_id: ObjectId,
    },
    Clear {
        player_id: PlayerId,
        npc_id: ObjectId,
    },
    Close {
        player_id: PlayerId,
        npc_id: ObjectId,
    },
    Menu {
        player_id: PlayerId,
        npc_id: ObjectId,
        text: String,
        option_count: usize,
    },
    InputRequested {
        player_id: PlayerId,
        npc_id: ObjectId,
        is_string: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSession {
    pub interaction: InteractionState,
    pub menu_selection: i32,
    pub input_amount: i32,
    pub input_text: String,
    pub overlay_open: bool,
    pub awaiting_response: bool,
}

/// In-process session layer that records every dialogue primitive.
#[derive(Debug, Default)]
pub struct RecordingSession {
    players: HashMap<PlayerId, PlayerSession>,
    events: Vec<SessionEvent>,
    restrict_commands: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            restrict_commands: true,
            ..Self::default()
        }
    }

    pub fn with_players(players: impl IntoIterator<Item = PlayerId>) -> Self {
        let mut session = Self::new();
        for player_id in players {
            session.add_player(player_id);
        }
        session
    }

    pub fn add_player(&mut self, player_id: PlayerId) {
        self.players.entry(player_id).or_default();
    }

    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.players.remove(&player_id);
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&PlayerSession> {
        self.players.get(&player_id)
    }

    pub fn set_interaction(&mut self, player_id: PlayerId, state: InteractionState) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.interaction = state;
        }
    }

    pub fn set_overlay_open(&mut self, player_id: PlayerId, open: bool) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.overlay_open = open;
        }
    }

    pub fn record_menu_selection(&mut self, player_id: PlayerId, selection: i32) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.menu_selection = selection;
        }
    }

    pub fn record_input_amount(&mut self, player_id: PlayerId, amount: i32) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.input_amount = amount;
        }
    }

    pub fn record_input_text(&mut self, player_id: PlayerId, text: impl Into<String>) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.input_text = text.into();
        }
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Message { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn set_awaiting(&mut self, player_id: PlayerId, awaiting: bool) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.awaiting_response = awaiting;
        }
    }
}

impl SessionHost for RecordingSession {
    fn player_exists(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
    }

    fn attach(&mut self, player_id: PlayerId, object_id: ObjectId) -> Option<InteractionState> {
        let restrict_commands = self.restrict_commands;
        let player = self.players.get_mut(&player_id)?;
        let previous = player.interaction;
        player.interaction = InteractionState {
            npc_id: object_id,
            commands_disabled: restrict_commands,
        };
        self.events.push(SessionEvent::Attached {
            player_id,
            npc_id: object_id,
        });
        Some(previous)
    }

    fn detach(
        &mut self,
        player_id: PlayerId,
        _object_id: ObjectId,
        previous: InteractionState,
        options: DetachOptions,
    ) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        if options.clear_overlay {
            player.overlay_open = false;
        }
        player.interaction = previous;
        player.awaiting_response = false;
        player.menu_selection = 0;
        player.input_amount = 0;
        player.input_text.clear();
        self.events.push(SessionEvent::Detached {
            player_id,
            restored_npc: previous.npc_id,
            clear_overlay: options.clear_overlay,
            dequeued: options.dequeue_event,
        });
    }

    fn show_message(&mut self, player_id: PlayerId, npc_id: ObjectId, text: &str) {
        self.events.push(SessionEvent::Message {
            player_id,
            npc_id,
            text: text.to_string(),
        });
    }

    fn show_next(&mut self, player_id: PlayerId, npc_id: ObjectId) {
        self.events.push(SessionEvent::Next { player_id, npc_id });
    }

    fn clear_dialog(&mut self, player_id: PlayerId, npc_id: ObjectId) {
        self.events.push(SessionEvent::Clear { player_id, npc_id });
    }

    fn show_close(&mut self, player_id: PlayerId, npc_id: ObjectId) {
        self.events.push(SessionEvent::Close { player_id, npc_id });
    }

    fn show_menu(&mut self, player_id: PlayerId, npc_id: ObjectId, text: &str, option_count: usize) {
        self.set_awaiting(player_id, true);
        self.events.push(SessionEvent::Menu {
            player_id,
            npc_id,
            text: text.to_string(),
            option_count,
        });
    }

    fn request_input(&mut self, player_id: PlayerId, npc_id: ObjectId, is_string: bool) {
        self.set_awaiting(player_id, true);
        self.events.push(SessionEvent::InputRequested {
            player_id,
            npc_id,
            is_string,
        });
    }

    fn take_menu_selection(&mut self, player_id: PlayerId) -> i32 {
        self.set_awaiting(player_id, false);
        self.players
            .get_mut(&player_id)
            .map(|player| std::mem::take(&mut player.menu_selection))
            .unwrap_or_default()
    }

    fn take_input_amount(&mut self, player_id: PlayerId) -> i32 {
        self.set_awaiting(player_id, false);
        self.players
            .get_mut(&player_id)
            .map(|player| std::mem::take(&mut player.input_amount))
            .unwrap_or_default()
    }

    fn take_input_text(&mut self, player_id: PlayerId) -> String {
        self.set_awaiting(player_id, false);
        self.players
            .get_mut(&player_id)
            .map(|player| std::mem::take(&mut player.input_text))
            .unwrap_or_default()
    }
}
