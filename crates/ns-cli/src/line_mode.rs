use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use ns_api::{create_runtime_from_bundle, CreateRuntimeFromBundleOptions, LoadReport};
use ns_core::{PlayerId, ScriptError};
use ns_runtime::host::SessionEvent;
use ns_runtime::{OwnerKey, OwnerRef, RecordingSession, ScriptRuntime, TickTimerQueue, WaitState};
use tracing::debug;

use crate::{map_line_io, DialogTarget, LineCommandAction, NpcSelector};

const HELP: &str = "commands: :help :get <var> :close :quit";

/// A runtime wired to in-process hosts the driver can inspect and feed.
pub(crate) struct LineHost {
    pub(crate) runtime: ScriptRuntime,
    pub(crate) session: Rc<RefCell<RecordingSession>>,
    pub(crate) timers: Rc<RefCell<TickTimerQueue>>,
}

pub(crate) fn create_line_host(
    bundle_json: &str,
    players: &[PlayerId],
) -> Result<(LineHost, LoadReport), ScriptError> {
    let session = Rc::new(RefCell::new(RecordingSession::with_players(
        players.iter().copied(),
    )));
    let timers = Rc::new(RefCell::new(TickTimerQueue::new()));
    let (runtime, report) = create_runtime_from_bundle(CreateRuntimeFromBundleOptions {
        bundle_json: bundle_json.to_string(),
        session: session.clone(),
        timers: timers.clone(),
        host_functions: None,
        config: None,
    })?;
    Ok((
        LineHost {
            runtime,
            session,
            timers,
        },
        report,
    ))
}

/// Resolves the selected npc to an object id, falling back to `object`.
pub(crate) fn resolve_target(
    host: &LineHost,
    selector: &NpcSelector,
    player_id: PlayerId,
    object: Option<i32>,
) -> Result<DialogTarget, ScriptError> {
    let owner = match selector {
        NpcSelector::Id(id) => OwnerRef::Id(*id),
        NpcSelector::Name(name) => OwnerRef::Name(name),
    };
    let Some(entry) = host.runtime.registry().resolve_owner(owner) else {
        return Err(ScriptError::new(
            "CLI_NPC_NOT_FOUND",
            format!("No npc registered as {:?}.", selector),
        ));
    };
    let npc_id = match &entry.owner {
        OwnerKey::Npc(id) => *id,
        OwnerKey::Function(_) => 0,
    };
    Ok(DialogTarget {
        player_id,
        object_id: object.unwrap_or(npc_id),
    })
}

pub(crate) fn start_npc(
    host: &mut LineHost,
    selector: &NpcSelector,
    label: Option<&str>,
    target: DialogTarget,
) -> Result<(), ScriptError> {
    let owner = match selector {
        NpcSelector::Id(id) => OwnerRef::Id(*id),
        NpcSelector::Name(name) => OwnerRef::Name(name),
    };
    if host
        .runtime
        .run_entry_point(owner, label, target.player_id, target.object_id)
    {
        return Ok(());
    }
    Err(ScriptError::new(
        "CLI_START_FAILED",
        format!(
            "Npc {:?} (label {}) could not be started.",
            selector,
            label.unwrap_or("main")
        ),
    ))
}

pub(crate) fn run_line_mode(host: &mut LineHost, target: DialogTarget) -> Result<i32, ScriptError> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut writer = io::stdout();
    run_line_mode_with_io(host, target, &mut reader, &mut writer)
}

/// Answers every wait of the target dialogue from `reader` and fast-forwards
/// the tick clock through sleeps until nothing is left to drive.
pub(crate) fn run_line_mode_with_io(
    host: &mut LineHost,
    target: DialogTarget,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<i32, ScriptError> {
    let DialogTarget {
        player_id,
        object_id,
    } = target;

    loop {
        flush_events(host, writer)?;

        if let Some(id) = host.runtime.pending_instance(player_id, object_id) {
            let wait = host.runtime.instance_wait(id).unwrap_or_default();
            let Some(raw) = prompt_input_from(prompt_for(&wait), reader, writer)? else {
                break;
            };
            match handle_line_cmd(&raw, host, writer)? {
                LineCommandAction::Continue => continue,
                LineCommandAction::Close => {
                    host.runtime.continue_dialog(player_id, object_id, true);
                    continue;
                }
                LineCommandAction::Quit => break,
                LineCommandAction::NotHandled => {}
            }
            if !record_response(host, player_id, &wait, &raw) {
                writeln!(writer, "not a number: {}", raw).map_err(map_line_io)?;
                continue;
            }
            host.runtime.continue_dialog(player_id, object_id, false);
            continue;
        }

        let fired = host.timers.borrow_mut().advance_to_next();
        if fired.is_empty() {
            writeln!(writer, "[END]").map_err(map_line_io)?;
            break;
        }
        let now = host.timers.borrow().now();
        writeln!(writer, "[tick {}]", now).map_err(map_line_io)?;
        for id in fired {
            host.runtime.wake_on_timer(id);
        }
    }

    host.runtime.shutdown_all();
    Ok(0)
}

fn prompt_for(wait: &WaitState) -> &'static str {
    match wait {
        WaitState::AwaitingMenuChoice => "choice> ",
        WaitState::AwaitingInput(request) if request.is_string => "text> ",
        WaitState::AwaitingInput(_) => "number> ",
        _ => "> ",
    }
}

/// Stores the reply the runtime will consume on resume. False when a
/// numeric reply does not parse.
fn record_response(host: &LineHost, player_id: PlayerId, wait: &WaitState, raw: &str) -> bool {
    let mut session = host.session.borrow_mut();
    match wait {
        WaitState::AwaitingMenuChoice => match raw.trim().parse::<i32>() {
            Ok(choice) => session.record_menu_selection(player_id, choice),
            Err(_) => return false,
        },
        WaitState::AwaitingInput(request) if request.is_string => {
            session.record_input_text(player_id, raw)
        }
        WaitState::AwaitingInput(_) => match raw.trim().parse::<i32>() {
            Ok(amount) => session.record_input_amount(player_id, amount),
            Err(_) => return false,
        },
        _ => {}
    }
    true
}

fn flush_events(host: &LineHost, writer: &mut dyn Write) -> Result<(), ScriptError> {
    let events = host.session.borrow_mut().take_events();
    for event in events {
        let written = match event {
            SessionEvent::Message { text, .. } => writeln!(writer, "{}", text),
            SessionEvent::Next { .. } => writeln!(writer, "[next]"),
            SessionEvent::Clear { .. } => writeln!(writer, "[clear]"),
            SessionEvent::Close { .. } => writeln!(writer, "[close]"),
            SessionEvent::Menu { text, .. } => write_menu(writer, &text),
            SessionEvent::InputRequested { is_string, .. } => {
                writeln!(writer, "[input {}]", if is_string { "text" } else { "number" })
            }
            other => {
                debug!(?other, "session event");
                Ok(())
            }
        };
        written.map_err(map_line_io)?;
    }
    Ok(())
}

/// Empty options keep their number but are not shown.
fn write_menu(writer: &mut dyn Write, text: &str) -> io::Result<()> {
    for (index, option) in text.split(':').enumerate() {
        if !option.is_empty() {
            writeln!(writer, "  [{}] {}", index + 1, option)?;
        }
    }
    Ok(())
}

pub(crate) fn handle_line_cmd(
    raw: &str,
    host: &LineHost,
    writer: &mut dyn Write,
) -> Result<LineCommandAction, ScriptError> {
    let raw = raw.trim();
    let action = match raw.split_once(' ').unwrap_or((raw, "")) {
        (":help", _) => {
            writeln!(writer, "{}", HELP).map_err(map_line_io)?;
            LineCommandAction::Continue
        }
        (":get", key) if !key.trim().is_empty() => {
            let value = host.runtime.variable(key.trim());
            writeln!(writer, "{} = {}", key.trim(), value.to_text()).map_err(map_line_io)?;
            LineCommandAction::Continue
        }
        (":close", _) => LineCommandAction::Close,
        (":quit", _) => LineCommandAction::Quit,
        _ => LineCommandAction::NotHandled,
    };
    Ok(action)
}

/// `None` once the reader is exhausted.
pub(crate) fn prompt_input_from(
    prefix: &str,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<Option<String>, ScriptError> {
    write!(writer, "{}", prefix).map_err(map_line_io)?;
    writer.flush().map_err(map_line_io)?;
    let mut input = String::new();
    let read = reader.read_line(&mut input).map_err(map_line_io)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim_end_matches(&['\r', '\n'][..]).to_string()))
}
