use std::cell::RefCell;
use std::rc::Rc;

use ns_api::{create_runtime_from_bundle, load_bundle, parse_bundle, CreateRuntimeFromBundleOptions};
use ns_core::ScriptValue;
use ns_runtime::{OwnerRef, RecordingSession, TickTimerQueue, WaitState};
use serde_json::json;

struct Hosts {
    session: Rc<RefCell<RecordingSession>>,
    timers: Rc<RefCell<TickTimerQueue>>,
}

fn options(bundle: serde_json::Value) -> (CreateRuntimeFromBundleOptions, Hosts) {
    let session = Rc::new(RefCell::new(RecordingSession::with_players([10])));
    let timers = Rc::new(RefCell::new(TickTimerQueue::new()));
    let options = CreateRuntimeFromBundleOptions {
        bundle_json: bundle.to_string(),
        session: session.clone(),
        timers: timers.clone(),
        host_functions: None,
        config: None,
    };
    (options, Hosts { session, timers })
}

fn merchant_bundle() -> serde_json::Value {
    json!({
        "npcs": [{
            "id": 30,
            "name": "Merchant",
            "main": [
                { "op": "select", "options": ["\"Buy:Sell\""], "into": ".@pick" },
                { "op": "callSub", "label": "L_Price", "args": ["get(\".@pick\")"], "into": ".@price" },
                { "op": "code", "code": "set(\"price\", get(\".@price\"));" },
                { "op": "sleep", "ticks": "5" },
                { "op": "code", "code": "set(\"woke\", 1);" }
            ],
            "labels": [{
                "name": "L_Price",
                "ops": [{ "op": "return", "values": ["getarg(0) * 100"] }]
            }],
            "events": [{
                "name": "OnTouch",
                "position": 2,
                "ops": [{ "op": "code", "code": "set(\"touched\", oid());" }]
            }],
            "duplicates": [{ "id": 31 }]
        }]
    })
}

#[test]
fn bundle_npc_runs_menu_sub_call_and_sleep() {
    let (options, hosts) = options(merchant_bundle());
    let (mut runtime, report) = create_runtime_from_bundle(options).expect("runtime should build");
    assert_eq!(report.npcs, 1);
    assert_eq!(report.duplicates, 1);

    assert!(runtime.run_entry_point(OwnerRef::Name("merchant"), None, 10, 30));
    assert_eq!(
        runtime.pending_wait(10, 30),
        Some(WaitState::AwaitingMenuChoice)
    );

    hosts.session.borrow_mut().record_menu_selection(10, 2);
    assert!(runtime.continue_dialog(10, 30, false));
    assert_eq!(runtime.variable("price"), ScriptValue::from(200));

    let fired = hosts.timers.borrow_mut().advance(5);
    assert_eq!(fired.len(), 1);
    for id in fired {
        assert!(runtime.wake_on_timer(id));
    }
    assert_eq!(runtime.variable("woke"), ScriptValue::from(1));
    assert_eq!(runtime.instance_count(), 0);
}

#[test]
fn duplicated_npc_dispatches_events_with_its_own_object() {
    let (options, _hosts) = options(merchant_bundle());
    let (mut runtime, _) = create_runtime_from_bundle(options).expect("runtime should build");

    assert!(runtime.run_event("OnTouch", 0, 31));
    assert_eq!(runtime.variable("touched"), ScriptValue::from(31));

    assert!(runtime.run_npc(31, None, 2, 0, 31));
    assert!(!runtime.run_npc(31, None, 7, 0, 31));
}

#[test]
fn reloading_a_bundle_replaces_functions_and_releases_old_handles() {
    let first = parse_bundle(
        &json!({
            "functions": [{ "name": "Greet", "run": [{ "op": "return", "values": ["1"] }] }]
        })
        .to_string(),
    )
    .expect("first bundle should parse");
    let second = parse_bundle(
        &json!({
            "functions": [{ "name": "greet", "run": [{ "op": "return", "values": ["2"] }] }]
        })
        .to_string(),
    )
    .expect("second bundle should parse");

    let (options, _hosts) = options(json!({}));
    let (mut runtime, _) = create_runtime_from_bundle(options).expect("runtime should build");
    let baseline = runtime.heap().live_handles();

    load_bundle(&mut runtime, first);
    let after_first = runtime.heap().live_handles();
    assert_eq!(after_first, baseline + 1);

    let report = load_bundle(&mut runtime, second);
    assert_eq!(report.functions, 1);
    assert_eq!(runtime.registry().function_count(), 1);
    assert_eq!(runtime.heap().live_handles(), after_first);
}
