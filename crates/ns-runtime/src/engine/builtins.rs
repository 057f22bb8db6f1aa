use std::cell::RefCell;
use std::rc::Rc;

use ns_core::{ScriptError, ScriptTable, ScriptValue, TableKey};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Position, INT};
use tracing::info;

use super::ScriptState;
use crate::helpers::rhai_bridge::{dynamic_to_table_key, dynamic_to_value, value_to_dynamic};
use crate::host::{ActionContext, HostFunctionRegistry};

pub const BUILTIN_NAMES: &[&str] = &[
    "get",
    "set",
    "get_var",
    "set_var",
    "get_character_var",
    "set_character_var",
    "get_character_temp_var",
    "set_character_temp_var",
    "get_account_var",
    "set_account_var",
    "get_account_global_var",
    "set_account_global_var",
    "get_map_server_var",
    "set_map_server_var",
    "get_npc_var",
    "set_npc_var",
    "get_npc_temp_var",
    "set_npc_temp_var",
    "get_instance_var",
    "set_instance_var",
    "setarray",
    "cleararray",
    "getarraysize",
    "getarg",
    "getargcount",
    "rid",
    "oid",
    "npc_name",
];

/// Scopes that also get their own `get_<scope>_var` / `set_<scope>_var` pair.
const SCOPED_ACCESSORS: &[&str] = &[
    "character",
    "character_temp",
    "account",
    "account_global",
    "map_server",
    "npc",
    "npc_temp",
    "instance",
];

/// Rhai operations allowed per evaluated op for each step of the resume budget.
const OPERATIONS_PER_STEP: u64 = 100;

type HostCall = Rc<dyn Fn(Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>>>;
type SharedState = Rc<RefCell<ScriptState>>;

fn runtime_error(error: ScriptError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(error.to_string()),
        Position::NONE,
    ))
}

fn to_value(value: Dynamic) -> Result<ScriptValue, Box<EvalAltResult>> {
    dynamic_to_value(value).map_err(runtime_error)
}

pub(super) fn build_engine(
    state: &SharedState,
    host_functions: Rc<dyn HostFunctionRegistry>,
    max_steps_per_resume: usize,
) -> Engine {
    let mut engine = Engine::new();
    engine.set_strict_variables(true);
    engine.set_max_operations(operation_limit(max_steps_per_resume));
    engine.on_print(|text| info!(target: "npcscript::print", "{}", text));

    register_variable_access(&mut engine, state);
    for scope in SCOPED_ACCESSORS.iter().copied() {
        register_scoped_access(&mut engine, state, scope);
    }
    register_array_helpers(&mut engine, state);
    register_frame_access(&mut engine, state);

    for name in host_functions.names() {
        let call = host_call(Rc::clone(state), Rc::clone(&host_functions), name.clone());
        register_host_function(&mut engine, name, call);
    }

    engine
}

fn register_variable_access(engine: &mut Engine, state: &SharedState) {
    let shared = Rc::clone(state);
    engine.register_fn("get", move |key: &str| -> Dynamic {
        let state = shared.borrow();
        let frame = state.stack.current_frame_id();
        value_to_dynamic(&state.vars.get_raw(key, frame))
    });

    let shared = Rc::clone(state);
    engine.register_fn(
        "set",
        move |key: &str, value: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let value = to_value(value)?;
            let mut state = shared.borrow_mut();
            let frame = state.stack.current_frame_id();
            state.vars.set_raw(key, value, frame);
            Ok(())
        },
    );

    let shared = Rc::clone(state);
    engine.register_fn("get_var", move |scope: &str, name: &str| -> Dynamic {
        let state = shared.borrow();
        let frame = state.stack.current_frame_id();
        value_to_dynamic(&state.vars.get_var(scope, name, None, frame))
    });

    let shared = Rc::clone(state);
    engine.register_fn(
        "get_var",
        move |scope: &str, name: &str, index: Dynamic| -> Dynamic {
            let state = shared.borrow();
            let frame = state.stack.current_frame_id();
            let index = dynamic_to_table_key(&index);
            value_to_dynamic(&state.vars.get_var(scope, name, index.as_ref(), frame))
        },
    );

    let shared = Rc::clone(state);
    engine.register_fn(
        "set_var",
        move |scope: &str, name: &str, value: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let value = to_value(value)?;
            let mut state = shared.borrow_mut();
            let frame = state.stack.current_frame_id();
            state.vars.set_var(scope, name, value, None, frame);
            Ok(())
        },
    );

    let shared = Rc::clone(state);
    engine.register_fn(
        "set_var",
        move |scope: &str,
              name: &str,
              value: Dynamic,
              index: Dynamic|
              -> Result<(), Box<EvalAltResult>> {
            let value = to_value(value)?;
            let index = dynamic_to_table_key(&index);
            let mut state = shared.borrow_mut();
            let frame = state.stack.current_frame_id();
            state.vars.set_var(scope, name, value, index, frame);
            Ok(())
        },
    );
}

/// Caps a single evaluation so a script loop inside one op cannot outrun
/// the step guard.
fn operation_limit(max_steps_per_resume: usize) -> u64 {
    (max_steps_per_resume.max(1) as u64).saturating_mul(OPERATIONS_PER_STEP)
}

fn register_scoped_access(engine: &mut Engine, state: &SharedState, scope: &'static str) {
    let shared = Rc::clone(state);
    engine.register_fn(format!("get_{}_var", scope), move |name: &str| -> Dynamic {
        let state = shared.borrow();
        let frame = state.stack.current_frame_id();
        value_to_dynamic(&state.vars.get_var(scope, name, None, frame))
    });

    let shared = Rc::clone(state);
    engine.register_fn(
        format!("get_{}_var", scope),
        move |name: &str, index: Dynamic| -> Dynamic {
            let state = shared.borrow();
            let frame = state.stack.current_frame_id();
            let index = dynamic_to_table_key(&index);
            value_to_dynamic(&state.vars.get_var(scope, name, index.as_ref(), frame))
        },
    );

    let shared = Rc::clone(state);
    engine.register_fn(
        format!("set_{}_var", scope),
        move |name: &str, value: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let value = to_value(value)?;
            let mut state = shared.borrow_mut();
            let frame = state.stack.current_frame_id();
            state.vars.set_var(scope, name, value, None, frame);
            Ok(())
        },
    );

    let shared = Rc::clone(state);
    engine.register_fn(
        format!("set_{}_var", scope),
        move |name: &str, value: Dynamic, index: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let value = to_value(value)?;
            let index = dynamic_to_table_key(&index);
            let mut state = shared.borrow_mut();
            let frame = state.stack.current_frame_id();
            state.vars.set_var(scope, name, value, index, frame);
            Ok(())
        },
    );
}

fn register_array_helpers(engine: &mut Engine, state: &SharedState) {
    let shared = Rc::clone(state);
    engine.register_fn(
        "setarray",
        move |target: &str, values: Array| -> Result<(), Box<EvalAltResult>> {
            let values = values
                .into_iter()
                .map(to_value)
                .collect::<Result<Vec<_>, _>>()?;
            let mut state = shared.borrow_mut();
            let frame = state.stack.current_frame_id();
            state.vars.set_array(target, values, frame);
            Ok(())
        },
    );

    let shared = Rc::clone(state);
    engine.register_fn(
        "cleararray",
        move |name: &str, value: Dynamic, count: INT| -> Result<(), Box<EvalAltResult>> {
            let value = to_value(value)?;
            let mut state = shared.borrow_mut();
            let frame = state.stack.current_frame_id();
            state.vars.clear_array(name, value, count, frame);
            Ok(())
        },
    );

    let shared = Rc::clone(state);
    engine.register_fn("getarraysize", move |name: &str| -> INT {
        let state = shared.borrow();
        let frame = state.stack.current_frame_id();
        state.vars.array_size(name, frame)
    });

    engine.register_fn("getarraysize", |map: Map| -> INT {
        let mut table = ScriptTable::new();
        for key in map.keys() {
            table.set(TableKey::parse(key.as_str()), ScriptValue::Bool(true));
        }
        table.array_size()
    });

    engine.register_fn("getarraysize", |array: Array| -> INT { array.len() as INT });
}

fn register_frame_access(engine: &mut Engine, state: &SharedState) {
    let shared = Rc::clone(state);
    engine.register_fn("getarg", move |index: INT| -> Dynamic {
        frame_arg(&shared, index).unwrap_or_else(|| Dynamic::from_int(0))
    });

    let shared = Rc::clone(state);
    engine.register_fn("getarg", move |index: INT, default: Dynamic| -> Dynamic {
        frame_arg(&shared, index).unwrap_or(default)
    });

    let shared = Rc::clone(state);
    engine.register_fn("getargcount", move || -> INT {
        shared
            .borrow()
            .stack
            .top()
            .map(|frame| frame.args.len() as INT)
            .unwrap_or(0)
    });

    let shared = Rc::clone(state);
    engine.register_fn("rid", move || -> INT {
        shared
            .borrow()
            .stack
            .top()
            .map(|frame| frame.env.player_id as INT)
            .unwrap_or(0)
    });

    let shared = Rc::clone(state);
    engine.register_fn("oid", move || -> INT {
        shared
            .borrow()
            .stack
            .top()
            .map(|frame| frame.env.object_id as INT)
            .unwrap_or(0)
    });

    let shared = Rc::clone(state);
    engine.register_fn("npc_name", move || -> String {
        shared
            .borrow()
            .stack
            .top()
            .map(|frame| frame.env.owner_name.clone())
            .unwrap_or_default()
    });
}

fn frame_arg(state: &SharedState, index: INT) -> Option<Dynamic> {
    let state = state.borrow();
    let frame = state.stack.top()?;
    let index = usize::try_from(index).ok()?;
    frame.arg(index).map(|value| value_to_dynamic(&value))
}

fn host_call(
    state: SharedState,
    host_functions: Rc<dyn HostFunctionRegistry>,
    name: String,
) -> HostCall {
    Rc::new(move |args: Vec<Dynamic>| {
        let context = {
            let state = state.borrow();
            state
                .stack
                .top()
                .map(|frame| ActionContext {
                    player_id: frame.player_id,
                    object_id: frame.object_id,
                    owner_name: frame.owner_name.clone(),
                })
                .unwrap_or(ActionContext {
                    player_id: 0,
                    object_id: 0,
                    owner_name: String::new(),
                })
        };
        let values = args
            .into_iter()
            .map(to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let result = host_functions
            .call(&context, &name, &values)
            .map_err(runtime_error)?;
        Ok(value_to_dynamic(&result))
    })
}

/// Game-action bindings take up to four arguments.
fn register_host_function(engine: &mut Engine, name: &str, call: HostCall) {
    let call0 = Rc::clone(&call);
    engine.register_fn(name, move || call0(Vec::new()));
    let call1 = Rc::clone(&call);
    engine.register_fn(name, move |a: Dynamic| call1(vec![a]));
    let call2 = Rc::clone(&call);
    engine.register_fn(name, move |a: Dynamic, b: Dynamic| call2(vec![a, b]));
    let call3 = Rc::clone(&call);
    engine.register_fn(name, move |a: Dynamic, b: Dynamic, c: Dynamic| {
        call3(vec![a, b, c])
    });
    engine.register_fn(name, move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| {
        call(vec![a, b, c, d])
    });
}
