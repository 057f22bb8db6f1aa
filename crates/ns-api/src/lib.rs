use std::cell::RefCell;
use std::rc::Rc;

use ns_core::{
    FunctionSource, LabelSource, NpcSource, RuntimeConfig, ScriptBundle, ScriptChunk, ScriptError,
    ScriptOp,
};
use ns_runtime::{
    FunctionDefinition, Heap, HostFunctionRegistry, LabelBinding, NpcDefinition, ScriptRuntime,
    ScriptRuntimeOptions, SessionHost, TimerHost,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct CreateRuntimeFromBundleOptions {
    pub bundle_json: String,
    pub session: Rc<RefCell<dyn SessionHost>>,
    pub timers: Rc<RefCell<dyn TimerHost>>,
    pub host_functions: Option<Rc<dyn HostFunctionRegistry>>,
    /// Overrides the bundle's own `config` section.
    pub config: Option<RuntimeConfig>,
}

/// What a bundle load registered. Rejected entries are logged and listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub npcs: usize,
    pub functions: usize,
    pub duplicates: usize,
    pub constants: usize,
    pub rejected: Vec<String>,
}

pub fn parse_bundle(json: &str) -> Result<ScriptBundle, ScriptError> {
    serde_json::from_str(json).map_err(|error| {
        ScriptError::new(
            "API_BUNDLE_PARSE",
            format!("Bundle JSON is invalid: {}", error),
        )
    })
}

/// Structural checks the runtime would otherwise only hit while running.
pub fn validate_bundle(bundle: &ScriptBundle) -> Result<(), ScriptError> {
    for npc in &bundle.npcs {
        let owner = format!("npc \"{}\"", npc.name);
        if let Some(main) = &npc.main {
            validate_ops(&owner, "main", main)?;
        }
        for label in npc.events.iter().chain(&npc.labels) {
            validate_ops(&owner, &label.name, &label.ops)?;
        }
    }
    for function in &bundle.functions {
        let owner = format!("function \"{}\"", function.name);
        validate_ops(&owner, "run", &function.run)?;
        for label in &function.labels {
            validate_ops(&owner, &label.name, &label.ops)?;
        }
    }
    Ok(())
}

fn validate_ops(owner: &str, routine: &str, ops: &[ScriptOp]) -> Result<(), ScriptError> {
    for (index, op) in ops.iter().enumerate() {
        let Some(target) = op.jump_target() else {
            continue;
        };
        if target > ops.len() {
            return Err(ScriptError::new(
                "API_JUMP_TARGET",
                format!(
                    "{} routine \"{}\" op {} ({}) jumps to {} past the end ({} ops).",
                    owner,
                    routine,
                    index,
                    op.kind(),
                    target,
                    ops.len()
                ),
            ));
        }
    }
    Ok(())
}

/// Allocates entry-point handles on the runtime heap and registers every
/// owner in the bundle. Constants are defined before any owner.
pub fn load_bundle(runtime: &mut ScriptRuntime, bundle: ScriptBundle) -> LoadReport {
    let mut report = LoadReport::default();
    let heap = runtime.heap().clone();

    for (name, value) in bundle.constants {
        runtime.define_constant(name, value);
        report.constants += 1;
    }

    for function in bundle.functions {
        let name = function.name.clone();
        if runtime.register_function(function_definition(&heap, function)) {
            report.functions += 1;
        } else {
            report.rejected.push(format!("function \"{}\"", name));
        }
    }

    for npc in bundle.npcs {
        let (id, name) = (npc.id, npc.name.clone());
        let duplicates = npc.duplicates.clone();
        if !runtime.register_npc(npc_definition(&heap, npc)) {
            report.rejected.push(format!("npc \"{}\" (#{})", name, id));
            continue;
        }
        report.npcs += 1;

        for duplicate in duplicates {
            if runtime.clone_npc(id, duplicate.id, duplicate.name.as_deref()) {
                report.duplicates += 1;
            } else {
                warn!(source = id, target = duplicate.id, "npc duplicate rejected");
                report
                    .rejected
                    .push(format!("duplicate #{} of \"{}\"", duplicate.id, name));
            }
        }
    }

    info!(
        npcs = report.npcs,
        functions = report.functions,
        duplicates = report.duplicates,
        rejected = report.rejected.len(),
        "bundle loaded"
    );
    report
}

pub fn create_runtime_from_bundle(
    options: CreateRuntimeFromBundleOptions,
) -> Result<(ScriptRuntime, LoadReport), ScriptError> {
    let mut bundle = parse_bundle(&options.bundle_json)?;
    validate_bundle(&bundle)?;

    let config = options
        .config
        .or_else(|| bundle.config.take())
        .unwrap_or_default();
    let mut runtime = ScriptRuntime::new(ScriptRuntimeOptions {
        config,
        session: options.session,
        timers: options.timers,
        host_functions: options.host_functions,
    })?;
    let report = load_bundle(&mut runtime, bundle);
    Ok((runtime, report))
}

fn npc_definition(heap: &Heap, source: NpcSource) -> NpcDefinition {
    NpcDefinition {
        npc_id: source.id,
        exname: source.name,
        main: source
            .main
            .map(|ops| heap.alloc(ScriptChunk::new("main", ops))),
        events: label_bindings(heap, source.events),
        labels: label_bindings(heap, source.labels),
    }
}

fn function_definition(heap: &Heap, source: FunctionSource) -> FunctionDefinition {
    FunctionDefinition {
        name: source.name,
        run: Some(heap.alloc(ScriptChunk::new("run", source.run))),
        labels: label_bindings(heap, source.labels),
    }
}

fn label_bindings(heap: &Heap, labels: Vec<LabelSource>) -> Vec<LabelBinding> {
    labels
        .into_iter()
        .map(|label| LabelBinding {
            code: heap.alloc(ScriptChunk::new(label.name.clone(), label.ops)),
            name: label.name,
            position: label.position,
        })
        .collect()
}
