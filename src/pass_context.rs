//! Pipeline driver.
//!
//! `PassContext` owns everything a compilation run threads through: the
//! parsed probes, the running diagnostic bag, and the immutable config
//! handle. Each pass takes `&mut PassContext` (or the narrower pieces it
//! needs) exclusively and returns before the next one starts — no pass
//! reaches into another's state concurrently, which is a stronger version
//! of the "no shared mutable state escapes a pass" rule than a
//! `Mutex`-guarded design would give for free.
//!
//! `run_pipeline` gates on `diagnostics.has_errors()` after every pass:
//! once a pass has recorded an error against any probe, later passes are
//! skipped and the bag is returned as-is rather than running type
//! inference or codegen over a tree known to be broken.

use crate::ast::map_info::MapDeclInfo;
use crate::ast::probe::Probe;
use crate::ast::types::StructRegistry;
use crate::codegen::visitor::CodegenVisitor;
use crate::codegen::CodegenResources;
use crate::config::Config;
use crate::diagnostics::DiagnosticBag;
use crate::portability::PortabilityAnalyser;
use crate::required_resources::RequiredResources;
use crate::resource_analyser::ResourceAnalyser;
use crate::symbol_oracle::SymbolOracle;
use crate::type_analyser::TypeAnalyser;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Owns the arena of parsed probes plus the diagnostics accumulated while
/// compiling them.
pub struct PassContext {
    pub config: Arc<Config>,
    pub probes: Vec<Probe>,
    pub diagnostics: DiagnosticBag,
}

impl PassContext {
    pub fn new(config: Arc<Config>, probes: Vec<Probe>) -> Self {
        Self { config, probes, diagnostics: DiagnosticBag::new() }
    }
}

/// One probe's finished compilation output.
pub struct CompiledProbe {
    pub ir: CodegenResources,
    pub resources: RequiredResources,
}

/// Result of running the full pipeline: either every probe compiled, or
/// the first error-bearing pass's diagnostics are returned instead.
pub enum PipelineOutcome {
    Compiled(Vec<CompiledProbe>),
    Diagnostics(DiagnosticBag),
}

/// Run attach-point expansion, type inference, resource analysis,
/// portability checks, then codegen, over every probe in `ctx`, stopping
/// at the first pass that records an error.
pub fn run_pipeline(
    mut ctx: PassContext,
    oracle: &dyn SymbolOracle,
    registry: &dyn StructRegistry,
) -> PipelineOutcome {
    expand_attach_points(&mut ctx, oracle);
    if ctx.diagnostics.has_errors() {
        return PipelineOutcome::Diagnostics(ctx.diagnostics);
    }

    let type_analyser = TypeAnalyser::new(registry);
    for probe in &ctx.probes {
        type_analyser.analyse_probe(probe, &mut ctx.diagnostics);
    }
    if ctx.diagnostics.has_errors() {
        return PipelineOutcome::Diagnostics(ctx.diagnostics);
    }

    for probe in &ctx.probes {
        PortabilityAnalyser::analyse(probe, &mut ctx.diagnostics);
    }
    if ctx.diagnostics.has_errors() {
        return PipelineOutcome::Diagnostics(ctx.diagnostics);
    }

    let resource_analyser = ResourceAnalyser::new(&ctx.config);
    let mut compiled = Vec::with_capacity(ctx.probes.len());
    for probe in &ctx.probes {
        let analysis = resource_analyser.analyse(probe);
        let map_ids: BTreeMap<String, MapDeclInfo> = analysis.map_decls.clone();

        match CodegenVisitor::new(Arc::clone(&ctx.config), &map_ids).compile(probe, &analysis) {
            Ok((ir, resources)) => compiled.push(CompiledProbe { ir, resources }),
            Err(e) => {
                ctx.diagnostics.error(probe.node, format!("codegen failed: {}", e));
                return PipelineOutcome::Diagnostics(ctx.diagnostics);
            }
        }
    }

    PipelineOutcome::Compiled(compiled)
}

/// Replace each wildcard-bearing attach point with its expansion against
/// the live symbol oracle, in place.
fn expand_attach_points(ctx: &mut PassContext, oracle: &dyn SymbolOracle) {
    for probe in &mut ctx.probes {
        let mut expanded = Vec::with_capacity(probe.attach_points.len());
        for ap in &probe.attach_points {
            expanded.extend(crate::probe_matcher::expand(ap, oracle));
        }
        if expanded.is_empty() {
            ctx.diagnostics.error(probe.node, "no attach points matched after expansion");
        }
        probe.attach_points = expanded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::attach_point::{AttachPoint, ProbeType};
    use crate::ast::types::StaticStructRegistry;
    use crate::ast::NodeId;
    use crate::symbol_oracle::StaticSymbolOracle;

    fn simple_probe() -> Probe {
        let mut ap = AttachPoint::new(ProbeType::Kprobe, "kprobe:vfs_read");
        ap.func = "vfs_read".to_string();
        Probe { node: NodeId(0), attach_points: vec![ap], filter: None, body: vec![] }
    }

    #[test]
    fn pipeline_compiles_a_trivial_probe() {
        let config = Config::new();
        let ctx = PassContext::new(config, vec![simple_probe()]);
        let oracle = StaticSymbolOracle::default().with_kernel_function("vfs_read", 0xffff_ffff);
        let registry = StaticStructRegistry::default();

        match run_pipeline(ctx, &oracle, &registry) {
            PipelineOutcome::Compiled(probes) => assert_eq!(probes.len(), 1),
            PipelineOutcome::Diagnostics(bag) => panic!("expected success, got {:?}", bag.entries()),
        }
    }

    #[test]
    fn unmatched_wildcard_short_circuits_before_codegen() {
        let config = Config::new();
        let mut ap = AttachPoint::new(ProbeType::Kprobe, "kprobe:nonexistent_*");
        ap.func = "nonexistent_*".to_string();
        let probe = Probe { node: NodeId(0), attach_points: vec![ap], filter: None, body: vec![] };
        let ctx = PassContext::new(config, vec![probe]);
        let oracle = StaticSymbolOracle::default();
        let registry = StaticStructRegistry::default();

        match run_pipeline(ctx, &oracle, &registry) {
            PipelineOutcome::Compiled(_) => panic!("expected diagnostics, got a compiled probe"),
            PipelineOutcome::Diagnostics(bag) => assert!(bag.has_errors()),
        }
    }
}
