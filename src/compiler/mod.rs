//! Turns a [`Graph`] into a [`CompiledGraph`] for one engine.
//!
//! The pipeline is: dead-node elimination, dispatch with operator Init/Finalize, scheduling,
//! type and shape propagation, constant folding, kernel creation and memory planning. Every
//! step either completes for the whole graph or aborts the compile.
use crate::engines::{DispatchError, Engine, EngineKind, EngineOptions, OptimizationLevel};
use crate::host_tensor::HostTensor;
use crate::ir::{EdgeId, Graph, GraphError, GraphTopo, Node, NodeId};
use crate::kernels::{Kernel, KernelError};
use crate::memory::{compute_liveness, Interval, LivenessMode, MemoryError, MemoryPlan, MemoryPlanner, TensorRequest};
use crate::ops::{InputOutputInfo, KernelCreateContext, OpError, OpState, OptKernel, OptKernelOptions, TensorShape};
use crate::optimizer::{self, PassReport, PassSet};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    #[error(transparent)]
    GraphError(#[from] GraphError),
    #[error(transparent)]
    OpError(#[from] OpError),
    #[error(transparent)]
    DispatchError(#[from] DispatchError),
    #[error(transparent)]
    MemoryError(#[from] MemoryError),
    #[error(transparent)]
    KernelError(#[from] KernelError),
    #[error("No shape given for graph input `{0}`")]
    MissingInputShape(String),
    #[error("Graph input `{0}` has no type")]
    UntypedInput(String),
}

/// Execution order for an optimization level and liveness mode: BFS without optimizations,
/// deeper-first otherwise.
///
/// Wavefront liveness treats every node of a BFS level as running at the same position, so
/// under that mode the order is always the BFS order, which never runs a node before a node of
/// a lower level.
pub fn schedule(
    topo: &GraphTopo,
    level: OptimizationLevel,
    mode: LivenessMode,
) -> Result<Vec<NodeId>, GraphError> {
    if level == OptimizationLevel::DisableAll || mode == LivenessMode::Wavefront {
        topo.bfs_order()
    } else {
        topo.deeper_first_order()
    }
}

pub struct Compiler<'e> {
    engine: &'e Engine,
    liveness_mode: LivenessMode,
}

impl<'e> Compiler<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            liveness_mode: LivenessMode::Serial,
        }
    }

    pub fn with_liveness_mode(mut self, mode: LivenessMode) -> Self {
        self.liveness_mode = mode;
        self
    }

    /// Compiles `graph` for inputs of the given shapes, keyed by input edge name.
    pub fn compile(
        &self,
        mut graph: Graph,
        input_shapes: &HashMap<String, TensorShape>,
    ) -> Result<CompiledGraph, CompilerError> {
        let options = self.engine.options().clone();
        let passes = PassSet::for_level(options.graph_optimization_level);
        let mut report = PassReport::default();
        log::debug!(
            "compiling {} nodes for the {} engine at level {}",
            graph.topo.node_count(),
            self.engine.kind(),
            options.graph_optimization_level
        );

        if passes.dead_node_elimination {
            report.dead_nodes = optimizer::eliminate_dead_nodes(&mut graph)?;
        }

        let mut kernels: Vec<Option<OptKernel>> = (0..graph.topo.max_node_id()).map(|_| None).collect();
        for node in graph.topo.nodes() {
            let op = self.engine.resolve(node)?;
            let mut kernel = OptKernel::new(node, op);
            let opts = OptKernelOptions {
                node,
                engine_options: &options,
                params: graph.data.params.get(&node.id()),
                common_param: graph.data.common_params.get(&node.id()),
            };
            kernel.init(&opts)?;
            kernel.finalize(&opts)?;
            kernels[node.id()] = Some(kernel);
        }

        let order = schedule(&graph.topo, options.graph_optimization_level, self.liveness_mode)?;
        let mut compiled = CompiledGraph {
            graph,
            engine_kind: self.engine.kind(),
            options,
            kernels,
            instances: Vec::new(),
            order,
            shapes: Vec::new(),
            plan: MemoryPlan::default(),
            liveness_mode: self.liveness_mode,
            report,
        };
        compiled.shapes = compiled.infer_shapes(input_shapes)?;

        if passes.constant_folding {
            compiled.fold_constants()?;
        }

        compiled.create_kernels()?;
        compiled.plan = compiled.plan_memory(&compiled.shapes)?;
        log::info!(
            "compiled {} nodes into {} slots ({} bytes)",
            compiled.order.len(),
            compiled.plan.slot_count(),
            compiled.plan.total_bytes
        );
        Ok(compiled)
    }
}

/// A graph bound to an engine: resolved operators, inferred shapes, kernels and memory plan.
#[derive(Debug)]
pub struct CompiledGraph {
    graph: Graph,
    engine_kind: EngineKind,
    options: Arc<EngineOptions>,
    kernels: Vec<Option<OptKernel>>,
    instances: Vec<Option<Box<dyn Kernel>>>,
    order: Vec<NodeId>,
    shapes: Vec<Option<TensorShape>>,
    plan: MemoryPlan,
    liveness_mode: LivenessMode,
    report: PassReport,
}

impl CompiledGraph {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine_kind
    }

    pub fn options(&self) -> &Arc<EngineOptions> {
        &self.options
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn plan(&self) -> &MemoryPlan {
        &self.plan
    }

    pub fn report(&self) -> &PassReport {
        &self.report
    }

    pub fn shape(&self, edge: EdgeId) -> Option<&TensorShape> {
        self.shapes.get(edge).and_then(|s| s.as_ref())
    }

    pub fn shape_by_name(&self, name: &str) -> Option<&TensorShape> {
        self.graph.topo.get_edge_by_name(name).and_then(|e| self.shape(e.id()))
    }

    pub fn op_state(&self, node: NodeId) -> Option<OpState> {
        self.kernels.get(node).and_then(|k| k.as_ref()).map(|k| k.state())
    }

    pub fn kernel(&self, node: NodeId) -> Option<&dyn Kernel> {
        self.instances.get(node).and_then(|k| k.as_deref())
    }

    pub fn input_names(&self) -> Vec<String> {
        self.graph
            .input_edges()
            .into_iter()
            .filter_map(|e| self.graph.topo.get_edge(e).map(|e| e.name().to_string()))
            .collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        self.graph
            .output_edges()
            .iter()
            .filter_map(|e| self.graph.topo.get_edge(*e).map(|e| e.name().to_string()))
            .collect()
    }

    /// Shapes of the graph inputs the graph is currently inferred for.
    pub fn input_shapes(&self) -> HashMap<String, TensorShape> {
        self.graph
            .input_edges()
            .into_iter()
            .filter_map(|e| {
                let name = self.graph.topo.get_edge(e)?.name().to_string();
                Some((name, self.shape(e)?.clone()))
            })
            .collect()
    }

    /// Re-runs type and shape propagation for new input shapes and re-plans memory. Kernels
    /// are kept; they read the shapes they are given at execution time.
    ///
    /// Shapes and plan are replaced together; on failure the graph keeps both as they were.
    pub fn reshape(&mut self, input_shapes: &HashMap<String, TensorShape>) -> Result<(), CompilerError> {
        let shapes = self.infer_shapes(input_shapes)?;
        let plan = self.plan_memory(&shapes)?;
        self.shapes = shapes;
        self.plan = plan;
        Ok(())
    }

    fn infer_shapes(
        &self,
        input_shapes: &HashMap<String, TensorShape>,
    ) -> Result<Vec<Option<TensorShape>>, CompilerError> {
        let topo = &self.graph.topo;
        let mut shapes: Vec<Option<TensorShape>> = vec![None; topo.max_edge_id()];
        for (edge, value) in &self.graph.data.constants {
            shapes[*edge] = Some(TensorShape::new(value.dtype(), value.shape()));
        }
        for edge in self.graph.input_edges() {
            let Some(edge) = topo.get_edge(edge) else {
                continue;
            };
            let shape = input_shapes
                .get(edge.name())
                .ok_or_else(|| CompilerError::MissingInputShape(edge.name().to_string()))?;
            if shape.dtype.is_none() {
                return Err(CompilerError::UntypedInput(edge.name().to_string()));
            }
            shapes[edge.id()] = Some(shape.clone());
        }
        for name in input_shapes.keys() {
            let known = topo
                .get_edge_by_name(name)
                .is_some_and(|e| e.producer().is_none() && !self.graph.is_constant(e.id()));
            if !known {
                log::warn!("ignoring shape for `{name}`, which is not a graph input");
            }
        }

        let requested = self.options.forward_precision.requested_dtype();
        for nid in &self.order {
            let (Some(node), Some(kernel)) = (topo.get_node(*nid), self.kernels[*nid].as_ref()) else {
                continue;
            };
            let outputs = {
                let info = InputOutputInfo::new(node, |eid, _| shapes.get(eid).and_then(|s| s.as_ref()));
                kernel.infer(&info, requested, &self.graph.data.quant)?
            };
            for (edge, shape) in node.output_ids().iter().zip(outputs) {
                log::trace!("{} -> {:?} {:?}", node.name(), shape.dtype, shape.dims);
                shapes[*edge] = Some(shape);
            }
        }
        Ok(shapes)
    }

    fn node_shapes(&self, node: &Node) -> (Vec<TensorShape>, Vec<TensorShape>) {
        let collect = |ids: &[EdgeId]| {
            ids.iter()
                .map(|e| self.shape(*e).cloned().unwrap_or_default())
                .collect::<Vec<_>>()
        };
        (collect(node.input_ids()), collect(node.output_ids()))
    }

    fn fold_constants(&mut self) -> Result<(), CompilerError> {
        let shapes = &self.shapes;
        let kernels = &mut self.kernels;
        let options = &self.options;
        let eval = |node: &Node, inputs: &[&HostTensor]| -> Result<Vec<HostTensor>, CompilerError> {
            let collect = |ids: &[EdgeId]| {
                ids.iter()
                    .map(|e| shapes.get(*e).cloned().flatten().unwrap_or_default())
                    .collect::<Vec<_>>()
            };
            let (input_shapes, output_shapes) = (collect(node.input_ids()), collect(node.output_ids()));
            let Some(kernel) = kernels.get_mut(node.id()).and_then(|k| k.as_mut()) else {
                return Ok(Vec::new());
            };
            let ctx = KernelCreateContext {
                node,
                engine_options: options,
                input_shapes: &input_shapes,
                output_shapes: &output_shapes,
            };
            let instance = kernel.create_kernel(&ctx)?;
            Ok(instance.execute(inputs, &output_shapes)?)
        };
        let folded = optimizer::fold_constants(&mut self.graph, &self.order, eval)?;
        for nid in &folded {
            self.kernels[*nid] = None;
        }
        if !folded.is_empty() {
            let level = self.options.graph_optimization_level;
            self.order = schedule(&self.graph.topo, level, self.liveness_mode)?;
        }
        self.report.folded_nodes = folded;
        Ok(())
    }

    fn create_kernels(&mut self) -> Result<(), CompilerError> {
        let mut instances: Vec<Option<Box<dyn Kernel>>> = (0..self.graph.topo.max_node_id()).map(|_| None).collect();
        for nid in self.order.clone() {
            let Some(node) = self.graph.topo.get_node(nid) else {
                continue;
            };
            let (input_shapes, output_shapes) = self.node_shapes(node);
            let Some(kernel) = self.kernels[nid].as_mut() else {
                continue;
            };
            let ctx = KernelCreateContext {
                node,
                engine_options: &self.options,
                input_shapes: &input_shapes,
                output_shapes: &output_shapes,
            };
            instances[nid] = Some(kernel.create_kernel(&ctx)?);
        }
        self.instances = instances;
        Ok(())
    }

    fn plan_memory(&self, shapes: &[Option<TensorShape>]) -> Result<MemoryPlan, CompilerError> {
        let topo = &self.graph.topo;
        let positions: Vec<Option<usize>> = match self.liveness_mode {
            LivenessMode::Serial => {
                let mut positions = vec![None; topo.max_node_id()];
                for (i, nid) in self.order.iter().enumerate() {
                    positions[*nid] = Some(i);
                }
                positions
            }
            LivenessMode::Wavefront => topo.wavefront_levels()?,
        };
        let last = positions.iter().flatten().copied().max().unwrap_or(0);
        let liveness = compute_liveness(
            topo,
            |nid| positions.get(*nid).copied().flatten(),
            last,
            |edge| self.graph.is_output(*edge),
        );

        let mut requests = Vec::new();
        for edge in topo.edges() {
            if self.graph.is_constant(edge.id()) {
                continue;
            }
            let live = liveness.get(&edge.id()).copied().unwrap_or(Interval::new(0, last));
            let bytes = shapes
                .get(edge.id())
                .and_then(|s| s.as_ref())
                .and_then(|s| s.byte_len())
                .ok_or_else(|| CompilerError::UntypedInput(edge.name().to_string()))?;
            requests.push(TensorRequest {
                edge: edge.id(),
                live,
                bytes,
            });
        }
        let planner = MemoryPlanner::new(self.options.mm_policy, self.options.max_memory_bytes);
        Ok(planner.plan(&requests)?)
    }
}
