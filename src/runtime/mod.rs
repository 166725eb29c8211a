//! Executes a [`CompiledGraph`] on host tensors.
mod edge_object;

pub use edge_object::EdgeObject;

use crate::compiler::{CompiledGraph, CompilerError};
use crate::dtype::DType;
use crate::graph::Observer;
use crate::host_tensor::{HostTensor, HostTensorError};
use crate::ir::{EdgeId, Graph, GraphTopo};
use crate::kernels::KernelError;
use crate::ops::{InputOutputInfo, TensorShape};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Missing value for graph input `{0}`")]
    MissingInput(String),
    #[error("Edge `{0}` has no value bound")]
    Unbound(String),
    #[error("Node `{node}` produced {got} outputs, expected {expected}")]
    OutputCount { node: String, expected: usize, got: usize },
    #[error(transparent)]
    CompilerError(#[from] CompilerError),
    #[error(transparent)]
    KernelError(#[from] KernelError),
    #[error(transparent)]
    HostTensorError(#[from] HostTensorError),
}

fn unbound(graph: &Graph, edge: EdgeId) -> RuntimeError {
    let name = graph.topo.get_edge(edge).map(|e| e.name().to_string()).unwrap_or_else(|| format!("#{edge}"));
    RuntimeError::Unbound(name)
}

/// Owns a compiled graph together with the slot storage its memory plan asks for.
#[derive(Debug)]
pub struct Runtime {
    compiled: CompiledGraph,
    objects: Vec<Option<EdgeObject>>,
    storage: Vec<Vec<u64>>,
}

impl Runtime {
    pub fn new(compiled: CompiledGraph) -> Self {
        if let Some(numa) = compiled.options().numa_node_id {
            log::info!("numa node {numa} requested; host storage is not pinned");
        }
        let mut runtime = Self {
            compiled,
            objects: Vec::new(),
            storage: Vec::new(),
        };
        runtime.bind();
        runtime
    }

    pub fn compiled(&self) -> &CompiledGraph {
        &self.compiled
    }

    pub fn edge_object(&self, edge: EdgeId) -> Option<&EdgeObject> {
        self.objects.get(edge).and_then(|o| o.as_ref())
    }

    /// Bytes of slot storage currently allocated.
    pub fn storage_bytes(&self) -> usize {
        self.storage.iter().map(|s| s.len() * size_of::<u64>()).sum()
    }

    fn bind(&mut self) {
        let graph = self.compiled.graph();
        let plan = self.compiled.plan();
        let objects = (0..graph.topo.max_edge_id())
            .map(|edge| {
                let shape = self.compiled.shape(edge)?.clone();
                if graph.is_constant(edge) {
                    Some(EdgeObject::Constant(shape))
                } else {
                    plan.slot_of(edge).map(|slot| EdgeObject::Slot { shape, slot })
                }
            })
            .collect();
        let storage = plan.slots.iter().map(|bytes| vec![0u64; bytes.div_ceil(size_of::<u64>())]).collect();
        self.objects = objects;
        self.storage = storage;
        log::debug!("bound {} slots, {} bytes", self.storage.len(), self.storage_bytes());
    }

    pub fn run(&mut self, inputs: HashMap<String, HostTensor>) -> Result<HashMap<String, HostTensor>, RuntimeError> {
        self.run_with_observer(inputs, &mut ())
    }

    /// Runs the graph on `inputs`, keyed by input edge name, and returns the graph outputs by
    /// name. Inputs whose shapes differ from the compiled ones trigger re-inference and a new
    /// memory plan first.
    pub fn run_with_observer<O: Observer<GraphTopo>>(
        &mut self,
        inputs: HashMap<String, HostTensor>,
        observer: &mut O,
    ) -> Result<HashMap<String, HostTensor>, RuntimeError> {
        let mut shapes = HashMap::new();
        for name in self.compiled.input_names() {
            let tensor = inputs.get(&name).ok_or_else(|| RuntimeError::MissingInput(name.clone()))?;
            shapes.insert(name, TensorShape::new(tensor.dtype(), tensor.shape()));
        }
        for name in inputs.keys() {
            if !shapes.contains_key(name) {
                log::warn!("ignoring value for `{name}`, which is not a graph input");
            }
        }
        if shapes != self.compiled.input_shapes() {
            log::info!("input shapes changed, re-inferring and re-planning");
            self.compiled.reshape(&shapes)?;
            self.bind();
        }

        let Runtime {
            compiled,
            objects,
            storage,
        } = self;
        let graph = compiled.graph();
        for edge in graph.input_edges() {
            let Some(name) = graph.topo.get_edge(edge).map(|e| e.name()) else {
                continue;
            };
            let (Some(tensor), Some(Some(object))) = (inputs.get(name), objects.get(edge)) else {
                continue;
            };
            object.store(storage, tensor)?;
        }

        for nid in compiled.order() {
            let (Some(node), Some(kernel)) = (graph.topo.get_node(*nid), compiled.kernel(*nid)) else {
                continue;
            };
            observer.on_node_scheduled(node);
            let start = Instant::now();
            let info = InputOutputInfo::new(node, |edge, _| objects.get(edge).and_then(|o| o.as_ref()));

            let mut values: Vec<Cow<HostTensor>> = Vec::with_capacity(info.input_count());
            for (edge, object) in node.input_ids().iter().zip(info.inputs()) {
                let object = object.ok_or_else(|| unbound(graph, *edge))?;
                let value = match object {
                    EdgeObject::Constant(_) => graph.data.constants.get(edge).map(Cow::Borrowed),
                    EdgeObject::Slot { .. } => object.load(storage)?.map(Cow::Owned),
                };
                let value = value.ok_or_else(|| unbound(graph, *edge))?;
                values.push(match graph.data.quant.get(*edge) {
                    Some(q) if value.dtype().is_quantized() => Cow::Owned(HostTensor::F32(q.dequantize(&value))),
                    _ => value,
                });
            }

            // Quantized outputs are computed in f32 and quantized with their edge's parameters.
            let mut descriptors = Vec::with_capacity(info.output_count());
            let mut requantize = Vec::with_capacity(info.output_count());
            for (i, edge) in node.output_ids().iter().enumerate() {
                let object = info.output(i).ok_or_else(|| unbound(graph, *edge))?;
                let mut shape = object.shape().clone();
                let quant = graph
                    .data
                    .quant
                    .get(*edge)
                    .filter(|_| shape.dtype.is_some_and(|d| d.is_quantized()));
                if quant.is_some() {
                    shape.dtype = Some(DType::F32);
                }
                descriptors.push(shape);
                requantize.push(quant);
            }

            let refs: Vec<&HostTensor> = values.iter().map(|v| v.as_ref()).collect();
            let results = kernel.execute(&refs, &descriptors)?;
            if results.len() != node.output_count() {
                return Err(RuntimeError::OutputCount {
                    node: node.name().to_string(),
                    expected: node.output_count(),
                    got: results.len(),
                });
            }
            for (i, (edge, value)) in node.output_ids().iter().zip(results).enumerate() {
                let value = match requantize[i] {
                    Some(q) => q.quantize(&value.to_f32())?,
                    None => value,
                };
                if let Some(object) = info.output(i) {
                    object.store(storage, &value)?;
                }
                if let Some(link) = graph.topo.get_edge(*edge) {
                    observer.on_tensor_assigned(link, &value);
                }
            }
            observer.on_node_executed(node, start, Instant::now());
        }

        let mut outputs = HashMap::new();
        for edge in graph.output_edges() {
            let Some(name) = graph.topo.get_edge(*edge).map(|e| e.name().to_string()) else {
                continue;
            };
            let value = match graph.data.constants.get(edge) {
                Some(value) => Some(value.clone()),
                None => match objects.get(*edge).and_then(|o| o.as_ref()) {
                    Some(object) => object.load(storage)?,
                    None => None,
                },
            };
            outputs.insert(name, value.ok_or_else(|| unbound(graph, *edge))?);
        }
        Ok(outputs)
    }
}
