mod common;

use common::*;
use nnrt::engines::{Engine, EngineOptions};
use nnrt::ir::{Graph, GraphBuilder};
use nnrt::ops::{
    InputOutputInfo, OpError, OpState, OptKernel, OptKernelOptions, QuantParam, QuantTable, TensorShape, TypePolicy,
    TypeRule,
};
use nnrt::{DType, ErrorKind};

fn graph() -> Graph {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("add", onnx("Add"), &["x", "y"], &["z"])
        .add_node("pow", onnx("Pow"), &["z", "e"], &["p"])
        .add_node("mm", onnx("MatMul"), &["p", "w"], &["out"]);
    builder.finalize().unwrap()
}

fn finalized(graph: &Graph, engine: &Engine, name: &str) -> OptKernel {
    let node = graph.topo.get_node_by_name(name).unwrap();
    let mut kernel = OptKernel::new(node, engine.resolve(node).unwrap());
    let opts = OptKernelOptions {
        node,
        engine_options: engine.options(),
        params: None,
        common_param: None,
    };
    kernel.init(&opts).unwrap();
    kernel.finalize(&opts).unwrap();
    kernel
}

/// Descriptors by edge id, in first-appearance order: x, y, z, e, p, w, out.
fn descriptors(dtype: DType) -> Vec<Option<TensorShape>> {
    let s = |dims: &[usize]| Some(TensorShape::new(dtype, dims));
    vec![s(&[2, 3]), s(&[3]), None, s(&[1]), None, s(&[3, 4]), None]
}

fn infer(
    graph: &Graph,
    kernel: &OptKernel,
    shapes: &[Option<TensorShape>],
    requested: Option<DType>,
    quant: &QuantTable,
) -> Vec<Option<DType>> {
    let node = graph.topo.get_node(kernel.node_id()).unwrap();
    let info = InputOutputInfo::new(node, |eid, _| shapes.get(eid).and_then(|s| s.as_ref()));
    kernel.infer_type(&info, requested, quant).unwrap()
}

#[test]
fn unknown_request_keeps_existing_annotations_and_is_idempotent() {
    let graph = graph();
    let engine = embedded(EngineOptions::default());
    let add = finalized(&graph, &engine, "add");
    let mut shapes = descriptors(DType::F32);
    let quant = QuantTable::new();

    let first = infer(&graph, &add, &shapes, None, &quant);
    assert_eq!(first, vec![Some(DType::F32)]);

    let node = graph.topo.get_node_by_name("add").unwrap();
    let info = InputOutputInfo::new(node, |eid, _| shapes.get(eid).and_then(|s| s.as_ref()));
    let out = add.infer(&info, None, &quant).unwrap();
    drop(info);
    assert_eq!(out[0].dims, vec![2, 3]);
    shapes[2] = Some(out[0].clone());

    let second = infer(&graph, &add, &shapes, None, &quant);
    assert_eq!(first, second);

    // an existing annotation wins over the input type
    shapes[2] = Some(TensorShape::new(DType::F16, &[2, 3]));
    assert_eq!(infer(&graph, &add, &shapes, None, &quant), vec![Some(DType::F16)]);
}

#[test]
fn explicit_request_is_forced() {
    let graph = graph();
    let engine = embedded(EngineOptions::default());
    let add = finalized(&graph, &engine, "add");
    let shapes = descriptors(DType::F32);
    let out = infer(&graph, &add, &shapes, Some(DType::F16), &QuantTable::new());
    assert_eq!(out, vec![Some(DType::F16)]);
}

#[test]
fn pow_promotes_half_inputs_to_float() {
    let graph = graph();
    let engine = embedded(EngineOptions::default());
    let pow = finalized(&graph, &engine, "pow");
    let mut shapes = descriptors(DType::F16);
    shapes[2] = Some(TensorShape::new(DType::F16, &[2, 3]));
    let quant = QuantTable::new();

    assert_eq!(infer(&graph, &pow, &shapes, None, &quant), vec![Some(DType::F32)]);
    assert_eq!(infer(&graph, &pow, &shapes, Some(DType::F16), &quant), vec![Some(DType::F32)]);

    shapes[2] = Some(TensorShape::new(DType::F32, &[2, 3]));
    assert_eq!(infer(&graph, &pow, &shapes, Some(DType::F16), &quant), vec![Some(DType::F16)]);
}

#[test]
fn accelerator_matmul_forces_half() {
    let graph = graph();
    let accelerator = Engine::accelerator(EngineOptions::default()).unwrap();
    let embedded = embedded(EngineOptions::default());
    let mut shapes = descriptors(DType::F32);
    shapes[4] = Some(TensorShape::new(DType::F32, &[2, 3]));
    let quant = QuantTable::new();

    let mm = finalized(&graph, &accelerator, "mm");
    assert_eq!(infer(&graph, &mm, &shapes, None, &quant), vec![Some(DType::F16)]);
    assert_eq!(infer(&graph, &mm, &shapes, Some(DType::F32), &quant), vec![Some(DType::F16)]);

    let mm = finalized(&graph, &embedded, "mm");
    assert_eq!(infer(&graph, &mm, &shapes, None, &quant), vec![Some(DType::F32)]);
}

#[test]
fn quantized_request_reads_the_quant_table() {
    let graph = graph();
    let engine = embedded(EngineOptions::default());
    let add = finalized(&graph, &engine, "add");
    let shapes = descriptors(DType::F32);
    let z = graph.topo.get_edge_by_name("z").unwrap().id();

    let mut quant = QuantTable::new();
    assert_eq!(infer(&graph, &add, &shapes, Some(DType::I8), &quant), vec![Some(DType::I8)]);

    quant.set(z, QuantParam::new(DType::U8, 0.5, 128));
    assert_eq!(infer(&graph, &add, &shapes, Some(DType::I8), &quant), vec![Some(DType::U8)]);
}

#[test]
fn rules_apply_in_order() {
    let graph = graph();
    let node = graph.topo.get_node_by_name("pow").unwrap();
    let shapes = {
        let mut s = descriptors(DType::F16);
        s[2] = Some(TensorShape::new(DType::F16, &[2, 3]));
        s
    };
    let info = InputOutputInfo::new(node, |eid, _| shapes.get(eid).and_then(|s| s.as_ref()));
    let quant = QuantTable::new();

    let promote_then_force = TypePolicy::new(&[TypeRule::PromoteHalfToFloat, TypeRule::ForceHalf]);
    assert_eq!(promote_then_force.infer(&info, None, &quant), vec![Some(DType::F16)]);
    let force_then_promote = TypePolicy::new(&[TypeRule::ForceHalf, TypeRule::PromoteHalfToFloat]);
    assert_eq!(force_then_promote.infer(&info, None, &quant), vec![Some(DType::F32)]);
}

#[test]
fn life_cycle_is_enforced() {
    let graph = graph();
    let engine = embedded(EngineOptions::default());
    let node = graph.topo.get_node_by_name("add").unwrap();
    let mut kernel = OptKernel::new(node, engine.resolve(node).unwrap());
    let opts = OptKernelOptions {
        node,
        engine_options: engine.options(),
        params: None,
        common_param: None,
    };
    assert_eq!(kernel.state(), OpState::Uninitialized);

    let shapes = descriptors(DType::F32);
    let info = InputOutputInfo::new(node, |eid, _| shapes.get(eid).and_then(|s| s.as_ref()));
    let err = kernel.infer(&info, None, &QuantTable::new()).unwrap_err();
    assert!(matches!(err, OpError::InvalidState { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    drop(info);

    assert!(kernel.finalize(&opts).is_err());
    kernel.init(&opts).unwrap();
    assert_eq!(kernel.state(), OpState::Initialized);
    assert!(kernel.init(&opts).is_err());
    kernel.finalize(&opts).unwrap();
    assert_eq!(kernel.state(), OpState::Finalized);
}
