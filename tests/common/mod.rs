#![allow(dead_code)]

use nnrt::ir::{Graph, GraphBuilder, GraphTopo, NodeId, OpKind};
use nnrt::{DType, Engine, EngineOptions, HostTensor, TensorShape};
use std::collections::HashMap;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_op(name: &str) -> OpKind {
    OpKind::new("test", name, 1)
}

pub fn onnx(name: &str) -> OpKind {
    OpKind::new("", name, 13)
}

/// Diamond-and-merge DAG over nodes `a..i`; `b` closes over the output of `i`.
pub fn nine_node_graph() -> Graph {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("a", test_op("op1"), &["in1"], &["out1", "out2"])
        .add_node("b", test_op("op2"), &["out1", "out6", "out9", "out11"], &["out3"])
        .add_node("c", test_op("op2"), &["out1"], &["out4"])
        .add_node("d", test_op("op2"), &["out2"], &["out5"])
        .add_node("e", test_op("op1"), &["out4"], &["out6", "out7"])
        .add_node("f", test_op("op1"), &["out5"], &["out8"])
        .add_node("g", test_op("op2"), &["out7", "out8"], &["out9"])
        .add_node("h", test_op("op2"), &["in2"], &["out10"])
        .add_node("i", test_op("op2"), &["out9", "out10"], &["out11"]);
    builder.finalize().unwrap()
}

pub fn chain_graph() -> Graph {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("a", test_op("op1"), &["input_of_a"], &["output_of_a"])
        .add_node("b", test_op("op2"), &["output_of_a"], &["output_of_b"])
        .add_node("c", test_op("op1"), &["output_of_b"], &["output_of_c"]);
    builder.finalize().unwrap()
}

pub fn node_id(topo: &GraphTopo, name: &str) -> NodeId {
    topo.get_node_by_name(name).unwrap().id()
}

pub fn names(topo: &GraphTopo, ids: &[NodeId]) -> Vec<String> {
    ids.iter().map(|id| topo.get_node(*id).unwrap().name().to_string()).collect()
}

pub fn is_before(topo: &GraphTopo, order: &[NodeId], a: &str, b: &str) -> bool {
    let pos = |name: &str| {
        let id = node_id(topo, name);
        order.iter().position(|x| *x == id).unwrap()
    };
    pos(a) < pos(b)
}

pub fn embedded(options: EngineOptions) -> Engine {
    init_logging();
    Engine::embedded(options).unwrap()
}

pub fn f32_tensor(values: Vec<f32>, shape: &[usize]) -> HostTensor {
    HostTensor::from_vec_shape(values, shape.to_vec()).unwrap()
}

pub fn f32_shapes(inputs: &[(&str, &[usize])]) -> HashMap<String, TensorShape> {
    inputs
        .iter()
        .map(|(name, dims)| (name.to_string(), TensorShape::new(DType::F32, dims)))
        .collect()
}

pub fn assert_close(actual: &HostTensor, expected: &[f32]) {
    let actual = actual.to_f32();
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "{actual:?} vs {expected:?}");
    }
}
