mod common;

use common::*;
use nnrt::compiler::{CompiledGraph, Compiler};
use nnrt::engines::{EngineOptions, ForwardPrecision, MemoryPolicy, OptimizationLevel};
use nnrt::graph::Observer;
use nnrt::ir::{Edge, Graph, GraphBuilder, GraphTopo, ModelDef, Node};
use nnrt::memory::{compute_liveness, LivenessMode};
use nnrt::ops::{OpState, QuantParam};
use nnrt::{DType, Error, ErrorKind, HostTensor, Runtime};
use std::collections::HashMap;
use std::time::Instant;

const MODEL: &str = r#"{
    "nodes": [
        {"name": "mm", "op": {"name": "MatMul", "version": 13}, "inputs": ["x", "w"], "outputs": ["h"]},
        {"name": "bias", "op": {"name": "Add", "version": 13}, "inputs": ["h", "b"], "outputs": ["y"]},
        {"name": "act", "op": {"name": "Relu", "version": 13}, "inputs": ["y"], "outputs": ["z"]}
    ],
    "constants": [
        {"name": "w", "shape": [2, 3], "values": [1, 0, -1, 0, 1, 1]},
        {"name": "b", "shape": [3], "values": [-2, -2, 0]}
    ],
    "outputs": ["z"]
}"#;

fn model() -> Graph {
    init_logging();
    Graph::from_model_def(&ModelDef::from_json(MODEL).unwrap()).unwrap()
}

fn inputs(values: Vec<f32>, shape: &[usize]) -> HashMap<String, HostTensor> {
    HashMap::from([("x".to_string(), f32_tensor(values, shape))])
}

#[test]
fn compile_and_run() {
    let engine = embedded(EngineOptions::default());
    let compiled = Compiler::new(&engine)
        .compile(model(), &f32_shapes(&[("x", &[2, 2])]))
        .unwrap();
    assert_eq!(compiled.input_names(), vec!["x"]);
    assert_eq!(compiled.output_names(), vec!["z"]);
    assert_eq!(compiled.shape_by_name("h").unwrap().dims, vec![2, 3]);
    assert_eq!(compiled.shape_by_name("z").unwrap().dtype, Some(DType::F32));
    for node in compiled.graph().topo.nodes() {
        assert_eq!(compiled.op_state(node.id()), Some(OpState::KernelCreated));
        assert!(compiled.kernel(node.id()).is_some());
    }
    compiled.plan().validate().unwrap();

    let mut runtime = Runtime::new(compiled);
    let outputs = runtime.run(inputs(vec![1.0, 2.0, 3.0, 4.0], &[2, 2])).unwrap();
    let z = &outputs["z"];
    assert_eq!(z.shape(), &[2, 3]);
    assert_close(z, &[0.0, 0.0, 1.0, 1.0, 2.0, 1.0]);

    // the same shapes run again without re-planning
    let bytes = runtime.storage_bytes();
    let outputs = runtime.run(inputs(vec![-1.0, 0.0, 0.0, 2.0], &[2, 2])).unwrap();
    assert_close(&outputs["z"], &[0.0, 0.0, 1.0, 0.0, 0.0, 2.0]);
    assert_eq!(runtime.storage_bytes(), bytes);
}

#[test]
fn new_input_shape_re_infers_and_re_plans() {
    let engine = embedded(EngineOptions::default());
    let compiled = Compiler::new(&engine)
        .compile(model(), &f32_shapes(&[("x", &[1, 2])]))
        .unwrap();
    let mut runtime = Runtime::new(compiled);
    let small = runtime.compiled().plan().total_bytes;

    let outputs = runtime.run(inputs([3.0, 1.0].repeat(64), &[64, 2])).unwrap();
    assert_eq!(outputs["z"].shape(), &[64, 3]);
    assert_eq!(runtime.compiled().shape_by_name("z").unwrap().dims, vec![64, 3]);
    assert!(runtime.compiled().plan().total_bytes > small);
    runtime.compiled().plan().validate().unwrap();
    assert_close(&outputs["z"].slice_row(63), &[1.0, 0.0, 0.0]);

    let err = runtime.run(inputs(vec![1.0; 3], &[1, 3])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn failed_re_plan_leaves_the_runtime_usable() {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder.add_node("act", onnx("Relu"), &["x"], &["y"]);
    let engine = embedded(EngineOptions {
        max_memory_bytes: Some(128),
        ..Default::default()
    });
    let compiled = Compiler::new(&engine)
        .compile(builder.finalize().unwrap(), &f32_shapes(&[("x", &[2])]))
        .unwrap();
    let mut runtime = Runtime::new(compiled);
    let plan = runtime.compiled().plan().clone();

    for _ in 0..2 {
        let err = runtime.run(inputs(vec![1.0; 64], &[64])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationFailure);
        assert_eq!(runtime.compiled().shape_by_name("y").unwrap().dims, vec![2]);
        assert_eq!(runtime.compiled().plan(), &plan);
    }

    let outputs = runtime.run(inputs(vec![-1.0, 3.0], &[2])).unwrap();
    assert_close(&outputs["y"], &[0.0, 3.0]);
}

trait SliceRow {
    fn slice_row(&self, row: usize) -> HostTensor;
}

impl SliceRow for HostTensor {
    fn slice_row(&self, row: usize) -> HostTensor {
        let values = self.to_f32();
        let row = values.index_axis(ndarray::Axis(0), row).to_owned();
        HostTensor::F32(row.into_dyn())
    }
}

fn folding_graph() -> Graph {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("scale", onnx("Mul"), &["w0", "two"], &["w"])
        .add_node("mm", onnx("MatMul"), &["x", "w"], &["y"])
        .add_constant("w0", f32_tensor(vec![1.0, 0.0, 0.0, 1.0], &[2, 2]))
        .add_constant("two", f32_tensor(vec![2.0], &[1]))
        .mark_output("y");
    builder.finalize().unwrap()
}

#[test]
fn constants_are_folded() {
    let engine = embedded(EngineOptions::default());
    let compiled = Compiler::new(&engine)
        .compile(folding_graph(), &f32_shapes(&[("x", &[1, 2])]))
        .unwrap();
    let topo = &compiled.graph().topo;
    assert!(topo.get_node_by_name("scale").is_none());
    assert_eq!(compiled.report().folded_nodes.len(), 1);
    assert_eq!(compiled.order().len(), 1);
    let w = topo.get_edge_by_name("w").unwrap().id();
    assert!(compiled.graph().is_constant(w));
    assert!(topo.get_edge_by_name("w0").is_none());

    let mut runtime = Runtime::new(compiled);
    let outputs = runtime.run(inputs(vec![3.0, 4.0], &[1, 2])).unwrap();
    assert_close(&outputs["y"], &[6.0, 8.0]);
}

#[test]
fn nothing_is_folded_without_optimizations() {
    let mut options = EngineOptions::default();
    options.set("graph_optimization_level", "disable_all").unwrap();
    let engine = embedded(options);
    let compiled = Compiler::new(&engine)
        .compile(folding_graph(), &f32_shapes(&[("x", &[1, 2])]))
        .unwrap();
    assert!(compiled.report().folded_nodes.is_empty());
    assert_eq!(compiled.order().len(), 2);

    let mut runtime = Runtime::new(compiled);
    let outputs = runtime.run(inputs(vec![3.0, 4.0], &[1, 2])).unwrap();
    assert_close(&outputs["y"], &[6.0, 8.0]);
}

fn graph_with_dead_branch() -> Graph {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("live", onnx("Relu"), &["x"], &["y"])
        .add_node("dead", onnx("Identity"), &["x"], &["unused"])
        .add_node("deader", onnx("Relu"), &["unused"], &["unused2"])
        .mark_output("y");
    builder.finalize().unwrap()
}

#[test]
fn dead_nodes_are_eliminated() {
    let engine = embedded(EngineOptions {
        graph_optimization_level: OptimizationLevel::Basic,
        ..Default::default()
    });
    let compiled = Compiler::new(&engine)
        .compile(graph_with_dead_branch(), &f32_shapes(&[("x", &[4])]))
        .unwrap();
    let topo = &compiled.graph().topo;
    assert_eq!(compiled.report().dead_nodes.len(), 2);
    assert!(topo.get_node_by_name("dead").is_none());
    assert!(topo.get_node_by_name("deader").is_none());
    assert!(topo.get_edge_by_name("unused").is_none());
    assert_eq!(topo.node_count(), 1);

    let mut runtime = Runtime::new(compiled);
    let outputs = runtime.run(inputs(vec![-1.0, 1.0, -2.0, 2.0], &[4])).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_close(&outputs["y"], &[0.0, 1.0, 0.0, 2.0]);

    let engine = embedded(EngineOptions {
        graph_optimization_level: OptimizationLevel::DisableAll,
        ..Default::default()
    });
    let compiled = Compiler::new(&engine)
        .compile(graph_with_dead_branch(), &f32_shapes(&[("x", &[4])]))
        .unwrap();
    assert!(compiled.report().dead_nodes.is_empty());
    assert_eq!(compiled.graph().topo.node_count(), 3);
}

#[test]
fn unsupported_operators_abort_the_compile() {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder.add_node("conv", onnx("Conv"), &["x", "w"], &["y"]);
    let graph = builder.finalize().unwrap();
    let engine = embedded(EngineOptions::default());

    let err: Error = Compiler::new(&engine)
        .compile(graph, &f32_shapes(&[("x", &[1]), ("w", &[1])]))
        .unwrap_err()
        .into();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    assert!(err.to_string().contains("conv"));
}

#[test]
fn bad_parameters_fail_binding() {
    for params in [
        serde_json::json!({"transA": "yes"}),
        serde_json::json!({"transpose": true}),
        serde_json::json!({"alpha": null}),
    ] {
        init_logging();
        let mut builder = GraphBuilder::new();
        builder
            .add_node("mm", onnx("MatMul"), &["a", "b"], &["c"])
            .set_params("mm", params.clone());
        let graph = builder.finalize().unwrap();
        let engine = embedded(EngineOptions::default());

        let err = Compiler::new(&engine)
            .compile(graph, &f32_shapes(&[("a", &[2, 2]), ("b", &[2, 2])]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParameterBindingFailure, "{params}");
    }
}

#[test]
fn shape_errors_abort_the_compile() {
    let engine = embedded(EngineOptions::default());
    let err = Compiler::new(&engine)
        .compile(model(), &f32_shapes(&[("x", &[2, 5])]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let err = Compiler::new(&engine).compile(model(), &HashMap::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn memory_limit_is_checked_at_compile_time() {
    let engine = embedded(EngineOptions {
        max_memory_bytes: Some(64),
        ..Default::default()
    });
    let err = Compiler::new(&engine)
        .compile(model(), &f32_shapes(&[("x", &[2, 2])]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
}

#[test]
fn missing_inputs_are_reported() {
    let engine = embedded(EngineOptions::default());
    let compiled = Compiler::new(&engine)
        .compile(model(), &f32_shapes(&[("x", &[2, 2])]))
        .unwrap();
    let mut runtime = Runtime::new(compiled);
    let err = runtime
        .run(HashMap::from([("y".to_string(), f32_tensor(vec![0.0], &[1]))]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    assert!(err.to_string().contains("`x`"));
}

#[derive(Default)]
struct Recorder {
    scheduled: Vec<String>,
    executed: Vec<String>,
    assigned: Vec<(String, Vec<usize>)>,
}

impl Observer<GraphTopo> for Recorder {
    fn on_node_scheduled(&mut self, node: &Node) {
        self.scheduled.push(node.name().to_string());
    }

    fn on_node_executed(&mut self, node: &Node, start: Instant, end: Instant) {
        assert!(start <= end);
        self.executed.push(node.name().to_string());
    }

    fn on_tensor_assigned(&mut self, link: &Edge, tensor: &HostTensor) {
        self.assigned.push((link.name().to_string(), tensor.shape().to_vec()));
    }
}

#[test]
fn observer_sees_every_node_in_order() {
    let engine = embedded(EngineOptions::default());
    let compiled = Compiler::new(&engine)
        .with_liveness_mode(LivenessMode::Wavefront)
        .compile(model(), &f32_shapes(&[("x", &[2, 2])]))
        .unwrap();
    compiled.plan().validate().unwrap();
    let mut runtime = Runtime::new(compiled);

    let mut recorder = Recorder::default();
    runtime
        .run_with_observer(inputs(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]), &mut recorder)
        .unwrap();
    assert_eq!(recorder.scheduled, vec!["mm", "bias", "act"]);
    assert_eq!(recorder.executed, recorder.scheduled);
    assert_eq!(
        recorder.assigned,
        vec![
            ("h".to_string(), vec![2, 3]),
            ("y".to_string(), vec![2, 3]),
            ("z".to_string(), vec![2, 3]),
        ]
    );
}

/// `q` reads `e` at BFS level 1, but a deeper-first order runs it after the whole `c` chain.
fn late_consumer_graph() -> Graph {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("p", onnx("Relu"), &["x"], &["e"])
        .add_node("q", onnx("Relu"), &["e"], &["qy"])
        .add_node("c1", onnx("Sub"), &["e", "e"], &["t1"])
        .add_node("c2", onnx("Relu"), &["t1"], &["t2"])
        .add_node("c3", onnx("Relu"), &["t2"], &["t3"])
        .add_node("c4", onnx("Relu"), &["t3"], &["t4"])
        .mark_output("qy")
        .mark_output("t4");
    builder.finalize().unwrap()
}

/// Edges sharing a slot must not be live together along the order the runtime executes.
fn assert_slots_disjoint_in_execution(compiled: &CompiledGraph) {
    let graph = compiled.graph();
    let order = compiled.order();
    let position = |nid: &usize| order.iter().position(|x| x == nid);
    let live = compute_liveness(&graph.topo, position, order.len() - 1, |edge| graph.is_output(*edge));
    let plan = compiled.plan();
    let edges: Vec<_> = plan.assignments.keys().copied().collect();
    for (i, a) in edges.iter().enumerate() {
        for b in &edges[i + 1..] {
            if plan.slot_of(*a) == plan.slot_of(*b) {
                assert!(!live[a].overlaps(&live[b]), "edges {a} and {b} share a slot while live");
            }
        }
    }
}

#[test]
fn wavefront_liveness_matches_serial_results() {
    let engine = embedded(EngineOptions::default());
    let shapes = f32_shapes(&[("x", &[4])]);
    let x = || inputs(vec![1.0, 2.0, 3.0, 4.0], &[4]);

    let serial = Compiler::new(&engine).compile(late_consumer_graph(), &shapes).unwrap();
    assert!(is_before(&serial.graph().topo, serial.order(), "c4", "q"));
    assert_slots_disjoint_in_execution(&serial);
    let expected = Runtime::new(serial).run(x()).unwrap();
    assert_close(&expected["qy"], &[1.0, 2.0, 3.0, 4.0]);
    assert_close(&expected["t4"], &[0.0; 4]);

    let wavefront = Compiler::new(&engine)
        .with_liveness_mode(LivenessMode::Wavefront)
        .compile(late_consumer_graph(), &shapes)
        .unwrap();
    let topo = &wavefront.graph().topo;
    let levels = topo.wavefront_levels().unwrap();
    let ordered: Vec<usize> = wavefront.order().iter().map(|n| levels[*n].unwrap()).collect();
    assert!(ordered.windows(2).all(|w| w[0] <= w[1]), "{ordered:?}");
    assert!(is_before(topo, wavefront.order(), "q", "c2"));
    wavefront.plan().validate().unwrap();
    assert_slots_disjoint_in_execution(&wavefront);

    let outputs = Runtime::new(wavefront).run(x()).unwrap();
    for name in ["qy", "t4"] {
        assert_eq!(outputs[name], expected[name], "{name}");
    }
}

#[test]
fn half_precision_and_mru_planning() {
    let engine = embedded(EngineOptions {
        forward_precision: ForwardPrecision::Fp16,
        mm_policy: MemoryPolicy::Mru,
        ..Default::default()
    });
    let compiled = Compiler::new(&engine)
        .compile(model(), &f32_shapes(&[("x", &[2, 2])]))
        .unwrap();
    assert_eq!(compiled.shape_by_name("z").unwrap().dtype, Some(DType::F16));
    assert_eq!(compiled.plan().policy, MemoryPolicy::Mru);

    let mut runtime = Runtime::new(compiled);
    let outputs = runtime.run(inputs(vec![1.0, 2.0, 3.0, 4.0], &[2, 2])).unwrap();
    assert_eq!(outputs["z"].dtype(), DType::F16);
    assert_close(&outputs["z"], &[0.0, 0.0, 1.0, 1.0, 2.0, 1.0]);
}

#[test]
fn quantized_outputs_use_the_quant_table() {
    init_logging();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("act", onnx("Relu"), &["x"], &["y"])
        .set_quant("y", QuantParam::new(DType::U8, 0.5, 0));
    let graph = builder.finalize().unwrap();
    let engine = embedded(EngineOptions {
        forward_precision: ForwardPrecision::Int8,
        ..Default::default()
    });
    let compiled = Compiler::new(&engine)
        .compile(graph, &f32_shapes(&[("x", &[4])]))
        .unwrap();
    assert_eq!(compiled.shape_by_name("y").unwrap().dtype, Some(DType::U8));

    let mut runtime = Runtime::new(compiled);
    let outputs = runtime.run(inputs(vec![-1.0, 0.5, 1.0, 2.0], &[4])).unwrap();
    assert_eq!(outputs["y"].try_to_vec::<u8>().unwrap(), vec![0, 1, 2, 4]);
}
