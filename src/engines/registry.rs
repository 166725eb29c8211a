use crate::ir::OpKind;
use crate::ops::{
    AnyOperator, BinaryOp, MatMulOp, PowOp, ReduceOp, RoiAlignOp, UnaryOp, WhichBinaryOp, WhichReduceOp,
    WhichUnaryOp,
};
use std::collections::HashMap;
use std::ops::RangeInclusive;

pub type OpFactory = fn() -> AnyOperator;

#[derive(Clone)]
struct Entry {
    versions: RangeInclusive<u64>,
    factory: OpFactory,
}

/// Maps `(domain, op name, version range)` to operator factories.
///
/// Later registrations shadow earlier ones whose version range also matches, which is how an
/// engine overrides a default operator.
#[derive(Clone, Default)]
pub struct OpRegistry {
    entries: HashMap<(String, String), Vec<Entry>>,
}

/// `ai.onnx` and the empty domain both name the default ONNX domain.
fn canonical_domain(domain: &str) -> &str {
    if domain == "ai.onnx" { "" } else { domain }
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the reference operators of the default ONNX domain.
    pub fn onnx_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("", "Add", 1..=14, || AnyOperator::Binary(BinaryOp::new(WhichBinaryOp::Add)));
        registry.register("", "Sub", 1..=14, || AnyOperator::Binary(BinaryOp::new(WhichBinaryOp::Sub)));
        registry.register("", "Mul", 1..=14, || AnyOperator::Binary(BinaryOp::new(WhichBinaryOp::Mul)));
        registry.register("", "Div", 1..=14, || AnyOperator::Binary(BinaryOp::new(WhichBinaryOp::Div)));
        registry.register("", "Pow", 1..=15, || AnyOperator::Pow(PowOp::new()));
        registry.register("", "MatMul", 1..=13, || AnyOperator::MatMul(MatMulOp::new()));
        registry.register("", "Relu", 1..=14, || AnyOperator::Unary(UnaryOp::new(WhichUnaryOp::Relu)));
        registry.register("", "Identity", 1..=21, || AnyOperator::Unary(UnaryOp::new(WhichUnaryOp::Identity)));
        registry.register("", "ReduceL2", 1..=18, || AnyOperator::Reduce(ReduceOp::new(WhichReduceOp::ReduceL2)));
        registry.register("", "ReduceSum", 1..=13, || AnyOperator::Reduce(ReduceOp::new(WhichReduceOp::ReduceSum)));
        registry.register("", "ReduceMean", 1..=18, || AnyOperator::Reduce(ReduceOp::new(WhichReduceOp::ReduceMean)));
        registry.register("", "RoiAlign", 10..=16, || AnyOperator::RoiAlign(RoiAlignOp::new()));
        registry
    }

    pub fn register(&mut self, domain: &str, name: &str, versions: RangeInclusive<u64>, factory: OpFactory) {
        self.entries
            .entry((canonical_domain(domain).to_string(), name.to_string()))
            .or_default()
            .push(Entry { versions, factory });
    }

    pub fn find(&self, kind: &OpKind) -> Option<OpFactory> {
        let key = (canonical_domain(&kind.domain).to_string(), kind.name.clone());
        self.entries
            .get(&key)?
            .iter()
            .rev()
            .find(|e| e.versions.contains(&kind.version))
            .map(|e| e.factory)
    }

    pub fn contains(&self, kind: &OpKind) -> bool {
        self.find(kind).is_some()
    }

    /// Registered `(domain, name)` pairs, sorted.
    pub fn op_names(&self) -> Vec<(String, String)> {
        let mut names: Vec<_> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpRegistry").field("ops", &self.op_names()).finish()
    }
}
