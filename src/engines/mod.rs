//! Engines own an operator registry and their options, and resolve graph nodes to operators.
mod options;
mod registry;

pub use options::{
    DynamicTuningLevel, EngineOptions, ForwardPrecision, MemoryPolicy, OptimizationLevel, OptionsError, WinogradLevel,
};
pub use registry::{OpFactory, OpRegistry};

use crate::ir::{Node, OpKind};
use crate::ops::{AnyOperator, MatMulOp};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Engine {engine} has no operator for node `{node}` of kind {kind}")]
    UnsupportedOperator { node: String, kind: OpKind, engine: EngineKind },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EngineKind {
    /// Device-style backend. Runs matrix products in half precision.
    Accelerator,
    /// Constrained CPU backend running everything at the requested precision.
    Embedded,
}

#[derive(Clone, Debug)]
pub struct Engine {
    kind: EngineKind,
    options: Arc<EngineOptions>,
    registry: OpRegistry,
}

impl Engine {
    pub fn new(kind: EngineKind, options: EngineOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        let mut registry = OpRegistry::onnx_defaults();
        if kind == EngineKind::Accelerator {
            registry.register("", "MatMul", 1..=13, || AnyOperator::MatMul(MatMulOp::half_precision()));
        }
        log::debug!("created {} engine with {:?}", kind, options);
        Ok(Self {
            kind,
            options: Arc::new(options),
            registry,
        })
    }

    pub fn accelerator(options: EngineOptions) -> Result<Self, OptionsError> {
        Self::new(EngineKind::Accelerator, options)
    }

    pub fn embedded(options: EngineOptions) -> Result<Self, OptionsError> {
        Self::new(EngineKind::Embedded, options)
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn options(&self) -> &Arc<EngineOptions> {
        &self.options
    }

    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OpRegistry {
        &mut self.registry
    }

    /// Instantiates the operator for one node.
    pub fn resolve(&self, node: &Node) -> Result<AnyOperator, DispatchError> {
        match self.registry.find(node.kind()) {
            Some(factory) => Ok(factory()),
            None => {
                log::error!(
                    "{} engine cannot run node `{}`: no operator registered for {}",
                    self.kind,
                    node.name(),
                    node.kind()
                );
                Err(DispatchError::UnsupportedOperator {
                    node: node.name().to_string(),
                    kind: node.kind().clone(),
                    engine: self.kind,
                })
            }
        }
    }
}
