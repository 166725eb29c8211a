use crate::dtype::DType;
use crate::host_tensor::HostTensor;
use crate::ir::builder::GraphBuilder;
use crate::ir::node::OpKind;
use crate::ir::GraphError;
use crate::ops::{CommonParam, QuantParam};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: OpKind,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub common: Option<CommonParam>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstantDef {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
    /// Storage type name such as `"float16"` or `"int8"`; values are cast from f32. Defaults to f32.
    #[serde(default)]
    pub dtype: Option<String>,
}

/// Serializable description of a model, the input to [`crate::ir::Graph::from_model_def`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelDef {
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub constants: Vec<ConstantDef>,
    #[serde(default)]
    pub quant: BTreeMap<String, QuantParam>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl ModelDef {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub(crate) fn populate(&self, builder: &mut GraphBuilder) -> Result<(), GraphError> {
        for node in &self.nodes {
            let inputs: Vec<&str> = node.inputs.iter().map(|x| x.as_str()).collect();
            let outputs: Vec<&str> = node.outputs.iter().map(|x| x.as_str()).collect();
            builder.add_node(&node.name, node.op.clone(), &inputs, &outputs);
            if !node.params.is_null() {
                builder.set_params(&node.name, node.params.clone());
            }
            if let Some(common) = &node.common {
                builder.set_common_param(&node.name, common.clone());
            }
        }
        for constant in &self.constants {
            let malformed = |e: &dyn std::fmt::Display| {
                log::warn!("Rejecting constant `{}`: {e}", constant.name);
                GraphError::InvalidGraph(format!("constant `{}` is malformed: {e}", constant.name))
            };
            let mut tensor = HostTensor::from_vec_shape(constant.values.clone(), constant.shape.clone())
                .map_err(|e| malformed(&e))?;
            if let Some(name) = &constant.dtype {
                let dtype: DType = name.parse().map_err(|e| malformed(&e))?;
                tensor = tensor.cast(dtype).map_err(|e| malformed(&e))?;
            }
            builder.add_constant(&constant.name, tensor);
        }
        for (edge, param) in &self.quant {
            builder.set_quant(edge, param.clone());
        }
        for output in &self.outputs {
            builder.mark_output(output);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Graph;

    fn model(dtype: &str) -> ModelDef {
        ModelDef::from_json(&format!(
            r#"{{
                "nodes": [{{"name": "add", "op": {{"domain": "", "name": "Add", "version": 14}},
                           "inputs": ["x", "w"], "outputs": ["y"]}}],
                "constants": [{{"name": "w", "shape": [2], "values": [1.5, -2.0], "dtype": "{dtype}"}}],
                "outputs": ["y"]
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn constants_are_stored_in_the_named_dtype() {
        let graph = Graph::from_model_def(&model("float16")).unwrap();
        let w = graph.topo.get_edge_by_name("w").unwrap().id();
        let value = &graph.data.constants[&w];
        assert_eq!(value.dtype(), DType::F16);
        assert_eq!(value.to_f32().into_raw_vec_and_offset().0, vec![1.5, -2.0]);
    }

    #[test]
    fn unknown_dtype_names_are_rejected() {
        let result = Graph::from_model_def(&model("float7"));
        assert!(matches!(result, Err(GraphError::InvalidGraph(msg)) if msg.contains("float7")));
    }
}
