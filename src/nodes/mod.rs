//! Built-in node types.
//!
//! - Control: [`Msg`] (`msg`), [`SampleRate`] (`samplerate~`)
//! - Tables: [`TabWrite`] (`tabwrite`), [`TabRead`] (`tabread`)
//! - Signal functions: [`SignalFunc`] (`abs~`, `cos~`, `wrap~`, `sqrt~`,
//!   `mtof~`, `ftom~`)
//!
//! [`NodeKind`] gathers them into one closed set, and [`NodeRegistry`] maps a
//! node-type identifier to the constructor of the matching variant.

pub mod funcs;
pub mod msg;
pub mod samplerate;
pub mod table;
pub mod tabread;
pub mod tabwrite;

pub use funcs::{FuncBuilder, FuncOp, SignalFunc};
pub use msg::{Msg, MsgArgs, MsgBuilder};
pub use samplerate::{SampleRate, SampleRateBuilder};
pub use table::{TableArgs, TableBinding};
pub use tabread::{TabRead, TabReadBuilder};
pub use tabwrite::{TabWrite, TabWriteBuilder};

use core::fmt;

use hashbrown::HashMap;
use tracing::debug;

use crate::code::{Code, Type, Var};
use crate::error::{CompileError, Result};
use crate::globals::GlobalCode;
use crate::message::{Atom, Message};
use crate::node::{
    GenerationContext, Generated, InletId, NodeBuilder, NodeImplementation, NodeIo, PortTopology,
    ProcessContext, RuntimeNode, StateVariables,
};

/// Every node type this crate knows how to compile and run.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Msg(Msg),
    TabWrite(TabWrite),
    TabRead(TabRead),
    SampleRate(SampleRate),
    Func(SignalFunc),
}

macro_rules! dispatch {
    ($self:expr, $node:ident => $body:expr) => {
        match $self {
            NodeKind::Msg($node) => $body,
            NodeKind::TabWrite($node) => $body,
            NodeKind::TabRead($node) => $body,
            NodeKind::SampleRate($node) => $body,
            NodeKind::Func($node) => $body,
        }
    };
}

impl NodeImplementation for NodeKind {
    fn state_variables(&self) -> StateVariables {
        dispatch!(self, node => node.state_variables())
    }

    fn dependencies(&self) -> Vec<&'static GlobalCode> {
        dispatch!(self, node => node.dependencies())
    }

    fn generate_declarations(&self, ctx: &GenerationContext<'_>) -> Option<Code> {
        dispatch!(self, node => node.generate_declarations(ctx))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Generated {
        dispatch!(self, node => node.generate(ctx))
    }
}

impl RuntimeNode for NodeKind {
    fn receive(&mut self, inlet: InletId, message: &Message, io: &mut dyn NodeIo) {
        dispatch!(self, node => node.receive(inlet, message, io))
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[f64], outputs: &mut [f64]) {
        dispatch!(self, node => node.process(ctx, inputs, outputs))
    }
}

/// A node ready to be compiled or run.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub node_type: String,
    pub topology: PortTopology,
    pub node: NodeKind,
}

pub type Constructor = fn(&[Atom]) -> Result<(PortTopology, NodeKind)>;

fn construct<B: NodeBuilder>(
    builder: B,
    raw: &[Atom],
    make: impl FnOnce(B::Args) -> NodeKind,
) -> Result<(PortTopology, NodeKind)> {
    let args = builder.translate_args(raw)?;
    let topology = builder.build(&args);
    Ok((topology, make(args)))
}

/// Node-type identifier to constructor.
#[derive(Clone)]
pub struct NodeRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.node_types()).finish()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("msg", |raw| {
            construct(MsgBuilder, raw, |args| NodeKind::Msg(Msg::new(args)))
        });
        registry.register("tabwrite", |raw| {
            construct(TabWriteBuilder, raw, |args| NodeKind::TabWrite(TabWrite::new(args)))
        });
        registry.register("tabread", |raw| {
            construct(TabReadBuilder, raw, |args| NodeKind::TabRead(TabRead::new(args)))
        });
        registry.register("samplerate~", |raw| {
            construct(SampleRateBuilder, raw, |()| NodeKind::SampleRate(SampleRate))
        });
        registry.register("abs~", |raw| func(FuncOp::Abs, raw));
        registry.register("cos~", |raw| func(FuncOp::Cos, raw));
        registry.register("wrap~", |raw| func(FuncOp::Wrap, raw));
        registry.register("sqrt~", |raw| func(FuncOp::Sqrt, raw));
        registry.register("mtof~", |raw| func(FuncOp::Mtof, raw));
        registry.register("ftom~", |raw| func(FuncOp::Ftom, raw));
        registry
    }
}

fn func(op: FuncOp, raw: &[Atom]) -> Result<(PortTopology, NodeKind)> {
    construct(FuncBuilder, raw, |()| NodeKind::Func(SignalFunc::new(op)))
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the constructor for `node_type`
    pub fn register(&mut self, node_type: &'static str, constructor: Constructor) {
        self.constructors.insert(node_type, constructor);
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.constructors.contains_key(node_type)
    }

    /// Registered identifiers, sorted
    pub fn node_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.constructors.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn instantiate(&self, node_type: &str, raw: &[Atom]) -> Result<Instance> {
        let constructor = self
            .constructors
            .get(node_type)
            .ok_or_else(|| CompileError::UnknownNodeType(node_type.to_owned()))?;
        let (topology, node) = constructor(raw)?;
        debug!(
            "instantiated [{}] with {} inlets, {} outlets",
            node_type,
            topology.inlets.len(),
            topology.outlets.len()
        );
        Ok(Instance {
            node_type: node_type.to_owned(),
            topology,
            node,
        })
    }
}

/// Receiver for a cold inlet that passes a float to `setter` and outputs
/// nothing.
pub fn cold_float_inlet_with_setter(setter: &str) -> Code {
    Code::anon_func(
        vec![Var::new(Type::Message, "m")],
        Type::Void,
        Code::raw(format!(
            r#"
if (msg_isMatching(m, [MSG_FLOAT_TOKEN])) {{
    {}(msg_readFloatToken(m, 0))
    return
}}
"#,
            setter
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms;
    use crate::node::PortKind;

    #[test]
    fn knows_every_builtin() {
        let registry = NodeRegistry::new();
        assert_eq!(
            registry.node_types(),
            vec![
                "abs~",
                "cos~",
                "ftom~",
                "msg",
                "mtof~",
                "samplerate~",
                "sqrt~",
                "tabread",
                "tabwrite",
                "wrap~"
            ]
        );
        for op in FuncOp::ALL {
            assert!(registry.contains(op.node_type()));
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        let err = NodeRegistry::new().instantiate("osc~", &[]).unwrap_err();
        assert_eq!(err, CompileError::UnknownNodeType("osc~".into()));
    }

    #[test]
    fn instantiates_with_topology() {
        let registry = NodeRegistry::new();

        let instance = registry.instantiate("wrap~", &[]).unwrap();
        assert_eq!(instance.topology.inlets, vec![PortKind::Signal]);
        assert_eq!(instance.node, NodeKind::Func(SignalFunc::new(FuncOp::Wrap)));

        let instance = registry.instantiate("tabwrite", &atoms!["array1"]).unwrap();
        assert_eq!(instance.topology.inlets.len(), 2);
        assert!(matches!(instance.node, NodeKind::TabWrite(_)));
    }

    #[test]
    fn builder_errors_surface() {
        let err = NodeRegistry::new()
            .instantiate("tabread", &atoms![1, 2])
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidDeclaration { .. }));
    }

    #[test]
    fn cold_inlet_calls_the_setter() {
        assert_eq!(
            cold_float_inlet_with_setter("n_w_setIndex").render(),
            "(m) => {\n    if (msg_isMatching(m, [MSG_FLOAT_TOKEN])) {\n        n_w_setIndex(msg_readFloatToken(m, 0))\n        return\n    }\n}\n"
        );
    }
}
