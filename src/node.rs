//! The contract every node type implements.
//!
//! A node type comes in two halves. The [`NodeBuilder`] turns raw declaration
//! arguments into typed arguments and a fixed [`PortTopology`]. The
//! [`NodeImplementation`] describes the code the node contributes to a
//! generated program: the state it owns, the global helpers it calls, and
//! either a per-sample loop body or one receiver per message inlet.
//!
//! [`RuntimeNode`] is the native counterpart of [`NodeImplementation`]: a
//! [`Patch`](crate::Patch) uses it to execute the same behaviour without
//! generating any code.

use alloc::collections::BTreeMap;

use hashbrown::HashMap;

use crate::code::{float_literal, string_literal, Code, Type};
use crate::config::Settings;
use crate::error::Result;
use crate::globals::GlobalCode;
use crate::message::{Atom, Message};

pub type InletId = usize;
pub type OutletId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortKind {
    Message,
    Signal,
}

/// Kinds of a node's inlets and outlets, by index. Fixed at build time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortTopology {
    pub inlets: Vec<PortKind>,
    pub outlets: Vec<PortKind>,
}

impl PortTopology {
    pub fn new(
        inlets: impl IntoIterator<Item = PortKind>,
        outlets: impl IntoIterator<Item = PortKind>,
    ) -> Self {
        Self {
            inlets: inlets.into_iter().collect(),
            outlets: outlets.into_iter().collect(),
        }
    }

    #[inline]
    pub fn inlet(&self, id: InletId) -> Option<PortKind> {
        self.inlets.get(id).copied()
    }

    #[inline]
    pub fn outlet(&self, id: OutletId) -> Option<PortKind> {
        self.outlets.get(id).copied()
    }

    pub fn message_inlets(&self) -> impl Iterator<Item = InletId> + '_ {
        ports_of_kind(&self.inlets, PortKind::Message)
    }

    pub fn signal_inlets(&self) -> impl Iterator<Item = InletId> + '_ {
        ports_of_kind(&self.inlets, PortKind::Signal)
    }

    pub fn signal_outlets(&self) -> impl Iterator<Item = OutletId> + '_ {
        ports_of_kind(&self.outlets, PortKind::Signal)
    }

    pub fn has_signal_ports(&self) -> bool {
        self.inlets.iter().chain(&self.outlets).any(|k| *k == PortKind::Signal)
    }
}

fn ports_of_kind(ports: &[PortKind], kind: PortKind) -> impl Iterator<Item = usize> + '_ {
    ports
        .iter()
        .enumerate()
        .filter(move |(_, k)| **k == kind)
        .map(|(i, _)| i)
}

/// Initial value of a state variable.
#[derive(Clone, Debug, PartialEq)]
pub enum InitialValue {
    Int(i64),
    Float(f64),
    Text(String),
    /// An empty array of the configured float width
    EmptyFloatArray,
    /// Any target expression
    Expr(String),
}

impl InitialValue {
    pub fn render(&self, settings: &Settings) -> String {
        match self {
            InitialValue::Int(v) => v.to_string(),
            InitialValue::Float(v) => float_literal(*v),
            InitialValue::Text(s) => string_literal(s),
            InitialValue::EmptyFloatArray => {
                format!("new {}(0)", settings.bit_depth.float_array())
            }
            InitialValue::Expr(e) => e.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateVariable {
    pub name: &'static str,
    pub ty: Type,
    pub init: InitialValue,
}

/// Ordered state owned by one node instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateVariables {
    vars: Vec<StateVariable>,
}

impl StateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, ty: Type, init: InitialValue) -> Self {
        self.vars.push(StateVariable { name, ty, init });
        self
    }

    pub fn iter(&self) -> core::slice::Iter<'_, StateVariable> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variable declarations using the mangled names of `ctx`
    pub fn declare(&self, ctx: &GenerationContext<'_>) -> Code {
        Code::block(self.vars.iter().map(|v| {
            Code::var(v.ty, ctx.state(v.name), v.init.render(ctx.settings))
        }))
    }
}

/// What a node contributes to the body of the program.
#[derive(Clone, Debug, PartialEq)]
pub enum Generated {
    /// Runs once per sample, reading [`GenerationContext::input`] names and
    /// assigning [`GenerationContext::output`] names
    Loop(Code),
    /// One handler per message inlet, each taking the message `m`
    MessageReceivers(BTreeMap<InletId, Code>),
}

/// Names available to a node while it generates code.
///
/// Every per-node name is mangled as `{prefix}_{node}_{local}` so fragments
/// from different nodes never collide.
pub struct GenerationContext<'a> {
    pub node_id: &'a str,
    pub settings: &'a Settings,
    namespace: String,
    state: HashMap<&'static str, String>,
}

impl<'a> GenerationContext<'a> {
    pub fn new(node_id: &'a str, settings: &'a Settings, state: &StateVariables) -> Self {
        let namespace = format!(
            "{}_{}",
            settings.variable_prefix,
            sanitize_identifier(node_id)
        );
        let state = state
            .iter()
            .map(|v| (v.name, format!("{}_{}", namespace, v.name)))
            .collect();
        Self {
            node_id,
            settings,
            namespace,
            state,
        }
    }

    /// Mangled name of a declared state variable.
    ///
    /// # Panics
    ///
    /// If the node did not declare `name` in its state variables.
    pub fn state(&self, name: &str) -> &str {
        &self.state[name]
    }

    /// Mangled name for a helper the node declares itself (e.g. a setter)
    pub fn local(&self, name: &str) -> String {
        format!("{}_{}", self.namespace, name)
    }

    /// Signal input `inlet`, readable inside a loop body
    pub fn input(&self, inlet: InletId) -> String {
        format!("{}_INS_{}", self.namespace, inlet)
    }

    /// Signal output `outlet`, assigned inside a loop body
    pub fn output(&self, outlet: OutletId) -> String {
        format!("{}_OUTS_{}", self.namespace, outlet)
    }

    /// Function sending a message out of `outlet`
    pub fn snd(&self, outlet: OutletId) -> String {
        format!("{}_SNDS_{}", self.namespace, outlet)
    }

    /// Name the receiver for `inlet` is bound to
    pub fn rcv(&self, inlet: InletId) -> String {
        format!("{}_RCVS_{}", self.namespace, inlet)
    }

    /// The message parameter of every receiver
    pub fn message(&self) -> &'static str {
        "m"
    }

    pub fn sample_rate(&self) -> &'static str {
        "SAMPLE_RATE"
    }
}

/// Replace anything that cannot appear in an identifier with `_`.
pub fn sanitize_identifier(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Compile-time description of a node type: arguments and ports.
pub trait NodeBuilder {
    type Args;

    /// Validate raw declaration arguments.
    fn translate_args(&self, raw: &[Atom]) -> Result<Self::Args>;

    fn build(&self, args: &Self::Args) -> PortTopology;
}

pub trait NodeImplementation {
    fn state_variables(&self) -> StateVariables {
        StateVariables::default()
    }

    /// Global code called by this node's fragments, in order
    fn dependencies(&self) -> Vec<&'static GlobalCode> {
        Vec::new()
    }

    fn generate_declarations(&self, _ctx: &GenerationContext<'_>) -> Option<Code> {
        None
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Generated;
}

/// Information available during signal processing.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the patch in Hz
    pub sample_rate: f64,
}

/// What a node can reach while it runs inside a [`Patch`](crate::Patch).
pub trait NodeIo {
    /// Deliver `message` to everything connected to `outlet`. Returns once all
    /// of it has been handled downstream.
    fn send(&mut self, outlet: OutletId, message: Message);

    fn sample_rate(&self) -> f64;

    fn array(&self, name: &str) -> Option<&[f64]>;

    fn array_mut(&mut self, name: &str) -> Option<&mut [f64]>;
}

/// Native execution of a node's behaviour.
pub trait RuntimeNode {
    /// Handle one message on a message inlet.
    fn receive(&mut self, inlet: InletId, message: &Message, io: &mut dyn NodeIo);

    /// Compute one sample. `inputs` has one value per inlet, `outputs` one
    /// per outlet.
    fn process(&mut self, _ctx: &ProcessContext, _inputs: &[f64], _outputs: &mut [f64]) {}
}
