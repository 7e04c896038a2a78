//! One-in one-out signal functions: `abs~`, `cos~`, `wrap~`, `sqrt~`,
//! `mtof~` and `ftom~`.

use core::f64::consts::TAU;

use tracing::debug;

use crate::code::Code;
use crate::error::Result;
use crate::globals::{GlobalCode, FTOM, MTOF};
use crate::message::{Atom, Message};
use crate::node::{
    GenerationContext, Generated, InletId, NodeBuilder, NodeImplementation, NodeIo, PortKind,
    PortTopology, ProcessContext, RuntimeNode,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FuncOp {
    Abs,
    Cos,
    Wrap,
    Sqrt,
    Mtof,
    Ftom,
}

impl FuncOp {
    pub const ALL: [FuncOp; 6] = [
        FuncOp::Abs,
        FuncOp::Cos,
        FuncOp::Wrap,
        FuncOp::Sqrt,
        FuncOp::Mtof,
        FuncOp::Ftom,
    ];

    pub fn node_type(self) -> &'static str {
        match self {
            FuncOp::Abs => "abs~",
            FuncOp::Cos => "cos~",
            FuncOp::Wrap => "wrap~",
            FuncOp::Sqrt => "sqrt~",
            FuncOp::Mtof => "mtof~",
            FuncOp::Ftom => "ftom~",
        }
    }

    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            FuncOp::Abs => x.abs(),
            FuncOp::Cos => (x * TAU).cos(),
            FuncOp::Wrap => (1.0 + x % 1.0) % 1.0,
            FuncOp::Sqrt => {
                if x >= 0.0 {
                    x.sqrt()
                } else {
                    0.0
                }
            }
            FuncOp::Mtof => mtof(x),
            FuncOp::Ftom => ftom(x),
        }
    }

    /// Target expression computing the function of `input`
    pub fn expression(self, input: &str) -> String {
        match self {
            FuncOp::Abs => format!("Math.abs({})", input),
            FuncOp::Cos => format!("Math.cos({} * 2 * Math.PI)", input),
            FuncOp::Wrap => format!("(1 + ({} % 1)) % 1", input),
            FuncOp::Sqrt => format!("{0} >= 0 ? Math.pow({0}, 0.5) : 0", input),
            FuncOp::Mtof => format!("mtof({})", input),
            FuncOp::Ftom => format!("ftom({})", input),
        }
    }

    pub fn dependencies(self) -> Vec<&'static GlobalCode> {
        match self {
            FuncOp::Mtof => vec![&MTOF],
            FuncOp::Ftom => vec![&FTOM],
            _ => Vec::new(),
        }
    }
}

/// MIDI note to frequency in Hz
pub fn mtof(note: f64) -> f64 {
    if note <= -1500.0 {
        0.0
    } else if note > 1499.0 {
        mtof(1499.0)
    } else {
        8.17579891564 * (0.0577622650 * note).exp()
    }
}

/// Frequency in Hz to MIDI note
pub fn ftom(freq: f64) -> f64 {
    if freq > 0.0 {
        17.3123405046 * (0.12231220585 * freq).ln()
    } else {
        -1500.0
    }
}

pub struct FuncBuilder;

impl NodeBuilder for FuncBuilder {
    type Args = ();

    /// Arguments are accepted and ignored.
    fn translate_args(&self, _raw: &[Atom]) -> Result<()> {
        Ok(())
    }

    fn build(&self, _args: &()) -> PortTopology {
        PortTopology::new([PortKind::Signal], [PortKind::Signal])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalFunc {
    op: FuncOp,
}

impl SignalFunc {
    pub fn new(op: FuncOp) -> Self {
        Self { op }
    }

    pub fn op(&self) -> FuncOp {
        self.op
    }
}

impl NodeImplementation for SignalFunc {
    fn dependencies(&self) -> Vec<&'static GlobalCode> {
        self.op.dependencies()
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Generated {
        Generated::Loop(Code::raw(format!(
            "{} = {}",
            ctx.output(0),
            self.op.expression(&ctx.input(0))
        )))
    }
}

impl RuntimeNode for SignalFunc {
    fn receive(&mut self, inlet: InletId, message: &Message, _io: &mut dyn NodeIo) {
        debug!(
            "[{}] has no message inlets, dropping {} on inlet {}",
            self.op.node_type(),
            message,
            inlet
        );
    }

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[f64], outputs: &mut [f64]) {
        outputs[0] = self.op.apply(inputs[0]);
    }
}
