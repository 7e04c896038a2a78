//! Patchwerk - node implementations for a patch-to-code dataflow compiler
//!
//! A patch is a graph of nodes exchanging discrete messages and audio-rate
//! signals. Every node type here is defined once and turned into fragments of
//! target code by the [`Compiler`], or run natively by a [`Patch`].
//!
//! Design principles:
//! - Node types are a closed set ([`nodes::NodeKind`]) behind one contract
//!   ([`NodeBuilder`], [`NodeImplementation`], [`RuntimeNode`])
//! - Message boxes evaluate `$n` templates ([`template`]) against what they receive
//! - Shared helper code is resolved once per program, dependencies first
//! - Message delivery is synchronous and depth-first
//! - Run-time oddities (a missing array, a placeholder past the end of a
//!   message) degrade to a logged no-op; only compilation returns errors

extern crate alloc;

pub mod code;
mod compiler;
pub mod config;
pub mod error;
pub mod globals;
mod graph;
pub mod logging;
mod message;
mod node;
pub mod nodes;
pub mod template;

pub use compiler::{CompiledNode, Compiler, NodeDeclaration, Program};
pub use config::{BitDepth, Settings};
pub use error::{CompileError, EvalError, Result};
pub use globals::{resolve_dependencies, GlobalCode};
pub use graph::{NodeId, Patch, Sent, MAX_PENDING_DELIVERIES};
pub use message::{Atom, Message};
pub use node::{
    sanitize_identifier, GenerationContext, Generated, InitialValue, InletId, NodeBuilder,
    NodeImplementation, NodeIo, OutletId, PortKind, PortTopology, ProcessContext, RuntimeNode,
    StateVariable, StateVariables,
};
pub use template::{parse_templates, Template, TemplateSet};
