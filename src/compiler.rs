//! High-level compile API
//!
//! [`Compiler`] turns a list of [`NodeDeclaration`]s into a [`Program`]: the
//! global code every node needs, resolved once, plus each node's state,
//! declarations and receivers or loop body, all with mangled names.
//!
//! ```
//! use patchwerk::{atoms, Compiler, NodeDeclaration, Settings};
//!
//! let compiler = Compiler::new(Settings::default());
//! let program = compiler
//!     .compile(&[
//!         NodeDeclaration::new("box", "msg", atoms![123, "$1"]),
//!         NodeDeclaration::new("pitch", "mtof~", vec![]),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(program.global_names(), vec!["tokenUtils", "msgTemplates", "mtof"]);
//! assert!(program.render().contains("n_pitch_OUTS_0 = mtof(n_pitch_INS_0)"));
//! ```

use hashbrown::HashSet;
use tracing::{debug, instrument};

use crate::code::{Code, Type};
use crate::config::Settings;
use crate::error::{CompileError, Result};
use crate::globals::{resolve_dependencies, GlobalCode};
use crate::message::Atom;
use crate::node::{
    sanitize_identifier, GenerationContext, Generated, NodeImplementation, PortTopology,
};
use crate::nodes::NodeRegistry;

/// One node of a patch: a unique id, a node-type identifier and raw arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDeclaration {
    pub id: String,
    pub node_type: String,
    pub args: Vec<Atom>,
}

impl NodeDeclaration {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, args: Vec<Atom>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            args,
        }
    }
}

/// Everything one node contributes to a program.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledNode {
    pub id: String,
    pub node_type: String,
    pub topology: PortTopology,
    /// State variable declarations
    pub state: Code,
    pub declarations: Option<Code>,
    pub generated: Generated,
    /// Names receivers are bound to, by inlet
    pub receiver_names: Vec<(usize, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub globals: Vec<&'static GlobalCode>,
    pub nodes: Vec<CompiledNode>,
    settings: Settings,
}

impl Program {
    pub fn node(&self, id: &str) -> Option<&CompiledNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn global_names(&self) -> Vec<&'static str> {
        self.globals.iter().map(|g| g.name).collect()
    }

    /// Render the whole program as JavaScript.
    ///
    /// Global code first, then each node's state, declarations and
    /// receivers, then a single `loop` function holding every loop body in
    /// declaration order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for global in &self.globals {
            out.push_str(&format!("// {}\n", global.name));
            out.push_str(&global.generate(&self.settings).render());
        }

        let mut loops = Vec::new();
        for node in &self.nodes {
            out.push_str(&format!("// [{}] {}\n", node.node_type, node.id));
            out.push_str(&node.state.render());
            if let Some(declarations) = &node.declarations {
                out.push_str(&declarations.render());
            }
            match &node.generated {
                Generated::MessageReceivers(receivers) => {
                    for (inlet, name) in &node.receiver_names {
                        if let Some(code) = receivers.get(inlet) {
                            out.push_str(&format!("const {} = {}", name, code.render()));
                        }
                    }
                }
                Generated::Loop(code) => loops.push(code.clone()),
            }
        }

        out.push_str(&Code::func("loop", Vec::new(), Type::Void, Code::block(loops)).render());
        out
    }
}

/// Compiles node declarations with a [`NodeRegistry`].
#[derive(Debug)]
pub struct Compiler {
    registry: NodeRegistry,
    settings: Settings,
}

impl Compiler {
    pub fn new(settings: Settings) -> Self {
        Self::with_registry(settings, NodeRegistry::default())
    }

    pub fn with_registry(settings: Settings, registry: NodeRegistry) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    #[instrument(skip_all, fields(nodes = declarations.len()))]
    pub fn compile(&self, declarations: &[NodeDeclaration]) -> Result<Program> {
        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();
        let mut nodes = Vec::with_capacity(declarations.len());

        for declaration in declarations {
            // ids must stay distinct once mangled into identifiers
            if !seen.insert(sanitize_identifier(&declaration.id)) {
                return Err(CompileError::DuplicateNode(declaration.id.clone()));
            }

            let instance = self
                .registry
                .instantiate(&declaration.node_type, &declaration.args)?;
            let state = instance.node.state_variables();
            let ctx = GenerationContext::new(&declaration.id, &self.settings, &state);

            dependencies.extend(instance.node.dependencies());
            let generated = instance.node.generate(&ctx);
            let receiver_names = match &generated {
                Generated::MessageReceivers(receivers) => {
                    receivers.keys().map(|inlet| (*inlet, ctx.rcv(*inlet))).collect()
                }
                Generated::Loop(_) => Vec::new(),
            };

            nodes.push(CompiledNode {
                id: declaration.id.clone(),
                node_type: instance.node_type,
                topology: instance.topology,
                state: state.declare(&ctx),
                declarations: instance.node.generate_declarations(&ctx),
                generated,
                receiver_names,
            });
        }

        let globals = resolve_dependencies(&dependencies)?;
        debug!(
            "compiled {} nodes with {} global code units",
            nodes.len(),
            globals.len()
        );
        Ok(Program {
            globals,
            nodes,
            settings: self.settings.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms;

    #[test]
    fn duplicate_ids_are_rejected() {
        let compiler = Compiler::new(Settings::default());
        let err = compiler
            .compile(&[
                NodeDeclaration::new("a", "abs~", vec![]),
                NodeDeclaration::new("a", "cos~", vec![]),
            ])
            .unwrap_err();
        assert_eq!(err, CompileError::DuplicateNode("a".into()));

        let err = compiler
            .compile(&[
                NodeDeclaration::new("osc-1", "abs~", vec![]),
                NodeDeclaration::new("osc_1", "abs~", vec![]),
            ])
            .unwrap_err();
        assert_eq!(err, CompileError::DuplicateNode("osc_1".into()));
    }

    #[test]
    fn shared_dependencies_are_emitted_once() {
        let compiler = Compiler::new(Settings::default());
        let program = compiler
            .compile(&[
                NodeDeclaration::new("w1", "tabwrite", atoms!["a"]),
                NodeDeclaration::new("w2", "tabwrite", atoms!["b"]),
                NodeDeclaration::new("sr", "samplerate~", vec![]),
            ])
            .unwrap();
        assert_eq!(
            program.global_names(),
            vec!["commonsWaitEngineConfigure", "commonsArrays", "bangUtils", "tokenUtils"]
        );
        let rendered = program.render();
        assert_eq!(rendered.matches("function commons_getArray(name)").count(), 1);
        assert!(rendered.contains("const n_w1_RCVS_1 = (m) => {"));
        assert!(rendered.contains("let n_w2_arrayName = \"b\""));
    }

    #[test]
    fn loop_bodies_share_one_loop() {
        let compiler = Compiler::new(Settings::default());
        let program = compiler
            .compile(&[
                NodeDeclaration::new("a", "abs~", vec![]),
                NodeDeclaration::new("c", "cos~", vec![]),
            ])
            .unwrap();
        assert!(program.render().ends_with(
            "function loop() {\n    n_a_OUTS_0 = Math.abs(n_a_INS_0)\n    n_c_OUTS_0 = Math.cos(n_c_INS_0 * 2 * Math.PI)\n}\n"
        ));
        assert!(program.node("c").is_some());
        assert!(program.node("missing").is_none());
    }

    #[test]
    fn builder_errors_abort_compilation() {
        let compiler = Compiler::new(Settings::default());
        assert!(matches!(
            compiler.compile(&[NodeDeclaration::new("m", "msg", atoms!["$x"])]),
            Err(CompileError::InvalidPlaceholder { .. })
        ));
        assert!(matches!(
            compiler.compile(&[NodeDeclaration::new("o", "osc~", vec![])]),
            Err(CompileError::UnknownNodeType(_))
        ));
    }
}
