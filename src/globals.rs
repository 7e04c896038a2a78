//! Shared helper code emitted once per program.
//!
//! A node lists the [`GlobalCode`] units its fragments call into. Units may in
//! turn depend on other units. [`resolve_dependencies`] flattens everything a
//! program asks for into a single list where each unit appears once and after
//! all of its own dependencies.

use core::fmt;

use hashbrown::HashMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use tracing::debug;

use crate::code::Code;
use crate::config::Settings;
use crate::error::{CompileError, Result};

/// A named unit of helper code.
pub struct GlobalCode {
    /// Unique name, also used as the deduplication key
    pub name: &'static str,
    pub dependencies: &'static [&'static GlobalCode],
    pub body: fn(&Settings) -> Code,
}

impl GlobalCode {
    pub fn generate(&self, settings: &Settings) -> Code {
        (self.body)(settings)
    }
}

impl PartialEq for GlobalCode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for GlobalCode {}

impl fmt::Debug for GlobalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalCode")
            .field("name", &self.name)
            .field(
                "dependencies",
                &self.dependencies.iter().map(|d| d.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Order `requested` and everything it depends on, dependencies first.
///
/// Units are emitted once each. Among units with no ordering constraint the
/// order of first request wins.
pub fn resolve_dependencies<'a, I>(requested: I) -> Result<Vec<&'static GlobalCode>>
where
    I: IntoIterator<Item = &'a &'static GlobalCode>,
{
    let mut graph: DiGraph<&'static GlobalCode, ()> = DiGraph::new();
    let mut indices: HashMap<&'static str, NodeIndex> = HashMap::new();

    let mut roots = Vec::new();
    for unit in requested {
        let index = register(&mut graph, &mut indices, *unit);
        if !roots.contains(&index) {
            roots.push(index);
        }
    }

    toposort(&graph, None)
        .map_err(|cycle| CompileError::DependencyCycle(graph[cycle.node_id()].name))?;

    let mut ordered = Vec::with_capacity(graph.node_count());
    let mut dfs = DfsPostOrder::empty(&graph);
    for root in roots {
        dfs.move_to(root);
        while let Some(index) = dfs.next(&graph) {
            ordered.push(graph[index]);
        }
    }

    debug!(
        "resolved global code: {:?}",
        ordered.iter().map(|u| u.name).collect::<Vec<_>>()
    );
    Ok(ordered)
}

fn register(
    graph: &mut DiGraph<&'static GlobalCode, ()>,
    indices: &mut HashMap<&'static str, NodeIndex>,
    unit: &'static GlobalCode,
) -> NodeIndex {
    if let Some(&index) = indices.get(unit.name) {
        return index;
    }
    let index = graph.add_node(unit);
    indices.insert(unit.name, index);
    // edges point from a unit to what it needs
    for dependency in unit.dependencies {
        let dependency = register(graph, indices, *dependency);
        graph.add_edge(index, dependency, ());
    }
    index
}

pub static BANG_UTILS: GlobalCode = GlobalCode {
    name: "bangUtils",
    dependencies: &[],
    body: |_| {
        Code::raw(
            r#"
            function msg_isBang(m) {
                return msg_getLength(m) === 1
                    && msg_isStringToken(m, 0)
                    && msg_readStringToken(m, 0) === "bang"
            }
            function msg_bang() {
                return msg_fromAtoms(["bang"])
            }
            "#,
        )
    },
};

pub static TOKEN_UTILS: GlobalCode = GlobalCode {
    name: "tokenUtils",
    dependencies: &[],
    body: |_| {
        Code::raw(
            r#"
            function msg_readAtom(m, i) {
                return msg_isFloatToken(m, i) ? msg_readFloatToken(m, i) : msg_readStringToken(m, i)
            }
            function msg_atomToString(m, i) {
                return msg_isFloatToken(m, i) ? String(msg_readFloatToken(m, i)) : msg_readStringToken(m, i)
            }
            function msg_fromAtoms(atoms) {
                const m = msg_create(atoms.map(a => typeof a === "number" ? MSG_FLOAT_TOKEN : [MSG_STRING_TOKEN, a.length]))
                atoms.forEach((a, i) => typeof a === "number" ? msg_writeFloatToken(m, i, a) : msg_writeStringToken(m, i, a))
                return m
            }
            function msg_floats(values) {
                return msg_fromAtoms(values)
            }
            "#,
        )
    },
};

pub static MSG_TEMPLATES: GlobalCode = GlobalCode {
    name: "msgTemplates",
    dependencies: &[&TOKEN_UTILS],
    body: |_| {
        Code::raw(
            r#"
            function tpl_evaluate(template, m) {
                const atoms = []
                for (const segment of template) {
                    if (segment.t !== "p") {
                        atoms.push(segment.v)
                        continue
                    }
                    if (segment.v.length === 1 && typeof segment.v[0] === "number") {
                        if (segment.v[0] > msg_getLength(m)) { return null }
                        atoms.push(msg_readAtom(m, segment.v[0] - 1))
                        continue
                    }
                    let text = ""
                    for (const piece of segment.v) {
                        if (typeof piece === "number") {
                            if (piece > msg_getLength(m)) { return null }
                            text += msg_atomToString(m, piece - 1)
                        } else {
                            text += piece
                        }
                    }
                    atoms.push(text)
                }
                return msg_fromAtoms(atoms)
            }
            function tpl_parseSymbol(s) {
                const pieces = []
                const re = /\\\$|\$(\d*)/g
                let last = 0, text = "", match
                while ((match = re.exec(s)) !== null) {
                    text += s.slice(last, match.index)
                    last = re.lastIndex
                    if (match[0] === "\\$") { text += "$"; continue }
                    const index = match[1].length ? Number(match[1]) : NaN
                    if (!Number.isSafeInteger(index) || index < 1) { return null }
                    if (text.length) { pieces.push(text); text = "" }
                    pieces.push(index)
                }
                text += s.slice(last)
                if (!pieces.length) { return { t: "s", v: text } }
                if (text.length) { pieces.push(text) }
                return { t: "p", v: pieces }
            }
            function tpl_fromMessage(m, start) {
                const template = []
                if (msg_getLength(m) > start && msg_isStringToken(m, start) && msg_readStringToken(m, start) === "symbol") {
                    const next = start + 1
                    if (msg_getLength(m) > next && msg_isStringToken(m, next)) {
                        const segment = tpl_parseSymbol(msg_readStringToken(m, next))
                        return segment === null ? null : [segment]
                    }
                    return [{ t: "s", v: "" }]
                }
                for (let i = start; i < msg_getLength(m); i++) {
                    if (msg_isFloatToken(m, i)) {
                        template.push({ t: "f", v: msg_readFloatToken(m, i) })
                    } else {
                        const segment = tpl_parseSymbol(msg_readStringToken(m, i))
                        if (segment === null) { return null }
                        template.push(segment)
                    }
                }
                return template
            }
            "#,
        )
    },
};

pub static MTOF: GlobalCode = GlobalCode {
    name: "mtof",
    dependencies: &[],
    body: |_| {
        Code::raw(
            r#"
            function mtof(note) {
                if (note <= -1500) { return 0 }
                else if (note > 1499) { return mtof(1499) }
                else { return 8.17579891564 * Math.exp(0.0577622650 * note) }
            }
            "#,
        )
    },
};

pub static FTOM: GlobalCode = GlobalCode {
    name: "ftom",
    dependencies: &[],
    body: |_| {
        Code::raw(
            r#"
            function ftom(freq) {
                return freq > 0 ? 17.3123405046 * Math.log(0.12231220585 * freq) : -1500
            }
            "#,
        )
    },
};

pub static COMMONS_ARRAYS: GlobalCode = GlobalCode {
    name: "commonsArrays",
    dependencies: &[],
    body: |settings| {
        Code::raw(format!(
            r#"
            const commons_ARRAYS = new Map()
            const commons_ARRAYS_CHANGES = new Map()
            function commons_getArray(name) {{
                return commons_ARRAYS.has(name) ? commons_ARRAYS.get(name) : new {array}(0)
            }}
            function commons_setArray(name, array) {{
                commons_ARRAYS.set(name, array)
                for (const callback of commons_ARRAYS_CHANGES.get(name) || []) {{ callback() }}
            }}
            function commons_subscribeArrayChanges(name, callback) {{
                if (!commons_ARRAYS_CHANGES.has(name)) {{ commons_ARRAYS_CHANGES.set(name, []) }}
                commons_ARRAYS_CHANGES.get(name).push(callback)
                if (commons_ARRAYS.has(name)) {{ callback() }}
                return callback
            }}
            function commons_cancelArrayChangesSubscription(name, callback) {{
                const callbacks = commons_ARRAYS_CHANGES.get(name) || []
                const i = callbacks.indexOf(callback)
                if (i !== -1) {{ callbacks.splice(i, 1) }}
            }}
            "#,
            array = settings.bit_depth.float_array()
        ))
    },
};

pub static COMMONS_WAIT_ENGINE_CONFIGURE: GlobalCode = GlobalCode {
    name: "commonsWaitEngineConfigure",
    dependencies: &[],
    body: |_| {
        Code::raw(
            r#"
            const commons_ENGINE_CONFIGURED = []
            function commons_waitEngineConfigure(callback) {
                commons_ENGINE_CONFIGURED.push(callback)
            }
            function commons_configureEngine() {
                commons_ENGINE_CONFIGURED.splice(0).forEach(callback => callback())
            }
            "#,
        )
    },
};
