//! `[msg ...]`: the message box.
//!
//! Each incoming message is run through the box's templates and one message is
//! sent per template, in order. `set ...` swaps the templates instead.

use alloc::collections::BTreeMap;

use itertools::Itertools;
use tracing::{debug, trace};

use crate::code::{float_literal, string_literal, Code, Type, Var};
use crate::error::Result;
use crate::globals::{GlobalCode, MSG_TEMPLATES};
use crate::message::{Atom, Message};
use crate::node::{
    GenerationContext, Generated, InitialValue, InletId, NodeBuilder, NodeImplementation, NodeIo,
    PortKind, PortTopology, RuntimeNode, StateVariables,
};
use crate::template::{
    apply_set_command, parse_templates, Piece, Segment, SetCommand, Template, TemplateSet,
};

pub struct MsgBuilder;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MsgArgs {
    pub templates: TemplateSet,
}

impl NodeBuilder for MsgBuilder {
    type Args = MsgArgs;

    fn translate_args(&self, raw: &[Atom]) -> Result<MsgArgs> {
        Ok(MsgArgs {
            templates: parse_templates(raw)?,
        })
    }

    fn build(&self, _args: &MsgArgs) -> PortTopology {
        PortTopology::new([PortKind::Message], [PortKind::Message])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    args: MsgArgs,
    active: TemplateSet,
}

impl Msg {
    pub fn new(args: MsgArgs) -> Self {
        let active = args.templates.clone();
        Self { args, active }
    }

    /// Templates currently in use, after any `set`
    pub fn templates(&self) -> &TemplateSet {
        &self.active
    }
}

/// Serialize templates as target data for `tpl_evaluate`.
///
/// A template is a list of segments: `{t: "f", v: 1}` for a number,
/// `{t: "s", v: "a"}` for a symbol, `{t: "p", v: ["a_", 2]}` for text with
/// placeholders, where numbers are 1-based indices.
pub fn templates_literal(templates: &TemplateSet) -> String {
    let template = |t: &Template| {
        format!("[{}]", t.segments().iter().map(segment_literal).join(", "))
    };
    format!("[{}]", templates.iter().map(template).join(", "))
}

fn segment_literal(segment: &Segment) -> String {
    match segment {
        Segment::Literal(Atom::Float(v)) => {
            format!("{{t: \"f\", v: {}}}", float_literal(*v))
        }
        Segment::Literal(Atom::Symbol(s)) => format!("{{t: \"s\", v: {}}}", string_literal(s)),
        Segment::Text(pieces) => {
            let pieces = pieces.iter().map(|p| match p {
                Piece::Text(t) => string_literal(t),
                Piece::Placeholder(n) => n.to_string(),
            });
            format!("{{t: \"p\", v: [{}]}}", pieces.format(", "))
        }
    }
}

impl NodeImplementation for Msg {
    fn state_variables(&self) -> StateVariables {
        StateVariables::new().with(
            "templates",
            Type::TemplateSet,
            InitialValue::Expr(templates_literal(&self.args.templates)),
        )
    }

    fn dependencies(&self) -> Vec<&'static GlobalCode> {
        vec![&MSG_TEMPLATES]
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Generated {
        let receiver = Code::anon_func(
            vec![Var::new(Type::Message, ctx.message())],
            Type::Void,
            Code::raw(format!(
                r#"
if (msg_getLength(m) > 0 && msg_isStringToken(m, 0) && msg_readStringToken(m, 0) === "set") {{
    const template = tpl_fromMessage(m, 1)
    if (template !== null) {{
        {templates} = [template]
    }}
    return
}}
for (const template of {templates}) {{
    const out = tpl_evaluate(template, m)
    if (out !== null) {{
        {snd}(out)
    }}
}}
return
"#,
                templates = ctx.state("templates"),
                snd = ctx.snd(0),
            )),
        );
        Generated::MessageReceivers(BTreeMap::from([(0, receiver)]))
    }
}

impl RuntimeNode for Msg {
    fn receive(&mut self, inlet: InletId, message: &Message, io: &mut dyn NodeIo) {
        match apply_set_command(&mut self.active, message) {
            SetCommand::Applied => trace!("[msg] templates replaced by {}", message),
            SetCommand::Rejected(e) => debug!("[msg] ignoring {}: {}", message, e),
            SetCommand::NotSet => {
                for result in self.active.evaluate_each(message) {
                    match result {
                        Ok(out) => io.send(0, out),
                        Err(e) => debug!("[msg] skipping template on inlet {}: {}", inlet, e),
                    }
                }
            }
        }
    }
}
