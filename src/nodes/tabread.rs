//! `[tabread <array>]`: outputs the array value at the index it receives.

use alloc::collections::BTreeMap;

use tracing::debug;

use crate::code::{Code, Type, Var};
use crate::error::Result;
use crate::globals::{GlobalCode, COMMONS_ARRAYS, COMMONS_WAIT_ENGINE_CONFIGURE, TOKEN_UTILS};
use crate::message::{Atom, Message};
use crate::node::{
    GenerationContext, Generated, InletId, NodeBuilder, NodeImplementation, NodeIo, PortKind,
    PortTopology, RuntimeNode, StateVariables,
};
use crate::nodes::table::{
    declare_table_base, index_in_range_code, message_set_array_code, prepare_index_code,
    table_state_variables, translate_table_args, TableArgs, TableBinding,
};

pub struct TabReadBuilder;

impl NodeBuilder for TabReadBuilder {
    type Args = TableArgs;

    fn translate_args(&self, raw: &[Atom]) -> Result<TableArgs> {
        translate_table_args("tabread", raw)
    }

    fn build(&self, _args: &TableArgs) -> PortTopology {
        PortTopology::new([PortKind::Message], [PortKind::Message])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TabRead {
    args: TableArgs,
    table: TableBinding,
}

impl TabRead {
    pub fn new(args: TableArgs) -> Self {
        let table = TableBinding::new(&args);
        Self { args, table }
    }

    pub fn table(&self) -> &TableBinding {
        &self.table
    }
}

impl NodeImplementation for TabRead {
    fn state_variables(&self) -> StateVariables {
        table_state_variables(&self.args)
    }

    fn dependencies(&self) -> Vec<&'static GlobalCode> {
        vec![&COMMONS_WAIT_ENGINE_CONFIGURE, &COMMONS_ARRAYS, &TOKEN_UTILS]
    }

    fn generate_declarations(&self, ctx: &GenerationContext<'_>) -> Option<Code> {
        Some(declare_table_base(ctx))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Generated {
        let array = ctx.state("array");
        let index = prepare_index_code("msg_readFloatToken(m, 0)");
        let in_range = index_in_range_code("index", array);
        let snd = ctx.snd(0);
        let set_array = message_set_array_code(ctx);

        let receiver = Code::anon_func(
            vec![Var::new(Type::Message, ctx.message())],
            Type::Void,
            Code::raw(format!(
                r#"
if (msg_isMatching(m, [MSG_FLOAT_TOKEN])) {{
    const index = {index}
    {snd}(msg_floats([{in_range} ? {array}[index] : 0]))
    return
}} {set_array}
"#
            )),
        );

        Generated::MessageReceivers(BTreeMap::from([(0, receiver)]))
    }
}

impl RuntimeNode for TabRead {
    fn receive(&mut self, inlet: InletId, message: &Message, io: &mut dyn NodeIo) {
        match message.atoms() {
            [Atom::Float(index)] => {
                self.table.set_index(*index);
                let value = self.table.read(io);
                io.send(0, Message::floats(&[value]));
            }
            _ if self.table.handle_set_array(message) => {}
            _ => debug!("[tabread] ignoring {} on inlet {}", message, inlet),
        }
    }
}
