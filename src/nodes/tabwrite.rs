//! `[tabwrite <array>]`: a float on the left inlet is written to the array at
//! the index last received on the right inlet.

use alloc::collections::BTreeMap;

use tracing::debug;

use crate::code::{Code, Type, Var};
use crate::error::Result;
use crate::globals::{GlobalCode, COMMONS_ARRAYS, COMMONS_WAIT_ENGINE_CONFIGURE};
use crate::message::{Atom, Message};
use crate::node::{
    GenerationContext, Generated, InitialValue, InletId, NodeBuilder, NodeImplementation, NodeIo,
    PortKind, PortTopology, RuntimeNode, StateVariables,
};
use crate::nodes::cold_float_inlet_with_setter;
use crate::nodes::table::{
    declare_table_base, index_in_range_code, message_set_array_code, prepare_index_code,
    table_state_variables, translate_table_args, TableArgs, TableBinding,
};

pub struct TabWriteBuilder;

impl NodeBuilder for TabWriteBuilder {
    type Args = TableArgs;

    fn translate_args(&self, raw: &[Atom]) -> Result<TableArgs> {
        translate_table_args("tabwrite", raw)
    }

    fn build(&self, _args: &TableArgs) -> PortTopology {
        PortTopology::new([PortKind::Message, PortKind::Message], [])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TabWrite {
    args: TableArgs,
    table: TableBinding,
}

impl TabWrite {
    pub fn new(args: TableArgs) -> Self {
        let table = TableBinding::new(&args);
        Self { args, table }
    }

    pub fn table(&self) -> &TableBinding {
        &self.table
    }
}

impl NodeImplementation for TabWrite {
    fn state_variables(&self) -> StateVariables {
        table_state_variables(&self.args).with("index", Type::Int, InitialValue::Int(0))
    }

    fn dependencies(&self) -> Vec<&'static GlobalCode> {
        vec![&COMMONS_WAIT_ENGINE_CONFIGURE, &COMMONS_ARRAYS]
    }

    fn generate_declarations(&self, ctx: &GenerationContext<'_>) -> Option<Code> {
        Some(Code::block([
            declare_table_base(ctx),
            Code::func(
                ctx.local("setIndex"),
                vec![Var::new(Type::Float, "index")],
                Type::Void,
                Code::raw(format!(
                    "{} = {}",
                    ctx.state("index"),
                    prepare_index_code("index")
                )),
            ),
        ]))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Generated {
        let array = ctx.state("array");
        let index = ctx.state("index");
        let in_range = index_in_range_code(index, array);
        let set_array = message_set_array_code(ctx);

        let hot = Code::anon_func(
            vec![Var::new(Type::Message, ctx.message())],
            Type::Void,
            Code::raw(format!(
                r#"
if (msg_isMatching(m, [MSG_FLOAT_TOKEN])) {{
    if ({array}.length === 0 || !({in_range})) {{
        return
    }}
    {array}[{index}] = msg_readFloatToken(m, 0)
    return
}} {set_array}
"#
            )),
        );

        Generated::MessageReceivers(BTreeMap::from([
            (0, hot),
            (1, cold_float_inlet_with_setter(&ctx.local("setIndex"))),
        ]))
    }
}

impl RuntimeNode for TabWrite {
    fn receive(&mut self, inlet: InletId, message: &Message, io: &mut dyn NodeIo) {
        match (inlet, message.atoms()) {
            (0, [Atom::Float(value)]) => {
                self.table.write(io, *value);
            }
            (0, _) if self.table.handle_set_array(message) => {}
            (1, [Atom::Float(index)]) => self.table.set_index(*index),
            _ => debug!("[tabwrite] ignoring {} on inlet {}", message, inlet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms;
    use crate::config::Settings;

    #[test]
    fn builds_two_message_inlets_and_no_outlets() {
        let args = TabWriteBuilder.translate_args(&atoms!["array1"]).unwrap();
        let topology = TabWriteBuilder.build(&args);
        assert_eq!(topology.inlets, vec![PortKind::Message; 2]);
        assert!(topology.outlets.is_empty());
    }

    #[test]
    fn generated_code_uses_declared_state() {
        let node = TabWrite::new(TableArgs {
            array_name: "array1".into(),
        });
        let settings = Settings::default();
        let state = node.state_variables();
        let ctx = GenerationContext::new("w", &settings, &state);

        let declarations = node.generate_declarations(&ctx).unwrap().render();
        assert!(declarations.contains("function n_w_setIndex(index) {"));
        assert!(declarations.contains("n_w_index = Math.trunc(index)"));
        assert!(declarations.contains("function n_w_setArrayName(arrayName) {"));

        let Generated::MessageReceivers(receivers) = node.generate(&ctx) else {
            panic!("tabwrite generates message receivers");
        };
        assert_eq!(receivers.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        let hot = receivers[&0].render();
        assert!(hot.contains("n_w_array[n_w_index] = msg_readFloatToken(m, 0)"));
        assert!(hot.contains("n_w_setArrayName(msg_readStringToken(m, 1))"));
        assert!(receivers[&1].render().contains("n_w_setIndex(msg_readFloatToken(m, 0))"));
    }

    #[test]
    fn state_starts_bound_to_the_declared_array() {
        let node = TabWrite::new(TableArgs {
            array_name: "array1".into(),
        });
        let names: Vec<_> = node.state_variables().iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["array", "arrayName", "arrayChangesSubscription", "index"]);
        assert_eq!(node.table().array_name(), "array1");
    }
}
