//! `[samplerate~]`: answers a bang with the current sample rate.

use alloc::collections::BTreeMap;

use tracing::debug;

use crate::code::{Code, Type, Var};
use crate::error::Result;
use crate::globals::{GlobalCode, BANG_UTILS, TOKEN_UTILS};
use crate::message::{Atom, Message};
use crate::node::{
    GenerationContext, Generated, InletId, NodeBuilder, NodeImplementation, NodeIo, PortKind,
    PortTopology, RuntimeNode,
};

pub struct SampleRateBuilder;

impl NodeBuilder for SampleRateBuilder {
    type Args = ();

    fn translate_args(&self, _raw: &[Atom]) -> Result<()> {
        Ok(())
    }

    fn build(&self, _args: &()) -> PortTopology {
        PortTopology::new([PortKind::Message], [PortKind::Message])
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SampleRate;

impl NodeImplementation for SampleRate {
    fn dependencies(&self) -> Vec<&'static GlobalCode> {
        vec![&BANG_UTILS, &TOKEN_UTILS]
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Generated {
        let receiver = Code::anon_func(
            vec![Var::new(Type::Message, ctx.message())],
            Type::Void,
            Code::raw(format!(
                r#"
if (msg_isBang({m})) {{
    {snd}(msg_floats([{sample_rate}]))
    return
}}
"#,
                m = ctx.message(),
                snd = ctx.snd(0),
                sample_rate = ctx.sample_rate(),
            )),
        );
        Generated::MessageReceivers(BTreeMap::from([(0, receiver)]))
    }
}

impl RuntimeNode for SampleRate {
    fn receive(&mut self, inlet: InletId, message: &Message, io: &mut dyn NodeIo) {
        if message.is_bang() {
            let rate = io.sample_rate();
            io.send(0, Message::floats(&[rate]));
        } else {
            debug!("[samplerate~] ignoring {} on inlet {}", message, inlet);
        }
    }
}
