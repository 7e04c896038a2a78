//! Shared plumbing for nodes that read or write a named array by index.

use tracing::debug;

use crate::code::{Code, Type, Var};
use crate::error::{CompileError, Result};
use crate::message::{Atom, Message};
use crate::node::{GenerationContext, InitialValue, NodeIo, StateVariables};

/// Array index from a raw float: truncated toward zero.
#[inline]
pub fn prepare_index(raw: f64) -> i64 {
    // saturating cast, NaN becomes 0
    raw.trunc() as i64
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableArgs {
    /// Empty when the node starts unbound
    pub array_name: String,
}

pub fn translate_table_args(node_type: &str, raw: &[Atom]) -> Result<TableArgs> {
    match raw {
        [] => Ok(TableArgs::default()),
        [Atom::Symbol(name)] => Ok(TableArgs {
            array_name: name.clone(),
        }),
        [Atom::Float(v)] => Err(CompileError::invalid_declaration(
            node_type,
            format!("array name must be a symbol, got {}", Atom::Float(*v)),
        )),
        _ => Err(CompileError::invalid_declaration(
            node_type,
            format!("expected at most one argument, got {}", raw.len()),
        )),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// No array under that name, or it has no slots
    Unresolved,
    OutOfRange,
}

/// The array a node is bound to and its current index.
#[derive(Clone, Debug, PartialEq)]
pub struct TableBinding {
    array_name: String,
    index: i64,
}

impl TableBinding {
    pub fn new(args: &TableArgs) -> Self {
        Self {
            array_name: args.array_name.clone(),
            index: 0,
        }
    }

    #[inline]
    pub fn array_name(&self) -> &str {
        &self.array_name
    }

    #[inline]
    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn set_index(&mut self, raw: f64) {
        self.index = prepare_index(raw);
    }

    pub fn set_array(&mut self, name: impl Into<String>) {
        self.array_name = name.into();
    }

    /// Rebind on `set <name>`. Returns `false` for any other message.
    pub fn handle_set_array(&mut self, message: &Message) -> bool {
        match message.atoms() {
            [set, Atom::Symbol(name)] if set.is_symbol("set") => {
                debug!("rebinding table from `{}` to `{}`", self.array_name, name);
                self.set_array(name.as_str());
                true
            }
            _ => false,
        }
    }

    fn slot(&self, len: usize) -> Option<usize> {
        usize::try_from(self.index).ok().filter(|i| *i < len)
    }

    pub fn write(&self, io: &mut dyn NodeIo, value: f64) -> WriteOutcome {
        let Some(array) = io.array_mut(&self.array_name).filter(|a| !a.is_empty()) else {
            debug!("write to unresolved array `{}` dropped", self.array_name);
            return WriteOutcome::Unresolved;
        };
        match self.slot(array.len()) {
            Some(i) => {
                array[i] = value;
                WriteOutcome::Written
            }
            None => {
                debug!(
                    "index {} out of range for `{}` (length {}), write dropped",
                    self.index,
                    self.array_name,
                    array.len()
                );
                WriteOutcome::OutOfRange
            }
        }
    }

    /// Value at the current index, `0` when unresolved or out of range
    pub fn read(&self, io: &dyn NodeIo) -> f64 {
        io.array(&self.array_name)
            .and_then(|array| self.slot(array.len()).map(|i| array[i]))
            .unwrap_or(0.0)
    }
}

pub fn table_state_variables(args: &TableArgs) -> StateVariables {
    StateVariables::new()
        .with("array", Type::FloatArray, InitialValue::EmptyFloatArray)
        .with(
            "arrayName",
            Type::String,
            InitialValue::Text(args.array_name.clone()),
        )
        .with("arrayChangesSubscription", Type::Int, InitialValue::Int(-1))
}

/// Re-binding function plus the hook binding the initial array once the
/// engine is configured.
pub fn declare_table_base(ctx: &GenerationContext<'_>) -> Code {
    let array = ctx.state("array");
    let array_name = ctx.state("arrayName");
    let subscription = ctx.state("arrayChangesSubscription");
    let set_array_name = ctx.local("setArrayName");

    Code::block([
        Code::func(
            set_array_name.clone(),
            vec![Var::new(Type::String, "arrayName")],
            Type::Void,
            Code::raw(format!(
                r#"
                if ({subscription} !== -1) {{
                    commons_cancelArrayChangesSubscription({array_name}, {subscription})
                }}
                {array_name} = arrayName
                {array} = new {float_array}(0)
                {subscription} = commons_subscribeArrayChanges(arrayName, () => {{
                    {array} = commons_getArray({array_name})
                }})
                "#,
                float_array = ctx.settings.bit_depth.float_array(),
            )),
        ),
        Code::raw(format!(
            r#"
            commons_waitEngineConfigure(() => {{
                if ({array_name}.length) {{
                    {set_array_name}({array_name})
                }}
            }})
            "#
        )),
    ])
}

/// Receiver branch handling `set <arrayName>`, chained after an `if`.
pub fn message_set_array_code(ctx: &GenerationContext<'_>) -> String {
    format!(
        r#"else if (msg_isMatching(m, [MSG_STRING_TOKEN, MSG_STRING_TOKEN])
    && msg_readStringToken(m, 0) === "set") {{
    {}(msg_readStringToken(m, 1))
    return
}}"#,
        ctx.local("setArrayName")
    )
}

pub fn prepare_index_code(index: &str) -> String {
    format!("Math.trunc({})", index)
}

/// Guard that holds when `index` addresses a slot of `array`
pub fn index_in_range_code(index: &str, array: &str) -> String {
    format!("{index} >= 0 && {index} < {array}.length")
}
