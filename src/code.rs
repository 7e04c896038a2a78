//! Structured code fragments.
//!
//! Nodes describe the code they need as a small tree of declarations and raw
//! statements rather than as finished text, leaving the final emission to the
//! backend. [`Code`] also renders itself as JavaScript, which is what the
//! reference [`Program`](crate::Program) output and the tests look at.

use core::fmt;

use itertools::Itertools;

use crate::message::Atom;

/// Types a backend needs to know about to declare variables and functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Boolean,
    String,
    Message,
    FloatArray,
    TemplateSet,
    Void,
}

/// A typed variable or parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Var {
    pub ty: Type,
    pub name: String,
    /// Initial value as a target expression
    pub init: Option<String>,
}

impl Var {
    pub fn new(ty: Type, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
            init: None,
        }
    }

    pub fn with_init(mut self, init: impl Into<String>) -> Self {
        self.init = Some(init.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Code {
    /// Statements or an expression, one per line
    Raw(String),
    Block(Vec<Code>),
    Var(Var),
    Func {
        /// `None` for an anonymous function (a message receiver)
        name: Option<String>,
        params: Vec<Var>,
        ret: Type,
        body: Box<Code>,
    },
}

impl Code {
    pub fn raw(text: impl Into<String>) -> Self {
        Code::Raw(text.into())
    }

    pub fn block(items: impl IntoIterator<Item = Code>) -> Self {
        Code::Block(items.into_iter().collect())
    }

    pub fn var(ty: Type, name: impl Into<String>, init: impl Into<String>) -> Self {
        Code::Var(Var::new(ty, name).with_init(init))
    }

    pub fn func(name: impl Into<String>, params: Vec<Var>, ret: Type, body: Code) -> Self {
        Code::Func {
            name: Some(name.into()),
            params,
            ret,
            body: Box::new(body),
        }
    }

    pub fn anon_func(params: Vec<Var>, ret: Type, body: Code) -> Self {
        Code::Func {
            name: None,
            params,
            ret,
            body: Box::new(body),
        }
    }

    /// Names declared at the top level of this fragment
    pub fn declared_names(&self) -> Vec<&str> {
        match self {
            Code::Raw(_) => Vec::new(),
            Code::Block(items) => items.iter().flat_map(Code::declared_names).collect(),
            Code::Var(var) => vec![var.name.as_str()],
            Code::Func { name, .. } => name.as_deref().into_iter().collect(),
        }
    }

    /// Render as JavaScript
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_indented(&mut out, 0);
        out
    }

    fn write_indented(&self, out: &mut String, depth: usize) {
        let pad = "    ".repeat(depth);
        match self {
            Code::Raw(text) => {
                let lines: Vec<&str> = text
                    .lines()
                    .map(str::trim_end)
                    .filter(|l| !l.is_empty())
                    .collect();
                // strip the indentation shared by all lines
                let common = lines
                    .iter()
                    .map(|l| l.len() - l.trim_start().len())
                    .min()
                    .unwrap_or(0);
                for line in lines {
                    out.push_str(&pad);
                    out.push_str(&line[common..]);
                    out.push('\n');
                }
            }
            Code::Block(items) => {
                for item in items {
                    item.write_indented(out, depth);
                }
            }
            Code::Var(var) => {
                out.push_str(&pad);
                match &var.init {
                    Some(init) => out.push_str(&format!("let {} = {}\n", var.name, init)),
                    None => out.push_str(&format!("let {}\n", var.name)),
                }
            }
            Code::Func {
                name, params, body, ..
            } => {
                let params = params.iter().map(|p| p.name.as_str()).join(", ");
                out.push_str(&pad);
                match name {
                    Some(name) => out.push_str(&format!("function {}({}) {{\n", name, params)),
                    None => out.push_str(&format!("({}) => {{\n", params)),
                }
                body.write_indented(out, depth + 1);
                out.push_str(&pad);
                out.push_str("}\n");
            }
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote `s` as a target string literal.
pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render `value` as a target number literal.
pub fn float_literal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value == f64::INFINITY {
        "Infinity".to_owned()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_owned()
    } else {
        Atom::Float(value).to_string()
    }
}
