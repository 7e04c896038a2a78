//! Runs rendered `msg` programs in a JavaScript engine and checks they behave
//! like the native runtime.

use boa_engine::{Context, Source};
use patchwerk::code::{float_literal, string_literal};
use patchwerk::{atoms, msg, Atom, Compiler, Message, NodeDeclaration, Patch, Settings};

/// Minimal host message API: a message is an array of numbers and strings.
const HOST: &str = r#"
const MSG_FLOAT_TOKEN = 0
const MSG_STRING_TOKEN = 1
function msg_create(template) { return new Array(template.length).fill(null) }
function msg_getLength(m) { return m.length }
function msg_isFloatToken(m, i) { return typeof m[i] === "number" }
function msg_isStringToken(m, i) { return typeof m[i] === "string" }
function msg_readFloatToken(m, i) { return m[i] }
function msg_readStringToken(m, i) { return m[i] }
function msg_writeFloatToken(m, i, v) { m[i] = v }
function msg_writeStringToken(m, i, v) { m[i] = v }
const sent = []
function n_box_SNDS_0(m) { sent.push(m) }
"#;

fn js_message(message: &Message) -> String {
    let atoms: Vec<String> = message
        .iter()
        .map(|atom| match atom {
            Atom::Float(v) => float_literal(*v),
            Atom::Symbol(s) => string_literal(s),
        })
        .collect();
    format!("[{}]", atoms.join(","))
}

fn js_messages(messages: &[Message]) -> String {
    let messages: Vec<String> = messages.iter().map(js_message).collect();
    format!("[{}]", messages.join(","))
}

fn run_native(args: &[Atom], inputs: &[Message]) -> Vec<Message> {
    let mut patch = Patch::default();
    let node = patch.add("msg", args).unwrap();
    for input in inputs {
        patch.send(node, 0, input.clone());
    }
    patch.sent_from(node, 0)
}

fn run_generated(args: &[Atom], inputs: &[Message]) -> String {
    let program = Compiler::new(Settings::default())
        .compile(&[NodeDeclaration::new("box", "msg", args.to_vec())])
        .unwrap();
    let calls: String = inputs
        .iter()
        .map(|m| format!("n_box_RCVS_0({})\n", js_message(m)))
        .collect();
    let script = format!(
        "{}{}{}JSON.stringify(sent)",
        HOST,
        program.render(),
        calls
    );

    let mut context = Context::default();
    let value = context.eval(Source::from_bytes(&script)).unwrap();
    value.to_string(&mut context).unwrap().to_std_string_escaped()
}

/// Both sides must agree, and agree with `expected`.
fn check(args: Vec<Atom>, inputs: Vec<Message>, expected: Vec<Message>) {
    let native = run_native(&args, &inputs);
    assert_eq!(native, expected, "native output for {:?}", args);
    assert_eq!(
        run_generated(&args, &inputs),
        js_messages(&expected),
        "generated output for {:?}",
        args
    );
}

#[test]
fn literals_ignore_the_input() {
    check(
        atoms![123, "hello"],
        vec![Message::bang(), msg!["blabla"]],
        vec![msg![123, "hello"], msg![123, "hello"]],
    );
}

#[test]
fn placeholders_keep_the_atom_type() {
    check(
        atoms![123, "$2", "$1"],
        vec![msg!["wow", "hehe", "hoho"], msg!["blabla", 456]],
        vec![msg![123, "hehe", "wow"], msg![123, 456, "blabla"]],
    );
}

#[test]
fn placeholders_inside_text() {
    check(
        atoms!["hello_$2", "$1", "greetings"],
        vec![msg!["satan", 666], msg!["earth", 0.5]],
        vec![
            msg!["hello_666", "satan", "greetings"],
            msg!["hello_0.5", "earth", "greetings"],
        ],
    );
}

#[test]
fn symbol_selector() {
    check(atoms!["symbol"], vec![Message::bang()], vec![msg![""]]);
    check(atoms!["symbol", "bla"], vec![Message::bang()], vec![msg!["bla"]]);
    check(
        atoms!["symbol", "poi", "iop"],
        vec![Message::bang()],
        vec![msg!["poi"]],
    );
}

#[test]
fn templates_fire_in_order() {
    check(
        atoms![123, "$1", ",", "bla-$1"],
        vec![msg!["hello"]],
        vec![msg![123, "hello"], msg!["bla-hello"]],
    );
}

#[test]
fn out_of_range_placeholder_skips_its_template() {
    check(
        atoms!["$3", ",", "ok", "$1"],
        vec![msg!["a", "b"]],
        vec![msg!["ok", "a"]],
    );
}

#[test]
fn set_replaces_the_templates() {
    check(
        atoms![123, "$1", ",", "bla-$1"],
        vec![msg!["set", "salut", "$1"], msg!["hello"]],
        vec![msg!["salut", "hello"]],
    );
}

#[test]
fn set_keeps_commas_as_text() {
    check(
        atoms!["x"],
        vec![msg!["set", "a", ",", "b"], Message::bang()],
        vec![msg!["a", ",", "b"]],
    );
}

#[test]
fn set_honours_the_symbol_selector() {
    check(
        atoms!["x"],
        vec![msg!["set", "symbol", "hey_$1"], msg![7]],
        vec![msg!["hey_7"]],
    );
}

#[test]
fn set_with_an_escaped_dollar() {
    check(
        atoms!["x"],
        vec![msg!["set", "cost\\$$1"], msg![5]],
        vec![msg!["cost$5"]],
    );
}

#[test]
fn invalid_set_keeps_the_templates() {
    for bad in ["$0", "$", "$9007199254740992", "$99999999999999999999999"] {
        check(
            atoms!["got", "$1"],
            vec![msg!["set", bad], msg!["x"]],
            vec![msg!["got", "x"]],
        );
    }
}

#[test]
fn largest_index_is_accepted_by_both() {
    check(
        atoms!["x"],
        vec![msg!["set", "$9007199254740991"], msg!["y"]],
        vec![],
    );
}
