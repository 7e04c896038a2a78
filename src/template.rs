//! Message templates.
//!
//! A message box is declared with a list of atoms such as
//! `123 hello_$2 $1 , bla-$1`. Commas split the declaration into several
//! [`Template`]s; each `$n` is a 1-based reference into the message that
//! arrives at run time. Evaluating a [`TemplateSet`] against an incoming
//! message yields one outgoing message per template, in order.
//!
//! A `set ...` message replaces the whole set with a single new template built
//! from the rest of that message (see [`apply_set_command`]).

use delegate::delegate;
use tracing::debug;

use crate::error::{CompileError, EvalError, Result};
use crate::message::{Atom, Message};

/// Largest `$n` index accepted, the largest integer a target `Number` holds exactly.
pub const MAX_PLACEHOLDER_INDEX: u64 = (1 << 53) - 1;

/// Part of a text segment: literal text or a `$n` reference (1-based).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Placeholder(usize),
}

/// One token of a template.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    /// Copied to the output as is
    Literal(Atom),
    /// Text holding at least one placeholder
    Text(Vec<Piece>),
}

impl Segment {
    /// Scan a symbol for `$n` references. `\$` stands for a literal dollar.
    pub fn parse_symbol(token: &str) -> Result<Self> {
        let invalid = |reason: &str| CompileError::InvalidPlaceholder {
            token: token.to_owned(),
            reason: reason.to_owned(),
        };

        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = token.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'$') => {
                    chars.next();
                    literal.push('$');
                }
                '$' => {
                    let mut digits = String::new();
                    while let Some(d) = chars.next_if(char::is_ascii_digit) {
                        digits.push(d);
                    }
                    if digits.is_empty() {
                        return Err(invalid("`$` must be followed by an index"));
                    }
                    let index = digits
                        .parse::<u64>()
                        .ok()
                        .filter(|i| *i <= MAX_PLACEHOLDER_INDEX)
                        .and_then(|i| usize::try_from(i).ok())
                        .ok_or_else(|| invalid("index is too large"))?;
                    if index == 0 {
                        return Err(invalid("indices start at 1"));
                    }
                    if !literal.is_empty() {
                        pieces.push(Piece::Text(core::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Placeholder(index));
                }
                c => literal.push(c),
            }
        }

        if pieces.is_empty() {
            return Ok(Segment::Literal(Atom::Symbol(literal)));
        }
        if !literal.is_empty() {
            pieces.push(Piece::Text(literal));
        }
        Ok(Segment::Text(pieces))
    }

    fn parse_atom(atom: &Atom) -> Result<Self> {
        match atom {
            Atom::Float(_) => Ok(Segment::Literal(atom.clone())),
            Atom::Symbol(s) => Self::parse_symbol(s),
        }
    }

    /// Largest placeholder index used by this segment (0 if none)
    pub fn max_placeholder(&self) -> usize {
        match self {
            Segment::Literal(_) => 0,
            Segment::Text(pieces) => pieces
                .iter()
                .filter_map(|p| match p {
                    Piece::Placeholder(n) => Some(*n),
                    Piece::Text(_) => None,
                })
                .max()
                .unwrap_or(0),
        }
    }

    fn resolve(&self, incoming: &Message) -> core::result::Result<Atom, EvalError> {
        match self {
            Segment::Literal(atom) => Ok(atom.clone()),
            // a lone `$n` keeps the type of the substituted atom
            Segment::Text(pieces) => match pieces.as_slice() {
                [Piece::Placeholder(index)] => lookup(incoming, *index).cloned(),
                _ => {
                    let mut text = String::new();
                    for piece in pieces {
                        match piece {
                            Piece::Text(t) => text.push_str(t),
                            Piece::Placeholder(index) => {
                                text.push_str(&lookup(incoming, *index)?.to_string())
                            }
                        }
                    }
                    Ok(Atom::Symbol(text))
                }
            },
        }
    }
}

fn lookup(incoming: &Message, index: usize) -> core::result::Result<&Atom, EvalError> {
    index
        .checked_sub(1)
        .and_then(|i| incoming.get(i))
        .ok_or(EvalError::PlaceholderOutOfRange {
            index,
            length: incoming.len(),
        })
}

/// An ordered list of segments producing one outgoing message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// One segment per atom, no comma handling and no `symbol` prefix.
    pub fn parse(atoms: &[Atom]) -> Result<Self> {
        atoms
            .iter()
            .map(Segment::parse_atom)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Like [`Template::parse`] but honours a leading `symbol` selector:
    /// `symbol bla` becomes the single segment `bla`, and a bare `symbol`
    /// (or one followed by a number) becomes the empty symbol.
    pub fn parse_with_prefix(atoms: &[Atom]) -> Result<Self> {
        match atoms {
            [first, rest @ ..] if first.is_symbol("symbol") => {
                let segment = match rest.first() {
                    Some(Atom::Symbol(s)) => Segment::parse_symbol(s)?,
                    _ => Segment::Literal(Atom::symbol("")),
                };
                Ok(Self::new(vec![segment]))
            }
            _ => Self::parse(atoms),
        }
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of atoms an incoming message needs for this template to resolve
    pub fn arity(&self) -> usize {
        self.segments.iter().map(Segment::max_placeholder).max().unwrap_or(0)
    }

    pub fn evaluate(&self, incoming: &Message) -> core::result::Result<Message, EvalError> {
        self.segments.iter().map(|s| s.resolve(incoming)).collect()
    }
}

/// The templates of one message node. Never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateSet {
    templates: Vec<Template>,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::single(Template::default())
    }
}

impl TemplateSet {
    pub fn single(template: Template) -> Self {
        Self {
            templates: vec![template],
        }
    }

    delegate! {
        to self.templates {
            pub fn len(&self) -> usize;
            pub fn get(&self, index: usize) -> Option<&Template>;
            pub fn iter(&self) -> core::slice::Iter<'_, Template>;
        }
    }

    #[inline]
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Lazily evaluate every template against `incoming`, in order.
    ///
    /// Each item is produced only when the previous one has been consumed, so
    /// a caller can deliver it downstream before the next template runs.
    pub fn evaluate_each<'a>(
        &'a self,
        incoming: &'a Message,
    ) -> impl Iterator<Item = core::result::Result<Message, EvalError>> + 'a {
        self.templates.iter().map(move |t| t.evaluate(incoming))
    }

    /// Evaluate every template, skipping those whose placeholders point past
    /// the end of `incoming`.
    pub fn evaluate(&self, incoming: &Message) -> Vec<Message> {
        self.evaluate_each(incoming)
            .filter_map(|result| match result {
                Ok(message) => Some(message),
                Err(e) => {
                    debug!("skipping template: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Parse declaration arguments into templates, splitting at comma atoms.
///
/// `k` commas always give `k + 1` templates, some of which may be empty.
pub fn parse_templates(args: &[Atom]) -> Result<TemplateSet> {
    let mut groups = args.split(|a| a.is_symbol(","));
    // `split` yields at least one group, even for an empty slice
    let first = groups.next().unwrap_or(&[]);

    let mut templates = vec![Template::parse_with_prefix(first)?];
    for group in groups {
        templates.push(Template::parse(group)?);
    }
    Ok(TemplateSet { templates })
}

/// Outcome of offering a message to [`apply_set_command`].
#[derive(Debug, PartialEq)]
pub enum SetCommand {
    /// Not a `set` message, evaluate it against the active templates
    NotSet,
    /// The active templates were replaced
    Applied,
    /// A `set` message whose payload could not be parsed, templates unchanged
    Rejected(CompileError),
}

/// Handle `set ...` by replacing `active` with a single template parsed from
/// the rest of the message. Commas in the payload are plain symbols.
pub fn apply_set_command(active: &mut TemplateSet, incoming: &Message) -> SetCommand {
    if !incoming.starts_with("set") {
        return SetCommand::NotSet;
    }

    match Template::parse_with_prefix(&incoming.atoms()[1..]) {
        Ok(template) => {
            *active = TemplateSet::single(template);
            SetCommand::Applied
        }
        Err(e) => SetCommand::Rejected(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{atoms, msg};
    use proptest::prelude::*;

    fn parse(args: Vec<Atom>) -> TemplateSet {
        parse_templates(&args).unwrap()
    }

    fn literal_set(templates: Vec<Vec<Atom>>) -> TemplateSet {
        TemplateSet {
            templates: templates
                .into_iter()
                .map(|t| Template::new(t.into_iter().map(Segment::Literal).collect()))
                .collect(),
        }
    }

    #[test]
    fn splits_on_commas() {
        assert_eq!(parse(atoms!["a", 12]).len(), 1);
        assert_eq!(parse(atoms!["a", 12, ",", "b"]).len(), 2);

        let set = parse(atoms![",", 1, ",", 2]);
        assert_eq!(set.len(), 3);
        assert!(set.templates()[0].is_empty());
        assert_eq!(set.templates()[1].segments(), &[Segment::Literal(Atom::Float(1.0))]);
    }

    #[test]
    fn empty_declaration_is_one_empty_template() {
        let set = parse(vec![]);
        assert_eq!(set.len(), 1);
        assert!(set.templates()[0].is_empty());
    }

    #[test]
    fn symbol_prefix_is_trimmed() {
        assert_eq!(parse(atoms!["symbol"]), literal_set(vec![atoms![""]]));
        assert_eq!(parse(atoms!["symbol", "bla"]), literal_set(vec![atoms!["bla"]]));
        assert_eq!(parse(atoms!["symbol", 123]), literal_set(vec![atoms![""]]));
        assert_eq!(parse(atoms!["symbol", "poi", "iop"]), literal_set(vec![atoms!["poi"]]));
    }

    #[test]
    fn symbol_prefix_only_applies_to_the_first_group() {
        let set = parse(atoms!["symbol", "a", ",", "symbol", "b"]);
        assert_eq!(set, literal_set(vec![atoms!["a"], atoms!["symbol", "b"]]));
    }

    #[test]
    fn placeholders_are_found_inside_symbols() {
        let segment = Segment::parse_symbol("hello_$2").unwrap();
        assert_eq!(
            segment,
            Segment::Text(vec![Piece::Text("hello_".into()), Piece::Placeholder(2)])
        );
        assert_eq!(segment.max_placeholder(), 2);

        let segment = Segment::parse_symbol("$1-$12x").unwrap();
        assert_eq!(
            segment,
            Segment::Text(vec![
                Piece::Placeholder(1),
                Piece::Text("-".into()),
                Piece::Placeholder(12),
                Piece::Text("x".into()),
            ])
        );
    }

    #[test]
    fn escaped_dollar_is_literal() {
        assert_eq!(
            Segment::parse_symbol("\\$1").unwrap(),
            Segment::Literal(Atom::symbol("$1"))
        );
    }

    #[test]
    fn rejects_invalid_placeholders() {
        for bad in [
            "$0",
            "$",
            "price$",
            "$x",
            "$99999999999999999999999",
            "$9007199254740992",
        ] {
            let err = parse_templates(&atoms![bad]).unwrap_err();
            assert!(
                matches!(err, CompileError::InvalidPlaceholder { .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn largest_index_is_accepted() {
        let segment = Segment::parse_symbol("$9007199254740991").unwrap();
        assert_eq!(segment.max_placeholder() as u64, MAX_PLACEHOLDER_INDEX);
    }

    #[test]
    fn passes_literals_through() {
        let set = parse(atoms![123, "hello"]);
        for incoming in [Message::bang(), msg!["blabla"], msg!["quoi?", 456]] {
            assert_eq!(set.evaluate(&incoming), vec![msg![123, "hello"]]);
        }
    }

    #[test]
    fn substitutes_whole_placeholders() {
        let set = parse(atoms![123, "$2", "$1"]);
        assert_eq!(set.evaluate(&msg!["wow", "hehe", "hoho"]), vec![msg![123, "hehe", "wow"]]);
        assert_eq!(set.evaluate(&msg!["blabla", 456]), vec![msg![123, 456, "blabla"]]);
    }

    #[test]
    fn substitutes_inside_symbols() {
        let set = parse(atoms!["hello_$2", "$1", "greetings"]);
        assert_eq!(
            set.evaluate(&msg!["earth", "saturn"]),
            vec![msg!["hello_saturn", "earth", "greetings"]]
        );
        assert_eq!(
            set.evaluate(&msg!["satan", 666]),
            vec![msg!["hello_666", "satan", "greetings"]]
        );
    }

    #[test]
    fn evaluates_templates_in_order() {
        let set = parse(atoms![123, "$1", ",", "bla-$1"]);
        assert_eq!(set.evaluate(&msg!["hello"]), vec![msg![123, "hello"], msg!["bla-hello"]]);
    }

    #[test]
    fn out_of_range_placeholder_skips_only_that_template() {
        let set = parse(atoms!["$2", ",", "$1"]);
        let results: Vec<_> = set.evaluate_each(&msg!["only"]).collect();
        assert_eq!(
            results[0],
            Err(EvalError::PlaceholderOutOfRange { index: 2, length: 1 })
        );
        assert_eq!(set.evaluate(&msg!["only"]), vec![msg!["only"]]);
        assert_eq!(set.templates()[0].arity(), 2);
    }

    #[test]
    fn set_replaces_all_templates() {
        let mut set = parse(atoms![123, "$1", ",", "bla-$1"]);
        assert_eq!(apply_set_command(&mut set, &msg!["set", "salut", 123]), SetCommand::Applied);
        assert_eq!(set.len(), 1);
        assert_eq!(set.evaluate(&msg!["hello"]), vec![msg!["salut", 123]]);
    }

    #[test]
    fn set_payload_is_not_split() {
        let mut set = TemplateSet::default();
        apply_set_command(&mut set, &msg!["set", "a", ",", "b"]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.evaluate(&Message::bang()), vec![msg!["a", ",", "b"]]);
    }

    #[test]
    fn empty_set_gives_an_empty_template() {
        let mut set = parse(atoms![1]);
        apply_set_command(&mut set, &msg!["set"]);
        assert_eq!(set.evaluate(&Message::bang()), vec![Message::default()]);
    }

    #[test]
    fn invalid_set_payload_keeps_templates() {
        let mut set = parse(atoms![1]);
        let outcome = apply_set_command(&mut set, &msg!["set", "$0"]);
        assert!(matches!(outcome, SetCommand::Rejected(_)));
        assert_eq!(set, parse(atoms![1]));
        assert_eq!(apply_set_command(&mut set, &msg!["bang"]), SetCommand::NotSet);
    }

    fn plain_atom() -> impl Strategy<Value = Atom> {
        prop_oneof![
            (-1000.0f64..1000.0).prop_map(Atom::Float),
            "[a-z]{1,5}".prop_map(Atom::Symbol),
            Just(Atom::symbol(",")),
        ]
    }

    proptest! {
        #[test]
        fn one_template_per_comma_plus_one(args in prop::collection::vec(plain_atom(), 0..40)) {
            let commas = args.iter().filter(|a| a.is_symbol(",")).count();
            let set = parse_templates(&args).unwrap();
            prop_assert_eq!(set.len(), commas + 1);
        }

        #[test]
        fn literal_templates_ignore_the_input(
            args in prop::collection::vec(plain_atom(), 0..20),
            incoming in prop::collection::vec(plain_atom(), 0..5),
        ) {
            let set = parse_templates(&args).unwrap();
            let incoming = Message::new(incoming);
            let expected: Vec<Message> = args
                .split(|a| a.is_symbol(","))
                .map(|group| Message::new(group.to_vec()))
                .collect();
            prop_assert_eq!(set.evaluate(&incoming), expected);
        }
    }
}
