//! Symbolic terms: atoms, variables, structures and lists.
//!
//! Thought content, rule patterns and rule actions are all [`Term`]s. This
//! module provides Prolog-style unification with an occurs check,
//! substitution, and the small textual syntax used by rule packs and the CLI:
//!
//! ```text
//! GOAL(?G)              structure with one variable argument
//! llm(expand, GOAL)     structure with two atom arguments
//! [a, "two words"]      list of atoms
//! ```
//!
//! Terms are immutable values: [`unify`] and [`substitute`] always build new
//! terms and binding sets, never mutate their inputs.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix marking an atom as a tool error result.
pub const ERROR_MARKER: &str = "error:";

/// Errors from parsing the textual term syntax.
#[derive(Debug, Error, Diagnostic)]
pub enum TermError {
    #[error("term parse error at offset {position}: {message}")]
    #[diagnostic(
        code(mindloop::term::parse),
        help(
            "Terms look like `name(arg, ?Var, [a, b])`. Quote atoms containing \
             spaces or punctuation with double quotes."
        )
    )]
    Parse { position: usize, message: String },
}

pub type TermResult<T> = std::result::Result<T, TermError>;

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

/// A symbolic value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Opaque symbolic constant.
    Atom(String),
    /// Placeholder that can be bound during unification.
    Variable(String),
    /// Named compound with ordered arguments.
    Structure { name: String, args: Vec<Term> },
    /// Fixed-length sequence compared element-wise.
    List(Vec<Term>),
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Self {
        Self::Atom(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn structure(name: impl Into<String>, args: Vec<Term>) -> Self {
        Self::Structure {
            name: name.into(),
            args,
        }
    }

    pub fn list(elements: Vec<Term>) -> Self {
        Self::List(elements)
    }

    /// Build the distinguished error result a tool returns to signal failure.
    pub fn error(message: impl fmt::Display) -> Self {
        Self::Atom(format!("{ERROR_MARKER} {message}"))
    }

    /// The message carried by an error marker, if this is one.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Atom(name) => name.strip_prefix(ERROR_MARKER).map(str::trim_start),
            _ => None,
        }
    }

    /// Whether this term is a tool error marker.
    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// Name of an atom or structure.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Atom(name) | Self::Structure { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Arguments of a structure (empty for every other variant).
    pub fn args(&self) -> &[Term] {
        match self {
            Self::Structure { args, .. } => args,
            _ => &[],
        }
    }

    /// Whether the term contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            Self::Atom(_) => true,
            Self::Variable(_) => false,
            Self::Structure { args: items, .. } | Self::List(items) => {
                items.iter().all(Term::is_ground)
            }
        }
    }

    /// Plain human-readable content: atoms unquoted, everything else in
    /// display syntax. Used for prompts and memory entries.
    pub fn text(&self) -> String {
        match self {
            Self::Atom(name) => name.clone(),
            other => other.to_string(),
        }
    }

    /// Parse a term from its textual syntax.
    pub fn parse(input: &str) -> TermResult<Self> {
        let mut parser = Parser::new(input);
        let term = parser.term()?;
        parser.skip_ws();
        if let Some(c) = parser.peek() {
            return Err(parser.error(format!("unexpected trailing input starting at '{c}'")));
        }
        Ok(term)
    }
}

fn is_bare_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-')
}

fn is_bare(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_bare_char)
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_bare(name) {
        return f.write_str(name);
    }
    f.write_str("\"")?;
    for c in name.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(name) => write_name(f, name),
            Self::Variable(name) => write!(f, "?{name}"),
            Self::Structure { name, args } => {
                write_name(f, name)?;
                f.write_str("(")?;
                write_items(f, args)?;
                f.write_str(")")
            }
            Self::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
        }
    }
}

impl std::str::FromStr for Term {
    type Err = TermError;

    fn from_str(s: &str) -> TermResult<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Variable bindings produced by [`unify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    map: BTreeMap<String, Term>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The term a variable is directly bound to.
    pub fn get(&self, var: &str) -> Option<&Term> {
        self.map.get(var)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Follow variable bindings until reaching an unbound variable or a
    /// non-variable term.
    pub fn resolve<'a>(&'a self, term: &'a Term) -> &'a Term {
        let mut current = term;
        while let Term::Variable(name) = current {
            match self.map.get(name) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Fully substitute the value bound to `var`, if any.
    pub fn value_of(&self, var: &str) -> Option<Term> {
        self.map.get(var).map(|t| substitute(t, self))
    }

    fn bind(&mut self, var: String, term: Term) {
        self.map.insert(var, term);
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (var, term)) in self.map.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "?{var} = {term}")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Unification
// ---------------------------------------------------------------------------

/// Unify two terms under an existing binding set.
///
/// Returns the extended bindings on success, `None` on failure. The input
/// bindings are left untouched. There is no backtracking: the result is the
/// single most general unifier reachable by left-to-right argument order.
pub fn unify(a: &Term, b: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut out = bindings.clone();
    unify_into(a, b, &mut out).then_some(out)
}

/// Dereference a term through the bindings, cloning only when the term was
/// a bound variable.
fn walk<'t>(term: &'t Term, bindings: &Bindings) -> Cow<'t, Term> {
    match term {
        Term::Variable(name) => match bindings.get(name) {
            Some(bound) => Cow::Owned(bindings.resolve(bound).clone()),
            None => Cow::Borrowed(term),
        },
        _ => Cow::Borrowed(term),
    }
}

fn unify_into(a: &Term, b: &Term, bindings: &mut Bindings) -> bool {
    let a = walk(a, bindings);
    let b = walk(b, bindings);

    match (a.as_ref(), b.as_ref()) {
        (Term::Variable(x), Term::Variable(y)) if x == y => true,
        (Term::Variable(x), other) | (other, Term::Variable(x)) => {
            if occurs(x, other, bindings) {
                return false;
            }
            bindings.bind(x.clone(), other.clone());
            true
        }
        (Term::Atom(x), Term::Atom(y)) => x == y,
        (
            Term::Structure { name: n1, args: a1 },
            Term::Structure { name: n2, args: a2 },
        ) => n1 == n2 && unify_seq(a1, a2, bindings),
        (Term::List(l1), Term::List(l2)) => unify_seq(l1, l2, bindings),
        _ => false,
    }
}

fn unify_seq(xs: &[Term], ys: &[Term], bindings: &mut Bindings) -> bool {
    xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| unify_into(x, y, bindings))
}

/// Whether `var` occurs in `term`, looking through bindings.
fn occurs(var: &str, term: &Term, bindings: &Bindings) -> bool {
    match bindings.resolve(term) {
        Term::Variable(name) => name == var,
        Term::Atom(_) => false,
        Term::Structure { args: items, .. } | Term::List(items) => {
            items.iter().any(|t| occurs(var, t, bindings))
        }
    }
}

/// Replace every bound variable in `term` by its fully resolved value.
/// Unbound variables are left in place.
pub fn substitute(term: &Term, bindings: &Bindings) -> Term {
    match bindings.resolve(term) {
        Term::Atom(name) => Term::Atom(name.clone()),
        Term::Variable(name) => Term::Variable(name.clone()),
        Term::Structure { name, args } => Term::Structure {
            name: name.clone(),
            args: args.iter().map(|t| substitute(t, bindings)).collect(),
        },
        Term::List(items) => Term::List(items.iter().map(|t| substitute(t, bindings)).collect()),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> TermError {
        TermError::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn term(&mut self) -> TermResult<Term> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('?') => {
                self.pos += 1;
                let name = self.bare();
                if name.is_empty() {
                    return Err(self.error("expected a variable name after '?'"));
                }
                Ok(Term::Variable(name))
            }
            Some('[') => {
                self.pos += 1;
                Ok(Term::List(self.items(']')?))
            }
            Some('"') => {
                let name = self.quoted()?;
                self.named(name)
            }
            Some(c) if is_bare_char(c) => {
                let name = self.bare();
                self.named(name)
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
        }
    }

    /// An atom, or a structure when followed by an argument list.
    fn named(&mut self, name: String) -> TermResult<Term> {
        self.skip_ws();
        if self.peek() == Some('(') {
            self.pos += 1;
            let args = self.items(')')?;
            Ok(Term::Structure { name, args })
        } else {
            Ok(Term::Atom(name))
        }
    }

    fn items(&mut self, close: char) -> TermResult<Vec<Term>> {
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.term()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(items),
                Some(c) => return Err(self.error(format!("expected ',' or '{close}', found '{c}'"))),
                None => return Err(self.error(format!("unclosed sequence, expected '{close}'"))),
            }
        }
    }

    fn bare(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_bare_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn quoted(&mut self) -> TermResult<String> {
        // Opening quote.
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Term {
        Term::parse(s).unwrap()
    }

    #[test]
    fn unify_binds_variable_in_structure() {
        let pattern = t("GOAL(?G)");
        let content = t("GOAL(shipV1)");
        let b = unify(&pattern, &content, &Bindings::new()).unwrap();
        assert_eq!(b.get("G"), Some(&Term::atom("shipV1")));
    }

    #[test]
    fn unify_rejects_name_and_arity_mismatch() {
        let empty = Bindings::new();
        assert!(unify(&t("f(a)"), &t("g(a)"), &empty).is_none());
        assert!(unify(&t("f(a)"), &t("f(a, b)"), &empty).is_none());
        assert!(unify(&t("[a, b]"), &t("[a]"), &empty).is_none());
        assert!(unify(&t("a"), &t("[a]"), &empty).is_none());
        assert!(unify(&t("a"), &t("a()"), &empty).is_none());
    }

    #[test]
    fn occurs_check_prevents_infinite_terms() {
        let x = Term::var("X");
        let fx = Term::structure("f", vec![Term::var("X")]);
        assert!(unify(&x, &fx, &Bindings::new()).is_none());
        assert!(unify(&fx, &x, &Bindings::new()).is_none());
    }

    #[test]
    fn occurs_check_follows_bindings() {
        // ?Y = f(?X) first, then ?X = ?Y must fail.
        let b = unify(&t("?Y"), &t("f(?X)"), &Bindings::new()).unwrap();
        assert!(unify(&t("?X"), &t("?Y"), &b).is_none());
    }

    #[test]
    fn same_variable_unifies_without_binding() {
        let b = unify(&t("?X"), &t("?X"), &Bindings::new()).unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn bindings_thread_left_to_right() {
        let b = unify(&t("p(?X, ?X)"), &t("p(a, a)"), &Bindings::new()).unwrap();
        assert_eq!(b.get("X"), Some(&Term::atom("a")));
        assert!(unify(&t("p(?X, ?X)"), &t("p(a, b)"), &Bindings::new()).is_none());
    }

    #[test]
    fn input_bindings_are_not_mutated() {
        let start = unify(&t("?A"), &t("one"), &Bindings::new()).unwrap();
        let snapshot = start.clone();
        let _ = unify(&t("?B"), &t("two"), &start).unwrap();
        assert!(unify(&t("?A"), &t("two"), &start).is_none());
        assert_eq!(start, snapshot);
    }

    #[test]
    fn unification_is_symmetric_and_sound() {
        let cases = [
            ("f(?X, b)", "f(a, ?Y)"),
            ("f(?X, ?X)", "f(?Y, g(?Z))"),
            ("[?H, tail]", "[head, ?T]"),
            ("f(?X)", "?X"),
            ("p(?A, q(?B))", "p(q(?B), ?A)"),
            ("a", "b"),
            ("f(?X, g(?X))", "f(h(?Y), g(h(c)))"),
            ("[]", "[]"),
            ("?X", "?Y"),
        ];
        for (l, r) in cases {
            let (a, b) = (t(l), t(r));
            let ab = unify(&a, &b, &Bindings::new());
            let ba = unify(&b, &a, &Bindings::new());
            assert_eq!(ab.is_some(), ba.is_some(), "asymmetric for {l} / {r}");
            for bindings in [ab, ba].into_iter().flatten() {
                assert_eq!(
                    substitute(&a, &bindings),
                    substitute(&b, &bindings),
                    "unsound for {l} / {r} with {bindings}"
                );
            }
        }
    }

    #[test]
    fn substitute_resolves_chains_and_keeps_unbound() {
        let b = unify(&t("f(?X, ?Y)"), &t("f(?Y, g(?Z))"), &Bindings::new()).unwrap();
        assert_eq!(substitute(&t("h(?X, ?W)"), &b), t("h(g(?Z), ?W)"));
    }

    #[test]
    fn substitute_is_idempotent() {
        let b = unify(&t("f(?X, [?Y, c])"), &t("f(a, [b, ?Z])"), &Bindings::new()).unwrap();
        let once = substitute(&t("out(?X, ?Y, ?Z)"), &b);
        assert_eq!(substitute(&once, &b), once);
        assert!(once.is_ground());
    }

    #[test]
    fn display_parses_back() {
        for src in [
            "GOAL(shipV1)",
            "llm(expand, GOAL)",
            "[a, \"two words\", ?X]",
            "f()",
            "\"quote \\\" inside\"(x)",
            "nested(f(g(h)), [[a], []])",
        ] {
            let term = t(src);
            assert_eq!(t(&term.to_string()), term, "round trip of {src}");
        }
    }

    #[test]
    fn parse_errors_report_position() {
        let err = Term::parse("f(a, ").unwrap_err();
        assert!(matches!(err, TermError::Parse { .. }));
        assert!(Term::parse("f(a) b").is_err());
        assert!(Term::parse("?").is_err());
        assert!(Term::parse("\"open").is_err());
    }

    #[test]
    fn error_marker_convention() {
        let e = Term::error("tool exploded");
        assert!(e.is_error());
        assert_eq!(e.error_message(), Some("tool exploded"));
        assert!(!Term::atom("fine").is_error());
        assert!(!t("error(x)").is_error());
    }

    #[test]
    fn text_unquotes_atoms() {
        assert_eq!(Term::atom("buy milk").text(), "buy milk");
        assert_eq!(t("GOAL(\"buy milk\")").text(), "GOAL(\"buy milk\")");
    }
}
