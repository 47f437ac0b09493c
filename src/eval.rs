//! Tokenized, variable-interpolating strings (`EvalString`).
//!
//! A Ninja value like `gcc -c $in -o $out` is never evaluated at parse
//! time: it's captured as an ordered sequence of literal and
//! variable-reference pieces, and evaluated later against whatever
//! scope applies at the point of use. This lets the same `command =`
//! binding on a `rule` be evaluated differently for every `build`
//! statement that uses it.

/// An environment that can resolve a variable name to its current value.
/// Missing variables evaluate to the empty string, never an error.
pub trait Env {
    fn get_var(&self, name: &str) -> Option<String>;
}

/// One token of a parsed [`EvalString`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalPart {
    /// Literal text, copied verbatim.
    Literal(String),
    /// A `$name` or `${name}` variable reference, resolved at evaluation time.
    Special(String),
}

/// A parsed but unevaluated string containing `$`-variable references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalString(Vec<EvalPart>);

impl EvalString {
    pub fn new() -> Self {
        EvalString(Vec::new())
    }

    pub fn from_parts(parts: Vec<EvalPart>) -> Self {
        EvalString(parts)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parts(&self) -> &[EvalPart] {
        &self.0
    }

    /// Append literal text, coalescing with a trailing literal piece if one
    /// is already present.
    pub fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(EvalPart::Literal(last)) = self.0.last_mut() {
            last.push_str(text);
            return;
        }
        self.0.push(EvalPart::Literal(text.to_owned()));
    }

    /// Append a variable reference.
    pub fn add_special(&mut self, name: &str) {
        self.0.push(EvalPart::Special(name.to_owned()));
    }

    /// Evaluate against a chain of environments, tried in order; the first
    /// environment to resolve a variable wins. A variable resolved by none
    /// of them expands to the empty string.
    pub fn evaluate(&self, envs: &[&dyn Env]) -> String {
        let mut result = String::new();
        for part in &self.0 {
            match part {
                EvalPart::Literal(s) => result.push_str(s),
                EvalPart::Special(name) => {
                    for env in envs {
                        if let Some(v) = env.get_var(name) {
                            result.push_str(&v);
                            break;
                        }
                    }
                }
            }
        }
        result
    }

    /// Canonical test-oriented representation: `[piece][$special]...`.
    pub fn serialize(&self) -> String {
        let mut result = String::new();
        for part in &self.0 {
            result.push('[');
            match part {
                EvalPart::Literal(s) => result.push_str(s),
                EvalPart::Special(s) => {
                    result.push('$');
                    result.push_str(s);
                }
            }
            result.push(']');
        }
        result
    }

    /// Reconstruct Ninja syntax, using `${name}` for variable references.
    pub fn unparse(&self) -> String {
        let mut result = String::new();
        for part in &self.0 {
            match part {
                EvalPart::Literal(s) => result.push_str(s),
                EvalPart::Special(s) => {
                    result.push_str("${");
                    result.push_str(s);
                    result.push('}');
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);
    impl Env for MapEnv {
        fn get_var(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|s| s.to_string())
        }
    }

    #[test]
    fn coalesces_adjacent_literals() {
        let mut e = EvalString::new();
        e.add_text("foo");
        e.add_text("bar");
        assert_eq!(e.parts().len(), 1);
        assert_eq!(e.serialize(), "[foobar]");
    }

    #[test]
    fn missing_variable_is_empty() {
        let mut e = EvalString::new();
        e.add_special("nope");
        assert_eq!(e.evaluate(&[]), "");
    }

    #[test]
    fn evaluate_mixed() {
        let mut env = HashMap::new();
        env.insert("in", "foo.c");
        env.insert("out", "foo.o");
        let env = MapEnv(env);

        let mut e = EvalString::new();
        e.add_text("gcc -c ");
        e.add_special("in");
        e.add_text(" -o ");
        e.add_special("out");

        assert_eq!(e.evaluate(&[&env]), "gcc -c foo.c -o foo.o");
    }

    #[test]
    fn unparse_roundtrips_through_evaluate() {
        let mut env = HashMap::new();
        env.insert("x", "1");
        let env = MapEnv(env);

        let mut e = EvalString::new();
        e.add_text("a=");
        e.add_special("x");

        // evaluate(e) == evaluate(parse(unparse(e))) -- approximated here
        // since this module doesn't own the lexer; the full round trip is
        // tested in `lexer`/`compiler`.
        assert_eq!(e.unparse(), "a=${x}");
        assert_eq!(e.evaluate(&[&env]), "a=1");
    }

    #[test]
    fn serialize_marks_special_pieces() {
        let mut e = EvalString::new();
        e.add_special("out");
        assert_eq!(e.serialize(), "[$out]");
    }
}
