//! The manifest-to-binary (M2B) compiler.
//!
//! Grounded on `manifest_to_bin_parser.cc`'s custom-packed-stream
//! variant (the one paired with `manifest_istream`/`manifest_ostream`),
//! adapted to drive [`crate::lexer::Lexer`] and
//! [`crate::binary::writer::BinaryWriter`] instead. This stage never
//! evaluates a variable: every value becomes an `EvalString` offset and
//! every rule/build/pool/default/include/binding statement becomes one
//! binary record, in source order. Evaluating those records against a
//! live scope is `crate::interp`'s job.

use crate::binary::writer::BinaryWriter;
use crate::eval::EvalString;
use crate::lexer::{LexResult, Lexer, Token};

/// Drives a [`Lexer`], translating any lex error into the same rendered
/// `filename:line:col: msg` string the lexer itself would print.
struct Compiler<'a, 'w> {
    lex: Lexer<'a>,
    writer: &'w mut BinaryWriter,
}

impl<'a, 'w> Compiler<'a, 'w> {
    fn render<T>(&self, r: LexResult<T>) -> Result<T, String> {
        r.map_err(|e| self.lex.render_error(&e))
    }

    fn next_token(&mut self) -> Result<Token, String> {
        let r = self.lex.read_token();
        self.render(r)
    }

    fn peek(&mut self, expected: Token) -> Result<bool, String> {
        let r = self.lex.peek_token(expected);
        self.render(r)
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        let r = self.lex.expect_token(expected);
        self.render(r)
    }

    fn read_ident(&mut self) -> Result<String, String> {
        let r = self.lex.read_ident();
        self.render(r)
    }

    fn read_var_value(&mut self, out: &mut EvalString) -> Result<(), String> {
        let r = self.lex.read_var_value(out);
        self.render(r)
    }

    fn read_path(&mut self, out: &mut EvalString) -> Result<bool, String> {
        let r = self.lex.read_path(out);
        self.render(r)
    }

    fn pos(&self) -> u64 {
        self.lex.position() as u64
    }

    /// A statement ends at a `NEWLINE`, or at `EOF` if the file has no
    /// trailing newline on its last line.
    fn expect_statement_end(&mut self) -> Result<(), String> {
        let tok = self.next_token()?;
        match tok {
            Token::Newline | Token::Eof => Ok(()),
            other => Err(format!(
                "byte {}: expected newline, got {}",
                self.pos(),
                other.name()
            )),
        }
    }

    /// Reads zero or more indented `key = value` lines following a
    /// block header, stopping at the first non-indented line (which is
    /// pushed back for the caller).
    fn read_indented_bindings(&mut self) -> Result<Vec<(String, EvalString)>, String> {
        let mut bindings = Vec::new();
        loop {
            if !self.peek(Token::Indent)? {
                break;
            }
            let key = self.read_ident()?;
            self.expect(Token::Equals)?;
            let mut value = EvalString::new();
            self.read_var_value(&mut value)?;
            self.expect_statement_end()?;
            bindings.push((key, value));
        }
        Ok(bindings)
    }

    /// Reads a whitespace-delimited run of paths, stopping when
    /// `read_path` reports nothing left to read.
    fn read_paths(&mut self) -> Result<Vec<EvalString>, String> {
        let mut paths = Vec::new();
        loop {
            let mut eval = EvalString::new();
            if !self.read_path(&mut eval)? {
                break;
            }
            paths.push(eval);
        }
        Ok(paths)
    }

    fn parse_pool(&mut self) -> Result<(), String> {
        let pool_position = self.pos();
        self.expect(Token::Ident)?;
        let name = self.lex.ident_text().to_string();
        self.expect_statement_end()?;

        let mut depth: Option<EvalString> = None;
        let mut depth_position = 0u64;
        loop {
            if !self.peek(Token::Indent)? {
                break;
            }
            let key_position = self.pos();
            let key = self.read_ident()?;
            if key != "depth" {
                return Err(format!(
                    "byte {}: unexpected pool binding '{}', only 'depth' is allowed",
                    key_position, key
                ));
            }
            if depth.is_some() {
                return Err(format!("pool '{}' has more than one 'depth' binding", name));
            }
            self.expect(Token::Equals)?;
            let mut value = EvalString::new();
            self.read_var_value(&mut value)?;
            self.expect_statement_end()?;
            depth_position = key_position;
            depth = Some(value);
        }

        let depth = depth.ok_or_else(|| format!("pool '{}' is missing a 'depth' binding", name))?;
        let final_position = self.pos();

        let name_ref = self.writer.string(&name);
        let depth_ref = self.writer.eval_string(&depth);
        self.writer
            .write_pool(name_ref, depth_ref, pool_position, depth_position, final_position);
        Ok(())
    }

    fn parse_rule(&mut self) -> Result<(), String> {
        let rule_position = self.pos();
        self.expect(Token::Ident)?;
        let name = self.lex.ident_text().to_string();
        self.expect_statement_end()?;

        let bindings = self.read_indented_bindings()?;
        for (key, _) in &bindings {
            if !crate::scope::is_reserved_binding(key) {
                return Err(format!(
                    "rule '{}': unexpected binding '{}' is not a reserved rule variable",
                    name, key
                ));
            }
        }
        let has = |key: &str| bindings.iter().any(|(k, _)| k == key);
        if !has("command") {
            return Err(format!("rule '{}' is missing a 'command' binding", name));
        }
        if has("rspfile") != has("rspfile_content") {
            return Err(format!(
                "rule '{}': 'rspfile' and 'rspfile_content' must both be present or both absent",
                name
            ));
        }

        let name_ref = self.writer.string(&name);
        let bindings_ref = self.writer.vector_of_bindings(&bindings);
        self.writer.write_rule(name_ref, bindings_ref, rule_position);
        Ok(())
    }

    fn parse_build(&mut self) -> Result<(), String> {
        let mut outs = self.read_paths()?;
        if outs.is_empty() {
            return Err("build statement requires at least one output".to_string());
        }

        let mut tok = self.next_token()?;
        let mut implicit_out_count: u16 = 0;
        if tok == Token::Pipe {
            let implicit = self.read_paths()?;
            implicit_out_count = implicit.len() as u16;
            outs.extend(implicit);
            tok = self.next_token()?;
        }
        if tok != Token::Colon {
            return Err(format!("expected ':' after build outputs, got {}", tok.name()));
        }

        let rule_position = self.pos();
        self.expect(Token::Ident)?;
        let rule_name = self.lex.ident_text().to_string();

        let mut ins = self.read_paths()?;
        let mut implicit_in_count: u16 = 0;
        let mut order_only_count: u16 = 0;
        let mut validations = Vec::new();

        loop {
            let tok = self.next_token()?;
            match tok {
                Token::Pipe => {
                    let implicit = self.read_paths()?;
                    implicit_in_count = implicit.len() as u16;
                    ins.extend(implicit);
                }
                Token::Pipe2 => {
                    let order_only = self.read_paths()?;
                    order_only_count = order_only.len() as u16;
                    ins.extend(order_only);
                }
                Token::PipeAt => {
                    validations = self.read_paths()?;
                }
                Token::Newline | Token::Eof => break,
                other => {
                    return Err(format!(
                        "unexpected {} in build statement",
                        other.name()
                    ))
                }
            }
        }

        let bindings = self.read_indented_bindings()?;
        let final_position = self.pos();

        let rule_name_ref = self.writer.string(&rule_name);
        let outs_ref = self.writer.vector_of_eval_strings(&outs);
        let ins_ref = self.writer.vector_of_eval_strings(&ins);
        let validations_ref = self.writer.vector_of_eval_strings(&validations);
        let bindings_ref = self.writer.vector_of_bindings(&bindings);
        self.writer.write_build(
            rule_name_ref,
            outs_ref,
            implicit_out_count,
            ins_ref,
            implicit_in_count,
            order_only_count,
            validations_ref,
            bindings_ref,
            rule_position,
            final_position,
        );
        Ok(())
    }

    fn parse_default(&mut self) -> Result<(), String> {
        let mut defaults = Vec::new();
        let mut positions = Vec::new();
        loop {
            let path_position = self.pos();
            let mut eval = EvalString::new();
            if !self.read_path(&mut eval)? {
                break;
            }
            positions.push(path_position);
            defaults.push(eval);
        }
        if defaults.is_empty() {
            return Err("'default' requires at least one path".to_string());
        }
        self.expect_statement_end()?;
        let final_position = self.pos();

        let defaults_ref = self.writer.vector_of_eval_strings(&defaults);
        let positions_ref = self.writer.vector_of_u64(&positions);
        self.writer
            .write_default(defaults_ref, positions_ref, final_position);
        Ok(())
    }

    fn parse_include(&mut self, new_scope: bool) -> Result<(), String> {
        let mut path = EvalString::new();
        if !self.read_path(&mut path)? {
            return Err("expected a path after 'include'/'subninja'".to_string());
        }
        self.expect_statement_end()?;
        let final_position = self.pos();

        let path_ref = self.writer.eval_string(&path);
        self.writer.write_include(new_scope, path_ref, final_position);
        Ok(())
    }

    fn parse_toplevel_binding(&mut self) -> Result<(), String> {
        let name = self.lex.ident_text().to_string();
        self.expect(Token::Equals)?;
        let mut value = EvalString::new();
        self.read_var_value(&mut value)?;
        self.expect_statement_end()?;

        let name_ref = self.writer.string(&name);
        let value_ref = self.writer.eval_string(&value);
        self.writer.write_binding(name_ref, value_ref);
        Ok(())
    }

    fn run(&mut self) -> Result<(), String> {
        self.writer.start_parse();
        loop {
            let tok = self.next_token()?;
            match tok {
                Token::Newline => continue,
                Token::Eof => {
                    self.writer.end_parse();
                    return Ok(());
                }
                Token::Pool => self.parse_pool()?,
                Token::Rule => self.parse_rule()?,
                Token::Build => self.parse_build()?,
                Token::Default => self.parse_default()?,
                Token::Include => self.parse_include(false)?,
                Token::Subninja => self.parse_include(true)?,
                Token::Ident => self.parse_toplevel_binding()?,
                Token::Error => return Err(self.lex.describe_last_error()),
                other => {
                    return Err(format!("unexpected top-level token {}", other.name()))
                }
            }
        }
    }
}

/// Compiles `text` (whose name is `filename`, used only in error
/// messages) into `writer`'s record stream. Never evaluates a
/// variable; every value is stored as an `EvalString` offset.
pub fn compile(filename: &str, text: &str, writer: &mut BinaryWriter) -> Result<(), String> {
    let mut compiler = Compiler {
        lex: Lexer::new(filename, text),
        writer,
    };
    compiler.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::reader::BinaryReader;
    use crate::binary::format::NodeType;

    fn compiled(text: &str) -> BinaryReader {
        let mut writer = BinaryWriter::new();
        compile("test.ninja", text, &mut writer).expect("compiles");
        BinaryReader::new(writer.into_bytes())
    }

    #[test]
    fn empty_input_compiles_to_just_the_header_and_terminator() {
        let mut r = compiled("");
        r.read_start_parse().unwrap();
        assert!(r.eat_end_parse());
    }

    #[test]
    fn minimal_rule_and_build() {
        let mut r = compiled(
            "rule cc\n  command = gcc -c $in -o $out\nbuild foo.o: cc foo.c\n",
        );
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Rule));
        let rule = r.read_rule();
        assert_eq!(r.deref_string(rule.name_ref), "cc");
        let bindings = r.read_bindings(rule.bindings_ref);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, "command");
        assert_eq!(
            bindings[0].1.serialize(),
            "[gcc -c ][$in][ -o ][$out]"
        );

        assert_eq!(r.next_node_type(), Some(NodeType::Build));
        let build = r.read_build();
        assert_eq!(r.deref_string(build.rule_name_ref), "cc");
        let outs = r.read_vec_of_eval_strings(build.outs_ref);
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].serialize(), "[foo.o]");
        let ins = r.read_vec_of_eval_strings(build.ins_ref);
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].serialize(), "[foo.c]");
        assert_eq!(build.outs_implicit, 0);
        assert_eq!(build.ins_implicit, 0);
        assert_eq!(build.ins_order_only, 0);

        assert!(r.eat_end_parse());
    }

    #[test]
    fn pool_with_depth() {
        let mut r = compiled("pool link\n  depth = 2\n");
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Pool));
        let pool = r.read_pool();
        assert_eq!(r.deref_string(pool.name_ref), "link");
        assert_eq!(r.read_eval_string(pool.depth_ref).serialize(), "[2]");
        assert!(r.eat_end_parse());
    }

    #[test]
    fn pool_without_depth_is_an_error() {
        let mut writer = BinaryWriter::new();
        let err = compile("test.ninja", "pool link\n", &mut writer).unwrap_err();
        assert!(err.contains("missing a 'depth' binding"));
    }

    #[test]
    fn rule_without_command_is_an_error() {
        let mut writer = BinaryWriter::new();
        let err = compile("test.ninja", "rule cc\n  description = x\n", &mut writer).unwrap_err();
        assert!(err.contains("missing a 'command' binding"));
    }

    #[test]
    fn rule_with_unreserved_binding_is_an_error() {
        let mut writer = BinaryWriter::new();
        let err = compile(
            "test.ninja",
            "rule cc\n  command = x\n  bogus = 1\n",
            &mut writer,
        )
        .unwrap_err();
        assert!(err.contains("not a reserved rule variable"));
    }

    #[test]
    fn build_with_implicit_and_order_only_and_validations() {
        let mut r = compiled(
            "rule cc\n  command = x\nbuild out1 out2 | out3.h: cc in1 | in2 || oo1 |@ val1\n",
        );
        r.read_start_parse().unwrap();
        r.next_node_type(); // rule
        r.read_rule();
        assert_eq!(r.next_node_type(), Some(NodeType::Build));
        let build = r.read_build();
        assert_eq!(build.outs_implicit, 1);
        assert_eq!(build.ins_implicit, 1);
        assert_eq!(build.ins_order_only, 1);
        let outs = r.read_vec_of_eval_strings(build.outs_ref);
        assert_eq!(outs.len(), 3);
        let ins = r.read_vec_of_eval_strings(build.ins_ref);
        assert_eq!(ins.len(), 3);
        let validations = r.read_vec_of_eval_strings(build.validations_ref);
        assert_eq!(validations.len(), 1);
    }

    #[test]
    fn edge_local_bindings_are_captured() {
        let mut r = compiled(
            "rule cc\n  command = echo $x\nbuild o: cc i\n  x = edge\n",
        );
        r.read_start_parse().unwrap();
        r.next_node_type();
        r.read_rule();
        r.next_node_type();
        let build = r.read_build();
        let bindings = r.read_bindings(build.bindings_ref);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, "x");
        assert_eq!(bindings[0].1.serialize(), "[edge]");
    }

    #[test]
    fn default_records_one_position_per_path() {
        let mut r = compiled("default a b\n");
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Default));
        let default = r.read_default();
        let paths = r.read_vec_of_eval_strings(default.defaults_ref);
        assert_eq!(paths.len(), 2);
        let positions = r.read_vec_of_u64(default.positions_ref);
        assert_eq!(positions.len(), 2);
        assert!(positions[0] < positions[1]);
    }

    #[test]
    fn subninja_sets_new_scope_include_does_not() {
        let mut r = compiled("include a.ninja\nsubninja b.ninja\n");
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Include));
        let inc = r.read_include();
        assert!(!inc.new_scope);
        assert_eq!(r.read_eval_string(inc.path_ref).serialize(), "[a.ninja]");
        assert_eq!(r.next_node_type(), Some(NodeType::Include));
        let sub = r.read_include();
        assert!(sub.new_scope);
    }

    #[test]
    fn toplevel_binding_emits_binding_record() {
        let mut r = compiled("a = 1\n");
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Binding));
        let binding = r.read_binding();
        assert_eq!(r.deref_string(binding.name_ref), "a");
        assert_eq!(r.read_eval_string(binding.value_ref).serialize(), "[1]");
    }

    #[test]
    fn toplevel_binding_without_trailing_newline_compiles() {
        let mut r = compiled("a = 1");
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Binding));
        let binding = r.read_binding();
        assert_eq!(r.read_eval_string(binding.value_ref).serialize(), "[1]");
        assert!(r.eat_end_parse());
    }
}
