//! Tokenizes Ninja manifest text.
//!
//! Grounded on the scanner design in `n2::parse::Scanner` (a byte-offset
//! cursor with `peek`/`next`/`back`/`read`), generalized to the full
//! token set the manifest grammar needs: keywords, `=`, `:`, the three
//! pipe variants, significant indentation, and `$`-escapes.

use crate::eval::EvalString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Pool,
    Build,
    Rule,
    Default,
    Include,
    Subninja,
    Ident,
    Equals,
    Colon,
    Pipe,
    Pipe2,
    PipeAt,
    Indent,
    Newline,
    Eof,
    Error,
}

impl Token {
    pub fn name(&self) -> &'static str {
        match self {
            Token::Pool => "pool",
            Token::Build => "build",
            Token::Rule => "rule",
            Token::Default => "default",
            Token::Include => "include",
            Token::Subninja => "subninja",
            Token::Ident => "identifier",
            Token::Equals => "'='",
            Token::Colon => "':'",
            Token::Pipe => "'|'",
            Token::Pipe2 => "'||'",
            Token::PipeAt => "'|@'",
            Token::Indent => "indent",
            Token::Newline => "newline",
            Token::Eof => "eof",
            Token::Error => "lexing error",
        }
    }
}

/// A parse/lex error tied to a byte offset in the source text.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub msg: String,
    pub ofs: usize,
}

pub type LexResult<T> = Result<T, ParseError>;

/// Tokenizes one manifest file's text.
pub struct Lexer<'a> {
    filename: String,
    buf: &'a str,
    ofs: usize,
    /// True immediately after a newline, before any non-space character
    /// has been consumed; used to recognize significant indentation.
    at_line_start: bool,
    /// One-token pushback buffer, the idiomatic substitute for the
    /// re-seeking `UnreadToken` in the C++ sources.
    pushback: Option<(Token, usize, Option<String>)>,
    last_error: Option<String>,
    /// The ident/literal text captured by the most recent `Ident` token.
    last_ident: Option<String>,
}

impl<'a> Lexer<'a> {
    pub fn new(filename: impl Into<String>, buf: &'a str) -> Self {
        Lexer {
            filename: filename.into(),
            buf,
            ofs: 0,
            at_line_start: true,
            pushback: None,
            last_error: None,
            last_ident: None,
        }
    }

    pub fn position(&self) -> usize {
        self.ofs
    }

    pub fn set_position(&mut self, pos: usize) {
        self.ofs = pos;
        self.pushback = None;
        self.at_line_start = pos == 0 || self.buf.as_bytes().get(pos.wrapping_sub(1)) == Some(&b'\n');
    }

    fn peek_byte(&self) -> Option<u8> {
        self.buf.as_bytes().get(self.ofs).copied()
    }

    fn advance(&mut self) {
        self.ofs += 1;
    }

    fn err<T>(&mut self, msg: impl Into<String>) -> LexResult<T> {
        let msg = msg.into();
        self.last_error = Some(msg.clone());
        Err(ParseError { msg, ofs: self.ofs })
    }

    /// Produce a rendered `filename:line:col: msg` error with a source
    /// excerpt and a caret, the way the C++ `Lexer::Error` does.
    pub fn render_error(&self, err: &ParseError) -> String {
        let mut line_start = 0;
        let mut line_no = 1;
        for (i, b) in self.buf.as_bytes().iter().enumerate() {
            if i >= err.ofs {
                break;
            }
            if *b == b'\n' {
                line_start = i + 1;
                line_no += 1;
            }
        }
        let line_end = self.buf[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(self.buf.len());
        let line = &self.buf[line_start..line_end];
        let col = err.ofs - line_start + 1;
        format!(
            "{}:{}:{}: {}\n{}\n{}^",
            self.filename,
            line_no,
            col,
            err.msg,
            line,
            " ".repeat(col.saturating_sub(1))
        )
    }

    pub fn describe_last_error(&self) -> String {
        self.last_error
            .clone()
            .unwrap_or_else(|| "lexing error".to_string())
    }

    /// The text captured by the most recently returned `Token::Ident`.
    pub fn ident_text(&self) -> &str {
        self.last_ident.as_deref().unwrap_or("")
    }

    fn skip_spaces(&mut self) {
        while self.peek_byte() == Some(b' ') {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn is_ident_byte(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-'
    }

    /// Read a bare identifier (rule/pool/variable name): `[A-Za-z0-9_.-]+`.
    pub fn read_ident(&mut self) -> LexResult<String> {
        let start = self.ofs;
        while let Some(b) = self.peek_byte() {
            if Self::is_ident_byte(b) {
                self.advance();
            } else {
                break;
            }
        }
        if self.ofs == start {
            return self.err("expected identifier");
        }
        Ok(self.buf[start..self.ofs].to_string())
    }

    /// Read the next token. Skips comments. Indentation is only
    /// recognized right after a newline.
    pub fn read_token(&mut self) -> LexResult<Token> {
        if let Some((tok, ofs, ident)) = self.pushback.take() {
            self.ofs = ofs;
            self.last_ident = ident;
            return Ok(tok);
        }

        if self.at_line_start && self.peek_byte() == Some(b' ') {
            self.skip_spaces();
            self.at_line_start = false;
            return Ok(Token::Indent);
        }
        self.at_line_start = false;

        // Non-indent whitespace between tokens on the same line is always
        // legal here; callers are responsible for requiring/forbidding it
        // around specific tokens (e.g. EvalString parsing is whitespace
        // sensitive and doesn't go through read_token for its interior).
        self.skip_spaces();

        match self.peek_byte() {
            None => Ok(Token::Eof),
            Some(b'\n') => {
                self.advance();
                self.at_line_start = true;
                Ok(Token::Newline)
            }
            Some(b'\r') => {
                self.advance();
                if self.peek_byte() == Some(b'\n') {
                    self.advance();
                }
                self.at_line_start = true;
                Ok(Token::Newline)
            }
            Some(b'#') => {
                self.skip_comment();
                self.read_token()
            }
            Some(b'=') => {
                self.advance();
                Ok(Token::Equals)
            }
            Some(b':') => {
                self.advance();
                Ok(Token::Colon)
            }
            Some(b'|') => {
                self.advance();
                match self.peek_byte() {
                    Some(b'|') => {
                        self.advance();
                        Ok(Token::Pipe2)
                    }
                    Some(b'@') => {
                        self.advance();
                        Ok(Token::PipeAt)
                    }
                    _ => Ok(Token::Pipe),
                }
            }
            Some(b) if Self::is_ident_byte(b) => {
                let ident = self.read_ident()?;
                let tok = match ident.as_str() {
                    "pool" => Token::Pool,
                    "build" => Token::Build,
                    "rule" => Token::Rule,
                    "default" => Token::Default,
                    "include" => Token::Include,
                    "subninja" => Token::Subninja,
                    _ => Token::Ident,
                };
                self.last_ident = Some(ident);
                Ok(tok)
            }
            Some(b) => self.err(format!("unexpected character {:?}", b as char)),
        }
    }

    /// Push the just-returned token back so the next `read_token` call
    /// returns it again.
    pub fn unread_token(&mut self, tok: Token) {
        self.pushback = Some((tok, self.ofs, self.last_ident.clone()));
    }

    /// Peek whether the next token is `expected` without consuming it
    /// unless it matched.
    pub fn peek_token(&mut self, expected: Token) -> LexResult<bool> {
        let tok = self.read_token()?;
        if tok == expected {
            Ok(true)
        } else {
            self.unread_token(tok);
            Ok(false)
        }
    }

    pub fn expect_token(&mut self, expected: Token) -> LexResult<()> {
        let tok = self.read_token()?;
        if tok == expected {
            Ok(())
        } else {
            self.err(format!("expected {}, got {}", expected.name(), tok.name()))
        }
    }

    /// Read one `$`-escape (the character right after a consumed `$`):
    /// `$$` literal dollar, `$ ` literal space, `$\n` line continuation
    /// (consuming the following indentation), `${name}`, or bare `$name`.
    fn read_escape(&mut self, out: &mut EvalString) -> LexResult<()> {
        match self.peek_byte() {
            Some(b'\n') => {
                self.advance();
                self.skip_spaces();
                Ok(())
            }
            Some(b'\r') => {
                self.advance();
                if self.peek_byte() == Some(b'\n') {
                    self.advance();
                }
                self.skip_spaces();
                Ok(())
            }
            Some(b'$') => {
                self.advance();
                out.add_text("$");
                Ok(())
            }
            Some(b' ') => {
                self.advance();
                out.add_text(" ");
                Ok(())
            }
            Some(b'{') => {
                self.advance();
                let start = self.ofs;
                loop {
                    match self.peek_byte() {
                        None => return self.err("unexpected EOF in ${...}"),
                        Some(b'}') => break,
                        Some(_) => self.advance(),
                    }
                }
                let name = self.buf[start..self.ofs].to_string();
                self.advance(); // consume '}'
                if name.is_empty() {
                    return self.err("expected variable name after ${");
                }
                out.add_special(&name);
                Ok(())
            }
            Some(b) if Self::is_ident_byte(b) => {
                let name = self.read_ident()?;
                out.add_special(&name);
                Ok(())
            }
            _ => self.err("bad $-escape (literal $ must be written as $$)"),
        }
    }

    /// Read an rvalue up to (not including) the terminating newline,
    /// handling `$`-escapes and `$\n` continuations.
    pub fn read_var_value(&mut self, out: &mut EvalString) -> LexResult<()> {
        self.skip_spaces();
        let mut start = self.ofs;
        loop {
            match self.peek_byte() {
                None => {
                    if start < self.ofs {
                        out.add_text(&self.buf[start..self.ofs]);
                    }
                    return Ok(());
                }
                Some(b'\n') | Some(b'\r') => {
                    if start < self.ofs {
                        out.add_text(&self.buf[start..self.ofs]);
                    }
                    return Ok(());
                }
                Some(b'$') => {
                    if start < self.ofs {
                        out.add_text(&self.buf[start..self.ofs]);
                    }
                    self.advance();
                    self.read_escape(out)?;
                    start = self.ofs;
                }
                Some(_) => self.advance(),
            }
        }
    }

    /// Read one whitespace/`:`/`|`-delimited path, handling `$`-escapes.
    /// Returns `Ok(true)` if a (possibly empty after escapes, but
    /// non-whitespace-delimited) path was read, `Ok(false)` if the next
    /// character terminates the path list instead (whitespace, `:`,
    /// `|`, or newline with nothing consumed).
    pub fn read_path(&mut self, out: &mut EvalString) -> LexResult<bool> {
        self.skip_spaces();
        let mut start = self.ofs;
        let mut read_any = false;
        loop {
            match self.peek_byte() {
                None => {
                    if start < self.ofs {
                        out.add_text(&self.buf[start..self.ofs]);
                    }
                    return Ok(read_any);
                }
                Some(b'\n') | Some(b'\r') | Some(b' ') | Some(b':') | Some(b'|') => {
                    if start < self.ofs {
                        out.add_text(&self.buf[start..self.ofs]);
                    }
                    return Ok(read_any);
                }
                Some(b'$') => {
                    if start < self.ofs {
                        out.add_text(&self.buf[start..self.ofs]);
                    }
                    self.advance();
                    self.read_escape(out)?;
                    start = self.ofs;
                    read_any = true;
                }
                Some(_) => {
                    self.advance();
                    read_any = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(input: &str) -> Vec<Token> {
        let mut lex = Lexer::new("test", input);
        let mut out = Vec::new();
        loop {
            let t = lex.read_token().unwrap();
            let done = t == Token::Eof;
            out.push(t);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn keywords() {
        assert_eq!(
            toks("rule\nbuild\npool\ndefault\ninclude\nsubninja\n"),
            vec![
                Token::Rule,
                Token::Newline,
                Token::Build,
                Token::Newline,
                Token::Pool,
                Token::Newline,
                Token::Default,
                Token::Newline,
                Token::Include,
                Token::Newline,
                Token::Subninja,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn indent_only_at_line_start() {
        let mut lex = Lexer::new("test", "rule cc\n  command = x\n");
        assert_eq!(lex.read_token().unwrap(), Token::Rule);
        assert_eq!(lex.read_token().unwrap(), Token::Ident); // "cc"
        assert_eq!(lex.read_token().unwrap(), Token::Newline);
        assert_eq!(lex.read_token().unwrap(), Token::Indent);
        assert_eq!(lex.read_token().unwrap(), Token::Ident); // "command"
    }

    #[test]
    fn pipe_variants() {
        assert_eq!(toks("| || |@"), vec![Token::Pipe, Token::Pipe2, Token::PipeAt, Token::Eof]);
    }

    #[test]
    fn unread_token_replays() {
        let mut lex = Lexer::new("test", "rule cc\n");
        let t = lex.read_token().unwrap();
        assert_eq!(t, Token::Rule);
        lex.unread_token(t);
        assert_eq!(lex.read_token().unwrap(), Token::Rule);
        assert_eq!(lex.read_token().unwrap(), Token::Ident);
    }

    #[test]
    fn var_value_with_escapes() {
        let mut lex = Lexer::new("test", "gcc -c $in -o $out\n");
        let mut eval = EvalString::new();
        lex.read_var_value(&mut eval).unwrap();
        assert_eq!(eval.serialize(), "[gcc -c ][$in][ -o ][$out]");
    }

    #[test]
    fn var_value_at_eof_with_no_trailing_newline() {
        let mut lex = Lexer::new("test", "a = 1");
        assert_eq!(lex.read_token().unwrap(), Token::Ident);
        assert_eq!(lex.read_token().unwrap(), Token::Equals);
        let mut eval = EvalString::new();
        lex.read_var_value(&mut eval).unwrap();
        assert_eq!(eval.serialize(), "[1]");
        assert_eq!(lex.read_token().unwrap(), Token::Eof);
    }

    #[test]
    fn var_value_line_continuation() {
        let mut lex = Lexer::new("test", "a $\n    b\n");
        let mut eval = EvalString::new();
        lex.read_var_value(&mut eval).unwrap();
        assert_eq!(eval.serialize(), "[a b]");
    }

    #[test]
    fn dollar_space_is_literal_space() {
        let mut lex = Lexer::new("test", "foo$ bar\n");
        let mut eval = EvalString::new();
        assert!(lex.read_path(&mut eval).unwrap());
        assert_eq!(eval.serialize(), "[foo bar]");
    }

    #[test]
    fn path_stops_at_colon_pipe_space() {
        let mut lex = Lexer::new("test", "a.o b.o : c.o | d.o\n");
        let mut eval = EvalString::new();
        assert!(lex.read_path(&mut eval).unwrap());
        assert_eq!(eval.serialize(), "[a.o]");
        let mut eval2 = EvalString::new();
        assert!(lex.read_path(&mut eval2).unwrap());
        assert_eq!(eval2.serialize(), "[b.o]");
        let mut eval3 = EvalString::new();
        assert!(!lex.read_path(&mut eval3).unwrap());
    }

    #[test]
    fn braced_variable_reference() {
        let mut lex = Lexer::new("test", "${name}\n");
        let mut eval = EvalString::new();
        lex.read_var_value(&mut eval).unwrap();
        assert_eq!(eval.serialize(), "[$name]");
    }

    #[test]
    fn bad_escape_errors() {
        let mut lex = Lexer::new("test", "a$!b\n");
        let mut eval = EvalString::new();
        assert!(lex.read_path(&mut eval).is_err());
    }
}
