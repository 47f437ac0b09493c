//! Reads the record stream a [`super::writer::BinaryWriter`] produces.
//!
//! Grounded on `manifest_stream.h`'s `manifest_istream`, which walks the
//! same buffer linearly for the top-level node sequence (RULE, BUILD,
//! INCLUDE, BINDING, DEFAULT, POOL) while STRING and VECTOR records are
//! only ever reached by following a `_ref` offset, never iterated
//! directly -- a reader scanning for the next node transparently steps
//! over them.

use crate::eval::{EvalPart, EvalString};

use super::format::*;

#[derive(Debug, Clone, Copy)]
pub struct RuleView {
    pub name_ref: u32,
    pub bindings_ref: u32,
    pub rule_position: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BuildView {
    pub rule_name_ref: u32,
    pub outs_ref: u32,
    pub outs_implicit: u16,
    pub ins_ref: u32,
    pub ins_implicit: u16,
    pub ins_order_only: u16,
    pub validations_ref: u32,
    pub bindings_ref: u32,
    pub rule_position: u64,
    pub final_position: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct IncludeView {
    pub new_scope: bool,
    pub path_ref: u32,
    pub final_position: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BindingView {
    pub name_ref: u32,
    pub value_ref: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultView {
    pub defaults_ref: u32,
    pub positions_ref: u32,
    pub final_position: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolView {
    pub name_ref: u32,
    pub depth_ref: u32,
    pub pool_position: u64,
    pub depth_position: u64,
    pub final_position: u64,
}

pub struct BinaryReader {
    buf: Vec<u8>,
    pos: usize,
}

impl BinaryReader {
    pub fn new(buf: Vec<u8>) -> Self {
        BinaryReader { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn u16_at(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.buf[at], self.buf[at + 1]])
    }

    fn u32_at(&self, at: usize) -> u32 {
        u32::from_le_bytes([
            self.buf[at],
            self.buf[at + 1],
            self.buf[at + 2],
            self.buf[at + 3],
        ])
    }

    fn u64_at(&self, at: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.buf[at..at + 8]);
        u64::from_le_bytes(b)
    }

    /// Reads the mandatory leading record, returning `(version, checksum)`.
    pub fn read_start_parse(&mut self) -> Result<(u16, u16), String> {
        if self.buf.get(self.pos) != Some(&TAG_START_PARSE) {
            return Err("missing START_PARSE header".to_string());
        }
        let version = self.u16_at(self.pos + HEADER_LEN);
        let checksum = self.u16_at(self.pos + HEADER_LEN + 2);
        self.pos += START_PARSE_RECORD_SIZE as usize;
        Ok((version, checksum))
    }

    /// Whether `(version, checksum)` (as returned by [`Self::read_start_parse`])
    /// matches the schema this binary was built against.
    pub fn is_current_version(version: u16, checksum: u16) -> bool {
        version == SCHEMA_VERSION && checksum == SCHEMA_CHECKSUM
    }

    /// Every declaration record (STRING, VECTOR) carries the same 3-byte
    /// header as a node record; its payload length is `size - HEADER_LEN`.
    /// A `_ref` always points just past that header, so the header can
    /// always be found by walking back from the reference.
    fn payload_len_at_ref(&self, r: u32) -> usize {
        let size = self.u16_at(r as usize - 2) as usize;
        size - HEADER_LEN
    }

    pub fn deref_string(&self, r: u32) -> &str {
        let len = self.payload_len_at_ref(r);
        let start = r as usize;
        std::str::from_utf8(&self.buf[start..start + len]).expect("interned string is valid utf8")
    }

    fn deref_vector_raw(&self, r: u32) -> (u16, &[u8]) {
        let len = self.payload_len_at_ref(r);
        let start = r as usize;
        let count = u16::from_le_bytes([self.buf[start], self.buf[start + 1]]);
        (count, &self.buf[start + 2..start + len])
    }

    pub fn read_vec_of_u32(&self, r: u32) -> Vec<u32> {
        let (count, elements) = self.deref_vector_raw(r);
        (0..count as usize)
            .map(|i| {
                let at = i * 4;
                u32::from_le_bytes([
                    elements[at],
                    elements[at + 1],
                    elements[at + 2],
                    elements[at + 3],
                ])
            })
            .collect()
    }

    pub fn read_vec_of_u64(&self, r: u32) -> Vec<u64> {
        let (count, elements) = self.deref_vector_raw(r);
        (0..count as usize)
            .map(|i| {
                let at = i * 8;
                let mut b = [0u8; 8];
                b.copy_from_slice(&elements[at..at + 8]);
                u64::from_le_bytes(b)
            })
            .collect()
    }

    pub fn read_eval_string(&self, r: u32) -> EvalString {
        let (count, elements) = self.deref_vector_raw(r);
        let mut parts = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let at = i * EVAL_PIECE_SIZE;
            let string_ref = u32::from_le_bytes([
                elements[at],
                elements[at + 1],
                elements[at + 2],
                elements[at + 3],
            ]);
            let kind = elements[at + 4];
            let text = self.deref_string(string_ref).to_owned();
            parts.push(if kind == EVAL_KIND_SPECIAL {
                EvalPart::Special(text)
            } else {
                EvalPart::Literal(text)
            });
        }
        EvalString::from_parts(parts)
    }

    pub fn read_vec_of_eval_strings(&self, r: u32) -> Vec<EvalString> {
        self.read_vec_of_u32(r)
            .into_iter()
            .map(|e| self.read_eval_string(e))
            .collect()
    }

    pub fn read_bindings(&self, r: u32) -> Vec<(String, EvalString)> {
        let (count, elements) = self.deref_vector_raw(r);
        (0..count as usize)
            .map(|i| {
                let at = i * BINDING_PAIR_SIZE;
                let name_ref = u32::from_le_bytes([
                    elements[at],
                    elements[at + 1],
                    elements[at + 2],
                    elements[at + 3],
                ]);
                let value_ref = u32::from_le_bytes([
                    elements[at + 4],
                    elements[at + 5],
                    elements[at + 6],
                    elements[at + 7],
                ]);
                (
                    self.deref_string(name_ref).to_owned(),
                    self.read_eval_string(value_ref),
                )
            })
            .collect()
    }

    /// Steps over any STRING/VECTOR declaration records sitting at the
    /// cursor, leaving it positioned at the next node record (or at
    /// end-of-buffer).
    fn skip_declarations(&mut self) {
        while let Some(&tag) = self.buf.get(self.pos) {
            if tag != TAG_STRING && tag != TAG_VECTOR {
                break;
            }
            let size = self.u16_at(self.pos + 1) as usize;
            self.pos += size;
        }
    }

    /// Returns the type of the next node record, without consuming it.
    pub fn next_node_type(&mut self) -> Option<NodeType> {
        self.skip_declarations();
        let tag = *self.buf.get(self.pos)?;
        NodeType::from_tag(tag)
    }

    pub fn read_rule(&mut self) -> RuleView {
        debug_assert_eq!(self.buf[self.pos], TAG_RULE);
        let base = self.pos + HEADER_LEN;
        let view = RuleView {
            name_ref: self.u32_at(base),
            bindings_ref: self.u32_at(base + 4),
            rule_position: self.u64_at(base + 8),
        };
        self.pos += RULE_RECORD_SIZE as usize;
        view
    }

    pub fn read_build(&mut self) -> BuildView {
        debug_assert_eq!(self.buf[self.pos], TAG_BUILD);
        let base = self.pos + HEADER_LEN;
        let view = BuildView {
            rule_name_ref: self.u32_at(base),
            outs_ref: self.u32_at(base + 4),
            outs_implicit: self.u16_at(base + 8),
            ins_ref: self.u32_at(base + 10),
            ins_implicit: self.u16_at(base + 14),
            ins_order_only: self.u16_at(base + 16),
            validations_ref: self.u32_at(base + 18),
            bindings_ref: self.u32_at(base + 22),
            rule_position: self.u64_at(base + 26),
            final_position: self.u64_at(base + 34),
        };
        self.pos += BUILD_RECORD_SIZE as usize;
        view
    }

    pub fn read_include(&mut self) -> IncludeView {
        debug_assert_eq!(self.buf[self.pos], TAG_INCLUDE);
        let base = self.pos + HEADER_LEN;
        let view = IncludeView {
            new_scope: self.buf[base] != 0,
            path_ref: self.u32_at(base + 1),
            final_position: self.u64_at(base + 5),
        };
        self.pos += INCLUDE_RECORD_SIZE as usize;
        view
    }

    pub fn read_binding(&mut self) -> BindingView {
        debug_assert_eq!(self.buf[self.pos], TAG_BINDING);
        let base = self.pos + HEADER_LEN;
        let view = BindingView {
            name_ref: self.u32_at(base),
            value_ref: self.u32_at(base + 4),
        };
        self.pos += BINDING_RECORD_SIZE as usize;
        view
    }

    pub fn read_default(&mut self) -> DefaultView {
        debug_assert_eq!(self.buf[self.pos], TAG_DEFAULT);
        let base = self.pos + HEADER_LEN;
        let view = DefaultView {
            defaults_ref: self.u32_at(base),
            positions_ref: self.u32_at(base + 4),
            final_position: self.u64_at(base + 8),
        };
        self.pos += DEFAULT_RECORD_SIZE as usize;
        view
    }

    pub fn read_pool(&mut self) -> PoolView {
        debug_assert_eq!(self.buf[self.pos], TAG_POOL);
        let base = self.pos + HEADER_LEN;
        let view = PoolView {
            name_ref: self.u32_at(base),
            depth_ref: self.u32_at(base + 4),
            pool_position: self.u64_at(base + 8),
            depth_position: self.u64_at(base + 16),
            final_position: self.u64_at(base + 24),
        };
        self.pos += POOL_RECORD_SIZE as usize;
        view
    }

    /// Consumes the trailing END_PARSE marker, if the cursor sits on one.
    pub fn eat_end_parse(&mut self) -> bool {
        self.skip_declarations();
        if self.buf.get(self.pos) == Some(&TAG_END_PARSE) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::writer::BinaryWriter;
    use super::*;

    #[test]
    fn round_trips_start_parse() {
        let mut w = BinaryWriter::new();
        w.start_parse();
        w.end_parse();
        let mut r = BinaryReader::new(w.into_bytes());
        let (version, checksum) = r.read_start_parse().unwrap();
        assert!(BinaryReader::is_current_version(version, checksum));
        assert!(r.eat_end_parse());
    }

    #[test]
    fn round_trips_a_rule_and_skips_declarations() {
        let mut w = BinaryWriter::new();
        w.start_parse();
        let name_ref = w.string("cc");
        let mut command = EvalString::new();
        command.add_text("gcc -c ");
        command.add_special("in");
        let bindings_ref = w.vector_of_bindings(&[("command".to_string(), command.clone())]);
        w.write_rule(name_ref, bindings_ref, 42);
        w.end_parse();

        let mut r = BinaryReader::new(w.into_bytes());
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Rule));
        let rule = r.read_rule();
        assert_eq!(r.deref_string(rule.name_ref), "cc");
        assert_eq!(rule.rule_position, 42);
        let bindings = r.read_bindings(rule.bindings_ref);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, "command");
        assert_eq!(bindings[0].1, command);
        assert!(r.eat_end_parse());
    }

    #[test]
    fn round_trips_a_build_with_eval_vectors() {
        let mut w = BinaryWriter::new();
        w.start_parse();
        let rule_name = w.string("cc");
        let mut out = EvalString::new();
        out.add_text("foo.o");
        let outs_ref = w.vector_of_eval_strings(&[out.clone()]);
        let mut inp = EvalString::new();
        inp.add_text("foo.c");
        let ins_ref = w.vector_of_eval_strings(&[inp.clone()]);
        let validations_ref = w.vector_of_eval_strings(&[]);
        let bindings_ref = w.vector_of_bindings(&[]);
        w.write_build(
            rule_name,
            outs_ref,
            0,
            ins_ref,
            0,
            0,
            validations_ref,
            bindings_ref,
            3,
            7,
        );
        w.end_parse();

        let mut r = BinaryReader::new(w.into_bytes());
        r.read_start_parse().unwrap();
        assert_eq!(r.next_node_type(), Some(NodeType::Build));
        let build = r.read_build();
        assert_eq!(r.deref_string(build.rule_name_ref), "cc");
        assert_eq!(r.read_vec_of_eval_strings(build.outs_ref), vec![out]);
        assert_eq!(r.read_vec_of_eval_strings(build.ins_ref), vec![inp]);
        assert_eq!(build.rule_position, 3);
        assert_eq!(build.final_position, 7);
        assert!(r.eat_end_parse());
    }

    #[test]
    fn empty_string_and_empty_vector_refs_read_back_distinctly() {
        let mut w = BinaryWriter::new();
        w.start_parse();
        let s = w.string("");
        let v = w.vector_of_u32(&[]);
        w.end_parse();
        let r = BinaryReader::new(w.into_bytes());
        assert_eq!(r.deref_string(s), "");
        assert_eq!(r.read_vec_of_u32(v), Vec::<u32>::new());
    }
}
