//! Appends the deduplicated binary record stream a [`BinaryReader`]
//! consumes.
//!
//! Grounded on `manifest_stream.h`'s `manifest_ostream`, which owns an
//! append-only buffer and an intern table so that two build statements
//! referencing the same string or the same command line only pay for
//! one copy of it. Every reference a record stores is a byte offset
//! into that buffer, always strictly less than the position of the
//! record doing the referencing -- the stream is write-once and never
//! patched in place.

use rustc_hash::FxHashMap;

use crate::eval::{EvalPart, EvalString};

use super::format::*;

/// Interning key: the record's tag plus its exact payload bytes. STRING
/// and VECTOR records can otherwise produce identical byte sequences
/// (an empty string and a zero-element vector are both zero bytes of
/// payload) and must not collide in the intern table.
type InternKey = (u8, Vec<u8>);

pub struct BinaryWriter {
    buf: Vec<u8>,
    interned: FxHashMap<InternKey, u32>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        BinaryWriter {
            buf: Vec::new(),
            interned: FxHashMap::default(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn position(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Writes the schema header. Must be the first record in the stream.
    pub fn start_parse(&mut self) {
        self.buf.push(TAG_START_PARSE);
        self.buf
            .extend_from_slice(&START_PARSE_RECORD_SIZE.to_le_bytes());
        self.buf.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        self.buf.extend_from_slice(&SCHEMA_CHECKSUM.to_le_bytes());
    }

    /// Writes the terminal marker. A bare tag byte, no size field (the
    /// original C++ writer never emits one for this node).
    pub fn end_parse(&mut self) {
        self.buf.push(TAG_END_PARSE);
    }

    /// Interns `tag`+`payload` as one record, returning the offset of its
    /// first payload byte (i.e. just past the header), which is what
    /// every downstream `_ref` field stores. Reuses an earlier record's
    /// offset if the same tag and payload were already written.
    fn intern(&mut self, tag: u8, payload: &[u8]) -> u32 {
        let key = (tag, payload.to_vec());
        if let Some(&offset) = self.interned.get(&key) {
            return offset;
        }
        self.buf.push(tag);
        let size = (HEADER_LEN + payload.len()) as u16;
        self.buf.extend_from_slice(&size.to_le_bytes());
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(payload);
        self.interned.insert(key, offset);
        offset
    }

    /// Interns a string, returning its reference.
    pub fn string(&mut self, s: &str) -> u32 {
        self.intern(TAG_STRING, s.as_bytes())
    }

    /// Interns a VECTOR record whose payload is `count` little-endian
    /// `u16` followed by `elements`, per the §6 layout
    /// `{tag, bytes:u16, count:u16, payload}` where `bytes = 2 +
    /// payload.len()`.
    fn vector(&mut self, count: u16, elements: &[u8]) -> u32 {
        let mut payload = Vec::with_capacity(2 + elements.len());
        payload.extend_from_slice(&count.to_le_bytes());
        payload.extend_from_slice(elements);
        self.intern(TAG_VECTOR, &payload)
    }

    /// Interns an `EvalString` as a VECTOR of `(string_ref: u32, kind:
    /// u8)` pairs and returns its reference.
    pub fn eval_string(&mut self, eval: &EvalString) -> u32 {
        let parts = eval.parts();
        let mut elements = Vec::with_capacity(parts.len() * EVAL_PIECE_SIZE);
        for part in parts {
            let (text, kind) = match part {
                EvalPart::Literal(s) => (s.as_str(), EVAL_KIND_RAW),
                EvalPart::Special(s) => (s.as_str(), EVAL_KIND_SPECIAL),
            };
            let string_ref = self.string(text);
            elements.extend_from_slice(&string_ref.to_le_bytes());
            elements.push(kind);
        }
        self.vector(parts.len() as u16, &elements)
    }

    /// Interns a VECTOR of `eval_string` refs (each a `u32`), used for
    /// `outs`/`ins`/`validations`/`defaults`-style lists.
    pub fn vector_of_eval_strings(&mut self, evals: &[EvalString]) -> u32 {
        let refs: Vec<u32> = evals.iter().map(|e| self.eval_string(e)).collect();
        self.vector_of_u32(&refs)
    }

    /// Interns a VECTOR of raw `u32`s.
    pub fn vector_of_u32(&mut self, values: &[u32]) -> u32 {
        let mut elements = Vec::with_capacity(values.len() * 4);
        for v in values {
            elements.extend_from_slice(&v.to_le_bytes());
        }
        self.vector(values.len() as u16, &elements)
    }

    /// Interns a VECTOR of raw `u64`s (used for `default_positions`).
    pub fn vector_of_u64(&mut self, values: &[u64]) -> u32 {
        let mut elements = Vec::with_capacity(values.len() * 8);
        for v in values {
            elements.extend_from_slice(&v.to_le_bytes());
        }
        self.vector(values.len() as u16, &elements)
    }

    /// Interns a VECTOR of `(name_ref: u32, value_eval_ref: u32)` pairs.
    pub fn vector_of_bindings(&mut self, bindings: &[(String, EvalString)]) -> u32 {
        let mut elements = Vec::with_capacity(bindings.len() * BINDING_PAIR_SIZE);
        for (name, value) in bindings {
            let name_ref = self.string(name);
            let value_ref = self.eval_string(value);
            elements.extend_from_slice(&name_ref.to_le_bytes());
            elements.extend_from_slice(&value_ref.to_le_bytes());
        }
        self.vector(bindings.len() as u16, &elements)
    }

    pub fn write_rule(&mut self, name_ref: u32, bindings_ref: u32, rule_position: u64) {
        self.buf.push(TAG_RULE);
        self.buf
            .extend_from_slice(&RULE_RECORD_SIZE.to_le_bytes());
        self.buf.extend_from_slice(&name_ref.to_le_bytes());
        self.buf.extend_from_slice(&bindings_ref.to_le_bytes());
        self.buf.extend_from_slice(&rule_position.to_le_bytes());
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_build(
        &mut self,
        rule_name_ref: u32,
        outs_ref: u32,
        outs_implicit: u16,
        ins_ref: u32,
        ins_implicit: u16,
        ins_order_only: u16,
        validations_ref: u32,
        bindings_ref: u32,
        rule_position: u64,
        final_position: u64,
    ) {
        self.buf.push(TAG_BUILD);
        self.buf
            .extend_from_slice(&BUILD_RECORD_SIZE.to_le_bytes());
        self.buf.extend_from_slice(&rule_name_ref.to_le_bytes());
        self.buf.extend_from_slice(&outs_ref.to_le_bytes());
        self.buf.extend_from_slice(&outs_implicit.to_le_bytes());
        self.buf.extend_from_slice(&ins_ref.to_le_bytes());
        self.buf.extend_from_slice(&ins_implicit.to_le_bytes());
        self.buf.extend_from_slice(&ins_order_only.to_le_bytes());
        self.buf.extend_from_slice(&validations_ref.to_le_bytes());
        self.buf.extend_from_slice(&bindings_ref.to_le_bytes());
        self.buf.extend_from_slice(&rule_position.to_le_bytes());
        self.buf.extend_from_slice(&final_position.to_le_bytes());
    }

    pub fn write_include(&mut self, new_scope: bool, path_ref: u32, final_position: u64) {
        self.buf.push(TAG_INCLUDE);
        self.buf
            .extend_from_slice(&INCLUDE_RECORD_SIZE.to_le_bytes());
        self.buf.push(new_scope as u8);
        self.buf.extend_from_slice(&path_ref.to_le_bytes());
        self.buf.extend_from_slice(&final_position.to_le_bytes());
    }

    pub fn write_binding(&mut self, name_ref: u32, value_ref: u32) {
        self.buf.push(TAG_BINDING);
        self.buf
            .extend_from_slice(&BINDING_RECORD_SIZE.to_le_bytes());
        self.buf.extend_from_slice(&name_ref.to_le_bytes());
        self.buf.extend_from_slice(&value_ref.to_le_bytes());
    }

    pub fn write_default(&mut self, defaults_ref: u32, positions_ref: u32, final_position: u64) {
        self.buf.push(TAG_DEFAULT);
        self.buf
            .extend_from_slice(&DEFAULT_RECORD_SIZE.to_le_bytes());
        self.buf.extend_from_slice(&defaults_ref.to_le_bytes());
        self.buf.extend_from_slice(&positions_ref.to_le_bytes());
        self.buf.extend_from_slice(&final_position.to_le_bytes());
    }

    /// `depth_ref` is an `eval_string` reference: M2B never evaluates
    /// `depth`, only the Interpreter does, against the scope in force at
    /// the pool's position.
    pub fn write_pool(
        &mut self,
        name_ref: u32,
        depth_ref: u32,
        pool_position: u64,
        depth_position: u64,
        final_position: u64,
    ) {
        self.buf.push(TAG_POOL);
        self.buf
            .extend_from_slice(&POOL_RECORD_SIZE.to_le_bytes());
        self.buf.extend_from_slice(&name_ref.to_le_bytes());
        self.buf.extend_from_slice(&depth_ref.to_le_bytes());
        self.buf.extend_from_slice(&pool_position.to_le_bytes());
        self.buf.extend_from_slice(&depth_position.to_le_bytes());
        self.buf.extend_from_slice(&final_position.to_le_bytes());
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_identical_strings() {
        let mut w = BinaryWriter::new();
        let a = w.string("hello");
        let b = w.string("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn string_and_empty_vector_do_not_collide() {
        let mut w = BinaryWriter::new();
        let s = w.string("");
        let v = w.vector_of_u32(&[]);
        assert_ne!(
            s, v,
            "empty string and empty vector must not share an intern slot"
        );
    }

    #[test]
    fn distinct_strings_get_distinct_refs() {
        let mut w = BinaryWriter::new();
        let a = w.string("foo");
        let b = w.string("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn eval_string_round_trips_through_vector() {
        let mut eval = EvalString::new();
        eval.add_text("gcc -c ");
        eval.add_special("in");
        let mut w = BinaryWriter::new();
        let r1 = w.eval_string(&eval);
        let r2 = w.eval_string(&eval);
        assert_eq!(r1, r2, "identical EvalStrings should dedup");
    }

    #[test]
    fn start_parse_matches_declared_size() {
        let mut w = BinaryWriter::new();
        w.start_parse();
        assert_eq!(w.position() as u16, START_PARSE_RECORD_SIZE);
    }
}
