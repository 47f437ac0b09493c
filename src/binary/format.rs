//! On-disk layout constants for the `.bin` manifest cache.
//!
//! Grounded on `manifest_stream.h`'s `man_node_t` tag enum and its
//! `__attribute__((packed))` node structs, translated to a record
//! layout spelled out explicitly here instead of relying on a packed
//! `#[repr]` struct, since Rust's `size_of` isn't usable the same way
//! the C++ sources use `sizeof` inside a `constexpr` sum when booleans
//! and padding-free layout both need to be pinned down exactly.
//!
//! Every record begins with a 1-byte tag; fixed-layout node records
//! additionally carry a 2-byte little-endian `size` counting the whole
//! record (tag + size + payload), matching `ParseStartNode`/`RuleNode`/
//! etc. in the original source.

pub const TAG_STRING: u8 = b's';
pub const TAG_START_PARSE: u8 = b'+';
pub const TAG_END_PARSE: u8 = b'-';
pub const TAG_RULE: u8 = b'r';
pub const TAG_BUILD: u8 = b'b';
pub const TAG_INCLUDE: u8 = b'i';
pub const TAG_BINDING: u8 = b'=';
pub const TAG_DEFAULT: u8 = b'd';
pub const TAG_POOL: u8 = b'p';
pub const TAG_VECTOR: u8 = b'v';

/// `EvalString` piece kind, as stored in a `(string_ref, kind)` pair.
pub const EVAL_KIND_RAW: u8 = 0;
pub const EVAL_KIND_SPECIAL: u8 = 1;

pub const HEADER_LEN: usize = 3; // tag + size

/// Byte length of a START_PARSE record: header + version(u16) + checksum(u16).
pub const START_PARSE_RECORD_SIZE: u16 = (HEADER_LEN + 2 + 2) as u16;
/// Byte length of a RULE record: header + name-ref + bindings-ref + rule_position.
pub const RULE_RECORD_SIZE: u16 = (HEADER_LEN + 4 + 4 + 8) as u16;
/// Byte length of a BUILD record.
pub const BUILD_RECORD_SIZE: u16 =
    (HEADER_LEN + 4 + 4 + 2 + 4 + 2 + 2 + 4 + 4 + 8 + 8) as u16;
/// Byte length of an INCLUDE record: header + new_scope(bool) + path-ref + final_position.
pub const INCLUDE_RECORD_SIZE: u16 = (HEADER_LEN + 1 + 4 + 8) as u16;
/// Byte length of a BINDING record: header + name-ref + value-ref. No final_position
/// (spec.md §9: "A BINDING record in the binary format lacks an explicit
/// final_position").
pub const BINDING_RECORD_SIZE: u16 = (HEADER_LEN + 4 + 4) as u16;
/// Byte length of a DEFAULT record: header + defaults-ref + positions-ref + final_position.
pub const DEFAULT_RECORD_SIZE: u16 = (HEADER_LEN + 4 + 4 + 8) as u16;
/// Byte length of a POOL record.
pub const POOL_RECORD_SIZE: u16 = (HEADER_LEN + 4 + 4 + 8 + 8 + 8) as u16;

/// Byte width of one `(string_ref: u32, kind: u8)` EvalString piece.
pub const EVAL_PIECE_SIZE: usize = 4 + 1;
/// Byte width of one `(name_ref: u32, value_eval_ref: u32)` binding pair.
pub const BINDING_PAIR_SIZE: usize = 4 + 4;

/// Schema version: bumped whenever the record layout changes in a way
/// that isn't already caught by the checksum (e.g. reordering fields
/// without changing any size).
pub const SCHEMA_VERSION: u16 = 1;

/// A compile-time-derived digest of every fixed-record struct's size.
/// Any layout change to one of the node records changes this sum and
/// therefore invalidates every existing `.bin` cache automatically.
pub const SCHEMA_CHECKSUM: u16 = POOL_RECORD_SIZE
    .wrapping_add(DEFAULT_RECORD_SIZE)
    .wrapping_add(BINDING_RECORD_SIZE)
    .wrapping_add(INCLUDE_RECORD_SIZE)
    .wrapping_add(BUILD_RECORD_SIZE)
    .wrapping_add(RULE_RECORD_SIZE);

/// The node/record type a reader encounters once STRING/VECTOR
/// declaration records have been skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    StartParse,
    EndParse,
    Rule,
    Build,
    Include,
    Binding,
    Default,
    Pool,
}

impl NodeType {
    pub fn from_tag(tag: u8) -> Option<NodeType> {
        match tag {
            TAG_START_PARSE => Some(NodeType::StartParse),
            TAG_END_PARSE => Some(NodeType::EndParse),
            TAG_RULE => Some(NodeType::Rule),
            TAG_BUILD => Some(NodeType::Build),
            TAG_INCLUDE => Some(NodeType::Include),
            TAG_BINDING => Some(NodeType::Binding),
            TAG_DEFAULT => Some(NodeType::Default),
            TAG_POOL => Some(NodeType::Pool),
            _ => None,
        }
    }
}
