//! The binary parse-cache format: record layout, writer and reader.
//!
//! A manifest is compiled once into this format by the M2B compiler
//! (`crate::compiler`) without evaluating any variable, then read back
//! by the interpreter (`crate::interp`) as many times as the cache
//! stays fresh. Splitting "parse" from "evaluate" this way is what lets
//! a `.bin` side-car be reused across repeated builds.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{NodeType, SCHEMA_CHECKSUM, SCHEMA_VERSION};
pub use reader::{BinaryReader, BuildView, DefaultView, IncludeView, PoolView, RuleView, BindingView};
pub use writer::BinaryWriter;
