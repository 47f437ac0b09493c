//! A Ninja-compatible build manifest reader with a binary parse cache.
//!
//! Parsing happens in two stages: [`compiler`] (M2B) turns manifest
//! text into a deduplicated binary record stream without evaluating a
//! single variable, and [`interp`] walks that stream to build a
//! [`graph::State`]. [`cache`] decides whether an existing `.bin`
//! side-car can be reused instead of recompiling, and [`manifest`]
//! ties the two stages together behind a `FileReader` collaborator.

pub mod binary;
pub mod cache;
pub mod canon;
pub mod compiler;
pub mod eval;
pub mod graph;
pub mod interp;
pub mod lexer;
pub mod manifest;
pub mod scope;

pub use eval::{EvalPart, EvalString, Env};
pub use graph::{Edge, EdgeId, Node, NodeId, Pool, State};
pub use manifest::{
    check_ninja_version, DupeEdgeAction, FileReader, ManifestParser, ManifestParserOptions,
    PhonyCycleAction, RealFileReader,
};
pub use scope::{Rule, Scope};
