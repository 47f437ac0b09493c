//! Top-level parse entry point: wires [`crate::cache`]'s freshness
//! check to [`crate::interp`]'s evaluation pass, and owns the
//! collaborator interfaces (`FileReader`) and policy knobs
//! (`ManifestParserOptions`) the rest of the crate treats as external.
//!
//! Grounded on `n2::load::Loader::load_file`'s role as the outermost
//! driver tying the parser to the filesystem, simplified to this
//! crate's single-threaded, cache-or-compile pipeline.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::graph::State;
use crate::scope::Scope;

/// How to handle a `build` statement whose output is already produced
/// by an earlier edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupeEdgeAction {
    Warn,
    Error,
}

/// How to handle a `phony` edge whose sole output is also one of its
/// own inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhonyCycleAction {
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct ManifestParserOptions {
    pub dupe_edge_action: DupeEdgeAction,
    pub phony_cycle_action: PhonyCycleAction,
}

impl Default for ManifestParserOptions {
    /// Matches real Ninja's default policy: both situations are
    /// diagnosed but do not abort the parse.
    fn default() -> Self {
        ManifestParserOptions {
            dupe_edge_action: DupeEdgeAction::Warn,
            phony_cycle_action: PhonyCycleAction::Warn,
        }
    }
}

/// The disk/clock collaborator the parser and cache gate depend on.
/// Kept as a trait so tests can swap in an in-memory filesystem
/// without touching disk.
pub trait FileReader {
    fn read_file(&self, path: &str) -> Result<String, String>;
    /// Reads raw bytes -- used for the `.bin` cache, which isn't
    /// guaranteed to be valid UTF-8 and must round-trip exactly.
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, String>;
    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), String>;
    /// `None` means the path doesn't exist.
    fn stat(&self, path: &str) -> Option<SystemTime>;
}

/// Reads/writes the real filesystem.
pub struct RealFileReader;

impl FileReader for RealFileReader {
    fn read_file(&self, path: &str) -> Result<String, String> {
        std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, String> {
        std::fs::read(path).map_err(|e| format!("{}: {}", path, e))
    }

    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), String> {
        std::fs::write(path, bytes).map_err(|e| format!("{}: {}", path, e))
    }

    fn stat(&self, path: &str) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

/// An in-memory stand-in used by tests: files are keyed by path, and
/// each write bumps a monotonic logical clock instead of depending on
/// actual wall-clock resolution (needed to make the cache-freshness
/// scenario deterministic).
#[derive(Default)]
pub struct InMemoryFileReader {
    files: RefCell<HashMap<String, (Vec<u8>, SystemTime)>>,
    clock: RefCell<u64>,
}

impl InMemoryFileReader {
    pub fn new() -> Self {
        InMemoryFileReader {
            files: RefCell::new(HashMap::new()),
            clock: RefCell::new(0),
        }
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.borrow_mut();
        *clock += 1;
        UNIX_EPOCH + Duration::from_secs(*clock)
    }

    pub fn put(&self, path: &str, contents: &str) {
        let time = self.tick();
        self.files
            .borrow_mut()
            .insert(path.to_string(), (contents.as_bytes().to_vec(), time));
    }

    /// Re-stamps `path`'s mtime to "now" (logically later than anything
    /// written so far) without changing its contents.
    pub fn touch(&self, path: &str) {
        let time = self.tick();
        if let Some(entry) = self.files.borrow_mut().get_mut(path) {
            entry.1 = time;
        }
    }
}

impl FileReader for InMemoryFileReader {
    fn read_file(&self, path: &str) -> Result<String, String> {
        self.files
            .borrow()
            .get(path)
            .map(|(bytes, _)| String::from_utf8_lossy(bytes).into_owned())
            .ok_or_else(|| format!("{}: no such file", path))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, String> {
        self.files
            .borrow()
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| format!("{}: no such file", path))
    }

    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), String> {
        let time = self.tick();
        self.files
            .borrow_mut()
            .insert(path.to_string(), (bytes.to_vec(), time));
        Ok(())
    }

    fn stat(&self, path: &str) -> Option<SystemTime> {
        self.files.borrow().get(path).map(|(_, t)| *t)
    }
}

/// The highest `ninja_required_version` this crate satisfies.
const SUPPORTED_VERSION: (u32, u32, u32) = (1, 10, 2);

fn parse_version(s: &str) -> Option<(u32, u32, u32)> {
    let mut it = s.trim().split('.');
    let major = it.next()?.parse().ok()?;
    let minor = it.next().unwrap_or("0").parse().ok()?;
    let patch = it.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

/// Validates a `ninja_required_version` binding. Grounded on Ninja's
/// `CheckNinjaVersion`, which compares component-wise and rejects
/// anything newer than the running tool.
pub fn check_ninja_version(required: &str) -> Result<(), String> {
    let required = parse_version(required)
        .ok_or_else(|| format!("invalid ninja_required_version '{}'", required))?;
    if required > SUPPORTED_VERSION {
        return Err(format!(
            "ninja_required_version {}.{}.{} is newer than the supported {}.{}.{}",
            required.0, required.1, required.2, SUPPORTED_VERSION.0, SUPPORTED_VERSION.1, SUPPORTED_VERSION.2
        ));
    }
    Ok(())
}

/// Compiles (or loads from cache) and interprets one manifest file,
/// recursing into `include`/`subninja` targets it names.
pub fn parse_file(
    reader: &dyn FileReader,
    filename: &str,
    scope: Rc<Scope>,
    state: &mut State,
    options: &ManifestParserOptions,
) -> Result<()> {
    let bytes = crate::cache::load_or_rebuild(reader, filename)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("loading '{}'", filename))?;
    let mut br = crate::binary::BinaryReader::new(bytes);
    crate::interp::interpret(&mut br, state, scope, options, reader)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("interpreting '{}'", filename))
}

/// The full pipeline: caching plus interpretation, starting a fresh
/// `State` at its root scope.
pub struct ManifestParser<'a> {
    pub reader: &'a dyn FileReader,
    pub options: ManifestParserOptions,
}

impl<'a> ManifestParser<'a> {
    pub fn new(reader: &'a dyn FileReader) -> Self {
        ManifestParser {
            reader,
            options: ManifestParserOptions::default(),
        }
    }

    pub fn parse(&self, filename: &str) -> Result<State> {
        let mut state = State::new();
        let scope = state.bindings.clone();
        parse_file(self.reader, filename, scope, &mut state, &self.options)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_within_support_is_ok() {
        assert!(check_ninja_version("1.9.0").is_ok());
        assert!(check_ninja_version("1.10.2").is_ok());
    }

    #[test]
    fn version_beyond_support_errors() {
        let err = check_ninja_version("2.0.0").unwrap_err();
        assert!(err.contains("newer"));
    }

    #[test]
    fn in_memory_reader_round_trips() {
        let fs = InMemoryFileReader::new();
        fs.put("a.txt", "hello");
        assert_eq!(fs.read_file("a.txt").unwrap(), "hello");
        assert!(fs.stat("a.txt").is_some());
        assert!(fs.stat("missing").is_none());
    }

    #[test]
    fn touch_advances_mtime_without_changing_contents() {
        let fs = InMemoryFileReader::new();
        fs.put("a.txt", "hello");
        let before = fs.stat("a.txt").unwrap();
        fs.touch("a.txt");
        let after = fs.stat("a.txt").unwrap();
        assert!(after > before);
        assert_eq!(fs.read_file("a.txt").unwrap(), "hello");
    }
}
