//! Decides whether a manifest's `.bin` side-car can be reused, or the
//! text must be recompiled.
//!
//! Grounded on `manifest_to_bin_parser.cc`'s driver loop pairing
//! `ParseStartNode`'s version/checksum check with an mtime comparison
//! against the source file -- the cache is never trusted on its own,
//! only as a function of both the header and the timestamps.

use crate::binary::format::{SCHEMA_CHECKSUM, SCHEMA_VERSION};
use crate::binary::writer::BinaryWriter;
use crate::manifest::FileReader;

fn cache_path(filename: &str) -> String {
    format!("{}.bin", filename)
}

/// Parses the 4-byte `(version, checksum)` pair out of a candidate
/// cache buffer's `START_PARSE` header without fully constructing a
/// `BinaryReader`, so a corrupt/foreign file can be rejected cheaply.
fn header_matches(bytes: &[u8]) -> bool {
    // tag(1) + size(2) + version(2) + checksum(2)
    if bytes.len() < 7 || bytes[0] != crate::binary::format::TAG_START_PARSE {
        return false;
    }
    let version = u16::from_le_bytes([bytes[3], bytes[4]]);
    let checksum = u16::from_le_bytes([bytes[5], bytes[6]]);
    version == SCHEMA_VERSION && checksum == SCHEMA_CHECKSUM
}

fn compile_to_bytes(reader: &dyn FileReader, filename: &str) -> Result<Vec<u8>, String> {
    let text = reader.read_file(filename)?;
    let mut writer = BinaryWriter::new();
    crate::compiler::compile(filename, &text, &mut writer)?;
    Ok(writer.into_bytes())
}

/// Returns the binary record stream to interpret for `filename`,
/// recompiling and rewriting the `.bin` side-car if it is missing,
/// stale, or built against a different schema.
pub fn load_or_rebuild(reader: &dyn FileReader, filename: &str) -> Result<Vec<u8>, String> {
    if reader.stat(filename).is_none() {
        return Err(format!("{}: no such file", filename));
    }

    let bin_path = cache_path(filename);
    let source_mtime = reader.stat(filename);
    let cache_mtime = reader.stat(&bin_path);

    let cache_is_fresh = match (source_mtime, cache_mtime) {
        (Some(src), Some(bin)) => bin >= src,
        _ => false,
    };

    if cache_is_fresh {
        if let Ok(bytes) = reader.read_bytes(&bin_path) {
            if header_matches(&bytes) {
                return Ok(bytes);
            }
        }
    }

    let bytes = compile_to_bytes(reader, filename)?;
    // Best-effort: a write failure shouldn't fail the parse that just
    // succeeded in memory, only forfeit the cache for next time.
    let _ = reader.write_file(&bin_path, &bytes);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::InMemoryFileReader;

    #[test]
    fn missing_source_is_an_error() {
        let fs = InMemoryFileReader::new();
        let err = load_or_rebuild(&fs, "build.ninja").unwrap_err();
        assert!(err.contains("no such file"));
    }

    #[test]
    fn first_parse_creates_the_cache() {
        let fs = InMemoryFileReader::new();
        fs.put("build.ninja", "rule cc\n  command = x\n");
        assert!(fs.stat("build.ninja.bin").is_none());
        let bytes = load_or_rebuild(&fs, "build.ninja").unwrap();
        assert!(header_matches(&bytes));
        assert!(fs.stat("build.ninja.bin").is_some());
    }

    #[test]
    fn second_parse_reuses_the_cache() {
        let fs = InMemoryFileReader::new();
        fs.put("build.ninja", "rule cc\n  command = x\n");
        let first = load_or_rebuild(&fs, "build.ninja").unwrap();
        let cache_mtime_after_first = fs.stat("build.ninja.bin").unwrap();
        let second = load_or_rebuild(&fs, "build.ninja").unwrap();
        assert_eq!(first, second);
        // No rewrite happened: the cache's mtime didn't move.
        assert_eq!(fs.stat("build.ninja.bin").unwrap(), cache_mtime_after_first);
    }

    #[test]
    fn touching_the_source_forces_regeneration() {
        let fs = InMemoryFileReader::new();
        fs.put("build.ninja", "rule cc\n  command = x\n");
        load_or_rebuild(&fs, "build.ninja").unwrap();
        let stale_cache_mtime = fs.stat("build.ninja.bin").unwrap();
        fs.touch("build.ninja");
        load_or_rebuild(&fs, "build.ninja").unwrap();
        let fresh_cache_mtime = fs.stat("build.ninja.bin").unwrap();
        assert!(fresh_cache_mtime > stale_cache_mtime);
    }
}
