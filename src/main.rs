//! Command-line entry point: loads a manifest (compiling or reusing
//! its `.bin` cache as needed) and reports what it found.

use argh::FromArgs;

use binja::{DupeEdgeAction, ManifestParser, ManifestParserOptions, PhonyCycleAction, RealFileReader};

#[derive(FromArgs)]
/// Parse a Ninja-compatible build manifest and report its contents.
struct Args {
    /// path to the top-level manifest (default: build.ninja)
    #[argh(positional, default = "String::from(\"build.ninja\")")]
    file: String,

    /// treat a duplicate build output as an error instead of a warning
    #[argh(switch)]
    fatal_dupe_edges: bool,

    /// treat a phony self-dependency as an error instead of a warning
    #[argh(switch)]
    fatal_phony_cycles: bool,

    /// print every node path in addition to the summary counts
    #[argh(switch)]
    verbose: bool,
}

fn main() {
    let args: Args = argh::from_env();

    let reader = RealFileReader;
    let parser = ManifestParser {
        reader: &reader,
        options: ManifestParserOptions {
            dupe_edge_action: if args.fatal_dupe_edges {
                DupeEdgeAction::Error
            } else {
                DupeEdgeAction::Warn
            },
            phony_cycle_action: if args.fatal_phony_cycles {
                PhonyCycleAction::Error
            } else {
                PhonyCycleAction::Warn
            },
        },
    };

    let state = match parser.parse(&args.file) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("binja: {:#}", err);
            std::process::exit(1);
        }
    };

    println!(
        "{}: {} nodes, {} edges, {} default targets",
        args.file,
        state.nodes.len(),
        state.edges.len(),
        state.defaults.len()
    );
    if args.verbose {
        for node in &state.nodes {
            let kind = if node.producer.is_some() { "build" } else { "source" };
            println!("  {} [{}]", node.path, kind);
        }
    }
}
