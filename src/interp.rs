//! The semantic interpreter (C7): walks a [`BinaryReader`] stream,
//! expands `EvalString`s against a [`Scope`], and populates a
//! [`State`].
//!
//! Grounded on `manifest_parser.cc`'s `Parse`/`ParseEdge`/`ParsePool`/
//! `ParseDefault` family, re-targeted to read already-compiled binary
//! records instead of driving the lexer directly -- the M2B compiler
//! in [`crate::compiler`] has already done all the syntactic work and
//! recorded every value as an unevaluated `EvalString` offset.

use std::rc::Rc;

use crate::binary::format::NodeType;
use crate::binary::reader::BinaryReader;
use crate::canon::canonicalize_path;
use crate::graph::{Pool, State};
use crate::manifest::{check_ninja_version, DupeEdgeAction, FileReader, ManifestParserOptions, PhonyCycleAction};
use crate::scope::{Rule, Scope, PHONY};

/// Reads one manifest's worth of records and mutates `state`/`scope`
/// accordingly, recursing into `include`/`subninja` targets through
/// [`crate::manifest::parse_file`].
pub fn interpret(
    br: &mut BinaryReader,
    state: &mut State,
    scope: Rc<Scope>,
    options: &ManifestParserOptions,
    reader: &dyn FileReader,
) -> Result<(), String> {
    let (version, checksum) = br.read_start_parse()?;
    if !BinaryReader::is_current_version(version, checksum) {
        return Err("binary stream schema does not match this build".to_string());
    }

    loop {
        match br.next_node_type() {
            None => return Err("truncated binary stream (missing END_PARSE)".to_string()),
            Some(NodeType::EndParse) => {
                br.eat_end_parse();
                return Ok(());
            }
            Some(NodeType::StartParse) => {
                return Err("unexpected duplicate START_PARSE record".to_string())
            }
            Some(NodeType::Binding) => interpret_binding(br, &scope)?,
            Some(NodeType::Rule) => interpret_rule(br, &scope)?,
            Some(NodeType::Pool) => interpret_pool(br, state, &scope)?,
            Some(NodeType::Default) => interpret_default(br, state, &scope)?,
            Some(NodeType::Build) => interpret_build(br, state, &scope, options)?,
            Some(NodeType::Include) => interpret_include(br, state, &scope, options, reader)?,
        }
    }
}

fn interpret_binding(br: &mut BinaryReader, scope: &Rc<Scope>) -> Result<(), String> {
    let b = br.read_binding();
    let name = br.deref_string(b.name_ref).to_string();
    let value = br.read_eval_string(b.value_ref).evaluate(&[scope.as_ref()]);
    if name == "ninja_required_version" {
        check_ninja_version(&value)?;
    }
    scope.add_binding(name, value);
    Ok(())
}

fn interpret_rule(br: &mut BinaryReader, scope: &Rc<Scope>) -> Result<(), String> {
    let r = br.read_rule();
    let name = br.deref_string(r.name_ref).to_string();
    if scope.lookup_rule_current_scope(&name).is_some() {
        return Err(format!(
            "duplicate rule '{}' (at byte {})",
            name, r.rule_position
        ));
    }
    let mut rule = Rule::new(name);
    for (key, value) in br.read_bindings(r.bindings_ref) {
        rule.add_binding(key, value);
    }
    scope.add_rule(rule)
}

fn interpret_pool(br: &mut BinaryReader, state: &mut State, scope: &Rc<Scope>) -> Result<(), String> {
    let p = br.read_pool();
    let name = br.deref_string(p.name_ref).to_string();
    let depth_str = br
        .read_eval_string(p.depth_ref)
        .evaluate(&[scope.as_ref()]);
    let depth: i32 = depth_str.trim().parse().map_err(|_| {
        format!(
            "pool '{}': invalid depth '{}' (at byte {})",
            name, depth_str, p.depth_position
        )
    })?;
    if depth < 0 {
        return Err(format!(
            "pool '{}': invalid pool depth {} (at byte {})",
            name, depth, p.depth_position
        ));
    }
    state
        .add_pool(Pool { name, depth })
        .map_err(|e| format!("{} (at byte {})", e, p.final_position))
}

fn interpret_default(br: &mut BinaryReader, state: &mut State, scope: &Rc<Scope>) -> Result<(), String> {
    let d = br.read_default();
    for eval in br.read_vec_of_eval_strings(d.defaults_ref) {
        let path = canonicalize_path(&eval.evaluate(&[scope.as_ref()]));
        let node = state.get_node(&path);
        state.add_default(node);
    }
    Ok(())
}

fn interpret_build(
    br: &mut BinaryReader,
    state: &mut State,
    scope: &Rc<Scope>,
    options: &ManifestParserOptions,
) -> Result<(), String> {
    let b = br.read_build();
    let rule_name = br.deref_string(b.rule_name_ref).to_string();
    let rule = scope.lookup_rule(&rule_name).ok_or_else(|| {
        format!(
            "unknown build rule '{}' (at byte {})",
            rule_name, b.rule_position
        )
    })?;

    let bindings = br.read_bindings(b.bindings_ref);
    let edge_scope = if bindings.is_empty() {
        scope.clone()
    } else {
        let child = Scope::child(scope.clone());
        for (key, value) in &bindings {
            let resolved = value.evaluate(&[scope.as_ref()]);
            child.add_binding(key.clone(), resolved);
        }
        child
    };

    let outs_eval = br.read_vec_of_eval_strings(b.outs_ref);
    let explicit_out_count = outs_eval.len() - b.outs_implicit as usize;
    let mut surviving_outputs = Vec::new();
    let mut explicit_surviving = 0usize;
    for (i, eval) in outs_eval.iter().enumerate() {
        let path = canonicalize_path(&eval.evaluate(&[edge_scope.as_ref()]));
        let node = state.get_node(&path);
        if let Some(existing_edge) = state.node_producer(node) {
            match options.dupe_edge_action {
                DupeEdgeAction::Error => {
                    return Err(format!(
                        "multiple rules generate '{}' (at byte {}, already produced by edge {})",
                        path, b.final_position, existing_edge
                    ))
                }
                DupeEdgeAction::Warn => {
                    println!(
                        "n2: warning: multiple rules generate '{}'; dropping this one",
                        path
                    );
                    continue;
                }
            }
        }
        if i < explicit_out_count {
            explicit_surviving += 1;
        }
        surviving_outputs.push(node);
    }
    if surviving_outputs.is_empty() {
        // Every output was a duplicate: the whole edge is dropped, and
        // no input node is ever wired to it.
        return Ok(());
    }

    let ins_eval = br.read_vec_of_eval_strings(b.ins_ref);
    let explicit_in_count =
        ins_eval.len() - b.ins_implicit as usize - b.ins_order_only as usize;
    let is_phony_self_cycle = rule.name == PHONY && surviving_outputs.len() == 1;
    let sole_output = surviving_outputs.first().copied();

    let mut inputs = Vec::new();
    let mut explicit_ins = 0usize;
    let mut implicit_ins = 0usize;
    let mut order_only_ins = 0usize;
    for (i, eval) in ins_eval.iter().enumerate() {
        let path = canonicalize_path(&eval.evaluate(&[edge_scope.as_ref()]));
        let node = state.get_node(&path);
        if is_phony_self_cycle && Some(node) == sole_output {
            match options.phony_cycle_action {
                PhonyCycleAction::Error => {
                    return Err(format!(
                        "phony target '{}' depends on itself (at byte {})",
                        path, b.final_position
                    ))
                }
                PhonyCycleAction::Warn => {
                    println!(
                        "n2: warning: phony target '{}' depends on itself; removing the self-dependency",
                        path
                    );
                    continue;
                }
            }
        }
        if i < explicit_in_count {
            explicit_ins += 1;
        } else if i < explicit_in_count + b.ins_implicit as usize {
            implicit_ins += 1;
        } else {
            order_only_ins += 1;
        }
        inputs.push(node);
    }

    let validations = br
        .read_vec_of_eval_strings(b.validations_ref)
        .iter()
        .map(|eval| {
            let path = canonicalize_path(&eval.evaluate(&[edge_scope.as_ref()]));
            state.get_node(&path)
        })
        .collect();

    let pool_name = edge_scope.lookup_with_fallback("pool", rule.get_binding("pool"), edge_scope.as_ref());
    let pool = if pool_name.is_empty() {
        None
    } else {
        if state.lookup_pool(&pool_name).is_none() {
            return Err(format!(
                "unknown pool '{}' (at byte {})",
                pool_name, b.final_position
            ));
        }
        Some(pool_name)
    };

    let dyndep_str =
        edge_scope.lookup_with_fallback("dyndep", rule.get_binding("dyndep"), edge_scope.as_ref());
    let dyndep = if dyndep_str.is_empty() {
        None
    } else {
        let path = canonicalize_path(&dyndep_str);
        let node = state.get_node(&path);
        if !inputs.contains(&node) {
            return Err(format!(
                "dyndep '{}' is not listed among this edge's inputs (at byte {})",
                path, b.final_position
            ));
        }
        Some(node)
    };

    state.add_build(
        rule,
        edge_scope,
        surviving_outputs,
        explicit_surviving,
        inputs,
        explicit_ins,
        implicit_ins,
        order_only_ins,
        validations,
        pool,
        dyndep,
    );
    Ok(())
}

fn interpret_include(
    br: &mut BinaryReader,
    state: &mut State,
    scope: &Rc<Scope>,
    options: &ManifestParserOptions,
    reader: &dyn FileReader,
) -> Result<(), String> {
    let inc = br.read_include();
    let path = br
        .read_eval_string(inc.path_ref)
        .evaluate(&[scope.as_ref()]);
    let nested_scope = if inc.new_scope {
        Scope::child(scope.clone())
    } else {
        scope.clone()
    };
    crate::manifest::parse_file(reader, &path, nested_scope, state, options)
        .map_err(|e| format!("while including '{}': {}", path, e))
}
