//! Transform operation registry
//!
//! Transforms receive opaque bytes plus a JSON options object and return a
//! JSON value. The built-in set uses language-agnostic heuristics (regular
//! expressions and line diffs); language-specific parsing is deliberately
//! replaceable by registering a different executor under the same name.

use agrama_core::{AgramaError, AgramaResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value as Json};
use similar::{ChangeTag, TextDiff};
use xxhash_rust::xxh3::xxh3_64;

/// A transform executor
pub type TransformFn = fn(&[u8], &Json) -> AgramaResult<Json>;

/// Registry of named transform operations
pub struct TransformRegistry {
    ops: FxHashMap<&'static str, TransformFn>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TransformRegistry {
    /// The built-in operation set
    pub fn builtin() -> Self {
        let mut ops: FxHashMap<&'static str, TransformFn> = FxHashMap::default();
        ops.insert("parse_functions", parse_functions);
        ops.insert("extract_imports", extract_imports);
        ops.insert("generate_embedding", generate_embedding);
        ops.insert("compress_text", compress_text);
        ops.insert("diff_content", diff_content);
        ops.insert("merge_content", merge_content);
        ops.insert("analyze_complexity", analyze_complexity);
        ops.insert("extract_dependencies", extract_dependencies);
        ops.insert("summarize_content", summarize_content);
        ops.insert("validate_syntax", validate_syntax);
        TransformRegistry { ops }
    }

    /// Run an operation
    pub fn apply(&self, operation: &str, data: &[u8], options: &Json) -> AgramaResult<Json> {
        let f = self
            .ops
            .get(operation)
            .ok_or_else(|| AgramaError::UnknownTransform {
                name: operation.to_string(),
            })?;
        f(data, options)
    }

    /// Registered operation names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.ops.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Whether an operation exists
    pub fn contains(&self, operation: &str) -> bool {
        self.ops.contains_key(operation)
    }
}

fn text_of(data: &[u8]) -> AgramaResult<&str> {
    std::str::from_utf8(data)
        .map_err(|_| AgramaError::validation("data", "operation requires UTF-8 input"))
}

// ============================================================================
// Code heuristics
// ============================================================================

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(?:pub\s+)?(?:async\s+)?(?:fn|def|function|func)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("function regex")
});

static ARROW_FN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s*)?\(")
        .expect("arrow function regex")
});

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^\s*(?:use\s+([A-Za-z0-9_:]+)|import\s+([A-Za-z0-9_./@-]+)|from\s+([A-Za-z0-9_.]+)\s+import|#include\s*[<"]([^>"]+)[>"]|require\(['"]([^'"]+)['"]\))"#,
    )
    .expect("import regex")
});

/// Function definitions with their 1-based line numbers
fn parse_functions(data: &[u8], _options: &Json) -> AgramaResult<Json> {
    let text = text_of(data)?;
    let mut functions = Vec::new();
    for re in [&*FUNCTION_RE, &*ARROW_FN_RE] {
        for cap in re.captures_iter(text) {
            let Some(m) = cap.get(1) else { continue };
            let line = text[..m.start()].lines().count();
            functions.push(json!({
                "name": m.as_str(),
                "line": line,
            }));
        }
    }
    functions.sort_by(|a, b| {
        a["line"]
            .as_u64()
            .cmp(&b["line"].as_u64())
            .then_with(|| a["name"].as_str().cmp(&b["name"].as_str()))
    });
    Ok(json!({ "functions": functions, "count": functions.len() }))
}

/// Import statements as written
fn extract_imports(data: &[u8], _options: &Json) -> AgramaResult<Json> {
    let text = text_of(data)?;
    let mut imports = Vec::new();
    for cap in IMPORT_RE.captures_iter(text) {
        for group in 1..=5 {
            if let Some(m) = cap.get(group) {
                imports.push(m.as_str().to_string());
                break;
            }
        }
    }
    Ok(json!({ "imports": imports, "count": imports.len() }))
}

/// Deduplicated top-level dependency names
fn extract_dependencies(data: &[u8], options: &Json) -> AgramaResult<Json> {
    let imports = extract_imports(data, options)?;
    let mut deps: Vec<String> = imports["imports"]
        .as_array()
        .map(|a| a.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| {
            s.split(['/', ':', '.'])
                .next()
                .unwrap_or(s)
                .to_string()
        })
        .collect();
    deps.sort();
    deps.dedup();
    Ok(json!({ "dependencies": deps, "count": deps.len() }))
}

// ============================================================================
// Embeddings
// ============================================================================

/// Deterministic feature-hashed embedding over code tokens.
///
/// Tokens are hashed into `dimension` buckets with a signed contribution,
/// then the vector is L2 normalized. Identical input always produces the
/// identical vector, which keeps semantic search self-contained.
fn generate_embedding(data: &[u8], options: &Json) -> AgramaResult<Json> {
    let dimension = options
        .get("dimension")
        .and_then(Json::as_u64)
        .unwrap_or(256) as usize;
    if !agrama_core::is_supported_dimension(dimension) {
        return Err(AgramaError::validation(
            "dimension",
            format!("unsupported embedding dimension {}", dimension),
        ));
    }

    let text = String::from_utf8_lossy(data);
    let mut vector = vec![0.0f32; dimension];
    for token in agrama_search::tokenizer::tokenize(&text) {
        let hash = xxh3_64(token.as_bytes());
        let bucket = (hash % dimension as u64) as usize;
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    Ok(json!({ "dimension": dimension, "embedding": vector }))
}

// ============================================================================
// Text operations
// ============================================================================

/// Collapse runs of blank lines and trailing whitespace
fn compress_text(data: &[u8], options: &Json) -> AgramaResult<Json> {
    let text = text_of(data)?;
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }
    if let Some(max) = options.get("max_bytes").and_then(Json::as_u64) {
        let max = max as usize;
        if out.len() > max {
            let mut cut = max;
            while cut > 0 && !out.is_char_boundary(cut) {
                cut -= 1;
            }
            out.truncate(cut);
        }
    }
    Ok(json!({
        "text": out,
        "original_bytes": data.len(),
        "compressed_bytes": out.len(),
    }))
}

/// Unified diff of `options.base` against the input
fn diff_content(data: &[u8], options: &Json) -> AgramaResult<Json> {
    let new_text = text_of(data)?;
    let base = options
        .get("base")
        .and_then(Json::as_str)
        .ok_or_else(|| AgramaError::validation("base", "diff_content requires options.base"))?;

    let diff = TextDiff::from_lines(base, new_text);
    let unified = diff.unified_diff().context_radius(3).to_string();
    let (mut added, mut removed) = (0usize, 0usize);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    Ok(json!({ "diff": unified, "added": added, "removed": removed }))
}

/// Line-level three-way merge: both sides' changes against the base input
fn merge_content(data: &[u8], options: &Json) -> AgramaResult<Json> {
    let base = text_of(data)?;
    let ours = options
        .get("ours")
        .and_then(Json::as_str)
        .ok_or_else(|| AgramaError::validation("ours", "merge_content requires options.ours"))?;
    let theirs = options
        .get("theirs")
        .and_then(Json::as_str)
        .ok_or_else(|| {
            AgramaError::validation("theirs", "merge_content requires options.theirs")
        })?;

    // Start from "ours" and fold in lines "theirs" added relative to base.
    // Overlapping removals are honored; conflicting rewrites keep ours.
    let mut merged: Vec<&str> = ours.lines().collect();
    let theirs_diff = TextDiff::from_lines(base, theirs);
    let mut clean = true;
    for change in theirs_diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => {
                let line = change.value().trim_end_matches('\n');
                if !merged.contains(&line) {
                    merged.push(line);
                }
            }
            ChangeTag::Delete => {
                let line = change.value().trim_end_matches('\n');
                if merged.contains(&line) {
                    merged.retain(|l| *l != line);
                } else {
                    // Ours already rewrote this line; flag the overlap
                    clean = false;
                }
            }
            ChangeTag::Equal => {}
        }
    }
    let mut text = merged.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(json!({ "merged": text, "clean": clean }))
}

/// Line, token, and branch counts with a cyclomatic estimate
fn analyze_complexity(data: &[u8], _options: &Json) -> AgramaResult<Json> {
    let text = text_of(data)?;
    let lines = text.lines().count();
    let tokens = agrama_search::tokenizer::tokenize(text).len();
    let branch_words = [
        "if", "else", "for", "while", "match", "case", "switch", "catch", "loop",
    ];
    let branches = agrama_search::tokenizer::tokenize(text)
        .iter()
        .filter(|t| branch_words.contains(&t.as_str()))
        .count();
    Ok(json!({
        "lines": lines,
        "tokens": tokens,
        "branches": branches,
        "cyclomatic_estimate": branches + 1,
    }))
}

/// First meaningful line plus dominant identifiers
fn summarize_content(data: &[u8], options: &Json) -> AgramaResult<Json> {
    let text = text_of(data)?;
    let max_len = options
        .get("max_length")
        .and_then(Json::as_u64)
        .unwrap_or(120) as usize;

    let headline = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    let headline: String = headline.chars().take(max_len).collect();

    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for token in agrama_search::tokenizer::tokenize(text) {
        if token.len() >= 4 {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    let mut top: Vec<(String, usize)> = counts.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let keywords: Vec<String> = top.into_iter().take(5).map(|(t, _)| t).collect();

    Ok(json!({
        "summary": headline,
        "keywords": keywords,
        "lines": text.lines().count(),
        "bytes": data.len(),
    }))
}

/// Bracket and quote balance check
fn validate_syntax(data: &[u8], _options: &Json) -> AgramaResult<Json> {
    let text = text_of(data)?;
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut error: Option<String> = None;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => stack.push((c, i)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, at)) => {
                        error = Some(format!(
                            "mismatched '{}' at byte {} (opened '{}' at byte {})",
                            c, i, open, at
                        ));
                        break;
                    }
                    None => {
                        error = Some(format!("unmatched '{}' at byte {}", c, i));
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    if error.is_none() {
        if let Some((open, at)) = stack.first() {
            error = Some(format!("unclosed '{}' at byte {}", open, at));
        }
    }
    Ok(json!({ "valid": error.is_none(), "error": error }))
}
