//! Structural merge implementations for `merge` restores.
//!
//! JSON: deep merge with source precedence. INI: section-keyed union that
//! rewrites the target line-by-line so its comments and layout survive.

use std::collections::BTreeSet;

use outfitter_schema::ArrayStrategy;
use serde_json::Value;

/// Deep-merge `source` into `target` with source precedence.
///
/// Scalars from the source override; object keys union (target's key order
/// first, new source keys appended); arrays combine per `strategy`.
pub fn deep_merge_json(target: &Value, source: &Value, strategy: ArrayStrategy) -> Value {
    match (target, source) {
        (Value::Object(tgt), Value::Object(src)) => {
            let mut out = serde_json::Map::new();
            for (key, tgt_val) in tgt {
                match src.get(key) {
                    Some(src_val) => {
                        out.insert(key.clone(), deep_merge_json(tgt_val, src_val, strategy));
                    }
                    None => {
                        out.insert(key.clone(), tgt_val.clone());
                    }
                }
            }
            for (key, src_val) in src {
                if !out.contains_key(key) {
                    out.insert(key.clone(), src_val.clone());
                }
            }
            Value::Object(out)
        }
        (Value::Array(tgt), Value::Array(src)) => match strategy {
            ArrayStrategy::Replace => Value::Array(src.clone()),
            // target-first, source appended
            ArrayStrategy::Concat => {
                let mut combined = tgt.clone();
                combined.extend(src.iter().cloned());
                Value::Array(combined)
            }
        },
        // scalar (or mismatched-shape) source wins
        (_, src) => src.clone(),
    }
}

/// A parsed INI document: section name → key → value. The anonymous leading
/// section is keyed `""`.
pub type IniSections = serde_json::Map<String, Value>;

/// Parse INI text into section-keyed mappings (values as JSON strings)
pub fn parse_ini(text: &str) -> IniSections {
    let mut sections = IniSections::new();
    let mut current = String::new();
    sections.insert(current.clone(), Value::Object(serde_json::Map::new()));

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }
        if let Some(name) = section_header(trimmed) {
            current = name.to_owned();
            sections
                .entry(current.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            continue;
        }
        if let Some((key, value)) = split_kv(trimmed) {
            if let Some(Value::Object(section)) = sections.get_mut(&current) {
                section.insert(key.to_owned(), Value::String(value.to_owned()));
            }
        }
    }
    sections
}

/// Merge INI `source` into INI `target`, preserving the target's comments
/// and line layout.
///
/// Keys present in both get the source's value in place; source keys the
/// target lacks are appended at the end of their section; sections the
/// target lacks are appended at the end of the file.
pub fn merge_ini_text(target_text: &str, source_text: &str) -> String {
    let source = parse_ini(source_text);
    let mut consumed: BTreeSet<(String, String)> = BTreeSet::new();
    let mut out_lines: Vec<String> = vec![];
    let mut current = String::new();

    for line in target_text.lines() {
        let trimmed = line.trim();

        if let Some(name) = section_header(trimmed) {
            // leaving the previous section: flush its unconsumed source keys
            flush_section(&mut out_lines, &source, &current, &mut consumed);
            current = name.to_owned();
            out_lines.push(line.to_owned());
            continue;
        }

        if !trimmed.is_empty() && !trimmed.starts_with(';') && !trimmed.starts_with('#') {
            if let Some((key, _)) = split_kv(trimmed) {
                if let Some(value) = source_value(&source, &current, key) {
                    consumed.insert((current.clone(), key.to_owned()));
                    // keep the key's spelling, replace the value
                    out_lines.push(format!("{key}={value}"));
                    continue;
                }
            }
        }
        out_lines.push(line.to_owned());
    }

    // unconsumed keys of the final (or only) section
    flush_section(&mut out_lines, &source, &current, &mut consumed);

    // whole sections the target never declared, in source order
    for (name, value) in &source {
        let Some(section) = value.as_object() else {
            continue;
        };
        let pending: Vec<(&String, &Value)> = section
            .iter()
            .filter(|(k, _)| !consumed.contains(&(name.clone(), (*k).clone())))
            .collect();
        if pending.is_empty() {
            continue;
        }
        if !name.is_empty() {
            if !out_lines.last().map(|l| l.trim().is_empty()).unwrap_or(true) {
                out_lines.push(String::new());
            }
            out_lines.push(format!("[{name}]"));
        }
        for (key, value) in pending {
            out_lines.push(format!("{key}={}", value.as_str().unwrap_or_default()));
        }
    }

    let mut out = out_lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Append `section`'s unconsumed source keys before any trailing blank
/// lines, so they sit inside the section body
fn flush_section(
    out_lines: &mut Vec<String>,
    source: &IniSections,
    section: &str,
    consumed: &mut BTreeSet<(String, String)>,
) {
    let Some(Value::Object(keys)) = source.get(section) else {
        return;
    };
    let mut insert_at = out_lines.len();
    while insert_at > 0 && out_lines[insert_at - 1].trim().is_empty() {
        insert_at -= 1;
    }
    let mut offset = 0;
    for (key, value) in keys {
        if !consumed.insert((section.to_owned(), key.clone())) {
            continue;
        }
        let line = format!("{key}={}", value.as_str().unwrap_or_default());
        out_lines.insert(insert_at + offset, line);
        offset += 1;
    }
}

fn source_value<'a>(source: &'a IniSections, section: &str, key: &str) -> Option<&'a str> {
    source
        .get(section)
        .and_then(|v| v.as_object())
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
}

fn section_header(trimmed: &str) -> Option<&str> {
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|name| name.trim())
}

fn split_kv(trimmed: &str) -> Option<(&str, &str)> {
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}
