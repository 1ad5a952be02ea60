//! The `append` restore: add source lines to the end of a target file.

use outfitter_schema::NewlineFlavor;

/// Compute the new target content for an append, or `None` when every
/// source line is already present (with `dedupe`) and nothing would change.
pub fn append_lines(
    target_text: Option<&str>,
    source_text: &str,
    dedupe: bool,
    flavor: NewlineFlavor,
) -> Option<String> {
    let source_lines: Vec<&str> = source_text.lines().collect();

    let additions: Vec<&str> = match (dedupe, target_text) {
        (true, Some(target)) => {
            let existing: std::collections::BTreeSet<&str> =
                target.lines().map(str::trim_end).collect();
            source_lines
                .iter()
                .copied()
                .filter(|line| !existing.contains(line.trim_end()))
                .collect()
        }
        _ => source_lines,
    };
    if additions.is_empty() {
        return None;
    }

    let newline = match flavor {
        NewlineFlavor::Lf => "\n",
        NewlineFlavor::Crlf => "\r\n",
        NewlineFlavor::Auto => detect_majority(target_text.unwrap_or(source_text)),
    };

    let mut out = String::new();
    if let Some(target) = target_text {
        out.push_str(target);
        if !target.is_empty() && !target.ends_with('\n') {
            out.push_str(newline);
        }
    }
    for line in additions {
        out.push_str(line);
        out.push_str(newline);
    }
    Some(out)
}

/// The newline flavour most of `text` uses (LF wins a tie or an empty file)
fn detect_majority(text: &str) -> &'static str {
    let crlf = text.matches("\r\n").count();
    let lf = text.matches('\n').count() - crlf;
    if crlf > lf {
        "\r\n"
    } else {
        "\n"
    }
}
