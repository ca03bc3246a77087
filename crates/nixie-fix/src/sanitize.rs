//! Input hygiene for text forwarded to the completion service.
//!
//! User-supplied diagram source and parse errors are embedded inside the
//! prompt's structural delimiters, so anything that could break out of them
//! (literal fences, control characters) is neutralized before the call.

/// Recognized diagram-type headers. A fix request must open with one of
/// these on some line, which keeps the completion service from being used as
/// a general-purpose free-text oracle.
const DIAGRAM_HEADERS: &[&str] = &[
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "gantt",
    "pie",
    "mindmap",
    "timeline",
    "gitGraph",
    "journey",
    "quadrantChart",
    "requirementDiagram",
    "C4Context",
];

const FLOW_DIRECTIONS: &[&str] = &["TB", "BT", "LR", "RL", "TD"];

/// Strip NULs and control characters, break literal code fences, collapse
/// runs of 4+ newlines down to 3, and trim.
pub fn sanitize_input(input: &str) -> String {
    let cleaned: String = input
        .replace('\0', "")
        .replace("```", "` ` `")
        .chars()
        .filter(|&c| !is_stripped_control(c))
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    let mut newline_run = 0usize;
    for c in cleaned.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run > 3 {
                continue;
            }
        } else {
            newline_run = 0;
        }
        out.push(c);
    }
    out.trim().to_string()
}

// Tab, newline, and carriage return survive; everything else below 0x20
// plus DEL goes.
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}' | '\u{7f}')
}

/// Whether the text opens a recognized diagram type on any line
/// (case-insensitive, keyword-prefix semantics).
pub fn looks_like_diagram(code: &str) -> bool {
    code.trim().lines().any(line_opens_diagram)
}

fn line_opens_diagram(line: &str) -> bool {
    for kw in ["graph", "flowchart"] {
        if let Some(rest) = strip_prefix_ci(line, kw) {
            // Flowcharts additionally need a direction token.
            if rest.starts_with(|c: char| c.is_whitespace()) {
                let direction = rest.trim_start();
                if FLOW_DIRECTIONS.iter().any(|d| starts_with_ci(direction, d)) {
                    return true;
                }
            }
        }
    }
    DIAGRAM_HEADERS.iter().any(|h| starts_with_ci(line, h))
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    starts_with_ci(s, prefix).then(|| &s[prefix.len()..])
}

/// 32-bit rolling hash over UTF-16 units, hex-encoded. Matches the hash the
/// hosted frontend stores in transaction metadata, so audit rows stay
/// comparable across both stacks.
pub fn error_hash(input: &str) -> String {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    if hash < 0 {
        format!("-{:x}", -(i64::from(hash)))
    } else {
        format!("{:x}", hash)
    }
}
