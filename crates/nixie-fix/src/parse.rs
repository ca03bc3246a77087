//! Parse the completion service's free-text response.
//!
//! Nothing structured is guaranteed: the contract is "plain text that may
//! contain a fenced mermaid block". The first such block is the fix; the
//! prose around it becomes the explanation.

use nixie_core::EXPLANATION_MAX_LEN;

const FENCE_OPEN: &str = "```mermaid";
const FENCE_CLOSE: &str = "```";

/// Extract the first fenced mermaid block, trimmed. `None` when the model
/// answered without one.
pub(crate) fn extract_fixed_code(text: &str) -> Option<String> {
    let start = text.find(FENCE_OPEN)? + FENCE_OPEN.len();
    let body = text[start..].strip_prefix('\n')?;
    let end = body.find("\n```")?;
    let code = body[..end].trim();
    (!code.is_empty()).then(|| code.to_string())
}

/// Everything outside the first fenced block, trimmed and capped. Falls back
/// to a stock sentence when the model offered no prose.
pub(crate) fn extract_explanation(text: &str) -> String {
    let without_block = match text.find(FENCE_OPEN) {
        Some(open) => {
            let tail_start = open + FENCE_OPEN.len();
            match text[tail_start..].find(FENCE_CLOSE) {
                Some(close) => {
                    let after = tail_start + close + FENCE_CLOSE.len();
                    format!("{}{}", &text[..open], &text[after..])
                }
                None => text.to_string(),
            }
        }
        None => text.to_string(),
    };

    let explanation: String = without_block
        .trim()
        .chars()
        .take(EXPLANATION_MAX_LEN)
        .collect();
    if explanation.is_empty() {
        "Syntax has been corrected.".to_string()
    } else {
        explanation
    }
}
