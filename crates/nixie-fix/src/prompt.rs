//! Prompt assembly for the syntax-fix completion call.

/// System prompt for the fix call. The model is told to answer with a fenced
/// mermaid block so the response can be parsed without a structured schema.
pub(crate) const SYSTEM_PROMPT: &str = "\
You are a Mermaid diagram syntax expert. Your task is to fix syntax errors in Mermaid diagram code.

Rules:
1. Only fix syntax errors, don't change the diagram's structure or meaning
2. Preserve all node labels and connections
3. Return only the corrected Mermaid code in a mermaid code block
4. If you cannot fix the error, explain why

Common Mermaid syntax issues:
- Missing or incorrect arrow syntax (-->, ---, -.->)
- Unbalanced brackets or quotes
- Invalid node IDs (must start with letter, no spaces)
- Missing subgraph end statements
- Incorrect flowchart direction (TB, BT, LR, RL)
- Missing semicolons or line breaks between statements";

/// Wrap sanitized code and error in structural delimiters. Sanitization has
/// already neutralized anything that could close these tags early.
pub(crate) fn user_message(code: &str, error_message: &str) -> String {
    format!(
        "<mermaid_code>\n{code}\n</mermaid_code>\n\n\
         <error_message>\n{error_message}\n</error_message>\n\n\
         Fix the syntax error in the Mermaid code above."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_wraps_both_inputs() {
        let msg = user_message("graph TD", "Parse error on line 1");
        assert!(msg.starts_with("<mermaid_code>\ngraph TD\n</mermaid_code>"));
        assert!(msg.contains("<error_message>\nParse error on line 1\n</error_message>"));
        assert!(msg.ends_with("Fix the syntax error in the Mermaid code above."));
    }
}
