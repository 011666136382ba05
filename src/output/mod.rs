//! Output shaping shared by the query engine's `full`/`compact` result
//! views: signature/doc truncation (`config.output.truncate_*`) and the
//! overall response token budget (`config.output.max_tokens`), per §9/§10.

pub mod token_budget;

pub use token_budget::TokenBudget;

/// Find the largest byte index <= max_bytes that is a valid char boundary.
pub fn floor_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut i = max_bytes;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Collapses a multi-line declarator head to single-spaced text and
/// truncates it to `max_sig_len`, breaking on a natural boundary
/// (`,`/`)`/`>`) when possible rather than mid-token.
pub fn normalize_signature(sig: &str, max_sig_len: usize) -> String {
    let mut result = String::with_capacity(sig.len());
    let mut pending_space = false;

    for c in sig.chars() {
        if c.is_whitespace() {
            if !result.is_empty() {
                pending_space = true;
            }
            continue;
        }

        if pending_space {
            pending_space = false;
            if let Some(last) = result.chars().last() {
                let drop_after = matches!(last, '(' | '[' | '{' | '<' | ':' | ',');
                let drop_before = matches!(c, ')' | ']' | '}' | '>' | ':' | ',');
                if !drop_after && !drop_before {
                    result.push(' ');
                }
            }
        }
        result.push(c);
    }

    if result.len() > max_sig_len {
        let boundary = floor_char_boundary(&result, max_sig_len);
        let truncated = &result[..boundary];
        if let Some(pos) = truncated.rfind([',', ')', '>']) {
            return format!("{}...", &truncated[..=pos]);
        }
        return format!("{truncated}...");
    }

    result
}

/// Truncates a doc-comment block to its first sentence or line when that
/// fits within `max_doc_brief_len`, otherwise truncates at a word boundary.
pub fn truncate_doc(doc: &str, max_doc_brief_len: usize) -> String {
    let trimmed = doc.trim();

    if let Some(dot_pos) = trimmed.find(". ") {
        let first_sentence = &trimmed[..=dot_pos];
        if first_sentence.len() <= max_doc_brief_len {
            return first_sentence.to_string();
        }
    }

    if let Some(nl_pos) = trimmed.find('\n') {
        let first_line = trimmed[..nl_pos].trim();
        if first_line.len() <= max_doc_brief_len {
            return first_line.to_string();
        }
    }

    if trimmed.len() <= max_doc_brief_len {
        return trimmed.to_string();
    }

    let boundary = floor_char_boundary(trimmed, max_doc_brief_len);
    let truncated = &trimmed[..boundary];
    if let Some(space_pos) = truncated.rfind(' ') {
        return format!("{}...", &truncated[..space_pos]);
    }

    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MAX_SIG: usize = 120;
    const TEST_MAX_DOC: usize = 100;

    #[test]
    fn test_normalize_signature_strips_whitespace() {
        let sig = "(a: number, b: number): number";
        let result = normalize_signature(sig, TEST_MAX_SIG);
        assert_eq!(result, "(a:number,b:number):number");
    }

    #[test]
    fn test_normalize_signature_preserves_ident_spaces() {
        let sig = "fn add(a int, b int) int";
        let result = normalize_signature(sig, TEST_MAX_SIG);
        assert_eq!(result, "fn add(a int,b int) int");
    }

    #[test]
    fn test_normalize_signature_truncates() {
        let sig = "a".repeat(200);
        let result = normalize_signature(&sig, TEST_MAX_SIG);
        assert!(result.len() <= TEST_MAX_SIG + 3);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_normalize_signature_utf8_boundary() {
        // Emoji is 4 bytes — verify truncation doesn't panic
        let sig = "fn f(".to_string() + &"\u{1F600}".repeat(50) + ")";
        let result = normalize_signature(&sig, 20);
        assert!(result.ends_with("..."));
        assert!(result.is_char_boundary(result.len()));
    }

    #[test]
    fn test_truncate_doc_first_sentence() {
        let doc = "Adds two numbers. Returns the sum.";
        assert_eq!(truncate_doc(doc, TEST_MAX_DOC), "Adds two numbers.");
    }

    #[test]
    fn test_truncate_doc_short() {
        let doc = "Simple doc";
        assert_eq!(truncate_doc(doc, TEST_MAX_DOC), "Simple doc");
    }

    #[test]
    fn test_truncate_doc_long() {
        let doc = "a ".repeat(100);
        let result = truncate_doc(&doc, TEST_MAX_DOC);
        assert!(result.len() <= TEST_MAX_DOC + 3);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_doc_utf8_boundary() {
        // CJK chars are 3 bytes each
        let doc = "\u{4e16}\u{754c}".repeat(50); // "世界" repeated
        let result = truncate_doc(&doc, 20);
        assert!(result.ends_with("..."));
        let _ = result.chars().count();
    }

    #[test]
    fn test_floor_char_boundary() {
        let s = "hello\u{1F600}world"; // emoji at byte 5, 4 bytes
        assert_eq!(floor_char_boundary(s, 5), 5);
        assert_eq!(floor_char_boundary(s, 6), 5);
        assert_eq!(floor_char_boundary(s, 7), 5);
        assert_eq!(floor_char_boundary(s, 8), 5);
        assert_eq!(floor_char_boundary(s, 9), 9);
        assert_eq!(floor_char_boundary(s, 100), s.len());
    }
}
