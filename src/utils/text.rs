// src/utils/text.rs

use once_cell::sync::Lazy;
use regex::Regex;

static ATTACHMENT_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^see attached file(s)?\.?$|^please see attached?\.?$|^see attached?\.?|^see attached file\(s\)\.?$",
    )
    .expect("attachment pattern is valid")
});
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*br\s*/>").expect("line break pattern is valid"));
static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9. -]").expect("character pattern is valid"));
static NDASH_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w*ndash\w*").expect("ndash pattern is valid"));

/// True when the comment body only points at an attachment ("See attached file(s).").
/// Such comments carry no text to cluster and are dropped at intake.
pub fn is_attachment_placeholder(text: &str) -> bool {
    ATTACHMENT_ONLY.is_match(text.trim())
}

/// Normalizes comment text before sentence splitting.
pub fn clean_comment(text: &str) -> String {
    let text = LINE_BREAK.replace_all(text, " ");
    let text = DISALLOWED_CHARS.replace_all(&text, "");
    NDASH_TOKEN.replace_all(&text, "").into_owned()
}

/// Splits text into sentences on periods followed by whitespace. Periods
/// inside tokens ("e.g", "3.5") become spaces; every sentence ends in '.'.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut normalized = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '.' && !chars.peek().map_or(false, |next| next.is_whitespace()) {
            normalized.push(' ');
        } else {
            normalized.push(c);
        }
    }

    normalized
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}.", s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_placeholders() {
        assert!(is_attachment_placeholder("See attached file(s)"));
        assert!(is_attachment_placeholder("see attached files."));
        assert!(is_attachment_placeholder("Please see attached."));
        assert!(is_attachment_placeholder("  See Attached  "));
        assert!(!is_attachment_placeholder(
            "I oppose this rule. Please see attached for details on my farm."
        ));
        assert!(!is_attachment_placeholder("The attached study shows harm."));
    }

    #[test]
    fn test_clean_comment() {
        assert_eq!(clean_comment("Stop<br/>this rule!"), "Stop this rule");
        assert_eq!(clean_comment("costs &ndash; rise"), "costs  rise");
        assert_eq!(clean_comment("Cut 3.5% now."), "Cut 3.5 now.");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("The rule is bad. It costs jobs. "),
            vec!["The rule is bad.".to_string(), "It costs jobs.".to_string()]
        );
        assert_eq!(
            split_sentences("See section 3.5 now. Thanks."),
            vec!["See section 3 5 now.".to_string(), "Thanks.".to_string()]
        );
        assert!(split_sentences("   ").is_empty());
    }
}
