//! Markdown stripping for speakable text

use std::sync::LazyLock;

use regex::Regex;

/// A rewrite rule: pattern and its replacement
struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid regex"),
        replacement,
    }
}

/// Rules applied in order; block-level constructs before inline ones
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // Code fence markers, content is kept
        rule(r"(?m)^[ \t]*(?:```|~~~)[^\n]*\n?", ""),
        // Images before links so the `!` goes too
        rule(r"!\[([^\]]*)\]\([^)]*\)", "${1}"),
        rule(r"\[([^\]]*)\]\([^)]*\)", "${1}"),
        rule(r"(?m)^[ \t]*#{1,6}[ \t]+", ""),
        rule(r"(?m)^[ \t]*>[ \t]?", ""),
        // Horizontal rules must go before bullets
        rule(r"(?m)^[ \t]*(?:[-*_][ \t]*){3,}$", ""),
        rule(r"(?m)^([ \t]*)[-*+][ \t]+", "${1}"),
        rule(r"\*\*([^*]+)\*\*", "${1}"),
        rule(r"__([^_]+)__", "${1}"),
        rule(r"\*([^*\n]+)\*", "${1}"),
        rule(r"(^|[^\w])_([^_\n]+)_([^\w]|$)", "${1}${2}${3}"),
        rule(r"~~([^~]+)~~", "${1}"),
        rule(r"`([^`\n]*)`", "${1}"),
        // Unpaired markers left when emphasis spans a chunk boundary
        rule(r"\*{2,3}|_{2,3}|~~|`+", ""),
        rule(r"(^|\s)[*_](\w)", "${1}${2}"),
        rule(r"(\w)[*_]($|[\s.,!?;:])", "${1}${2}"),
        rule(r"<[^>\n]+>", ""),
    ]
});

/// Remove markdown formatting, keeping the readable text
#[must_use]
pub fn strip_markdown(text: &str) -> String {
    RULES.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern.replace_all(&acc, rule.replacement).into_owned()
    })
}
