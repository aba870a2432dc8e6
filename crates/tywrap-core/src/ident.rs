//! Identifier policy for generated TypeScript.
//!
//! Python names pass through a deterministic pipeline: NFD normalization
//! with combining marks stripped, a small ASCII fallback map, hex-codepoint
//! fallback for everything else non-ASCII, a leading-digit guard,
//! snake_case-to-camelCase conversion (skippable for structural property
//! names and wire paths), and reserved-word escaping. Every output matches
//! `^[A-Za-z_$][A-Za-z0-9_$]*$`.

use std::fmt::Write as _;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Target-language reserved words that must not be emitted bare.
const RESERVED: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
    "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
    "null", "package", "private", "protected", "public", "return", "static", "super", "switch",
    "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.binary_search(&name).is_ok()
}

/// Maps characters NFD cannot reduce to ASCII.
fn ascii_fallback(ch: char) -> Option<&'static str> {
    match ch {
        'ñ' => Some("n"),
        'ü' => Some("u"),
        'ß' => Some("ss"),
        'æ' => Some("ae"),
        'œ' => Some("oe"),
        'ø' => Some("o"),
        '€' => Some("euro"),
        _ => None,
    }
}

/// Options for [`sanitize_identifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentOptions {
    /// Keep the original casing (structural property names and qualified
    /// call paths); otherwise snake_case converts to camelCase.
    pub preserve_case: bool,
}

/// Produces a valid, non-reserved TS identifier from an arbitrary Python
/// name. Deterministic and total; empty input yields `_`.
pub fn sanitize_identifier(input: &str, options: IdentOptions) -> String {
    let mut cleaned = String::with_capacity(input.len());
    for ch in input.nfd().filter(|c| !is_combining_mark(*c)) {
        if let Some(mapped) = ascii_fallback(ch) {
            cleaned.push_str(mapped);
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            cleaned.push(ch);
        } else if ch.is_ascii() {
            cleaned.push('_');
        } else {
            // Remaining non-ASCII becomes its hex codepoint.
            let _ = write!(cleaned, "{:x}", ch as u32);
        }
    }

    if cleaned.is_empty() {
        return "_".to_string();
    }

    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned.insert(0, '_');
    }

    let name = if options.preserve_case {
        cleaned
    } else {
        snake_to_camel(&cleaned)
    };

    if is_reserved(&name) {
        format!("_{name}_")
    } else {
        name
    }
}

/// `snake_case` to `camelCase`. Leading underscores are preserved; interior
/// underscores are consumed and capitalize the following character.
fn snake_to_camel(input: &str) -> String {
    let leading = input.chars().take_while(|c| *c == '_').count();
    let body = &input[leading..];

    let mut out: String = input[..leading].to_string();
    let mut upper_next = false;
    for ch in body.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    if out.is_empty() {
        input.to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camel(input: &str) -> String {
        sanitize_identifier(input, IdentOptions::default())
    }

    fn preserved(input: &str) -> String {
        sanitize_identifier(input, IdentOptions { preserve_case: true })
    }

    #[test]
    fn test_snake_to_camel_basic() {
        assert_eq!(camel("calculate_sum"), "calculateSum");
        assert_eq!(camel("create_request"), "createRequest");
        assert_eq!(camel("x"), "x");
    }

    #[test]
    fn test_preserve_case_keeps_snake() {
        assert_eq!(preserved("is_active"), "is_active");
        assert_eq!(preserved("UserProfile"), "UserProfile");
    }

    #[test]
    fn test_reserved_words_are_escaped() {
        assert_eq!(camel("default"), "_default_");
        assert_eq!(camel("delete"), "_delete_");
        assert_eq!(camel("new"), "_new_");
        assert_eq!(camel("class"), "_class_");
        assert_eq!(preserved("await"), "_await_");
    }

    #[test]
    fn test_leading_digit_gets_guard() {
        assert_eq!(camel("2fast"), "_2fast");
    }

    #[test]
    fn test_diacritics_strip_via_nfd() {
        assert_eq!(camel("café"), "cafe");
        assert_eq!(camel("señal"), "senal");
        assert_eq!(camel("über"), "uber");
    }

    #[test]
    fn test_ascii_fallback_map() {
        assert_eq!(camel("straße"), "strasse");
        assert_eq!(camel("æther"), "aether");
        assert_eq!(camel("høst"), "host");
        assert_eq!(camel("cost_€"), "costEuro");
    }

    #[test]
    fn test_non_ascii_becomes_hex_codepoint() {
        // U+4E2D, then the leading-digit guard
        assert_eq!(camel("中"), "_4e2d");
    }

    #[test]
    fn test_ascii_punctuation_becomes_underscore() {
        assert_eq!(camel("a-b c"), "aBC".to_string());
        assert_eq!(preserved("a-b c"), "a_b_c");
    }

    #[test]
    fn test_empty_input_yields_underscore() {
        assert_eq!(camel(""), "_");
    }

    #[test]
    fn test_leading_underscores_preserved() {
        assert_eq!(camel("_private_helper"), "_privateHelper");
        assert_eq!(camel("__dunder__"), "__dunder");
    }

    #[test]
    fn test_outputs_are_valid_identifiers() {
        for input in ["", "default", "2x", "café", "straße", "a-b", "中文名", "_x_y"] {
            for preserve_case in [false, true] {
                let out = sanitize_identifier(input, IdentOptions { preserve_case });
                let mut chars = out.chars();
                let first = chars.next().unwrap();
                assert!(
                    first.is_ascii_alphabetic() || first == '_' || first == '$',
                    "{input:?} -> {out:?}"
                );
                assert!(
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
                    "{input:?} -> {out:?}"
                );
                assert!(!is_reserved(&out), "{input:?} -> {out:?}");
            }
        }
    }
}
