//! Centralized validation and helper functions.

/// Maximum number of characters kept from a failing tool's stderr
pub const MAX_STDERR_CHARS: usize = 500;

/// Maximum length of a label embedded in a scratch file name
pub const MAX_LABEL_LENGTH: usize = 64;

/// Truncate a string to at most `limit` characters, on a char boundary.
///
/// # Examples
///
/// ```
/// use locus_annotator::utils::validation::truncate_chars;
///
/// assert_eq!(truncate_chars("abcdef", 3), "abc");
/// assert_eq!(truncate_chars("ab", 3), "ab");
/// assert_eq!(truncate_chars("ééé", 2), "éé");
/// ```
#[must_use]
pub fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Reduce captured stderr to a single bounded failure reason.
///
/// Whitespace is trimmed, and an empty stream yields `fallback`.
#[must_use]
pub fn stderr_reason(stderr: &[u8], limit: usize, fallback: &str) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        truncate_chars(trimmed, limit).to_string()
    }
}

/// Turn a free-form label (chromosome, job name) into a safe file-name
/// fragment.
///
/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
/// Path separators and `..` can therefore never survive.
#[must_use]
pub fn sanitize_label(label: &str) -> String {
    let sanitized: String = label
        .chars()
        .take(MAX_LABEL_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "job".to_string()
    } else {
        sanitized
    }
}

/// Check that a string looks like an allele (ACGTN, or `*` / `.`)
#[must_use]
pub fn is_valid_allele(s: &str) -> bool {
    !s.is_empty()
        && (s == "*"
            || s == "."
            || s
                .chars()
                .all(|c| matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T' | 'N')))
}
