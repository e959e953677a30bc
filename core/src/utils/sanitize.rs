/// Sanitization of backend-supplied strings before they reach consumers
///
/// Raw backend strings are never surfaced directly: display names are
/// restricted to a safe character set and preview text is stripped of
/// control characters and truncated.

const PREVIEW_MAX_CHARS: usize = 120;

/// Restrict a display name to ASCII alphanumerics, whitespace, '-' and '_'.
/// An empty result falls back to "Contact".
pub fn sanitize_display_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "Contact".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Strip control characters, collapse newlines into spaces, and truncate to
/// preview length.
pub fn sanitize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(PREVIEW_MAX_CHARS + 4));
    let mut chars = 0usize;
    for c in raw.chars() {
        if chars >= PREVIEW_MAX_CHARS {
            out.push('…');
            break;
        }
        if c == '\n' || c == '\r' || c == '\t' {
            if !out.ends_with(' ') {
                out.push(' ');
                chars += 1;
            }
        } else if !c.is_control() {
            out.push(c);
            chars += 1;
        }
    }
    out.trim().to_string()
}
