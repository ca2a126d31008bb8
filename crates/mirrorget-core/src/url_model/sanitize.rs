//! Filesystem-safe filename sanitization.

/// Longest filename accepted by common filesystems (Linux NAME_MAX).
const NAME_MAX: usize = 255;

/// Sanitizes a candidate filename for safe use as a single path component.
///
/// Separators, NUL and control characters become `_`, runs of `_` collapse,
/// and leading/trailing dots, spaces and underscores are trimmed. Spaces inside
/// the name are kept. The result is cut to at most 255 bytes.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let c = if c == '/' || c == '\\' || c.is_control() { '_' } else { c };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
