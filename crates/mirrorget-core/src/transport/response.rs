//! Status line and Content-Range parsing for segment responses.

/// Status code of the last `HTTP/` line (the final response after redirects).
pub(crate) fn parse_http_status(lines: &[String]) -> Option<u32> {
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("HTTP/"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
}

/// `Content-Range: bytes start-end/total` as `(start, end, total)`; total is
/// `None` for `*`.
pub(crate) fn parse_content_range(lines: &[String]) -> Option<(u64, u64, Option<u64>)> {
    let value = lines.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-range")
            .then(|| value.trim())
    })?;
    let spec = value.strip_prefix("bytes")?.trim_start();
    let (range, total) = spec.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, end, total))
}
