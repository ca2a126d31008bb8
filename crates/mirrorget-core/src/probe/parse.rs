//! Parse HTTP response header lines into RemoteFileInfo.

use super::RemoteFileInfo;

/// Parse collected header lines into RemoteFileInfo.
pub(crate) fn parse_headers(lines: &[String]) -> RemoteFileInfo {
    let mut info = RemoteFileInfo::unreachable();

    for line in lines {
        let Some((name, value)) = line.trim().split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            info.size = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            info.supports_partial_download = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("content-md5") {
            info.content_hash = value.as_bytes().to_vec();
        }
    }

    info
}
