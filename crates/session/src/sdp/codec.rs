//! Codec preference rewrite for a single media section

use regex::Regex;
use tracing::debug;

/// Separator between SDP media sections
pub const MEDIA_SECTION_DELIMITER: &str = "\r\nm=";

const LINE_DELIMITER: &str = "\r\n";

/// Index of the first payload type in an m-line (`m=<media> <port> <proto> <fmt>...`)
const FIRST_FORMAT_INDEX: usize = 3;

/// Move `codec` to the front of the payload list of the first `media_type` section
///
/// Every other byte of `sdp` is preserved. Returns the input unchanged if
/// there is no such section, the section has no `a=rtpmap` line for the
/// codec, or the m-line does not list the codec's payload type.
///
/// # Example
///
/// ```
/// use peershare_session::sdp::prefer_codec;
///
/// let sdp = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96 98\r\na=rtpmap:96 VP9/90000\r\na=rtpmap:98 VP8/90000\r\n";
/// let rewritten = prefer_codec(sdp, "video", "VP8");
/// assert!(rewritten.contains("m=video 9 UDP/TLS/RTP/SAVPF 98 96\r\n"));
/// ```
pub fn prefer_codec(sdp: &str, media_type: &str, codec: &str) -> String {
    let mut sections: Vec<&str> = sdp.split(MEDIA_SECTION_DELIMITER).collect();

    let media_prefix = format!("{} ", media_type);
    let Some(index) = sections
        .iter()
        .position(|section| section.trim().starts_with(&media_prefix))
    else {
        return sdp.to_string();
    };

    let Some(payload_type) = find_payload_type(sections[index], codec) else {
        debug!("Codec {} not offered in {} section, SDP left unchanged", codec, media_type);
        return sdp.to_string();
    };

    let Some(rewritten) = reorder_section(sections[index], &payload_type) else {
        return sdp.to_string();
    };

    sections[index] = &rewritten;
    sections.join(MEDIA_SECTION_DELIMITER)
}

/// Find the RTP payload type mapped to `codec` by an rtpmap attribute
fn find_payload_type(section: &str, codec: &str) -> Option<String> {
    let pattern = format!(r"a=rtpmap:(\d+) {}/\d+", regex::escape(codec));
    // The pattern is built from an escaped literal, so it always compiles.
    let re = Regex::new(&pattern).ok()?;

    section
        .split(LINE_DELIMITER)
        .find_map(|line| re.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Rewrite the section's m-line so `payload_type` comes first
fn reorder_section(section: &str, payload_type: &str) -> Option<String> {
    let mut lines: Vec<String> = section.split(LINE_DELIMITER).map(str::to_string).collect();

    let mut fields: Vec<&str> = lines.first()?.split(' ').collect();
    if fields.len() <= FIRST_FORMAT_INDEX {
        return None;
    }

    let formats = &mut fields[FIRST_FORMAT_INDEX..];
    let position = formats.iter().position(|pt| *pt == payload_type)?;
    formats[..=position].rotate_right(1);

    lines[0] = fields.join(" ");
    Some(lines.join(LINE_DELIMITER))
}
