//! SDP text transforms
//!
//! Only one rewrite is needed (codec preference on locally created offers),
//! so SDP is handled as CRLF-delimited lines rather than a parsed model.

mod codec;

pub use codec::{prefer_codec, MEDIA_SECTION_DELIMITER};
