//! Turning blob bytes into analyzable content.

use super::{GitError, RepositoryReader};
use crate::dispatch::{Content, Side};

/// Number of leading bytes inspected for NUL when sniffing binary blobs.
pub const BINARY_SNIFF_LEN: usize = 1024;

/// The all-zero object id libgit2 reports for a missing side of a delta.
pub const ZERO_ID: &str = "0000000000000000000000000000000000000000";

pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

pub fn is_zero_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b == b'0')
}

/// Content standing in for a zero blob id on `side`.
pub fn zero_content(side: Side) -> Content {
    match side {
        Side::Base => Content::Added,
        Side::Target => Content::Deleted,
        Side::Snapshot => Content::Invalid,
    }
}

/// Decode blob bytes.
///
/// Invalid UTF-8 is replaced, or reported as [`Content::DecodeError`] in
/// strict mode. NUL characters are stripped from the decoded text.
pub fn decode_blob(bytes: &[u8], strict: bool) -> Content {
    if is_binary(bytes) {
        return Content::Binary;
    }

    let text = if strict {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => return Content::DecodeError,
        }
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };

    if text.contains('\0') {
        Content::Text(text.replace('\0', ""))
    } else {
        Content::Text(text)
    }
}

/// Load and decode the blob for one side of a file version.
pub fn read_content(
    reader: &dyn RepositoryReader,
    blob_id: Option<&str>,
    side: Side,
    strict: bool,
) -> Result<Content, GitError> {
    let id = match blob_id {
        Some(id) if !is_zero_id(id) => id,
        Some(_) => return Ok(zero_content(side)),
        None => return Ok(Content::Invalid),
    };

    match reader.blob(id)? {
        Some(bytes) => Ok(decode_blob(&bytes, strict)),
        None => {
            tracing::warn!(blob = %id, "blob not found");
            Ok(Content::Invalid)
        }
    }
}
