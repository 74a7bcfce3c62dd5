//! Kernel wire format
//!
//! A message on a kernel socket is a multipart frame list:
//!
//! ```text
//! [ident, ..., "<IDS|MSG>", signature, header, parent_header, metadata, content, buffer, ...]
//! ```
//!
//! Signatures are not verified; a spy only reads.

use crate::channel::{ChannelError, ChannelResult};
use jspy_core::{Header, Message};
use serde_json::{Map, Value};
use tracing::debug;

/// Frame separating routing identities from the message body
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Decode one multipart message into its routing identities and the message
pub fn decode_frames<B: AsRef<[u8]>>(frames: &[B]) -> ChannelResult<(Vec<Vec<u8>>, Message)> {
    let split = frames
        .iter()
        .position(|frame| frame.as_ref() == DELIMITER)
        .ok_or_else(|| ChannelError::Malformed("missing <IDS|MSG> delimiter".into()))?;

    let idents = frames[..split].iter().map(|f| f.as_ref().to_vec()).collect();

    // signature, header, parent_header, metadata, content
    let body = &frames[split + 1..];
    if body.len() < 5 {
        return Err(ChannelError::Malformed(format!(
            "expected at least 5 frames after delimiter, got {}",
            body.len()
        )));
    }

    let header: Header = serde_json::from_slice(body[1].as_ref())?;
    let parent_header: Header = serde_json::from_slice(body[2].as_ref())?;
    let metadata = object_frame(body[3].as_ref(), "metadata")?;
    let content = object_frame(body[4].as_ref(), "content")?;

    if body.len() > 5 {
        debug!(count = body.len() - 5, "Dropping binary buffers");
    }

    let mut message = Message {
        header,
        parent_header,
        metadata,
        content,
        ..Default::default()
    };
    message.mirror_header_ids();
    message.set_buffers(Vec::new());

    Ok((idents, message))
}

fn object_frame(frame: &[u8], name: &str) -> ChannelResult<Map<String, Value>> {
    match serde_json::from_slice(frame)? {
        Value::Object(map) => Ok(map),
        other => Err(ChannelError::Malformed(format!(
            "{} frame is not an object: {}",
            name, other
        ))),
    }
}
