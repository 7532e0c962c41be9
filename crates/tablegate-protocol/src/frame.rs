//! Response framing: JSON array, optionally JSONP-wrapped.

use crate::{Packet, ProtocolError};

/// Serializes outgoing packets as the response body.
///
/// The body is always a JSON array (empty when the handler produced no
/// packets). When the request carried a `jsonp` query parameter, the array
/// is wrapped in a call to the named callback so browsers can consume it
/// through a `<script>` tag: `CB([...])`.
pub fn frame_response(
    packets: &[Packet],
    jsonp: Option<&str>,
) -> Result<String, ProtocolError> {
    let array =
        serde_json::to_string(packets).map_err(ProtocolError::Encode)?;
    Ok(match jsonp {
        Some(callback) => format!("{callback}({array})"),
        None => array,
    })
}
