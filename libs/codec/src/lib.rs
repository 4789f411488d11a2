//! # Module Runtime Codec
//!
//! ## Purpose
//!
//! Encoding and decoding rules for every payload that crosses a socket:
//! - **Frames**: `u32` big-endian length prefix followed by an opaque payload
//! - **Control commands**: one tag byte plus a UTF-8 body (`0x01` + `"source->target"`)
//! - **Registry exchange**: `"<resolve-path>:<pid>"` requests and JSON replies
//! - **Values**: whitespace-separated decimal text, decoded by [`types::PortKind`]
//! - **Acknowledgments**: the literal `"ACK"`
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or connection handling (belongs in `network`)
//! - Port or module state (belongs in `network` / `module-runtime`)
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → network/ → module/
//!     ↑           ↓          ↓
//!  Records     Wire rules  Sockets
//! ```

pub mod constants;
pub mod control;
pub mod error;
pub mod frame;
pub mod registry;
pub mod value;

pub use constants::{is_ack, ACK, CONNECT_SEPARATOR, CONNECT_TAG, DEFAULT_MAX_MESSAGE_SIZE};
pub use control::ControlCommand;
pub use error::CodecError;
pub use frame::{decode_frame, encode_frame, FRAME_HEADER_LEN};
pub use registry::{decode_reply, encode_request, ResolveReply, ResolveRequest};
pub use value::{decode_value, encode_value};

/// Drop the NUL terminators some peers append to text payloads
pub(crate) fn trim_nul(payload: &[u8]) -> &[u8] {
    let end = payload
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |last| last + 1);
    &payload[..end]
}

#[cfg(test)]
mod tests {
    use super::trim_nul;

    #[test]
    fn test_trim_nul() {
        assert_eq!(trim_nul(b"ACK\0"), b"ACK");
        assert_eq!(trim_nul(b"ACK\0\0"), b"ACK");
        assert_eq!(trim_nul(b"\0"), b"");
        assert_eq!(trim_nul(b"a\0b"), b"a\0b");
    }
}
