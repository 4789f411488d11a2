//! Protocol constants

/// Acknowledgment payload sent by every server-role port after a request
pub const ACK: &[u8] = b"ACK";

/// Control-channel tag for "connect source to target"
pub const CONNECT_TAG: u8 = 0x01;

/// Separator between source and target in a connect command body
pub const CONNECT_SEPARATOR: &str = "->";

/// Largest frame accepted unless configured otherwise (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// True if `payload` is an acknowledgment, ignoring trailing NULs
pub fn is_ack(payload: &[u8]) -> bool {
    crate::trim_nul(payload) == ACK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ack() {
        assert!(is_ack(b"ACK"));
        assert!(is_ack(b"ACK\0"));
        assert!(!is_ack(b"ack"));
        assert!(!is_ack(b"NACK"));
        assert!(!is_ack(b""));
    }
}
