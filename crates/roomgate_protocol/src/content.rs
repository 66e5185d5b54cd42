//! Base64 transport encoding for document content.
//!
//! Document state travels over the broker as standard base64 (with padding).

use crate::error::{ProtocolError, ProtocolResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encodes raw document bytes for the `SAVE` pattern.
pub fn encode_content(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes document bytes received from the `FETCH` pattern.
pub fn decode_content(encoded: &str) -> ProtocolResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| ProtocolError::InvalidContent(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_content() {
        assert_eq!(encode_content(&[]), "");
        assert!(decode_content("").unwrap().is_empty());
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            decode_content("not base64!"),
            Err(ProtocolError::InvalidContent(_))
        ));
    }

    proptest! {
        #[test]
        fn content_survives_transport(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode_content(&bytes);
            prop_assert_eq!(decode_content(&encoded).unwrap(), bytes);
        }
    }
}
