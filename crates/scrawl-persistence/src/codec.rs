//! The canonical text form of a stored lobby.

use scrawl_lobby::LobbyDocument;
use scrawl_protocol::{Codec, JsonCodec};

use crate::error::PersistenceError;

/// Encodes a document as compact JSON.
pub fn encode_document(doc: &LobbyDocument) -> Result<String, PersistenceError> {
    Ok(JsonCodec.encode_text(doc)?)
}

/// Decodes a stored document.
pub fn decode_document(raw: &str) -> Result<LobbyDocument, PersistenceError> {
    Ok(JsonCodec.decode(raw.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrawl_protocol::ProtocolError;

    #[test]
    fn test_decode_garbage_is_codec_error() {
        assert!(matches!(
            decode_document("{\"LobbyID\":"),
            Err(PersistenceError::Codec(ProtocolError::Decode(_)))
        ));
    }

    #[test]
    fn test_encode_omits_missing_drawer() {
        let doc = decode_document(
            r#"{"LobbyID":"x","EditableLobbySettings":null,"DrawingTimeNew":0,"CustomWords":null,"Words":null,"Players":null,"State":"unstarted","Owner":null,"Creator":null,"CurrentWord":"","WordHints":null,"WordHintsShown":null,"HintsLeft":0,"HintCount":0,"Round":0,"WordChoice":null,"Wordpack":"english","RoundEndTime":0,"TimeLeftTicker":null,"ScoreEarnedByGuessers":0,"CurrentDrawing":null,"Lowercaser":{},"LastPlayerDisconnectTime":null}"#,
        )
        .unwrap();
        let text = encode_document(&doc).unwrap();
        assert!(!text.contains("Drawer"));
        assert!(text.starts_with("{\"LobbyID\":\"x\""));
    }
}
