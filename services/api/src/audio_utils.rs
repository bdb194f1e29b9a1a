use base64::Engine;

/// Sample rate of PCM16 audio on the realtime API and in the hosted page.
pub const PCM16_SAMPLE_RATE: u32 = 24_000;

/// Decodes a base64 audio delta into little-endian PCM16 bytes.
///
/// Returns `None` for invalid base64 or a payload with a dangling half sample.
pub fn decode_pcm16_base64(base64_fragment: &str) -> Option<Vec<u8>> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(bytes) if bytes.len() % 2 == 0 => Some(bytes),
        Ok(bytes) => {
            tracing::warn!(len = bytes.len(), "Dropping audio delta with odd byte count");
            None
        }
        Err(e) => {
            tracing::error!("Failed to decode base64 audio delta: {}", e);
            None
        }
    }
}

/// Whether a binary frame from the page is plausible PCM16 mono audio.
pub fn is_pcm16_frame(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.len() % 2 == 0
}

/// Duration of a PCM16 mono buffer in milliseconds.
pub fn pcm16_duration_ms(bytes: &[u8]) -> u64 {
    (bytes.len() as u64 / 2) * 1000 / PCM16_SAMPLE_RATE as u64
}
