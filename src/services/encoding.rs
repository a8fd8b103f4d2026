//! `data:` URL handling for inline uploads.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use thiserror::Error;

/// Browsers always pad, hand-rolled clients sometimes don't.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("data URL has no ',' separating header and payload")]
    MissingSeparator,

    #[error("data URL is not base64 encoded (header: '{0}')")]
    NotBase64(String),

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[derive(Debug)]
pub struct DecodedData {
    /// Media type from the header, if one was given
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    let mime_type = if mime_type.trim().is_empty() {
        mime::APPLICATION_OCTET_STREAM.to_string()
    } else {
        mime_type.trim().to_string()
    };
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Decodes `data:<mime>[;param]*;base64,<payload>`. A string without the
/// `data:` scheme is decoded as bare base64.
pub fn decode_data_url(input: &str) -> Result<DecodedData, EncodingError> {
    let input = input.trim();

    let (media_type, payload) = match strip_scheme(input) {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or(EncodingError::MissingSeparator)?;
            let mut parts = header.split(';');
            let media_type = parts
                .next()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                return Err(EncodingError::NotBase64(header.to_string()));
            }
            (media_type, payload)
        }
        None => (None, input),
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = LENIENT.decode(compact.as_bytes())?;

    Ok(DecodedData { media_type, bytes })
}

fn strip_scheme(input: &str) -> Option<&str> {
    let head = input.get(..5)?;
    head.eq_ignore_ascii_case("data:").then(|| &input[5..])
}
