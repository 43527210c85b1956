//! ASCII armor framing for envelope packets.
//!
//! An armored block is a labeled header/footer pair around base64 of a
//! binary packet, wrapped at 64 columns:
//!
//! ```text
//! -----BEGIN AXON MESSAGE-----
//!
//! q83vEjRWeJCrze8S...
//! -----END AXON MESSAGE-----
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CoreError;

const HEADER_PREFIX: &str = "-----BEGIN AXON ";
const FOOTER_PREFIX: &str = "-----END AXON ";
const DASHES: &str = "-----";
const WRAP_COLUMNS: usize = 64;

/// Encode bytes into an armored block with the given label.
pub fn encode(label: &str, bytes: &[u8]) -> String {
    let body = STANDARD.encode(bytes);
    let mut out = String::with_capacity(body.len() + label.len() * 2 + 64);
    out.push_str(HEADER_PREFIX);
    out.push_str(label);
    out.push_str(DASHES);
    out.push_str("\n\n");
    for chunk in body.as_bytes().chunks(WRAP_COLUMNS) {
        // base64 output is ASCII, so the chunk is valid UTF-8
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(FOOTER_PREFIX);
    out.push_str(label);
    out.push_str(DASHES);
    out.push('\n');
    out
}

/// Decode an armored block, returning its label and raw bytes.
pub fn decode(input: &str) -> Result<(String, Vec<u8>), CoreError> {
    let mut lines = input.lines().map(str::trim);

    let header = lines
        .by_ref()
        .find(|l| !l.is_empty())
        .ok_or_else(|| CoreError::MalformedArmor("empty input".into()))?;

    let label = header
        .strip_prefix(HEADER_PREFIX)
        .and_then(|rest| rest.strip_suffix(DASHES))
        .ok_or_else(|| CoreError::MalformedArmor(format!("bad header line: {header}")))?
        .to_string();

    let footer = format!("{FOOTER_PREFIX}{label}{DASHES}");
    let mut body = String::new();
    let mut closed = false;
    for line in lines {
        if line == footer {
            closed = true;
            break;
        }
        if line.starts_with(DASHES) {
            return Err(CoreError::MalformedArmor(format!(
                "unexpected boundary line: {line}"
            )));
        }
        body.push_str(line);
    }
    if !closed {
        return Err(CoreError::MalformedArmor(format!("missing footer for {label}")));
    }

    let bytes = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CoreError::MalformedArmor(format!("invalid base64: {e}")))?;

    Ok((label, bytes))
}

/// Decode an armored block, requiring a specific label.
pub fn decode_labeled(input: &str, expected: &str) -> Result<Vec<u8>, CoreError> {
    let (label, bytes) = decode(input)?;
    if label != expected {
        return Err(CoreError::UnexpectedLabel {
            expected: expected.to_string(),
            got: label,
        });
    }
    Ok(bytes)
}

/// Peek at the label of an armored block without decoding the body.
pub fn peek_label(input: &str) -> Option<&str> {
    let header = input.lines().map(str::trim).find(|l| !l.is_empty())?;
    header
        .strip_prefix(HEADER_PREFIX)
        .and_then(|rest| rest.strip_suffix(DASHES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let armored = encode("MESSAGE", data);
        let (label, decoded) = decode(&armored).unwrap();
        assert_eq!(label, "MESSAGE");
        assert_eq!(decoded, data);
    }

    #[test]
    fn roundtrip_long_body_wraps() {
        let data = vec![0xabu8; 500];
        let armored = encode("PUBLIC KEY", &data);
        assert!(armored.lines().all(|l| l.len() <= 64 + 32));
        let (label, decoded) = decode(&armored).unwrap();
        assert_eq!(label, "PUBLIC KEY");
        assert_eq!(decoded, data);
    }

    #[test]
    fn rejects_missing_footer() {
        let armored = "-----BEGIN AXON MESSAGE-----\n\nYWJj\n";
        assert!(decode(armored).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("not armored at all").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn decode_labeled_rejects_wrong_label() {
        let armored = encode("MESSAGE", b"x");
        let err = decode_labeled(&armored, "PUBLIC KEY").unwrap_err();
        assert!(matches!(err, CoreError::UnexpectedLabel { .. }));
    }

    #[test]
    fn peek_label_reads_header_only() {
        let armored = encode("SIGNATURE", b"x");
        assert_eq!(peek_label(&armored), Some("SIGNATURE"));
        assert_eq!(peek_label("plain text"), None);
    }
}
