//! ASCII armor for keys, signatures and messages.
//!
//! ```text
//! -----BEGIN LOCSHARE MESSAGE-----
//! Version: locshare 1
//!
//! <base64, wrapped at 64 columns>
//! -----END LOCSHARE MESSAGE-----
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::constants::{APP_NAME, ARMOR_LINE_WIDTH, PACKET_VERSION};
use crate::error::ArmorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    PublicKey,
    PrivateKey,
    Signature,
    Message,
}

impl ArmorKind {
    pub fn label(self) -> &'static str {
        match self {
            ArmorKind::PublicKey => "LOCSHARE PUBLIC KEY BLOCK",
            ArmorKind::PrivateKey => "LOCSHARE PRIVATE KEY BLOCK",
            ArmorKind::Signature => "LOCSHARE SIGNATURE",
            ArmorKind::Message => "LOCSHARE MESSAGE",
        }
    }

    pub fn begin_line(self) -> String {
        format!("-----BEGIN {}-----", self.label())
    }

    pub fn end_line(self) -> String {
        format!("-----END {}-----", self.label())
    }
}

/// Wrap `body` in an armored block. `headers` are emitted after `Version`.
pub fn encode(kind: ArmorKind, headers: &[(&str, &str)], body: &[u8]) -> String {
    let b64 = STANDARD.encode(body);

    let mut out = String::with_capacity(b64.len() + 128);
    out.push_str(&kind.begin_line());
    out.push('\n');
    out.push_str(&format!("Version: {APP_NAME} {PACKET_VERSION}\n"));
    for (name, value) in headers {
        // Header values are single-line by construction.
        let value = value.replace(['\r', '\n'], " ");
        out.push_str(&format!("{name}: {value}\n"));
    }
    out.push('\n');

    let bytes = b64.as_bytes();
    for chunk in bytes.chunks(ARMOR_LINE_WIDTH) {
        // base64 output is pure ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }

    out.push_str(&kind.end_line());
    out.push('\n');
    out
}

/// Decode the first block of `kind` found in `text`.
pub fn decode(kind: ArmorKind, text: &str) -> Result<Vec<u8>, ArmorError> {
    let begin = kind.begin_line();
    let end = kind.end_line();

    let start = text
        .find(&begin)
        .ok_or(ArmorError::MissingHeader(kind.label()))?;
    let rest = &text[start + begin.len()..];
    let stop = rest
        .find(&end)
        .ok_or(ArmorError::MissingFooter(kind.label()))?;
    let inner = &rest[..stop];

    // First line is the tail of the BEGIN line; headers run until the
    // first blank line after it.
    let mut in_headers = true;
    let mut b64 = String::new();
    for line in inner.lines().skip(1).map(str::trim) {
        if in_headers {
            if line.is_empty() {
                in_headers = false;
            }
            continue;
        }
        b64.push_str(line);
    }

    STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| ArmorError::Base64(e.to_string()))
}

/// Split a string holding several concatenated blocks of `kind`.
pub fn split_blocks(kind: ArmorKind, text: &str) -> Vec<String> {
    let begin = kind.begin_line();
    let end = kind.end_line();

    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&begin) {
        let after = &rest[start..];
        let Some(stop) = after.find(&end) else {
            break;
        };
        let block_end = stop + end.len();
        blocks.push(after[..block_end].to_string());
        rest = &after[block_end..];
    }
    blocks
}

/// Read a named header from an armored block, if present.
pub fn header<'a>(kind: ArmorKind, text: &'a str, name: &str) -> Option<&'a str> {
    let begin = kind.begin_line();
    let start = text.find(&begin)?;
    let prefix = format!("{name}: ");
    text[start + begin.len()..]
        .lines()
        .map(str::trim)
        .skip_while(|l| l.is_empty())
        .take_while(|l| !l.is_empty())
        .find_map(|l| l.strip_prefix(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let body: Vec<u8> = (0..=255u8).cycle().take(500).collect();
        let armored = encode(ArmorKind::Message, &[], &body);

        assert!(armored.starts_with("-----BEGIN LOCSHARE MESSAGE-----\n"));
        assert!(armored.trim_end().ends_with("-----END LOCSHARE MESSAGE-----"));
        assert!(armored.lines().all(|l| l.len() <= ARMOR_LINE_WIDTH || l.starts_with("-----")));
        assert_eq!(decode(ArmorKind::Message, &armored).unwrap(), body);
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let armored = encode(ArmorKind::Signature, &[], b"sig");
        assert_eq!(
            decode(ArmorKind::PublicKey, &armored),
            Err(ArmorError::MissingHeader("LOCSHARE PUBLIC KEY BLOCK"))
        );
    }

    #[test]
    fn test_truncated_block() {
        let armored = encode(ArmorKind::Message, &[], b"hello");
        let cut = &armored[..armored.len() - 20];
        assert!(matches!(
            decode(ArmorKind::Message, cut),
            Err(ArmorError::MissingFooter(_))
        ));
    }

    #[test]
    fn test_headers_are_readable() {
        let armored = encode(ArmorKind::PublicKey, &[("Comment", "Alice <a@x>")], b"k");
        assert_eq!(header(ArmorKind::PublicKey, &armored, "Comment"), Some("Alice <a@x>"));
        assert_eq!(header(ArmorKind::PublicKey, &armored, "Missing"), None);
        assert_eq!(decode(ArmorKind::PublicKey, &armored).unwrap(), b"k");
    }

    #[test]
    fn test_split_concatenated_blocks() {
        let a = encode(ArmorKind::PublicKey, &[], b"first");
        let b = encode(ArmorKind::PublicKey, &[], b"second");
        let joined = format!("{a}\n{b}");

        let blocks = split_blocks(ArmorKind::PublicKey, &joined);
        assert_eq!(blocks.len(), 2);
        assert_eq!(decode(ArmorKind::PublicKey, &blocks[1]).unwrap(), b"second");
    }
}
