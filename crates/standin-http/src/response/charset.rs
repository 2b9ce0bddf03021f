//! Body transcoding for rules with an explicit `encoding`.

use super::SynthesisError;
use encoding_rs::{EncoderResult, Encoding, REPLACEMENT, UTF_16BE, UTF_16LE, UTF_8};

/// Written in place of characters the target charset cannot represent.
const UNMAPPABLE: u8 = b'?';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Utf8,
    Utf16Le { bom: bool },
    Utf16Be,
    /// Low byte of every code point.
    Binary,
    /// Code points up to U+00FF as-is, anything above unmappable.
    Iso88591,
    Whatwg(&'static Encoding),
}

impl Charset {
    fn resolve(name: &str) -> Option<Self> {
        let canonical: String = name
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match canonical.as_str() {
            "utf8" => return Some(Charset::Utf8),
            "utf16le" | "ucs2" => return Some(Charset::Utf16Le { bom: false }),
            "utf16" => return Some(Charset::Utf16Le { bom: true }),
            "utf16be" => return Some(Charset::Utf16Be),
            "binary" | "latin1" => return Some(Charset::Binary),
            "iso88591" => return Some(Charset::Iso88591),
            _ => {}
        }

        let encoding = Encoding::for_label(name.trim().as_bytes())?;
        if encoding == UTF_8 {
            Some(Charset::Utf8)
        } else if encoding == UTF_16LE {
            Some(Charset::Utf16Le { bom: false })
        } else if encoding == UTF_16BE {
            Some(Charset::Utf16Be)
        } else if encoding == REPLACEMENT {
            None
        } else {
            Some(Charset::Whatwg(encoding))
        }
    }
}

/// Encode `text` into the charset called `charset_name`.
pub fn transcode(text: &str, charset_name: &str) -> Result<Vec<u8>, SynthesisError> {
    let charset = Charset::resolve(charset_name)
        .ok_or_else(|| SynthesisError::UnknownCharset(charset_name.to_string()))?;

    let bytes = match charset {
        Charset::Utf8 => text.as_bytes().to_vec(),
        Charset::Utf16Le { bom } => {
            let mut out = Vec::with_capacity(text.len() * 2 + 2);
            if bom {
                out.extend_from_slice(&[0xFF, 0xFE]);
            }
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out
        }
        Charset::Utf16Be => text
            .encode_utf16()
            .flat_map(|unit| unit.to_be_bytes())
            .collect(),
        Charset::Binary => text.chars().map(|c| (c as u32 & 0xFF) as u8).collect(),
        Charset::Iso88591 => text
            .chars()
            .map(|c| u8::try_from(c as u32).unwrap_or(UNMAPPABLE))
            .collect(),
        Charset::Whatwg(encoding) => encode_whatwg(text, encoding),
    };
    Ok(bytes)
}

fn encode_whatwg(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    let mut encoder = encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len());
    let mut buffer = [0u8; 4096];
    let mut remaining = text;

    loop {
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(remaining, &mut buffer, true);
        out.extend_from_slice(&buffer[..written]);
        remaining = &remaining[read..];

        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => {}
            EncoderResult::Unmappable(_) => out.push(UNMAPPABLE),
        }
    }
    out
}
