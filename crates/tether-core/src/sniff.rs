//! Format sniffing for opaque binary payloads
//!
//! Used to explain a frame that the decoder could only classify as binary:
//! a hex dump, attempts at several text encodings, and a list of formats the
//! bytes plausibly are.

use serde::Serialize;
use std::fmt;

/// Bytes per hex dump line
pub const HEX_DUMP_WIDTH: usize = 16;

/// Candidate format label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Format {
    Json,
    Utf8Text,
    Png,
    Jpeg,
    Gzip,
    /// No textual match; protobuf or some other binary encoding
    UnknownBinary,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Format::Json => "JSON",
            Format::Utf8Text => "UTF-8 Text",
            Format::Png => "PNG image",
            Format::Jpeg => "JPEG image",
            Format::Gzip => "GZIP compressed data",
            Format::UnknownBinary => "possibly protobuf or other binary format",
        };
        f.write_str(label)
    }
}

/// Text encodings attempted by [`text_representations`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl TextEncoding {
    pub const ALL: [TextEncoding; 4] = [
        TextEncoding::Utf8,
        TextEncoding::Utf16Le,
        TextEncoding::Utf16Be,
        TextEncoding::Latin1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Latin1 => "iso-8859-1",
        }
    }

    /// Decode strictly; the error string says why it failed
    pub fn decode(&self, data: &[u8]) -> Result<String, String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(data)
                .map(str::to_string)
                .map_err(|e| e.to_string()),
            TextEncoding::Utf16Le => decode_utf16(data, u16::from_le_bytes),
            TextEncoding::Utf16Be => decode_utf16(data, u16::from_be_bytes),
            TextEncoding::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
        }
    }
}

fn decode_utf16(data: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, String> {
    if data.len() % 2 != 0 {
        return Err(format!("odd byte length {} for utf-16", data.len()));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| e.to_string())
}

/// Full inspection report
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub byte_length: usize,
    pub hex_dump: String,
    pub text_representations: Vec<(TextEncoding, Result<String, String>)>,
    pub possible_formats: Vec<Format>,
}

impl Inspection {
    pub fn text(&self, encoding: TextEncoding) -> Option<&Result<String, String>> {
        self.text_representations
            .iter()
            .find(|(enc, _)| *enc == encoding)
            .map(|(_, text)| text)
    }
}

pub fn inspect(data: &[u8]) -> Inspection {
    Inspection {
        byte_length: data.len(),
        hex_dump: hex_dump(data),
        text_representations: text_representations(data),
        possible_formats: detect_formats(data),
    }
}

/// Classic hex dump: `offset: hex bytes | ascii`
///
/// ```text
/// 00000000: 7b 22 61 22 3a 31 7d                            | {"a":1}
/// ```
pub fn hex_dump(data: &[u8]) -> String {
    let hex_width = HEX_DUMP_WIDTH * 3 - 1;

    data.chunks(HEX_DUMP_WIDTH)
        .enumerate()
        .map(|(line, chunk)| {
            let hex = chunk
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { '.' })
                .collect();
            format!(
                "{:08x}: {:<width$} | {}",
                line * HEX_DUMP_WIDTH,
                hex,
                ascii,
                width = hex_width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn text_representations(data: &[u8]) -> Vec<(TextEncoding, Result<String, String>)> {
    TextEncoding::ALL
        .iter()
        .map(|enc| (*enc, enc.decode(data)))
        .collect()
}

fn is_printable_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| (0x20..=0x7e).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t'))
}

/// Candidate formats, most specific first
///
/// JSON and printable text are checked first; if neither matched the buffer
/// is labelled [`Format::UnknownBinary`]. Magic-byte signatures are added on
/// top, so a gzip stream reports both `UnknownBinary` and `Gzip`.
pub fn detect_formats(data: &[u8]) -> Vec<Format> {
    let mut formats = Vec::new();

    if let Ok(text) = std::str::from_utf8(data) {
        if serde_json::from_str::<serde_json::Value>(text).is_ok() {
            formats.push(Format::Json);
        }
        if is_printable_text(text) {
            formats.push(Format::Utf8Text);
        }
    }

    if formats.is_empty() {
        formats.push(Format::UnknownBinary);
    }

    if data.len() >= 8 && data.starts_with(&[0x89, 0x50, 0x4e, 0x47]) {
        formats.push(Format::Png);
    }
    if data.starts_with(&[0xff, 0xd8]) {
        formats.push(Format::Jpeg);
    }
    if data.starts_with(&[0x1f, 0x8b]) {
        formats.push(Format::Gzip);
    }

    formats
}
