//! Offline commands over captured payload files

use anyhow::{Context, Result};
use bytes::Bytes;
use colored::Colorize;
use std::path::Path;
use tether_core::{decode_compressed, inspect, DecoderKind, DecoderRegistry, Message, ZlibInflater};

fn read_payload(path: &Path) -> Result<Bytes> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}

pub fn inspect_file(path: &Path) -> Result<()> {
    let data = read_payload(path)?;
    let report = inspect(&data);

    println!("{} {}", "FILE".cyan().bold(), path.display());
    println!("Byte length: {}", report.byte_length);

    println!();
    println!("{}", "Possible formats:".green());
    for format in &report.possible_formats {
        println!("  - {}", format);
    }

    println!();
    println!("{}", "Text representations:".green());
    for (encoding, text) in &report.text_representations {
        match text {
            Ok(text) => println!("  {:<10} {:?}", encoding.label(), text),
            Err(e) => println!("  {:<10} {}", encoding.label(), e.dimmed()),
        }
    }

    println!();
    println!("{}", "Hex dump:".green());
    println!("{}", report.hex_dump);

    Ok(())
}

/// Decode `data` the way the client treats an inbound binary frame
pub fn decode_bytes(data: &Bytes, decoder: &str, compressed: bool) -> Result<Message> {
    if compressed {
        return Ok(decode_compressed(data, &ZlibInflater::new()));
    }

    let kind = DecoderKind::from(decoder);
    let message = DecoderRegistry::new().try_decode(data, kind.name())?;
    Ok(message)
}

pub fn decode_file(path: &Path, decoder: &str, compressed: bool) -> Result<()> {
    let data = read_payload(path)?;
    let message = decode_bytes(&data, decoder, compressed)
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    println!("{} {}", "KIND".cyan().bold(), message.kind());
    let rendered = serde_json::to_string_pretty(&message.to_value())?;
    println!("{}", rendered);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_auto_json() {
        let data = Bytes::from_static(br#"{"topic":"quotes"}"#);
        let message = decode_bytes(&data, "auto", false).unwrap();
        assert_eq!(message, Message::Json(json!({"topic": "quotes"})));
    }

    #[test]
    fn test_decode_hex() {
        let data = Bytes::from_static(&[0xde, 0xad]);
        let message = decode_bytes(&data, "hex", false).unwrap();
        assert_eq!(message, Message::Text("dead".to_string()));
    }

    #[test]
    fn test_decode_unknown_decoder() {
        let data = Bytes::from_static(b"abc");
        assert!(decode_bytes(&data, "protobuf", false).is_err());
    }

    #[test]
    fn test_decode_strict_json_rejects_text() {
        let data = Bytes::from_static(b"not json");
        assert!(decode_bytes(&data, "json", false).is_err());
    }
}
