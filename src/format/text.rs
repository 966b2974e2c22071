//! Byte-level text handling: encodings, line breaks, display width.
//!
//! Encoding detection supports UTF-8 with or without a BOM and UTF-16 LE/BE
//! with a BOM. Line breaks are detected on load and preserved on write
//! unless overridden by a flag.

use crate::config::{Encoding, LineBreak, SessionFlags};

/// Decode raw bytes under the requested encoding. `Auto` sniffs the BOM and
/// falls back to UTF-8. Returns the text and the concrete encoding that was
/// used, so writes can reproduce it.
pub fn decode_bytes(bytes: &[u8], encoding: Encoding) -> Result<(String, Encoding), String> {
    let encoding = match encoding {
        Encoding::Auto => {
            if bytes.starts_with(&[0xFF, 0xFE]) {
                Encoding::Utf16Le
            } else if bytes.starts_with(&[0xFE, 0xFF]) {
                Encoding::Utf16Be
            } else if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
                Encoding::Utf8Bom
            } else {
                Encoding::Utf8
            }
        }
        e => e,
    };
    let text = match encoding {
        Encoding::Auto => unreachable!("resolved above"),
        Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())?,
        Encoding::Utf8Bom => {
            let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
            String::from_utf8(body.to_vec()).map_err(|e| e.to_string())?
        }
        Encoding::Utf16Le | Encoding::Utf16Be => {
            if bytes.len() % 2 != 0 {
                return Err("odd byte length for UTF-16".to_string());
            }
            let mut units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| {
                    if encoding == Encoding::Utf16Le {
                        u16::from_le_bytes([c[0], c[1]])
                    } else {
                        u16::from_be_bytes([c[0], c[1]])
                    }
                })
                .collect();
            if units.first() == Some(&0xFEFF) {
                units.remove(0);
            }
            String::from_utf16(&units).map_err(|e| e.to_string())?
        }
    };
    Ok((text, encoding))
}

/// Encode text under the given concrete encoding, emitting a BOM where the
/// encoding carries one.
pub fn encode_bytes(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Auto | Encoding::Utf8 => text.as_bytes().to_vec(),
        Encoding::Utf8Bom => {
            let mut out = vec![0xEF, 0xBB, 0xBF];
            out.extend_from_slice(text.as_bytes());
            out
        }
        Encoding::Utf16Le | Encoding::Utf16Be => {
            let mut out = Vec::with_capacity(2 + text.len() * 2);
            let units = std::iter::once(0xFEFFu16).chain(text.encode_utf16());
            for u in units {
                let b = if encoding == Encoding::Utf16Le {
                    u.to_le_bytes()
                } else {
                    u.to_be_bytes()
                };
                out.extend_from_slice(&b);
            }
            out
        }
    }
}

/// First line-break style found in the text; LF when there is none.
pub fn detect_line_break(text: &str) -> LineBreak {
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'\n' => return LineBreak::Lf,
            b'\r' => {
                if bytes.get(i + 1) == Some(&b'\n') {
                    return LineBreak::CrLf;
                }
                return LineBreak::Cr;
            }
            _ => {}
        }
    }
    LineBreak::Lf
}

/// Normalize every line break to LF for the codecs.
pub fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn is_wide(c: char) -> bool {
    matches!(u32::from(c),
        0x1100..=0x115F
        | 0x2E80..=0x303E
        | 0x3041..=0x33FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xA000..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x2FFFD
        | 0x30000..=0x3FFFD)
}

fn is_diacritical(c: char) -> bool {
    matches!(u32::from(c), 0x0300..=0x036F)
}

fn is_format_code(c: char) -> bool {
    matches!(u32::from(c), 0x200B..=0x200F | 0x2060 | 0xFEFF)
}

/// Display width of a string for fixed-width alignment. The width flags
/// control how wide, combining, and format-code characters count.
pub fn text_width(s: &str, flags: &SessionFlags) -> usize {
    s.chars()
        .map(|c| {
            if is_diacritical(c) {
                usize::from(flags.count_diacritical_sign)
            } else if is_format_code(c) {
                usize::from(flags.count_format_code)
            } else if flags.east_asian_encoding && is_wide(c) {
                2
            } else {
                1
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_detection_round_trip() {
        let cases = [
            Encoding::Utf8,
            Encoding::Utf8Bom,
            Encoding::Utf16Le,
            Encoding::Utf16Be,
        ];
        for enc in cases {
            let bytes = encode_bytes("a,b\n1,2\n", enc);
            let (text, detected) = decode_bytes(&bytes, Encoding::Auto).unwrap();
            assert_eq!(text, "a,b\n1,2\n");
            assert_eq!(detected, enc);
        }
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        assert!(decode_bytes(&[0xFF, 0xFF, 0xFF], Encoding::Utf8).is_err());
        assert!(decode_bytes(&[0x41, 0x00, 0x42], Encoding::Utf16Le).is_err());
    }

    #[test]
    fn line_break_detection() {
        assert_eq!(detect_line_break("a\r\nb"), LineBreak::CrLf);
        assert_eq!(detect_line_break("a\nb"), LineBreak::Lf);
        assert_eq!(detect_line_break("a\rb"), LineBreak::Cr);
        assert_eq!(detect_line_break("ab"), LineBreak::Lf);
        assert_eq!(normalize_line_breaks("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn width_flags_change_counting() {
        let mut flags = SessionFlags::default();
        assert_eq!(text_width("abc", &flags), 3);
        assert_eq!(text_width("漢字", &flags), 2);
        flags.east_asian_encoding = true;
        assert_eq!(text_width("漢字", &flags), 4);
        assert_eq!(text_width("e\u{0301}", &flags), 1);
        flags.count_diacritical_sign = true;
        assert_eq!(text_width("e\u{0301}", &flags), 2);
    }
}
