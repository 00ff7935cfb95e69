//! Purpose: ISO-8859-15 (Latin-9) text policy for strings sent over the wire.
//! Exports: `to_latin9`.
//! Role: The portal stores text in Latin-9; wire strings are restricted to it.
//! Invariants: Unrepresentable code points are dropped, never escaped or replaced.
//! Invariants: U+2019 is rewritten to an ASCII apostrophe before dropping.

const RIGHT_SINGLE_QUOTATION_MARK: char = '\u{2019}';

/// Latin-9 byte for `c`, if it has one.
///
/// Latin-9 is Latin-1 with eight positions reassigned (euro sign, S/Z caron,
/// OE ligature, Y diaeresis), so the Latin-1 characters at those positions are
/// not representable.
fn encode_char(c: char) -> Option<u8> {
    match c {
        '\u{20AC}' => Some(0xA4),
        '\u{0160}' => Some(0xA6),
        '\u{0161}' => Some(0xA8),
        '\u{017D}' => Some(0xB4),
        '\u{017E}' => Some(0xB8),
        '\u{0152}' => Some(0xBC),
        '\u{0153}' => Some(0xBD),
        '\u{0178}' => Some(0xBE),
        '\u{A4}' | '\u{A6}' | '\u{A8}' | '\u{B4}' | '\u{B8}' | '\u{BC}' | '\u{BD}' | '\u{BE}' => {
            None
        }
        c if (c as u32) <= 0xFF => Some(c as u32 as u8),
        _ => None,
    }
}

fn normalize(c: char) -> char {
    if c == RIGHT_SINGLE_QUOTATION_MARK {
        '\''
    } else {
        c
    }
}

/// Restrict `text` to the Latin-9 repertoire, keeping it as a Rust string.
///
/// The loss is silent and the original text cannot be recovered from the
/// result.
pub fn to_latin9(text: &str) -> String {
    text.chars()
        .map(normalize)
        .filter(|c| encode_char(*c).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{encode_char, to_latin9};

    #[test]
    fn accented_latin_text_is_lossless() {
        let text = "ééééé èèèàççç ÿ ñ";
        assert!(text.chars().all(|c| encode_char(c).is_some()));
        assert_eq!(to_latin9(text), text);
    }

    #[test]
    fn latin9_specific_characters_use_their_own_bytes() {
        assert_eq!(encode_char('€'), Some(0xA4));
        assert_eq!(encode_char('Œ'), Some(0xBC));
        assert_eq!(encode_char('Š'), Some(0xA6));
        assert_eq!(encode_char('é'), Some(0xE9));
        assert_eq!(to_latin9("Œuvre à 5 €"), "Œuvre à 5 €");
    }

    #[test]
    fn latin1_characters_displaced_by_latin9_are_dropped() {
        assert_eq!(encode_char('¤'), None);
        assert_eq!(to_latin9("a½b"), "ab");
    }

    #[test]
    fn unrepresentable_code_point_is_dropped_alone() {
        assert_eq!(to_latin9("snow\u{2603}man"), "snowman");
        assert_eq!(to_latin9("日本 text"), " text");
    }

    #[test]
    fn curly_apostrophe_becomes_ascii() {
        assert_eq!(to_latin9("l\u{2019}été"), "l'été");
        assert_eq!(to_latin9("it\u{2019}s"), "it's");
    }

    #[test]
    fn other_typographic_quotes_are_not_substituted() {
        assert_eq!(to_latin9("\u{201C}quoted\u{201D}"), "quoted");
    }
}
