/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    encode_modified_utf8_into(string, &mut buffer);
    buffer
}

/// Same as [`encode_modified_utf8`], but appending to an existing buffer
pub fn encode_modified_utf8_into(string: &str, buffer: &mut Vec<u8>) {
    for c in string.chars() {
        let code: u32 = c as u32;
        match encoded_width(c) {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: each half of the surrogate pair gets 3 bytes
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x0F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
}

/// Number of bytes [`encode_modified_utf8`] produces, without producing them
pub fn modified_utf8_len(string: &str) -> usize {
    string.chars().map(encoded_width).sum()
}

fn encoded_width(c: char) -> usize {
    match c as u32 {
        0 => 2,
        0x01..=0x7F => 1,
        0x80..=0x7FF => 2,
        0x800..=0xFFFF => 3,
        _ => 6,
    }
}

/// Decode modified UTF-8 bytes
///
/// Surrogate pairs are recombined into supplementary characters. Lone surrogates and truncated
/// sequences turn into `U+FFFD`.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c & 0x80 == 0 {
            units.push(c as u16);
            i += 1;
        } else if c & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push(((c as u16 & 0x1F) << 6) | (bytes[i + 1] as u16 & 0x3F));
            i += 2;
        } else if c & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                ((c as u16 & 0x0F) << 12)
                    | ((bytes[i + 1] as u16 & 0x3F) << 6)
                    | (bytes[i + 2] as u16 & 0x3F),
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }

    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(modified_utf8_len("java/lang/Object"), 16);
    }

    #[test]
    fn two_and_three_byte_encodings() {
        assert_eq!(
            encode_modified_utf8("ĄǍǞ"),
            vec![196, 132, 199, 141, 199, 158]
        );
        assert_eq!(
            encode_modified_utf8("ऄअॲ"),
            vec![224, 164, 132, 224, 164, 133, 224, 165, 178]
        );
    }

    #[test]
    fn supplementary_characters() {
        let encoded = encode_modified_utf8("\u{10000}\u{10FFFF}");
        assert_eq!(
            encoded,
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
        assert_eq!(modified_utf8_len("\u{10000}\u{10FFFF}"), 12);
        assert_eq!(decode_modified_utf8(&encoded), "\u{10000}\u{10FFFF}");
    }

    #[test]
    fn round_trip_basic_multilingual_plane() {
        let sample: String = (0x0001u32..0xFFFF)
            .step_by(97)
            .filter_map(char::from_u32)
            .collect();
        assert_eq!(decode_modified_utf8(&encode_modified_utf8(&sample)), sample);
    }

    #[test]
    fn lone_surrogate_is_replaced() {
        // 0xD800 on its own
        assert_eq!(decode_modified_utf8(&[0xED, 0xA0, 0x80]), "\u{FFFD}");
    }

    #[test]
    fn truncated_sequence_is_replaced() {
        assert_eq!(decode_modified_utf8(&[b'a', 0xE0, 0x80]), "a\u{FFFD}\u{FFFD}");
    }
}
