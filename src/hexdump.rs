/// Decodes the inspector's raw dump format into a zeroed buffer of `size`
/// bytes. Each data line carries an octal byte offset followed by eight
/// 4-hex-digit words of two bytes each, in buffer order; the trailing ASCII
/// gutter and any line that does not match the pattern (prompt echo, banner
/// noise) are ignored. Regions no line covers stay zero.
pub fn decode_hexdump(text: &str, size: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; size];

    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        let Some(offset) = tokens.next().and_then(parse_octal) else {
            continue;
        };

        let words: Vec<&str> = tokens.by_ref().take(8).collect();
        if words.len() != 8 || !words.iter().all(|w| is_hex_word(w)) {
            continue;
        }

        let mut pos = offset as usize;
        for word in words {
            // Two buffer-order bytes per word.
            let hi = u8::from_str_radix(&word[..2], 16).unwrap_or(0);
            let lo = u8::from_str_radix(&word[2..], 16).unwrap_or(0);
            if let Some(slot) = buffer.get_mut(pos) {
                *slot = hi;
            }
            if let Some(slot) = buffer.get_mut(pos + 1) {
                *slot = lo;
            }
            pos += 2;
        }
    }

    buffer
}

fn parse_octal(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return None;
    }
    u64::from_str_radix(token, 8).ok()
}

fn is_hex_word(token: &str) -> bool {
    token.len() == 4 && token.bytes().all(|b| b.is_ascii_hexdigit())
}
