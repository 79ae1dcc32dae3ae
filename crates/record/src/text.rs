//! Fixed-width, zero-padded string fields.

/// Copy `value` into `dest`, truncating on a UTF-8 boundary so that at least
/// one trailing NUL always remains, and zero the rest of the buffer.
pub fn write_fixed(dest: &mut [u8], value: &str) {
    dest.fill(0);
    if dest.is_empty() {
        return;
    }

    let mut end = value.len().min(dest.len() - 1);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    dest[..end].copy_from_slice(&value.as_bytes()[..end]);
}

/// Read a fixed-width field up to its first NUL.
pub fn read_fixed(src: &[u8]) -> String {
    let end = src.iter().position(|b| *b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_value_is_zero_padded() {
        let mut buf = [0xFFu8; 8];
        write_fixed(&mut buf, "cpu");
        assert_eq!(&buf, b"cpu\0\0\0\0\0");
        assert_eq!(read_fixed(&buf), "cpu");
    }

    #[test]
    fn test_long_value_keeps_terminator() {
        let mut buf = [0u8; 4];
        write_fixed(&mut buf, "abcdef");
        assert_eq!(&buf, b"abc\0");
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let mut buf = [0u8; 3];
        // two bytes of room, but 'é' starts at byte 1 and needs two
        write_fixed(&mut buf, "aé");
        assert_eq!(&buf, b"a\0\0");
    }

    #[test]
    fn test_unterminated_buffer_reads_whole_slice() {
        assert_eq!(read_fixed(b"full"), "full");
    }
}
