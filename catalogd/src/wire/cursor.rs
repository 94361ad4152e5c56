use super::error::DecodeError;

/// Forward-only read cursor over one snapshot payload.
///
/// There is no way to rewind, so every field has to be taken in the order the
/// format declares it.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn take_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(DecodeError::TruncatedInput { needed: n, remaining });
        }
        let taken = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(taken)
    }

    /// Take the next `n` bytes as a lower-case hex string.
    pub fn take_hex(&mut self, n: usize) -> Result<String, DecodeError> {
        self.take_bytes(n).map(hex::encode)
    }

    pub fn take_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_uint(1)? as u8)
    }

    /// Take `n` bytes (at most 8) as a big-endian unsigned integer.
    pub fn take_uint(&mut self, n: usize) -> Result<u64, DecodeError> {
        debug_assert!(n <= 8, "take_uint supports at most 8 bytes");
        let bytes = self.take_bytes(n)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    /// Take a one-byte length `L` followed by `L` bytes of UTF-8 text.
    pub fn take_length_prefixed_string(&mut self) -> Result<String, DecodeError> {
        let len = usize::from(self.take_u8()?);
        let offset = self.pos;
        let bytes = self.take_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_bytes_advances() {
        let data = [0x01, 0x02, 0x03];
        let mut cursor = ByteCursor::new(&data);

        assert_eq!(cursor.take_bytes(2).unwrap(), &[0x01, 0x02]);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.take_hex(1).unwrap(), "03");
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_take_bytes_truncated_leaves_position() {
        let data = [0xaa];
        let mut cursor = ByteCursor::new(&data);

        let err = cursor.take_bytes(2).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedInput { needed: 2, remaining: 1 });
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_take_uint_big_endian() {
        let data = [0x50, 0x1f, 0x00, 0x00, 0x01, 0x00];
        let mut cursor = ByteCursor::new(&data);

        assert_eq!(cursor.take_uint(2).unwrap(), 0x501f);
        assert_eq!(cursor.take_uint(4).unwrap(), 0x0000_0100);
    }

    #[test]
    fn test_length_prefixed_string() {
        let mut data = vec![5];
        data.extend_from_slice(b"monza");
        data.push(0xff);
        let mut cursor = ByteCursor::new(&data);

        assert_eq!(cursor.take_length_prefixed_string().unwrap(), "monza");
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_length_prefixed_string_shortfall() {
        let data = [4, b's', b'p'];
        let mut cursor = ByteCursor::new(&data);

        assert!(matches!(
            cursor.take_length_prefixed_string(),
            Err(DecodeError::TruncatedInput { needed: 4, remaining: 2 })
        ));
    }

    #[test]
    fn test_length_prefixed_string_invalid_utf8() {
        let data = [2, 0xc3, 0x28];
        let mut cursor = ByteCursor::new(&data);

        assert_eq!(
            cursor.take_length_prefixed_string(),
            Err(DecodeError::InvalidUtf8 { offset: 1 })
        );
    }

    #[test]
    fn test_empty_string() {
        let data = [0];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.take_length_prefixed_string().unwrap(), "");
    }
}
