use bytes::{Buf, BufMut, Bytes};

use crate::{common::ByteStr, postgres::ProtocolError};

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while postgres want `u32`,
    /// this will panic when overflow instead of wrapping.
    fn to_u32(self) -> u32;
}

/// Nul string operation.
pub trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> u32;
}

/// Nul string operation in [`BufMut`]
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

/// Bounds checked read operation in [`Bytes`].
///
/// Backend message body is never trusted, every read returns
/// [`ProtocolError`] instead of panicking when the body is too short.
pub trait BytesExt {
    /// Try to read nul terminated string.
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError>;

    /// Try to split `len` bytes from the front.
    fn try_split_to(&mut self, len: usize) -> Result<Bytes, ProtocolError>;

    fn get_u8_checked(&mut self) -> Result<u8, ProtocolError>;

    fn get_i16_checked(&mut self) -> Result<i16, ProtocolError>;

    fn get_u32_checked(&mut self) -> Result<u32, ProtocolError>;

    fn get_i32_checked(&mut self) -> Result<i32, ProtocolError>;
}

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        self.try_into().expect("message size too large for protocol")
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> u32 {
        self.len().to_u32() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

macro_rules! get_checked {
    ($name:ident, $get:ident, $ty:ty) => {
        fn $name(&mut self) -> Result<$ty, ProtocolError> {
            if self.remaining() < size_of::<$ty>() {
                return Err(ProtocolError::truncated());
            }
            Ok(self.$get())
        }
    };
}

impl BytesExt for Bytes {
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        let Some(end) = self.iter().position(|e| matches!(e, b'\0')) else {
            return Err(ProtocolError::malformed("string is not nul terminated"));
        };
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(ByteStr::from_utf8(me)?)
    }

    fn try_split_to(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        if self.len() < len {
            return Err(ProtocolError::truncated());
        }
        Ok(self.split_to(len))
    }

    get_checked!(get_u8_checked, get_u8, u8);
    get_checked!(get_i16_checked, get_i16, i16);
    get_checked!(get_u32_checked, get_u32, u32);
    get_checked!(get_i32_checked, get_i32, i32);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nul_string() {
        let mut body = Bytes::from_static(b"server_version\x0017.2\x00");
        assert_eq!(body.get_nul_bytestr().unwrap(), "server_version");
        assert_eq!(body.get_nul_bytestr().unwrap(), "17.2");
        assert!(body.is_empty());
    }

    #[test]
    fn unterminated_string() {
        let mut body = Bytes::from_static(b"server_version");
        assert!(body.get_nul_bytestr().is_err());
    }

    #[test]
    fn short_integer() {
        let mut body = Bytes::from_static(&[0, 0, 1]);
        assert!(body.get_u32_checked().is_err());
        assert_eq!(body.get_u8_checked().unwrap(), 0);
        assert_eq!(body.get_i16_checked().unwrap(), 1);
        assert!(body.get_u8_checked().is_err());
    }
}
