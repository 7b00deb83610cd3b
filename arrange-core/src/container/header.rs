use std::io::{Read, Write};

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const HEADER_LEN: usize = SALT_LEN + IV_LEN;

/// First 32 bytes of every single-file container: salt, then IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherHeader {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
}

impl CipherHeader {
    /// Fresh random salt and IV. Never reuse a header across files.
    pub fn generate() -> std::io::Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        getrandom::getrandom(&mut salt).map_err(std::io::Error::other)?;
        getrandom::getrandom(&mut iv).map_err(std::io::Error::other)?;
        Ok(Self { salt, iv })
    }

    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        w.write_all(&self.salt)?;
        w.write_all(&self.iv)?;
        Ok(())
    }

    pub fn read_from(mut r: impl Read) -> std::io::Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        r.read_exact(&mut salt)?;
        let mut iv = [0u8; IV_LEN];
        r.read_exact(&mut iv)?;
        Ok(Self { salt, iv })
    }
}
