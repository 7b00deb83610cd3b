use crate::container::header::SALT_LEN;
use crate::request::Password;
use sha2::Sha256;

pub const KEY_LEN: usize = 32;
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Raw AES-256 key. Lives only in memory for the duration of one file.
#[derive(Clone)]
pub struct CipherKey(pub [u8; KEY_LEN]);

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// PBKDF2-HMAC-SHA256 over the password with the per-file salt.
pub fn derive_key(password: &Password, salt: &[u8; SALT_LEN]) -> CipherKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.expose().as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    CipherKey(key)
}
