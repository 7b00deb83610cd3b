//! Single-file container codec.
//!
//! Layout: `salt (16) || iv (16) || AES-256-CBC(plaintext)`, PKCS#7 padding
//! applied once, on the final chunk. Plaintext is streamed in
//! [`BUFFER_SIZE`] chunks so memory use does not depend on file size.

use crate::container::header::{CipherHeader, HEADER_LEN};
use crate::crypto::kdf::derive_key;
use crate::error::{ArrangeError, PathContext, Result};
use crate::request::Password;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use tracing::warn;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const BUFFER_SIZE: usize = 64 * 1024;
pub const BLOCK_LEN: usize = 16;

/// Fill `buf` unless EOF comes first. Returns the number of bytes read.
fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn encrypt_blocks(enc: &mut Aes256CbcEnc, data: &mut [u8]) {
    for block in data.chunks_exact_mut(BLOCK_LEN) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn decrypt_blocks(dec: &mut Aes256CbcDec, data: &mut [u8]) {
    for block in data.chunks_exact_mut(BLOCK_LEN) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Encrypt `src` into `dst` under a fresh header. Returns container bytes written.
pub fn encrypt_stream<R: Read + ?Sized, W: Write + ?Sized>(
    src: &mut R,
    dst: &mut W,
    password: &Password,
) -> Result<u64> {
    let header = CipherHeader::generate()?;
    let key = derive_key(password, &header.salt);
    header.write_to(&mut *dst)?;
    let mut enc = Aes256CbcEnc::new(&key.0.into(), &header.iv.into());

    // one spare block so the final chunk can always take a full pad block
    let mut buf = vec![0u8; BUFFER_SIZE + BLOCK_LEN];
    let mut written = HEADER_LEN as u64;

    let tail = loop {
        let n = read_full(src, &mut buf[..BUFFER_SIZE])?;
        if n < BUFFER_SIZE {
            break n;
        }
        encrypt_blocks(&mut enc, &mut buf[..n]);
        dst.write_all(&buf[..n])?;
        written += n as u64;
    };

    let last = enc
        .encrypt_padded_mut::<Pkcs7>(&mut buf, tail)
        .map_err(|_| ArrangeError::Format("no room for padding block".into()))?;
    dst.write_all(last)?;
    written += last.len() as u64;
    Ok(written)
}

/// Decrypt a container from `src` into `dst`. Returns plaintext bytes written.
///
/// The last ciphertext chunk is held back until EOF so padding is only
/// checked where it was written. A short header, an empty or misaligned body,
/// and bad padding all surface as [`ArrangeError::Integrity`].
pub fn decrypt_stream<R: Read + ?Sized, W: Write + ?Sized>(
    src: &mut R,
    dst: &mut W,
    password: &Password,
) -> Result<u64> {
    let header = CipherHeader::read_from(&mut *src).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ArrangeError::Integrity,
        _ => e.into(),
    })?;
    let key = derive_key(password, &header.salt);
    let mut dec = Aes256CbcDec::new(&key.0.into(), &header.iv.into());

    let mut cur = vec![0u8; BUFFER_SIZE];
    let mut next = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;

    let mut n = read_full(src, &mut cur)?;
    while n == BUFFER_SIZE {
        let m = read_full(src, &mut next)?;
        if m == 0 {
            break;
        }
        decrypt_blocks(&mut dec, &mut cur[..n]);
        dst.write_all(&cur[..n])?;
        written += n as u64;
        std::mem::swap(&mut cur, &mut next);
        n = m;
    }

    if n == 0 || n % BLOCK_LEN != 0 {
        return Err(ArrangeError::Integrity);
    }
    let plain = dec
        .decrypt_padded_mut::<Pkcs7>(&mut cur[..n])
        .map_err(|_| ArrangeError::Integrity)?;
    dst.write_all(plain)?;
    written += plain.len() as u64;
    Ok(written)
}

fn open_pair(input: &Path, output: &Path) -> Result<(File, File)> {
    let src = File::open(input).at(input)?;
    // never clobber: the output name was resolved to a free path
    let dst = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .at(output)?;
    Ok((src, dst))
}

/// Best-effort removal of a half-written output.
pub(crate) fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove partial output {}: {}", path.display(), e),
    }
}

/// Writer that remembers whether any write to it failed.
struct WriteSide<W> {
    inner: W,
    failed: bool,
}

impl<W: Write> Write for WriteSide<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let r = self.inner.write(buf);
        self.failed |= r.is_err();
        r
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let r = self.inner.flush();
        self.failed |= r.is_err();
        r
    }
}

/// Run a stream codec and attach the path of whichever side failed to I/O errors.
fn with_paths<R: Read, W: Write>(
    src: &mut R,
    dst: W,
    input: &Path,
    output: &Path,
    run: impl FnOnce(&mut R, &mut WriteSide<W>) -> Result<u64>,
) -> Result<u64> {
    let mut dst = WriteSide {
        inner: dst,
        failed: false,
    };
    let res = run(src, &mut dst).and_then(|n| dst.flush().map(|()| n).map_err(Into::into));
    res.map_err(|e| match e {
        ArrangeError::Io(io) if dst.failed => ArrangeError::at(output, io),
        ArrangeError::Io(io) => ArrangeError::at(input, io),
        other => other,
    })
}

pub fn encrypt_file(input: &Path, output: &Path, password: &Password) -> Result<u64> {
    let (mut src, dst) = open_pair(input, output)?;
    let res = with_paths(&mut src, dst, input, output, |s, d| {
        encrypt_stream(s, d, password)
    });
    if res.is_err() {
        discard(output);
    }
    res
}

pub fn decrypt_file(input: &Path, output: &Path, password: &Password) -> Result<u64> {
    let (mut src, dst) = open_pair(input, output)?;
    let res = with_paths(&mut src, dst, input, output, |s, d| {
        decrypt_stream(s, d, password)
    });
    if res.is_err() {
        discard(output);
    }
    res
}
