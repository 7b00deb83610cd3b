use super::{Step, TaskContext, display_name};
use crate::archive::{self, Opened};
use crate::crypto::stream::{decrypt_file, encrypt_file};
use crate::error::{ArrangeError, PathContext, Result};
use crate::naming::{resolve_decrypt_output, resolve_encrypt_output};
use crate::request::{Direction, Password};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CryptJob {
    direction: Direction,
    password: Password,
    remove_originals: bool,
}

impl CryptJob {
    pub fn new(direction: Direction, password: Password, remove_originals: bool) -> Self {
        Self {
            direction,
            password,
            remove_originals,
        }
    }

    pub fn execute(&self, entry: &Path, cx: &TaskContext<'_>) -> Result<Step> {
        let meta = fs::metadata(entry).at(entry)?;
        let name = display_name(entry);
        let is_dir = meta.is_dir();

        let out = match self.direction {
            Direction::Encrypt => {
                cx.status(format!("Encrypting: {name}"));
                self.encrypt(entry, is_dir, cx)?
            }
            Direction::Decrypt => {
                if is_dir {
                    return Err(ArrangeError::Format(format!(
                        "{} is a folder, not an encrypted container",
                        entry.display()
                    )));
                }
                cx.status(format!("Decrypting: {name}"));
                self.decrypt(entry, cx)?
            }
        };

        if self.remove_originals {
            if is_dir {
                fs::remove_dir_all(entry).at(entry)?;
            } else {
                fs::remove_file(entry).at(entry)?;
            }
            cx.status(format!("Removed original: {name}"));
        }
        Ok(Step::Wrote(out))
    }

    fn encrypt(&self, entry: &Path, is_dir: bool, cx: &TaskContext<'_>) -> Result<PathBuf> {
        let out = resolve_encrypt_output(entry, Some(cx.claims));
        if is_dir {
            let stats = archive::seal_directory(entry, &out, &self.password)?;
            debug!("{}: {} files sealed", out.display(), stats.files);
        } else {
            let n = encrypt_file(entry, &out, &self.password)?;
            debug!("{}: {} bytes", out.display(), n);
        }
        Ok(out)
    }

    fn decrypt(&self, entry: &Path, cx: &TaskContext<'_>) -> Result<PathBuf> {
        let out = resolve_decrypt_output(entry, Some(cx.claims));
        match archive::probe(entry)? {
            Some(zip) => match archive::open_container(zip, entry, &out, &self.password)? {
                Opened::Directory { files } => {
                    debug!("{}: {} files restored", out.display(), files)
                }
                Opened::Foreign => debug!("{}: extracted as-is", out.display()),
            },
            None => {
                let n = decrypt_file(entry, &out, &self.password)?;
                debug!("{}: {} bytes", out.display(), n);
            }
        }
        Ok(out)
    }
}
