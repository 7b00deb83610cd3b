use crate::error::{ArrangeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Password for a crypto batch. Never printed, never serialized.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(p: impl Into<String>) -> Self {
        Self(p.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizeBy {
    ByType,
    ByDate,
    Both,
}

impl OrganizeBy {
    pub fn by_type(self) -> bool {
        matches!(self, OrganizeBy::ByType | OrganizeBy::Both)
    }

    pub fn by_date(self) -> bool {
        matches!(self, OrganizeBy::ByDate | OrganizeBy::Both)
    }
}

#[derive(Clone, Debug)]
pub struct OrganizeParams {
    pub organize_by: OrganizeBy,
    /// `None` falls back to the parent folder of the first entry.
    pub destination_root: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct CryptoParams {
    pub password: Password,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

#[derive(Clone, Debug)]
pub enum Mode {
    Organize(OrganizeParams),
    Crypt(Direction, CryptoParams),
}

/// What a batch does, without its parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Organize,
    Encrypt,
    Decrypt,
}

impl Mode {
    pub fn operation(&self) -> Operation {
        match self {
            Mode::Organize(_) => Operation::Organize,
            Mode::Crypt(Direction::Encrypt, _) => Operation::Encrypt,
            Mode::Crypt(Direction::Decrypt, _) => Operation::Decrypt,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchRequest {
    pub entries: Vec<PathBuf>,
    pub mode: Mode,
    pub remove_originals: bool,
}

impl BatchRequest {
    pub fn organize(entries: Vec<PathBuf>, params: OrganizeParams) -> Self {
        Self {
            entries,
            mode: Mode::Organize(params),
            remove_originals: false,
        }
    }

    pub fn encrypt(entries: Vec<PathBuf>, password: Password) -> Self {
        Self {
            entries,
            mode: Mode::Crypt(Direction::Encrypt, CryptoParams { password }),
            remove_originals: false,
        }
    }

    pub fn decrypt(entries: Vec<PathBuf>, password: Password) -> Self {
        Self {
            entries,
            mode: Mode::Crypt(Direction::Decrypt, CryptoParams { password }),
            remove_originals: false,
        }
    }

    pub fn remove_originals(mut self, yes: bool) -> Self {
        self.remove_originals = yes;
        self
    }

    /// Pre-flight checks run before any task is scheduled.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(ArrangeError::InvalidRequest("no entries selected".into()));
        }
        let mut seen = HashSet::with_capacity(self.entries.len());
        for e in &self.entries {
            if !seen.insert(e) {
                return Err(ArrangeError::InvalidRequest(format!(
                    "entry listed twice: {}",
                    e.display()
                )));
            }
        }
        if let Mode::Crypt(_, params) = &self.mode {
            if params.password.is_empty() {
                return Err(ArrangeError::InvalidRequest("password is empty".into()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> OrganizeParams {
        OrganizeParams {
            organize_by: OrganizeBy::Both,
            destination_root: None,
        }
    }

    #[test]
    fn rejects_empty_batch() {
        let req = BatchRequest::organize(vec![], params());
        assert!(matches!(req.validate(), Err(ArrangeError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_duplicate_entries() {
        let req = BatchRequest::organize(vec!["a.txt".into(), "a.txt".into()], params());
        assert!(matches!(req.validate(), Err(ArrangeError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_empty_password() {
        let req = BatchRequest::encrypt(vec!["a.txt".into()], Password::new(""));
        assert!(matches!(req.validate(), Err(ArrangeError::InvalidRequest(_))));
    }

    #[test]
    fn password_never_shows_in_debug() {
        let req = BatchRequest::encrypt(vec!["a.txt".into()], Password::new("hunter2"));
        assert!(!format!("{req:?}").contains("hunter2"));
    }

    #[test]
    fn organize_by_flags() {
        assert!(OrganizeBy::Both.by_type() && OrganizeBy::Both.by_date());
        assert!(OrganizeBy::ByType.by_type() && !OrganizeBy::ByType.by_date());
        assert!(!OrganizeBy::ByDate.by_type() && OrganizeBy::ByDate.by_date());
    }
}
