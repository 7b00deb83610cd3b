use dashmap::DashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

pub const ENCRYPTED_SUFFIX: &str = ".encrypted";
pub const DECRYPTED_PREFIX: &str = "decrypted_";

/// Split a file name into stem and extension (extension without its dot).
///
/// Leading dots never start an extension, so `.bashrc` has none and
/// `archive.tar.gz` splits into `archive.tar` + `gz`. Works on raw
/// `OsStr` so names that are not UTF-8 survive untouched.
pub fn split_name(name: &OsStr) -> (&OsStr, Option<&OsStr>) {
    let p = Path::new(name);
    match (p.file_stem(), p.extension()) {
        (Some(stem), Some(ext)) => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// `<stem>_<n>.<ext>`
fn numbered(stem: &OsStr, n: u32, ext: Option<&OsStr>) -> OsString {
    let mut out = stem.to_os_string();
    out.push(format!("_{n}"));
    if let Some(ext) = ext {
        out.push(".");
        out.push(ext);
    }
    out
}

#[cfg(unix)]
fn strip_prefix_os<'a>(s: &'a OsStr, prefix: &str) -> Option<&'a OsStr> {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes()
        .strip_prefix(prefix.as_bytes())
        .map(OsStr::from_bytes)
}

#[cfg(not(unix))]
fn strip_prefix_os<'a>(s: &'a OsStr, prefix: &str) -> Option<&'a OsStr> {
    s.to_str()?.strip_prefix(prefix).map(OsStr::new)
}

/// Paths handed out during one batch.
///
/// The on-disk existence check alone is check-then-act; claiming the chosen
/// name here keeps two workers of the same batch from picking the same one.
#[derive(Debug, Default)]
pub struct NameClaims {
    taken: DashSet<PathBuf>,
}

impl NameClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when another task already owns `path`.
    pub fn claim(&self, path: &Path) -> bool {
        self.taken.insert(path.to_path_buf())
    }
}

fn occupied(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// First free path produced by `candidate(0)`, `candidate(1)`, ...
///
/// `candidate(0)` is the undecorated name.
pub fn first_free(claims: Option<&NameClaims>, mut candidate: impl FnMut(u32) -> PathBuf) -> PathBuf {
    let mut n = 0u32;
    loop {
        let p = candidate(n);
        if !occupied(&p) && claims.map_or(true, |c| c.claim(&p)) {
            return p;
        }
        n += 1;
    }
}

/// `dir/name`, or `dir/<stem>_<n>.<ext>` when that is taken.
pub fn resolve_in_dir(dir: &Path, file_name: &OsStr, claims: Option<&NameClaims>) -> PathBuf {
    let (stem, ext) = split_name(file_name);
    first_free(claims, |n| {
        if n == 0 {
            dir.join(file_name)
        } else {
            dir.join(numbered(stem, n, ext))
        }
    })
}

/// Container path for `source`: `<source>.encrypted`, then `<stem>_<n>.<ext>.encrypted`.
pub fn resolve_encrypt_output(source: &Path, claims: Option<&NameClaims>) -> PathBuf {
    let name = source.file_name().unwrap_or_default();
    let (stem, ext) = split_name(name);
    first_free(claims, |n| {
        let mut out = if n == 0 {
            name.to_os_string()
        } else {
            numbered(stem, n, ext)
        };
        out.push(ENCRYPTED_SUFFIX);
        source.with_file_name(out)
    })
}

/// Plain path for a container: strip `.encrypted`, else prefix `decrypted_`.
/// Taken names become `decrypted_<n>_<stem>.<ext>`.
pub fn resolve_decrypt_output(source: &Path, claims: Option<&NameClaims>) -> PathBuf {
    let name = source.file_name().unwrap_or_default();
    let base = match split_name(name) {
        (stem, Some(ext)) if ext == ENCRYPTED_SUFFIX.trim_start_matches('.') => stem.to_os_string(),
        _ => {
            let mut prefixed = OsString::from(DECRYPTED_PREFIX);
            prefixed.push(name);
            prefixed
        }
    };
    let (stem, ext) = split_name(&base);
    let bare = strip_prefix_os(stem, DECRYPTED_PREFIX).unwrap_or(stem);
    first_free(claims, |n| {
        if n == 0 {
            source.with_file_name(&base)
        } else {
            let mut out = OsString::from(DECRYPTED_PREFIX);
            out.push(numbered(bare, n, ext));
            source.with_file_name(out)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn split(name: &str) -> (&str, Option<&str>) {
        let (stem, ext) = split_name(OsStr::new(name));
        (stem.to_str().unwrap(), ext.map(|e| e.to_str().unwrap()))
    }

    #[test]
    fn split_name_follows_last_dot() {
        assert_eq!(split("report.txt"), ("report", Some("txt")));
        assert_eq!(split("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split("README"), ("README", None));
        assert_eq!(split(".bashrc"), (".bashrc", None));
        assert_eq!(split("..hidden.cfg"), ("..hidden", Some("cfg")));
        assert_eq!(split("trailing."), ("trailing", Some("")));
        assert_eq!(split(""), ("", None));
    }

    #[test]
    fn copy_destination_counts_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.txt"), b"x").unwrap();

        let first = resolve_in_dir(dir.path(), OsStr::new("report.txt"), None);
        assert_eq!(first, dir.path().join("report_1.txt"));
        fs::write(&first, b"y").unwrap();

        let second = resolve_in_dir(dir.path(), OsStr::new("report.txt"), None);
        assert_eq!(second, dir.path().join("report_2.txt"));
    }

    #[test]
    fn claims_keep_concurrent_picks_apart() {
        let dir = tempfile::tempdir().unwrap();
        let claims = NameClaims::new();
        let a = resolve_in_dir(dir.path(), OsStr::new("photo.jpg"), Some(&claims));
        let b = resolve_in_dir(dir.path(), OsStr::new("photo.jpg"), Some(&claims));
        assert_eq!(a, dir.path().join("photo.jpg"));
        assert_eq!(b, dir.path().join("photo_1.jpg"));
    }

    #[test]
    fn encrypt_output_inserts_counter_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("notes.txt");
        assert_eq!(
            resolve_encrypt_output(&src, None),
            dir.path().join("notes.txt.encrypted")
        );
        fs::write(dir.path().join("notes.txt.encrypted"), b"").unwrap();
        assert_eq!(
            resolve_encrypt_output(&src, None),
            dir.path().join("notes_1.txt.encrypted")
        );
    }

    #[test]
    fn decrypt_output_strips_or_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_decrypt_output(&dir.path().join("a.txt.encrypted"), None),
            dir.path().join("a.txt")
        );
        assert_eq!(
            resolve_decrypt_output(&dir.path().join("blob.bin"), None),
            dir.path().join("decrypted_blob.bin")
        );
    }

    #[test]
    fn decrypt_counter_lives_inside_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt.encrypted");
        fs::write(dir.path().join("a.txt"), b"").unwrap();
        let first = resolve_decrypt_output(&src, None);
        assert_eq!(first, dir.path().join("decrypted_1_a.txt"));
        fs::write(&first, b"").unwrap();
        assert_eq!(
            resolve_decrypt_output(&src, None),
            dir.path().join("decrypted_2_a.txt")
        );

        let foreign = dir.path().join("blob.bin");
        fs::write(dir.path().join("decrypted_blob.bin"), b"").unwrap();
        assert_eq!(
            resolve_decrypt_output(&foreign, None),
            dir.path().join("decrypted_1_blob.bin")
        );
    }

    #[cfg(unix)]
    #[test]
    fn raw_byte_names_are_kept_verbatim() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let raw = OsStr::from_bytes(b"caf\xE9.txt");
        let dir = PathBuf::from("/nowhere-arrange-test");
        assert_eq!(split_name(raw).1, Some(OsStr::new("txt")));

        let claims = NameClaims::new();
        assert_eq!(resolve_in_dir(&dir, raw, Some(&claims)), dir.join(raw));
        assert_eq!(
            resolve_in_dir(&dir, raw, Some(&claims)),
            dir.join(OsStr::from_bytes(b"caf\xE9_1.txt"))
        );

        let sealed = resolve_encrypt_output(&dir.join(raw), None);
        assert_eq!(
            sealed.file_name().unwrap().as_bytes(),
            b"caf\xE9.txt.encrypted"
        );
        assert_eq!(resolve_decrypt_output(&sealed, None), dir.join(raw));

        let claims = NameClaims::new();
        claims.claim(&dir.join(raw));
        let again = resolve_decrypt_output(&sealed, Some(&claims));
        assert_eq!(
            again.file_name().unwrap().to_os_string().into_vec(),
            b"decrypted_1_caf\xE9.txt".to_vec()
        );

        // two different raw names must not collapse into one
        let other = OsStr::from_bytes(b"caf\xE8.txt");
        assert_ne!(
            resolve_encrypt_output(&dir.join(raw), None),
            resolve_encrypt_output(&dir.join(other), None)
        );
    }
}
