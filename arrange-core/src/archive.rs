//! Directory containers.
//!
//! Seal: every file under the source directory is encrypted on its own into a
//! staging mirror tree (`<rel>.encrypted`), a manifest is dropped at the root,
//! and the tree is packed into one zip-compatible file. Open reverses it; a
//! zip without a manifest is handed back as plain extracted content.

use crate::container::manifest::{ArchiveManifest, MANIFEST_NAME};
use crate::crypto::stream::{decrypt_file, discard, encrypt_file};
use crate::error::{ArrangeError, PathContext, Result};
use crate::naming::ENCRYPTED_SUFFIX;
use crate::request::Password;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const LOCAL_HEADER_SIG: &[u8; 4] = b"PK\x03\x04";
const EMPTY_ARCHIVE_SIG: &[u8; 4] = b"PK\x05\x06";

/// Scratch directory owned by exactly one task; removed on drop.
///
/// Named from the source path so no random allocation is needed:
/// `.<output-name>.staging-<blake3(source)[..8] hex>` next to the output.
pub struct Staging {
    path: PathBuf,
    armed: bool,
}

impl Staging {
    pub fn create(source: &Path, output: &Path) -> Result<Self> {
        let digest = blake3::hash(source.as_os_str().as_encoded_bytes());
        let mut name = OsString::from(".");
        name.push(output.file_name().unwrap_or_default());
        name.push(".staging-");
        name.push(hex::encode(&digest.as_bytes()[..8]));
        let path = output.with_file_name(name);
        // a leftover from an interrupted run is ours to reuse
        if path.exists() {
            fs::remove_dir_all(&path).at(&path)?;
        }
        fs::create_dir_all(&path).at(&path)?;
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the staged tree to `dest` and keep it.
    fn promote(mut self, dest: &Path) -> Result<()> {
        fs::rename(&self.path, dest).at(dest)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove staging {}: {}", self.path.display(), e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SealStats {
    pub files: u64,
    pub dirs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opened {
    /// A sealed directory; `files` members were decrypted.
    Directory { files: u64 },
    /// No manifest: contents were extracted as they were.
    Foreign,
}

fn walk_err(root: &Path, e: walkdir::Error) -> ArrangeError {
    let path = e.path().unwrap_or(root).to_path_buf();
    ArrangeError::at(path, e.into())
}

fn relative<'a>(path: &'a Path, root: &Path) -> Result<&'a Path> {
    path.strip_prefix(root)
        .map_err(|_| ArrangeError::Format(format!("{} escapes {}", path.display(), root.display())))
}

/// Zip member name: `/`-joined normal components, UTF-8 only.
fn member_name(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_str().ok_or_else(|| {
                ArrangeError::Format(format!("non UTF-8 name: {}", rel.display()))
            })?),
            _ => return Err(ArrangeError::Format(format!("unusable member path: {}", rel.display()))),
        }
    }
    Ok(parts.join("/"))
}

fn with_suffix(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(ENCRYPTED_SUFFIX);
    PathBuf::from(s)
}

/// Encrypt every regular file under `input_dir` into `staging`, mirroring the tree.
fn stage_mirror(input_dir: &Path, staging: &Path, password: &Password) -> Result<SealStats> {
    let mut stats = SealStats::default();
    for entry in WalkDir::new(input_dir).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| walk_err(input_dir, e))?;
        let rel = relative(entry.path(), input_dir)?;
        let target = staging.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
            stats.dirs += 1;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            encrypt_file(entry.path(), &with_suffix(&target), password)?;
            stats.files += 1;
        } else {
            debug!("skipping non-regular entry {}", entry.path().display());
        }
    }
    Ok(stats)
}

fn write_manifest(staging: &Path, manifest: &ArchiveManifest) -> Result<()> {
    let bytes = serde_json::to_vec(manifest)
        .map_err(|e| ArrangeError::Format(format!("manifest encode: {e}")))?;
    let path = staging.join(MANIFEST_NAME);
    fs::write(&path, bytes).at(&path)
}

// members are ciphertext already; deflate would not gain anything
fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
}

/// Pack the tree under `root` into a new zip file at `output`.
fn pack_tree(root: &Path, output: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .at(output)?;
    let mut zip = ZipWriter::new(file);

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_err(root, e))?;
        let name = member_name(relative(entry.path(), root)?)?;
        if entry.file_type().is_dir() {
            zip.add_directory(name, stored())?;
        } else {
            let len = entry.metadata().map_err(|e| walk_err(root, e))?.len();
            zip.start_file(name, stored().large_file(len >= u32::MAX as u64))?;
            let mut src = File::open(entry.path()).at(entry.path())?;
            std::io::copy(&mut src, &mut zip).at(entry.path())?;
        }
    }
    zip.finish()?;
    Ok(())
}

/// Seal `input_dir` into a single container at `output`.
///
/// `output` must not exist. The staging tree is removed whether or not
/// sealing succeeds; a partially written container is removed on failure.
pub fn seal_directory(input_dir: &Path, output: &Path, password: &Password) -> Result<SealStats> {
    let name = input_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let staging = Staging::create(input_dir, output)?;
    let stats = stage_mirror(input_dir, staging.path(), password)?;
    write_manifest(staging.path(), &ArchiveManifest::directory(name))?;
    if let Err(e) = pack_tree(staging.path(), output) {
        discard(output);
        return Err(e);
    }
    debug!(
        "sealed {} ({} files, {} dirs)",
        input_dir.display(),
        stats.files,
        stats.dirs
    );
    Ok(stats)
}

/// Open `path` as a zip archive if it carries a zip signature and parses as one.
///
/// `Ok(None)` means "not an archive": treat it as a single-file container.
pub fn probe(path: &Path) -> Result<Option<ZipArchive<File>>> {
    let mut f = File::open(path).at(path)?;
    let mut sig = [0u8; 4];
    match f.read_exact(&mut sig) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ArrangeError::at(path, e)),
    }
    if &sig != LOCAL_HEADER_SIG && &sig != EMPTY_ARCHIVE_SIG {
        return Ok(None);
    }
    // ZipArchive locates the central directory itself, position does not matter
    match ZipArchive::new(f) {
        Ok(zip) => Ok(Some(zip)),
        Err(e) => {
            debug!("{} has a zip signature but is not an archive: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// A staged tree is a sealed directory when the manifest file is present.
///
/// The manifest body is only read for logging; an unreadable or unexpected
/// one does not change the decision.
fn has_manifest(staging: &Path, input: &Path) -> bool {
    let path = staging.join(MANIFEST_NAME);
    if !path.is_file() {
        return false;
    }
    let parsed = fs::read(&path)
        .map_err(|e| e.to_string())
        .and_then(|b| serde_json::from_slice::<ArchiveManifest>(&b).map_err(|e| e.to_string()));
    match parsed {
        Ok(m) if m.is_directory() => {
            debug!("{} is a sealed directory ({})", input.display(), m.name)
        }
        Ok(m) => warn!("{} manifest has kind {:?}, opening as a directory", input.display(), m.kind),
        Err(e) => warn!("{} manifest unreadable ({}), opening as a directory", input.display(), e),
    }
    true
}

/// Decrypt every `*.encrypted` member of the staged tree into `output_dir`.
fn restore_tree(staging: &Path, output_dir: &Path, password: &Password) -> Result<u64> {
    let mut files = 0;
    for entry in WalkDir::new(staging).min_depth(1) {
        let entry = entry.map_err(|e| walk_err(staging, e))?;
        let rel = relative(entry.path(), staging)?;
        if rel == Path::new(MANIFEST_NAME) {
            continue;
        }
        let target = output_dir.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        match name.strip_suffix(ENCRYPTED_SUFFIX) {
            Some(plain) if !plain.is_empty() => {
                let dest = target.with_file_name(plain);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).at(parent)?;
                }
                decrypt_file(entry.path(), &dest, password)?;
                files += 1;
            }
            _ => debug!("skipping non-container member {}", rel.display()),
        }
    }
    Ok(files)
}

fn discard_dir(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove partial output {}: {}", path.display(), e),
    }
}

/// Open a container previously recognised by [`probe`] into `output_dir`.
///
/// `output_dir` must not exist. With a manifest present each member is
/// decrypted; without one the extracted tree is moved into place unchanged.
pub fn open_container(
    mut zip: ZipArchive<File>,
    input: &Path,
    output_dir: &Path,
    password: &Password,
) -> Result<Opened> {
    let staging = Staging::create(input, output_dir)?;
    zip.extract(staging.path())?;

    if !has_manifest(staging.path(), input) {
        debug!("{} has no directory manifest, extracting as-is", input.display());
        staging.promote(output_dir)?;
        return Ok(Opened::Foreign);
    }
    fs::create_dir(output_dir).at(output_dir)?;
    match restore_tree(staging.path(), output_dir, password) {
        Ok(files) => Ok(Opened::Directory { files }),
        Err(e) => {
            discard_dir(output_dir);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_names_use_forward_slashes() {
        let rel = Path::new("sub").join("deeper").join("b.txt.encrypted");
        assert_eq!(member_name(&rel).unwrap(), "sub/deeper/b.txt.encrypted");
    }

    #[test]
    fn member_names_reject_parent_components() {
        assert!(member_name(Path::new("../evil")).is_err());
    }

    #[test]
    fn staging_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photos");
        let out = dir.path().join("photos.encrypted");
        let staged = {
            let s = Staging::create(&src, &out).unwrap();
            fs::write(s.path().join("x"), b"1").unwrap();
            s.path().to_path_buf()
        };
        assert!(!staged.exists());
        assert!(
            staged
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".photos.encrypted.staging-")
        );
    }

    #[test]
    fn staging_name_is_stable_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("o");
        let a = Staging::create(&dir.path().join("a"), &out).unwrap().path().to_path_buf();
        let b = Staging::create(&dir.path().join("a"), &out).unwrap().path().to_path_buf();
        let c = Staging::create(&dir.path().join("c"), &out).unwrap().path().to_path_buf();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[cfg(unix)]
    #[test]
    fn staging_keeps_raw_output_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(OsStr::from_bytes(b"caf\xE9.encrypted"));
        let s = Staging::create(&dir.path().join("src"), &out).unwrap();
        let name = s.path().file_name().unwrap().as_bytes();
        assert!(name.starts_with(b".caf\xE9.encrypted.staging-"));
        assert!(s.path().is_dir());
    }

    #[test]
    fn manifest_presence_decides_directory_mode() {
        let dir = tempfile::tempdir().unwrap();
        let password = Password::new("pw");
        let tree = dir.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(tree.join(MANIFEST_NAME), b"not json at all").unwrap();
        let plain = dir.path().join("a.txt");
        fs::write(&plain, b"alpha").unwrap();
        encrypt_file(&plain, &tree.join("a.txt.encrypted"), &password).unwrap();

        let container = dir.path().join("odd.zip");
        pack_tree(&tree, &container).unwrap();
        let zip = probe(&container).unwrap().expect("zip");
        let out = dir.path().join("opened");
        let opened = open_container(zip, &container, &out, &password).unwrap();

        assert_eq!(opened, Opened::Directory { files: 1 });
        assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"alpha");
        assert!(!out.join(MANIFEST_NAME).exists());
    }

    #[test]
    fn probe_ignores_short_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let short = dir.path().join("short");
        fs::write(&short, b"PK").unwrap();
        assert!(probe(&short).unwrap().is_none());

        let fake = dir.path().join("fake");
        fs::write(&fake, b"PK\x03\x04 definitely not a zip").unwrap();
        assert!(probe(&fake).unwrap().is_none());
    }
}
