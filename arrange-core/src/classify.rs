use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Images,
    Videos,
    Audio,
    Documents,
    Pdf,
    Excel,
    PowerPoint,
    Text,
    Archives,
    Code,
    Executables,
    Apk,
    OneNote,
    Encrypted,
    Others,
}

impl Category {
    /// Folder label used under `Organized by Type`.
    pub fn label(self) -> &'static str {
        match self {
            Category::Images => "Images",
            Category::Videos => "Videos",
            Category::Audio => "Audio",
            Category::Documents => "Documents",
            Category::Pdf => "PDF",
            Category::Excel => "Excel",
            Category::PowerPoint => "PowerPoint",
            Category::Text => "Text",
            Category::Archives => "Archives",
            Category::Code => "Code",
            Category::Executables => "Executables",
            Category::Apk => "APK",
            Category::OneNote => "OneNote",
            Category::Encrypted => "Encrypted",
            Category::Others => "Others",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extension table, lower-case and without the leading dot.
const TABLE: &[(Category, &[&str])] = &[
    (
        Category::Images,
        &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "svg", "ico", "heic"],
    ),
    (
        Category::Videos,
        &["mp4", "avi", "mov", "wmv", "flv", "mkv", "webm", "m4v", "3gp", "mpeg"],
    ),
    (
        Category::Audio,
        &["mp3", "wav", "ogg", "flac", "aac", "wma", "m4a", "opus"],
    ),
    (Category::Documents, &["doc", "docx", "odt"]),
    (Category::Pdf, &["pdf"]),
    (Category::Excel, &["xls", "xlsx", "csv", "ods"]),
    (Category::PowerPoint, &["ppt", "pptx", "odp", "key"]),
    (Category::Text, &["txt", "rtf", "md"]),
    (
        Category::Archives,
        &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso"],
    ),
    (
        Category::Code,
        &[
            "py", "js", "html", "css", "java", "cpp", "c", "h", "php", "rb", "go", "ts", "json",
            "xml",
        ],
    ),
    (
        Category::Executables,
        &["exe", "msi", "app", "dmg", "deb", "rpm"],
    ),
    (Category::Apk, &["apk"]),
    (Category::OneNote, &["one", "onetoc2"]),
    (Category::Encrypted, &["encrypted", "enc", "aes"]),
];

// keyed by lower-cased extension; "" stands for "no extension"
static MEMO: LazyLock<DashMap<String, Category>> = LazyLock::new(DashMap::new);

/// Category of `path`, decided by its extension alone.
pub fn classify(path: &Path) -> Category {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if let Some(hit) = MEMO.get(&ext) {
        return *hit;
    }
    let cat = lookup(&ext);
    MEMO.insert(ext, cat);
    cat
}

fn lookup(ext: &str) -> Category {
    if ext.is_empty() {
        return Category::Others;
    }
    TABLE
        .iter()
        .find(|(_, exts)| exts.contains(&ext))
        .map(|(cat, _)| *cat)
        .unwrap_or(Category::Others)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(classify(Path::new("a.JPG")), classify(Path::new("a.jpg")));
        assert_eq!(classify(Path::new("holiday.Jpeg")), Category::Images);
        assert_eq!(classify(Path::new("/tmp/REPORT.PDF")), Category::Pdf);
    }

    #[test]
    fn unknown_or_missing_extension_is_others() {
        assert_eq!(classify(Path::new("Makefile")), Category::Others);
        assert_eq!(classify(Path::new("blob.xyz")), Category::Others);
        assert_eq!(classify(Path::new(".bashrc")), Category::Others);
        assert_eq!(classify(Path::new("")), Category::Others);
    }

    #[test]
    fn only_last_extension_counts() {
        assert_eq!(classify(Path::new("notes.txt.encrypted")), Category::Encrypted);
        assert_eq!(classify(Path::new("backup.tar.gz")), Category::Archives);
    }

    #[test]
    fn every_table_row_maps_back_to_its_category() {
        for (cat, exts) in TABLE {
            for ext in *exts {
                let name = format!("file.{ext}");
                assert_eq!(classify(Path::new(&name)), *cat, "{name}");
            }
        }
    }

    #[test]
    fn extensions_are_unique_across_categories() {
        let mut seen = std::collections::HashSet::new();
        for (_, exts) in TABLE {
            for ext in *exts {
                assert!(seen.insert(*ext), "duplicate extension {ext}");
            }
        }
    }

    #[test]
    fn labels_match_folder_names() {
        assert_eq!(Category::Pdf.to_string(), "PDF");
        assert_eq!(Category::Apk.to_string(), "APK");
        assert_eq!(Category::Others.label(), "Others");
    }

    #[cfg(unix)]
    #[test]
    fn raw_byte_stem_still_classifies_by_extension() {
        use std::os::unix::ffi::OsStrExt;
        let name = std::ffi::OsStr::from_bytes(b"caf\xE9.TXT");
        assert_eq!(classify(Path::new(name)), Category::Text);
    }
}
