//! Music library: recursive scan + keyword search.
//!
//! The scan builds an index-stable arena of directories and files; a
//! [`FileId`] stays valid for the library's lifetime and is small enough
//! to travel through event records. Queries match keywords against the
//! directory name and the file name together, so "artist song" finds a
//! track whose artist only appears in the folder name.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::search::SearchEngine;

/// Filename-extension check is all we do; the decoder is the real judge.
const AUDIO_EXTENSIONS: &[&str] = &["aac", "flac", "m4a", "mp3", "ogg", "wav", "wma"];

/// Sidecar image names checked for cover art, in preference order.
const COVER_FILENAMES: &[&str] = &[
    "albumart.jpg",
    "albumart.jpeg",
    "albumart.png",
    "cover.jpg",
    "cover.jpeg",
    "cover.png",
];

/// Stable handle to one library file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u32);

impl FileId {
    /// Wire representation (event records carry file ids as `u32`).
    pub fn to_u32(self) -> u32 {
        self.0
    }

    pub fn from_u32(raw: u32) -> Self {
        Self(raw)
    }
}

struct DirEntry {
    /// Path relative to the library root; empty for the root itself.
    base: String,
}

struct FileEntry {
    dir: u32,
    name: String,
}

/// The scanned music library.
pub struct Library {
    root: PathBuf,
    dirs: Vec<DirEntry>,
    files: Vec<FileEntry>,
}

impl Library {
    /// Recursively scan `root` for audio files.
    ///
    /// Directories without any audio files are not recorded.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::library(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut dirs: Vec<DirEntry> = Vec::new();
        let mut files: Vec<FileEntry> = Vec::new();
        let mut dir_index: HashMap<PathBuf, u32> = HashMap::new();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !has_audio_extension(path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let parent = path.parent().unwrap_or(root);
            let rel = parent.strip_prefix(root).unwrap_or(Path::new(""));
            let dir = *dir_index.entry(rel.to_path_buf()).or_insert_with(|| {
                dirs.push(DirEntry {
                    base: rel.to_string_lossy().into_owned(),
                });
                (dirs.len() - 1) as u32
            });
            files.push(FileEntry {
                dir,
                name: name.to_string(),
            });
        }

        tracing::info!(
            "Scanned {}: {} files in {} directories.",
            root.display(),
            files.len(),
            dirs.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            dirs,
            files,
        })
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Find every file whose directory name and file name together contain
    /// all space-separated keywords. Results are in natural order
    /// (directory first, then file name).
    pub fn find(&self, keyword: &str) -> Result<Vec<FileId>> {
        let engine = SearchEngine::new(keyword, Some(' '))?;

        // Directory names repeat for every file they contain; match each
        // one once.
        let mut dir_matches = Vec::with_capacity(self.dirs.len());
        for dir in &self.dirs {
            dir_matches.push(engine.find_all(&dir.base));
        }

        let mut selection: Vec<FileId> = Vec::new();
        for (index, file) in self.files.iter().enumerate() {
            let file_match = engine.find_all(&file.name);
            if engine.matches_all(dir_matches[file.dir as usize] | file_match) {
                selection.push(FileId(index as u32));
            }
        }

        selection.sort_by(|&a, &b| {
            let fa = &self.files[a.0 as usize];
            let fb = &self.files[b.0 as usize];
            natural_cmp(&self.dirs[fa.dir as usize].base, &self.dirs[fb.dir as usize].base)
                .then_with(|| natural_cmp(&fa.name, &fb.name))
        });
        Ok(selection)
    }

    /// Absolute path of a file. `None` for a stale or foreign id.
    pub fn path(&self, id: FileId) -> Option<PathBuf> {
        let file = self.files.get(id.0 as usize)?;
        let base = &self.dirs[file.dir as usize].base;
        let mut path = self.root.clone();
        if !base.is_empty() {
            path.push(base);
        }
        path.push(&file.name);
        Some(path)
    }

    /// Display name of a file.
    pub fn name(&self, id: FileId) -> Option<&str> {
        self.files.get(id.0 as usize).map(|f| f.name.as_str())
    }

    /// Cover art sidecar next to the file, if any.
    pub fn cover_path(&self, id: FileId) -> Option<PathBuf> {
        let file = self.files.get(id.0 as usize)?;
        let base = &self.dirs[file.dir as usize].base;
        let mut dir = self.root.clone();
        if !base.is_empty() {
            dir.push(base);
        }
        COVER_FILENAMES.iter().find_map(|candidate| {
            let path = dir.join(candidate);
            path.is_file().then_some(path)
        })
    }
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Compare strings the way a human sorts track listings: runs of digits
/// compare by numeric value (leading zeros ignored), everything else byte
/// by byte.
pub(crate) fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            while i < a.len() && a[i] == b'0' {
                i += 1;
            }
            while j < b.len() && b[j] == b'0' {
                j += 1;
            }
            let start_a = i;
            let start_b = j;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            // Same digit count: lexicographic equals numeric. Different:
            // the longer run is the bigger number.
            match (i - start_a)
                .cmp(&(j - start_b))
                .then_with(|| a[start_a..i].cmp(&b[start_b..j]))
            {
                Ordering::Equal => {}
                other => return other,
            }
        } else {
            if a[i] != b[j] {
                return a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}
