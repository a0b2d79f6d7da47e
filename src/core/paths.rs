//! core::paths
//!
//! Path normalization and the on-disk layout of a document.
//!
//! # Storage Layout
//!
//! Every logical document at canonical path `P` owns three artifacts:
//! - `P` - the canonical file, holding the last fully committed bytes
//! - `<dir>/$<name>.tmp` - the scratch file, present only mid-commit
//! - `P.transaction` - the transaction marker, present only mid-commit
//!
//! **Hard rule:** No code may compute scratch or marker names itself.
//! All artifact paths go through [`DocumentPaths`].
//!
//! # Example
//!
//! ```
//! use docfile::core::paths::DocumentPaths;
//! use std::path::PathBuf;
//!
//! let paths = DocumentPaths::for_canonical(PathBuf::from("/data/counters.json"));
//!
//! assert_eq!(paths.scratch, PathBuf::from("/data/$counters.json.tmp"));
//! assert_eq!(paths.marker, PathBuf::from("/data/counters.json.transaction"));
//! ```

use std::ffi::OsString;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Suffix appended to the canonical path to name the transaction marker.
pub const MARKER_SUFFIX: &str = ".transaction";

/// A canonical absolute path used as the registry key for a document.
///
/// Two `NormalizedPath`s compare equal when they name the same file. On
/// case-insensitive filesystems (Windows, macOS) the comparison key is
/// case-folded; the original spelling is kept for I/O.
#[derive(Debug, Clone)]
pub struct NormalizedPath {
    /// Resolved path used for every filesystem operation.
    path: PathBuf,
    /// Comparison key.
    key: String,
}

impl NormalizedPath {
    /// Resolve `path` against `base_dir` and normalize it.
    ///
    /// Relative paths are joined onto `base_dir` and `.` and `..` components
    /// are removed lexically. The longest existing ancestor of the parent
    /// directory is then canonicalized and the missing components are
    /// re-appended, so the key stays the same once those directories are
    /// created.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the path has no file name component, or any
    /// I/O error from canonicalizing an existing ancestor.
    pub fn resolve(path: &Path, base_dir: &Path) -> io::Result<Self> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        };
        let absolute = std::path::absolute(&joined)?;
        let lexical = normalize_lexically(&absolute);

        let resolved = match (lexical.parent(), lexical.file_name()) {
            (Some(parent), Some(name)) => canonicalize_existing_prefix(parent)?.join(name),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("'{}' does not name a file", path.display()),
                ))
            }
        };

        Ok(Self::from_resolved(resolved))
    }

    fn from_resolved(path: PathBuf) -> Self {
        let key = fold_case(&path.to_string_lossy());
        Self { path, key }
    }

    /// The resolved path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// The comparison key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for NormalizedPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for NormalizedPath {}

impl Hash for NormalizedPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(any(windows, target_os = "macos"))]
fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn fold_case(s: &str) -> String {
    s.to_string()
}

/// Canonicalize the longest existing ancestor of `dir` and re-append the rest.
///
/// `dir` must already be lexically normalized.
fn canonicalize_existing_prefix(dir: &Path) -> io::Result<PathBuf> {
    let mut missing = Vec::new();
    let mut current = dir;
    loop {
        match current.canonicalize() {
            Ok(mut resolved) => {
                resolved.extend(missing.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => match (current.parent(), current.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    current = parent;
                }
                _ => return Ok(dir.to_path_buf()),
            },
            Err(e) => return Err(e),
        }
    }
}

/// Remove `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The three filesystem artifacts of one document.
///
/// # Invariants
///
/// - `scratch` and `marker` live in the same directory as `canonical`, so
///   every rename in the commit protocol stays on one filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPaths {
    /// The canonical file.
    pub canonical: PathBuf,
    /// Staging file written before the swap.
    pub scratch: PathBuf,
    /// Holds the previous committed content while the swap is in flight.
    pub marker: PathBuf,
}

impl DocumentPaths {
    /// Derive the artifact paths for a canonical file.
    pub fn for_canonical(canonical: PathBuf) -> Self {
        let name = canonical
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();

        let mut scratch_name = OsString::from("$");
        scratch_name.push(&name);
        scratch_name.push(".tmp");
        let scratch = canonical.with_file_name(scratch_name);

        let mut marker = canonical.clone().into_os_string();
        marker.push(MARKER_SUFFIX);

        Self {
            canonical,
            scratch,
            marker: PathBuf::from(marker),
        }
    }

    /// Artifact paths for a normalized document path.
    pub fn for_document(path: &NormalizedPath) -> Self {
        Self::for_canonical(path.as_path().to_path_buf())
    }

    /// Directory holding all three artifacts.
    pub fn dir(&self) -> Option<&Path> {
        self.canonical.parent()
    }
}

/// File name stem derived from a Rust type name.
///
/// Module paths are dropped and generic arguments are kept in parentheses,
/// so `alloc::vec::Vec<app::Settings>` becomes `Vec(Settings)`. Characters
/// that are awkward in file names become `_`.
pub fn friendly_type_name(full: &str) -> String {
    fn flush(segment: &mut String, out: &mut String) {
        if let Some(short) = segment.rsplit("::").next() {
            out.push_str(short);
        }
        segment.clear();
    }

    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        match ch {
            c if c.is_alphanumeric() || c == '_' || c == ':' => segment.push(c),
            '<' => {
                flush(&mut segment, &mut out);
                out.push('(');
            }
            '>' => {
                flush(&mut segment, &mut out);
                out.push(')');
            }
            ',' => {
                flush(&mut segment, &mut out);
                out.push(',');
            }
            ' ' => {}
            _ => {
                flush(&mut segment, &mut out);
                out.push('_');
            }
        }
    }
    flush(&mut segment, &mut out);
    out
}
