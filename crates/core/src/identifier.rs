//! Dataset identifiers and image path resolution.
//!
//! Every blob path in the workspace is produced by [`resolve`]. Identifiers
//! arrive from the transport layer with separators possibly percent-encoded,
//! so resolution decodes those escapes once, normalizes separators, rejects
//! anything that could name a location outside the dataset root, and finally
//! checks existing ancestors for symlinks that lead elsewhere.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Percent-escapes of separator characters that the transport may leave in
/// an identifier.
const ENCODED_SEPARATORS: [(&str, char); 4] =
    [("%2F", '/'), ("%2f", '/'), ("%5C", '\\'), ("%5c", '\\')];

/// Longest dataset identifier accepted (a single path component).
const MAX_DATASET_ID_LEN: usize = 255;

/// Validated dataset identifier.
///
/// A dataset identifier is a single directory name below the storage root:
/// it never contains a separator, an encoded separator, or a NUL byte, and it
/// is never empty, `.` or `..`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

impl DatasetId {
    /// Parse and validate a dataset identifier.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidIdentifier(
                "dataset id cannot be empty".to_string(),
            ));
        }
        if id.len() > MAX_DATASET_ID_LEN {
            return Err(Error::InvalidIdentifier(format!(
                "dataset id longer than {MAX_DATASET_ID_LEN} bytes"
            )));
        }
        if id.contains(['/', '\\', '\0']) || decode_separators(&id) != id {
            return Err(Error::InvalidIdentifier(format!(
                "dataset id must be a single path segment: {id:?}"
            )));
        }
        if !is_single_normal_component(&id) {
            return Err(Error::InvalidIdentifier(format!(
                "dataset id is not a plain directory name: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Get the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatasetId({})", self.0)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DatasetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DatasetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DatasetId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<DatasetId> for String {
    fn from(value: DatasetId) -> Self {
        value.0
    }
}

/// Replace encoded separators with the characters they stand for.
///
/// This is a single left-to-right pass: the output is never scanned again,
/// and escapes other than separators are left as they are.
fn decode_separators(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        decoded.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match ENCODED_SEPARATORS
            .iter()
            .find(|(encoded, _)| tail.starts_with(encoded))
        {
            Some((encoded, separator)) => {
                decoded.push(*separator);
                rest = &tail[encoded.len()..];
            }
            None => {
                decoded.push('%');
                rest = &tail[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn is_single_normal_component(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Decode and split an identifier into validated segments.
fn segments(raw: &str) -> Result<Vec<String>> {
    let decoded = decode_separators(raw);

    if decoded.is_empty() {
        return Err(Error::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }
    if decoded.contains('\0') {
        return Err(Error::InvalidIdentifier(format!(
            "identifier contains a NUL byte: {raw:?}"
        )));
    }
    if decoded.starts_with(['/', '\\']) {
        return Err(Error::InvalidIdentifier(format!(
            "absolute identifiers are not allowed: {raw}"
        )));
    }

    decoded
        .split(['/', '\\'])
        .map(|segment| match segment {
            "" => Err(Error::InvalidIdentifier(format!(
                "identifier has an empty segment: {raw}"
            ))),
            "." | ".." => Err(Error::InvalidIdentifier(format!(
                "path traversal not allowed: {raw}"
            ))),
            s if !is_single_normal_component(s) => Err(Error::InvalidIdentifier(format!(
                "contains unsafe path component: {raw}"
            ))),
            s => Ok(s.to_string()),
        })
        .collect()
}

/// Canonical form of an image identifier, with `/` as the only separator.
///
/// Applies the same decoding and validation as [`resolve`] without touching
/// the filesystem, so relational lookups and blob paths agree on one name.
pub fn canonical_identifier(raw: &str) -> Result<String> {
    Ok(segments(raw)?.join("/"))
}

/// Resolve a raw identifier to a path below `root`.
///
/// `root` must be a trusted, existing directory. The returned path is always
/// a descendant of `root`; the file it names may or may not exist.
pub fn resolve(root: &Path, raw: &str) -> Result<PathBuf> {
    let segments = segments(raw)?;
    let path = segments
        .iter()
        .fold(root.to_path_buf(), |path, segment| path.join(segment));

    let root_canonical = root.canonicalize().map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize root {}: {e}", root.display()),
        ))
    })?;

    // The nearest existing entry along the path (the path itself, or one of
    // its ancestors) must not lead out of the root through a symlink.
    let mut candidate = path.as_path();
    loop {
        match std::fs::symlink_metadata(candidate) {
            Ok(meta) => {
                let canonical = candidate.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        Error::InvalidIdentifier(format!(
                            "symlink target missing or invalid: {raw}"
                        ))
                    } else {
                        Error::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(Error::InvalidIdentifier(format!(
                        "resolved path escapes root: {raw}"
                    )));
                }
                break;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::Io(err)),
        }
        if candidate == root {
            break;
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => break,
        }
    }

    Ok(path)
}
