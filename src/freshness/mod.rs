//! Freshness detection: blake3 fingerprints of a bundle's inputs.
//!
//! A [`Fingerprint`] covers the bundle definition, every resolved content and
//! dependency path, and the bytes of each of those files. A bundle is fresh
//! when its fingerprint equals the one recorded at its last build and the
//! artifact is still on disk.

mod hash;

pub use hash::{ContentHash, VERSION_LEN, compute_file_hash};

use std::io;
use std::path::PathBuf;

use crate::bundle::{Bundle, Resolved};

/// Hash of everything a bundle's output depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// Fingerprint `bundle` with its resolved inputs.
    ///
    /// Fails if an input cannot be read; callers treat that as stale.
    pub fn compute(bundle: &Bundle, resolved: &Resolved) -> io::Result<Self> {
        let mut hasher = blake3::Hasher::new();

        hash_definition(&mut hasher, bundle);

        hasher.update(b"contents\0");
        hash_files(&mut hasher, &resolved.contents)?;
        hasher.update(b"depends\0");
        hash_files(&mut hasher, &resolved.depends)?;

        Ok(Self(ContentHash::new(*hasher.finalize().as_bytes())))
    }
}

fn hash_definition(hasher: &mut blake3::Hasher, bundle: &Bundle) {
    let fields: [(&str, &[String]); 3] = [
        ("contents", &bundle.contents),
        ("depends", &bundle.depends),
        ("filters", &bundle.filters),
    ];

    hasher.update(bundle.name.as_bytes()).update(b"\0");
    hasher.update(bundle.output.as_bytes()).update(b"\0");
    for (label, values) in fields {
        hasher.update(label.as_bytes()).update(b"\0");
        for value in values {
            hasher.update(value.as_bytes()).update(b"\0");
        }
    }
}

fn hash_files(hasher: &mut blake3::Hasher, files: &[PathBuf]) -> io::Result<()> {
    for path in files {
        hasher.update(path.to_string_lossy().as_bytes()).update(b"\0");
        hasher.update(compute_file_hash(path)?.as_bytes());
    }
    Ok(())
}
