use crate::error::{Result, SyncError};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;

/// Git blob SHA of raw bytes: sha1("blob " + len + NUL + bytes)
pub fn git_blob_sha(content: &[u8]) -> String {
    let header = format!("blob {}\0", content.len());

    let mut hasher = Sha1::new();
    hasher.update(header.as_bytes());
    hasher.update(content);

    hex::encode(hasher.finalize())
}

/// Compute git blob SHA for a file (same format git uses)
pub fn compute_git_blob_sha(path: &Path) -> Result<String> {
    let content = fs::read(path).map_err(|e| SyncError::io(path, e))?;
    Ok(git_blob_sha(&content))
}

/// Whether a local file's content matches a remote object hash.
///
/// A missing remote hash or an unreadable file never matches.
pub fn matches_remote(path: &Path, remote_sha: Option<&str>) -> bool {
    let Some(remote_sha) = remote_sha else {
        return false;
    };
    match compute_git_blob_sha(path) {
        Ok(local) => local.eq_ignore_ascii_case(remote_sha),
        Err(e) => {
            tracing::warn!("Hash check failed for {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_hashes_like_bare_blob_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.png");
        fs::write(&path, b"").unwrap();

        let mut hasher = Sha1::new();
        hasher.update(b"blob 0\0");
        let expected = hex::encode(hasher.finalize());

        assert_eq!(compute_git_blob_sha(&path).unwrap(), expected);
        assert_eq!(expected, "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn matches_git_hash_object() {
        // `echo hello | git hash-object --stdin`
        assert_eq!(
            git_blob_sha(b"hello\n"),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn line_endings_are_hashed_verbatim() {
        assert_ne!(git_blob_sha(b"a\r\nb\r\n"), git_blob_sha(b"a\nb\n"));
    }

    #[test]
    fn missing_file_or_hash_never_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tex.png");
        assert!(!matches_remote(&path, Some("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391")));
        fs::write(&path, b"").unwrap();
        assert!(!matches_remote(&path, None));
        assert!(matches_remote(&path, Some("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391")));
    }
}
