//! SHA-256 verification of downloaded archives.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, AssetError};

/// Streamed hex SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<String, AssetError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare against `expected` (case-insensitive hex). Returns the actual digest.
pub fn verify(path: &Path, expected: &str) -> Result<String, AssetError> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(AssetError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        });
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("abc")
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn digest_of_known_input() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.zip");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), ABC);
    }

    #[test]
    fn verify_accepts_uppercase_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.zip");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(verify(&path, &ABC.to_uppercase()).unwrap(), ABC);
    }

    #[test]
    fn verify_reports_mismatch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.zip");
        std::fs::write(&path, b"abd").unwrap();
        let err = verify(&path, ABC).unwrap_err();
        match err {
            AssetError::ChecksumMismatch { expected, actual, .. } => {
                assert_eq!(expected, ABC);
                assert_ne!(actual, ABC);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
