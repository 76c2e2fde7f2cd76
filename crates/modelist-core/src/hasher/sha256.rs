use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Stream a file through SHA-256 and return the lowercase hex digest.
///
/// Reads in fixed-size chunks so large meshes never have to fit in memory.
pub async fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_hash_matches_known_digest() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("abc.stl");
        std::fs::write(&path, b"abc").unwrap();

        let digest = hash_file(&path).await.unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_hash_spans_multiple_reads() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.stl");
        let b = tmp.path().join("b.stl");
        let mut content = vec![0xAAu8; READ_BUFFER_SIZE * 3 + 17];
        std::fs::write(&a, &content).unwrap();
        *content.last_mut().unwrap() = 0xAB;
        std::fs::write(&b, &content).unwrap();

        let digest_a = hash_file(&a).await.unwrap();
        let digest_b = hash_file(&b).await.unwrap();
        assert_eq!(digest_a.len(), 64);
        assert_ne!(digest_a, digest_b);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = hash_file(&tmp.path().join("gone.stl")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
