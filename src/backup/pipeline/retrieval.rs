use crate::backup::compress::{decompress, ArchiveFormat};
use crate::backup::encrypt::Cipher;
use crate::backup::file_ext::{has_ext, remove_path, strip_ext, ENC_EXT};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::storage::{join_key, list_prefix, ObjectStorage};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which object a restore starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Latest,
    Key(String),
}

/// Newest `.enc` key. Keys embed a fixed-width timestamp, so the
/// lexicographic maximum is the most recent one.
pub fn resolve_latest<'a, I: IntoIterator<Item = &'a str>>(keys: I) -> Option<&'a str> {
    keys.into_iter()
        .filter(|k| !k.ends_with('/') && has_ext(k, ENC_EXT))
        .max()
}

pub fn resolve_key(storage: &dyn ObjectStorage, prefix: &str, selector: &Selector) -> Result<String> {
    match selector {
        Selector::Key(key) if key.starts_with(&list_prefix(prefix)) => Ok(key.clone()),
        Selector::Key(key) => Ok(join_key(prefix, key)),
        Selector::Latest => {
            let objects = storage
                .list(&list_prefix(prefix))
                .with_msg(format!("Listing {prefix:?} on {} failed", storage.name()))?;
            resolve_latest(objects.iter().map(|o| o.key.as_str()))
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::storage(format!(
                        "no encrypted artifact under {prefix:?} on {}",
                        storage.name()
                    ))
                })
        }
    }
}

/// Fetches `key` into `staging` and returns a path the restore driver can
/// consume: decrypted, and decompressed unless `keep_compressed` is set.
/// Intermediate files are removed along the way.
pub fn retrieve(
    storage: &dyn ObjectStorage,
    cipher: &Cipher,
    key: &str,
    staging: &Path,
    keep_compressed: bool,
) -> Result<PathBuf> {
    let source = storage.name();
    let file_name = Path::new(key)
        .file_name()
        .ok_or_else(|| Error::storage(format!("key {key:?} has no file name")))?;
    let encrypted = staging.join(file_name);
    let decrypted = strip_ext(&encrypted, ENC_EXT)
        .ok_or_else(|| Error::codec(format!("{key:?} is not an encrypted artifact")))?;

    storage.download(key, &encrypted)?;
    let decrypt_res = cipher.decrypt_file(&encrypted, &decrypted);
    discard(source, &encrypted);
    decrypt_res?;
    info!(source, "Fetched and decrypted {} to {:?}", key, decrypted);

    let format = ArchiveFormat::detect(&decrypted)
        .filter(|f| matches!(f, ArchiveFormat::TarGz | ArchiveFormat::Gz));
    let (Some(format), false) = (format, keep_compressed) else {
        return Ok(decrypted);
    };

    let output = format
        .output_path(&decrypted)
        .ok_or_else(|| Error::codec(format!("cannot derive output name from {decrypted:?}")))?;
    let res = decompress(&decrypted, &output);
    discard(source, &decrypted);
    res
}

fn discard(source: &str, path: &Path) {
    if let Err(e) = remove_path(path) {
        warn!(source, "Failed to remove {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::compress::compress;
    use crate::backup::encrypt::StaticKeyProvider;
    use crate::backup::storage::memory::MemoryStorage;
    use chrono::Duration;
    use tempfile::TempDir;

    fn cipher() -> Cipher {
        Cipher::new(&StaticKeyProvider::new(vec![8u8; 16])).unwrap()
    }

    #[test]
    fn test_latest_resolution() {
        let keys = ["b-20240101_000000.enc", "b-20240102_000000.enc", "b-20231231_235959.enc"];
        assert_eq!(resolve_latest(keys), Some("b-20240102_000000.enc"));
        assert_eq!(resolve_latest(["p/", "p/readme.txt"]), None);
    }

    #[test]
    fn test_resolve_key_from_storage() {
        let storage = MemoryStorage::new("t");
        for k in ["b-20240101_000000.enc", "b-20240102_000000.enc", "b-20231231_235959.enc"] {
            storage.put(&format!("p/{k}"), b"x", "STANDARD", Duration::zero());
        }
        storage.put("p/zzz-notes.txt", b"x", "STANDARD", Duration::zero());
        storage.put("pz/b-20990101_000000.enc", b"x", "STANDARD", Duration::zero());

        assert_eq!(
            resolve_key(&storage, "p", &Selector::Latest).unwrap(),
            "p/b-20240102_000000.enc"
        );
        assert_eq!(
            resolve_key(&storage, "p", &Selector::Key("b-20240101_000000.enc".into())).unwrap(),
            "p/b-20240101_000000.enc"
        );
        assert_eq!(
            resolve_key(&storage, "p", &Selector::Key("p/b-20240101_000000.enc".into())).unwrap(),
            "p/b-20240101_000000.enc"
        );
        assert!(resolve_key(&storage, "empty", &Selector::Latest).is_err());
    }

    #[test]
    fn test_retrieve_directory_artifact() {
        let work = TempDir::new().unwrap();
        let src = work.path().join("site-www-20240101_000000");
        std::fs::create_dir_all(src.join("css")).unwrap();
        std::fs::write(src.join("index.html"), "<html/>").unwrap();
        std::fs::write(src.join("css/site.css"), "body{}").unwrap();
        let packed = compress(&src).unwrap();
        let c = cipher();
        let sealed = c.encrypt(&std::fs::read(&packed).unwrap()).unwrap();

        let storage = MemoryStorage::new("t");
        let key = "p/site-www-20240101_000000.tar.gz.enc";
        storage.put(key, &sealed, "STANDARD", Duration::zero());

        let staging = TempDir::new().unwrap();
        let restored = retrieve(&storage, &c, key, staging.path(), false).unwrap();
        assert_eq!(restored, staging.path().join("site-www-20240101_000000"));
        assert_eq!(std::fs::read_to_string(restored.join("css/site.css")).unwrap(), "body{}");
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_retrieving_same_key_twice_replaces_the_tree() {
        let work = TempDir::new().unwrap();
        let src = work.path().join("site-www-20240101_000000");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("index.html"), "v1").unwrap();
        let packed = compress(&src).unwrap();
        let c = cipher();

        let storage = MemoryStorage::new("t");
        let key = "p/site-www-20240101_000000.tar.gz.enc";
        storage.put(key, &c.encrypt(&std::fs::read(&packed).unwrap()).unwrap(), "STANDARD", Duration::zero());

        let staging = TempDir::new().unwrap();
        let first = retrieve(&storage, &c, key, staging.path(), false).unwrap();
        std::fs::write(first.join("index.html"), "edited by restore").unwrap();
        std::fs::write(first.join("leftover.txt"), "x").unwrap();

        let second = retrieve(&storage, &c, key, staging.path(), false).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(second.join("index.html")).unwrap(), "v1");
        assert!(!second.join("leftover.txt").exists());
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_retrieve_keeps_compressed_when_asked() {
        let c = cipher();
        let storage = MemoryStorage::new("t");
        let key = "p/db-app-20240101_000000.gz.enc";
        storage.put(key, &c.encrypt(b"gz bytes").unwrap(), "STANDARD", Duration::zero());

        let staging = TempDir::new().unwrap();
        let restored = retrieve(&storage, &c, key, staging.path(), true).unwrap();
        assert_eq!(restored, staging.path().join("db-app-20240101_000000.gz"));
        assert_eq!(std::fs::read(restored).unwrap(), b"gz bytes");
    }

    #[test]
    fn test_wrong_key_leaves_nothing_behind() {
        let storage = MemoryStorage::new("t");
        let key = "p/a-b-20240101_000000.gz.enc";
        storage.put(key, &cipher().encrypt(b"x").unwrap(), "STANDARD", Duration::zero());

        let other = Cipher::new(&StaticKeyProvider::new(vec![9u8; 16])).unwrap();
        let staging = TempDir::new().unwrap();
        assert!(retrieve(&storage, &other, key, staging.path(), false).is_err());
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_non_encrypted_key_is_rejected() {
        let storage = MemoryStorage::new("t");
        let staging = TempDir::new().unwrap();
        assert!(matches!(
            retrieve(&storage, &cipher(), "p/readme.txt", staging.path(), false),
            Err(Error::Codec(_))
        ));
    }
}
