use crate::backup::encrypt::key::KeyProvider;
use crate::backup::file_ext::write_atomically;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use function_name::named;
use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::path::Path;

pub const NONCE_SIZE: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

fn init<C: KeyInit>(key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|e| Error::configuration(format!("invalid encryption key: {e}")))
}

enum Engine {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// AES-GCM over whole payloads: `nonce (12 bytes) || ciphertext || tag`.
pub struct Cipher {
    engine: Engine,
}

impl Debug for Cipher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cipher(AES-{}-GCM)", self.key_bits())
    }
}

impl Cipher {
    /// Builds the cipher from whatever key the provider hands back. The key
    /// length picks AES-128, AES-192 or AES-256.
    pub fn new(provider: &dyn KeyProvider) -> Result<Self> {
        let key = provider.key()?;
        let engine = match key.len() {
            16 => Engine::Aes128(init(&key)?),
            24 => Engine::Aes192(init(&key)?),
            32 => Engine::Aes256(init(&key)?),
            n => {
                return Err(Error::configuration(format!(
                    "encryption key must be 16, 24 or 32 bytes, got {n}"
                )))
            }
        };
        Ok(Self { engine })
    }

    pub fn key_bits(&self) -> usize {
        match self.engine {
            Engine::Aes128(_) => 128,
            Engine::Aes192(_) => 192,
            Engine::Aes256(_) => 256,
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = match &self.engine {
            Engine::Aes128(c) => c.encrypt(nonce, plaintext),
            Engine::Aes192(c) => c.encrypt(nonce, plaintext),
            Engine::Aes256(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|e| Error::codec(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            return Err(Error::codec(format!(
                "ciphertext of {} bytes is shorter than the {NONCE_SIZE} byte nonce",
                data.len()
            )));
        }
        let (nonce_bytes, sealed) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        match &self.engine {
            Engine::Aes128(c) => c.decrypt(nonce, sealed),
            Engine::Aes192(c) => c.decrypt(nonce, sealed),
            Engine::Aes256(c) => c.decrypt(nonce, sealed),
        }
        .map_err(|_| Error::codec("decryption failed: wrong key or corrupted data"))
    }

    #[named]
    pub fn encrypt_file<P1: AsRef<Path>, P2: AsRef<Path>>(&self, input: P1, output: P2) -> Result<()> {
        let input = input.as_ref();
        let output = output.as_ref();
        std::fs::read(input)
            .map_err(Error::from)
            .and_then(|plain| self.encrypt(&plain))
            .and_then(|sealed| write_atomically(output, |f| Ok(f.write_all(&sealed)?)))
            .with_debug_object_and_fn_name(input.to_path_buf(), function_path!())?;
        tracing::debug!("Encrypted {:?} to {:?}", input, output);
        Ok(())
    }

    /// Decrypts `input` into `output`. Nothing is written unless the payload
    /// authenticates.
    #[named]
    pub fn decrypt_file<P1: AsRef<Path>, P2: AsRef<Path>>(&self, input: P1, output: P2) -> Result<()> {
        let input = input.as_ref();
        let output = output.as_ref();
        std::fs::read(input)
            .map_err(Error::from)
            .and_then(|sealed| self.decrypt(&sealed))
            .and_then(|plain| write_atomically(output, |f| Ok(f.write_all(&plain)?)))
            .with_debug_object_and_fn_name(input.to_path_buf(), function_path!())?;
        tracing::debug!("Decrypted {:?} to {:?}", input, output);
        Ok(())
    }
}
