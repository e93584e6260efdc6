//! Authenticated encryption of artifacts.
//!
//! [`Cipher`] seals a whole payload with AES-GCM and prepends the random nonce.
//! Its key comes from a [`KeyProvider`] handed over at construction.

pub mod cipher;
pub mod key;

pub use cipher::Cipher;
pub use key::{EnvKeyProvider, HexKeyProvider, KeyProvider, StaticKeyProvider};
