//! Session encryption and verification
//!
//! - [`payload`] - plaintext layout of the session value and its expiration
//! - [`cipher`] - per-cookie key derivation, encrypt-then-MAC, multi-key verification
//! - [`protocol`] - entry points over a key set and a random source

pub mod cipher;
pub mod payload;
pub mod protocol;

pub use payload::{ExtendedPayloadWrapper, PayloadWrapper};
pub use protocol::{
    decrypt_session, decrypt_session_at, encrypt_session, encrypt_session_at, reissue_session,
};
