//! # custodia-vault
//!
//! The custody boundary: symmetric encryption of custodial private keys at
//! rest, and generation of fresh per-request deposit addresses.
//!
//! ## Architecture
//!
//! 1. **`KeyVault`**: ChaCha20-Poly1305 AEAD over a key derived from the
//!    platform secret. Ciphertexts are self-contained (nonce prepended),
//!    so decryption needs nothing but the sealed blob.
//! 2. **`AddressIssuer`**: draws a random custodial secret, derives the
//!    coin-prefixed address, and hands back the record with the secret
//!    already sealed — plaintext key material never crosses this crate's
//!    boundary.
//!
//! Address format validation for user-supplied destinations also lives
//! here, next to the code that defines the format.

pub mod issuer;
pub mod vault;

pub use issuer::{AddressIssuer, validate_address};
pub use vault::KeyVault;
