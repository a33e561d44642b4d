//! Handling of sensitive material passed through the wallet
//!
//! This module provides:
//! - Passphrases that are zeroed on drop and never printed
//! - Zeroizing byte buffers for the client key PEM

pub mod zeroize;

pub use zeroize::{Passphrase, SecureBytes};
