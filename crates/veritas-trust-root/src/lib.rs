//! Trust anchors for veritas
//!
//! A [`TrustStore`] holds the long-lived public keys, keyless certificate
//! roots and timestamp authority roots a verification run trusts. Stores are
//! built from a verified policy or from an out-of-band [`TrustedRoot`].

pub mod error;
pub mod store;
pub mod trusted_root;

pub use error::{Error, Result};
pub use store::{TrustStore, TrustStoreBuilder};
pub use trusted_root::TrustedRoot;
