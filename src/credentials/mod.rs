//! TLS credential subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (once, off the async runtime):
//!     CredentialStore::get_credential_pair()
//!         → store.rs: read <cert_dir>/ssl.cert + ssl.key, validate PEM
//!         → miss or invalid: generate.rs (RSA 2048, self-signed, SHA-256)
//!         → persist (failure logged, pair still returned)
//!     → TlsCredentialPair handed to the TLS listener
//! ```
//!
//! # Design Decisions
//! - The pair is immutable for a listener's lifetime; rotation means a
//!   new listener
//! - Never called per request

pub mod generate;
pub mod store;

pub use generate::generate_self_signed;
pub use store::{CredentialError, CredentialStore, TlsCredentialPair};
