//! Credential verification: the first stage of the tenant gate.
//!
//! - [`verifier`]: the [`CredentialVerifier`] trait and shared header parsing
//! - [`basic`]: `Basic` scheme backed by an [`IdentityStore`]
//! - [`bearer`]: `Bearer` scheme with HS256-signed JWTs
//! - [`store`]: identity store capability and the in-memory implementation

pub mod basic;
pub mod bearer;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod store;
pub mod verifier;

pub use basic::BasicVerifier;
pub use bearer::BearerJwtVerifier;
#[cfg(feature = "postgres")]
pub use postgres::PgIdentityStore;
pub use store::{parse_identity_spec, IdentitySpecError, IdentityStore, MemoryIdentityStore, StoredSecret};
pub use verifier::{AuthError, CredentialVerifier, MalformedReason};
