//! gqlink-file - File-backed credential source for gqlink.
//!
//! Keeps a bearer token in a small JSON file and exposes it as a
//! [`CredentialSource`](gqlink_core::CredentialSource) that notices when
//! another process signs in or out.

mod source;
pub mod store;

pub use source::FileCredentialSource;
pub use store::{StoredCredentials, clear, load, save};
