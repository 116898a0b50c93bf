//! Credential store and session guard
//!
//! The session (token + identity) is process-wide. [`SessionGuard`] is its
//! only writer for sign-in, sign-up and probe; every other component holds a
//! [`SessionHandle`], reads the token at call time and may only force a
//! sign-out when the service rejects it.

pub mod guard;
pub mod store;

pub use guard::{
    Session, SessionGuard, SessionHandle, SessionNotice, SessionStatus, SignUpProfile,
    SESSION_EXPIRED_NOTICE,
};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials};
