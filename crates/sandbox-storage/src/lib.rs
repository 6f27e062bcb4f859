//! Capability tokens, the envelope codec and a file-backed object store.
//! Sealing uses AES-GCM with keys derived from the capability tokens themselves.

pub mod cipher;
pub mod envelope;
pub mod file_store;
pub mod tokens;
