//! Capability router for the sandbox.
//!
//! | Endpoint                          | Method  | Purpose                          |
//! |-----------------------------------|---------|----------------------------------|
//! | `/`                               | GET     | Landing banner                   |
//! | any                               | HEAD    | Liveness, CORS header only       |
//! | any                               | OPTIONS | CORS preflight                   |
//! | `/store`                          | POST    | Create, returns capability URLs  |
//! | `/p3/{location}`                  | GET     | Read the canonical document      |
//! | `/update/{location}/{token}`      | PUT     | Replace the document             |
//! | `/update/{location}/{token}`      | DELETE  | Delete using the update token    |
//! | `/delete/{location}/{token}`      | DELETE  | Delete using the delete token    |
//!
//! Every request is handled statelessly: [`action::Action::parse`] picks the
//! operation from method and path, then [`router::Router`] checks the
//! presented capability tokens against the stored envelope before touching
//! the object store.

pub mod action;
pub mod config;
pub mod error;
pub mod response;
pub mod router;
pub mod server;

pub use config::SandboxConfig;
pub use error::RouterError;
pub use router::Router;

/// Response header reporting the seconds left before an object expires.
pub const EXPIRES_IN_HEADER: &str = "x-sandbox-expires-in";

/// Default maximum HTTP request body size (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
