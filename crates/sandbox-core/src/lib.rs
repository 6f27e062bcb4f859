//! Core abstractions for the sandbox: object store and document conversion
//! contracts, plus the clock both the store and the router read time from.

pub mod clock;
pub mod convert;
pub mod storage;
