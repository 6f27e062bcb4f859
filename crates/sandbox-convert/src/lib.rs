//! Document converters: a local IIIF Presentation 3 upgrader and a client for
//! an external conversion service.

pub mod presentation3;
pub mod remote;
