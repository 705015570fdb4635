//! Session management.

pub mod session;

pub use session::Session;
