//! Panel-side state modules.
//!
//! DESIGN
//! ======
//! State is split by concern (`chat` for the buffer and notices, `scroll` for
//! viewport pinning) so the panel can drive each with small pure functions.

pub mod chat;
pub mod scroll;
