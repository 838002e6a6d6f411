//! HTTP handlers for the gated dynamic surface and the session-scoped management surface.

pub mod control;
pub mod dynamic;
pub mod management;
