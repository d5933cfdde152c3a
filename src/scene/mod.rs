//! Per-frame scene state

mod animation;

pub use animation::*;
