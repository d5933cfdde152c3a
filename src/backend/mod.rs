//! Backend abstraction layer
//!
//! Service traits the host renderer implements, shared GPU-facing types, and
//! the Vulkan implementation of those services.

pub mod traits;
pub mod types;
pub mod vulkan;

pub use traits::*;
pub use types::*;
