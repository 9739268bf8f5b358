//! KMS resource discovery and framebuffer provisioning

pub mod allocator;
pub mod backend;
pub mod card;
pub mod catalog;
pub mod discovery;
pub mod display;
pub mod error;
pub mod framebuffer;
pub mod inspector;
mod ioctl_helpers;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use card::Card;
pub use discovery::{discover, Discovery, DiscoveryOptions, SkipReason};
pub use error::{ModesetError, ModesetResult};
pub use framebuffer::PixelFormat;
