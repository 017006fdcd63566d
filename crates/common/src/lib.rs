//! Common types shared by the Forge Reports client crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
