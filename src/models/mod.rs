//! Data models shared by the providers, the injector and the tools

mod playback;
mod provider;

pub use playback::*;
pub use provider::*;
