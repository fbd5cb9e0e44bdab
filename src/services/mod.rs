mod ai;
mod cache;
mod config;
mod manifest;
mod pacing;
mod pipeline;
mod transport;

pub use ai::*;
pub use cache::*;
pub use config::*;
pub use manifest::*;
pub use pacing::*;
pub use pipeline::*;
pub use transport::*;

#[cfg(test)]
pub(crate) mod test_support;
