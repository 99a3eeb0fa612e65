//! skillgate-remote
//!
//! reqwest-backed implementations of the skillgate collaborator traits:
//! npm/PyPI package indexes, the Anthropic content generator, GitHub
//! publishing and catalog listings, and the registry source collector.

pub mod anthropic;
pub mod collector;
pub mod error;
pub mod github;
pub mod http;
pub mod index;

pub use anthropic::{AnthropicConfig, AnthropicGenerator};
pub use collector::RegistrySourceCollector;
pub use error::{RemoteError, RemoteResult};
pub use github::{GithubCatalog, GithubConfig, GithubPublisher};
pub use http::build_client;
pub use index::RegistryIndex;
