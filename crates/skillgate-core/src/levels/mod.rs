//! The four validation levels.
//!
//! - [`syntax`]: L1 check-only parse per language
//! - [`dependencies`]: L2 package existence via `PackageIndex`
//! - [`sandbox`]: L3 isolated execution of credential-free blocks
//! - [`mocked`]: L4 execution of credential-bearing blocks under mocks

pub mod dependencies;
pub mod mocked;
pub mod sandbox;
pub mod syntax;

pub use dependencies::{
    DependencyResolver, IndexError, IndexLookup, IndexResult, LookupCache, PackageIndex,
    RateLimiter,
};
pub use mocked::{rewrite_env_references, MockedExecutor, DEFAULT_SERVICE_MODULES, MAX_MOCKED_BLOCKS};
pub use sandbox::{SandboxExecutor, MAX_SANDBOX_BLOCKS};
pub use syntax::SyntaxValidator;
