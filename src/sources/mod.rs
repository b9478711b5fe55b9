pub mod base;
pub mod github_source;
pub mod push_source;
pub mod token_verifier;

pub use base::IdentitySource;
pub use github_source::{GitHubConfig, GitHubIdentitySource};
pub use push_source::PushSource;
