//! Ephemeral artifact store: namespace-scoped layout, TTL eviction.

pub mod artifact;
pub mod janitor;
#[allow(clippy::module_inception)]
pub mod store;

pub use artifact::{Artifact, ArtifactKind, ArtifactListing, ArtifactMetadata, ArtifactSource};
pub use janitor::{Eviction, SweepReport};
pub use store::ArtifactStore;
