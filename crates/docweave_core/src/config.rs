//! Unit-of-work configuration.

use crate::schema::ReferenceLoading;

/// What the materializer does when a stored document has no key for a
/// reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReferencePolicy {
    /// Read a missing reference-one as unset and reference-many as empty,
    /// mirroring how empty embed-many fields are omitted.
    TreatAsEmpty,
    /// Fail with `MaterializationMismatch`.
    Reject,
}

/// Configuration for a unit of work.
#[derive(Debug, Clone)]
pub struct Config {
    /// Handling of absent reference keys in stored documents.
    pub missing_reference_policy: MissingReferencePolicy,

    /// Loading strategy for reference fields that don't declare one.
    pub default_reference_loading: ReferenceLoading,

    /// Maximum nesting of embedded documents below a root.
    pub max_embed_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            missing_reference_policy: MissingReferencePolicy::TreatAsEmpty,
            default_reference_loading: ReferenceLoading::Lazy,
            max_embed_depth: 64,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the policy for absent reference keys.
    #[must_use]
    pub const fn missing_reference_policy(mut self, policy: MissingReferencePolicy) -> Self {
        self.missing_reference_policy = policy;
        self
    }

    /// Sets the default reference loading strategy.
    #[must_use]
    pub const fn default_reference_loading(mut self, loading: ReferenceLoading) -> Self {
        self.default_reference_loading = loading;
        self
    }

    /// Sets the maximum embedding depth.
    #[must_use]
    pub const fn max_embed_depth(mut self, depth: usize) -> Self {
        self.max_embed_depth = depth;
        self
    }
}
