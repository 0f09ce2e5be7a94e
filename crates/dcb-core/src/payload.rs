use crate::error::{Error, Result};
use std::collections::HashSet;

/// A process-wide set of known payload discriminators ("type tags").
/// Writing never consults the registry — any tag may be
/// persisted. Readers that want validated reconstruction call
/// [`PayloadRegistry::check`], which surfaces `Error::Serialization`
/// for a tag no factory was ever registered for, rather than silently
/// passing through `null`.
#[derive(Debug, Clone, Default)]
pub struct PayloadRegistry {
    known: HashSet<String>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discriminator this process can reconstruct.
    pub fn register(&mut self, type_tag: impl Into<String>) -> &mut Self {
        self.known.insert(type_tag.into());
        self
    }

    pub fn is_known(&self, type_tag: &str) -> bool {
        self.known.contains(type_tag)
    }

    /// Validate a discriminator read off disk. An empty registry is
    /// treated as "no validation configured" and always accepts —
    /// callers that never register anything get the pre-registry
    /// behavior of passing payloads through untyped.
    pub fn check(&self, type_tag: &str) -> Result<()> {
        if self.known.is_empty() || self.known.contains(type_tag) {
            Ok(())
        } else {
            Err(Error::Serialization(format!(
                "unknown payload discriminator {type_tag:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_accepts_anything() {
        let registry = PayloadRegistry::new();
        assert!(registry.check("whatever").is_ok());
    }

    #[test]
    fn registered_tag_is_accepted() {
        let mut registry = PayloadRegistry::new();
        registry.register("order.created.v1");
        assert!(registry.check("order.created.v1").is_ok());
    }

    #[test]
    fn unknown_tag_is_rejected_once_any_tag_is_registered() {
        let mut registry = PayloadRegistry::new();
        registry.register("order.created.v1");
        let err = registry.check("order.unknown.v1").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
