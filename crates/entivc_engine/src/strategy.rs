//! Sync strategy resolution.

use entivc_types::SyncStrategy;

/// Resolves the effective strategy for one entity type.
///
/// An explicit per-type strategy wins; otherwise the request-level
/// default applies; otherwise merge, the non-destructive choice.
#[must_use]
pub fn resolve_strategy(
    request_default: Option<SyncStrategy>,
    per_type: Option<SyncStrategy>,
) -> SyncStrategy {
    per_type.or(request_default).unwrap_or(SyncStrategy::Merge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_type_wins() {
        assert_eq!(
            resolve_strategy(Some(SyncStrategy::Merge), Some(SyncStrategy::Overwrite)),
            SyncStrategy::Overwrite
        );
    }

    #[test]
    fn request_default_applies() {
        assert_eq!(
            resolve_strategy(Some(SyncStrategy::Overwrite), None),
            SyncStrategy::Overwrite
        );
    }

    #[test]
    fn merge_when_nothing_specified() {
        assert_eq!(resolve_strategy(None, None), SyncStrategy::Merge);
    }
}
