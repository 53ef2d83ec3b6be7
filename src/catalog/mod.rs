//! Find-or-create reconciliation of venues and events, keyed by the upstream
//! source's external ids.

pub mod changes;
pub mod event;
pub mod venue;

pub use changes::ChangeSet;
pub use event::EventReconciler;
pub use venue::VenueResolver;

use serde::Serialize;
use tracing::warn;

use crate::metrics::CatalogMetrics;

/// What reconciliation did to the stored entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeType {
    Created,
    Updated,
    NoChange,
}

/// An entity as it stands in storage after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub entity: T,
    pub change: ChangeType,
}

impl<T> Reconciled<T> {
    pub fn created(entity: T) -> Self {
        Self { entity, change: ChangeType::Created }
    }

    pub fn updated(entity: T) -> Self {
        Self { entity, change: ChangeType::Updated }
    }

    pub fn unchanged(entity: T) -> Self {
        Self { entity, change: ChangeType::NoChange }
    }
}

/// External ids are expected to match zero or one row. More than one is a
/// data-integrity problem: it is reported and the first in storage order wins.
pub(crate) fn first_in_storage_order<T>(
    matches: Vec<T>,
    entity: &'static str,
    external_id: i64,
) -> Option<T> {
    if matches.len() > 1 {
        warn!(
            entity,
            external_id,
            count = matches.len(),
            "Multiple rows share an external id, using the first in storage order"
        );
        CatalogMetrics::record_duplicate_matches(entity);
    }
    matches.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_in_storage_order() {
        assert_eq!(first_in_storage_order(Vec::<u8>::new(), "venue", 1), None);
        assert_eq!(first_in_storage_order(vec![3], "venue", 1), Some(3));
        assert_eq!(first_in_storage_order(vec![5, 4, 6], "event", 1), Some(5));
    }
}
