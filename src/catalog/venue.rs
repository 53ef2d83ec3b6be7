use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{first_in_storage_order, Reconciled};
use crate::config::ReconcileConfig;
use crate::domain::{Venue, VenueRecord};
use crate::error::Result;
use crate::metrics::CatalogMetrics;
use crate::storage::Storage;

/// Finds or creates the venue for an external venue id. Existing venues are
/// returned as stored, even when the source now reports a different name.
pub struct VenueResolver {
    storage: Arc<dyn Storage>,
    conflict_retries: u32,
}

impl VenueResolver {
    pub fn new(storage: Arc<dyn Storage>, config: &ReconcileConfig) -> Self {
        Self {
            storage,
            conflict_retries: config.conflict_retries,
        }
    }

    #[instrument(skip(self, record), fields(external_venue_id = record.remote_id))]
    pub async fn resolve_venue(&self, record: &VenueRecord) -> Result<Reconciled<Venue>> {
        let mut conflicts = 0;
        loop {
            let matches = self.storage.find_venues_by_external_id(record.remote_id).await?;
            if let Some(existing) = first_in_storage_order(matches, "venue", record.remote_id) {
                debug!("Using existing venue: {}", existing.name);
                return Ok(Reconciled::unchanged(existing));
            }

            let mut venue = Venue::new(record);
            match self.storage.create_venue(&mut venue).await {
                Ok(()) => {
                    info!("Created new venue: {}", venue.name);
                    CatalogMetrics::record_venue_created();
                    return Ok(Reconciled::created(venue));
                }
                // Another job created it between our find and create
                Err(e) if e.is_unique_violation() && conflicts < self.conflict_retries => {
                    conflicts += 1;
                    info!("Venue create lost a race, re-querying");
                    CatalogMetrics::record_conflict("venue");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
