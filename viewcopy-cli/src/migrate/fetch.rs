//! Reads view definitions from the source dataset

use anyhow::{Context, Result};
use log::{debug, error, info, warn};

use super::types::{FetchedViews, ViewDefinition};
use crate::api::{DatasetRef, Lookup, Warehouse};

/// List the source dataset and fetch every view's definition
///
/// Failing to list the dataset is fatal. A view whose definition cannot be
/// fetched is kept in `view_names`, recorded in `unavailable`, and skipped.
pub async fn fetch_views(warehouse: &dyn Warehouse, source: &DatasetRef) -> Result<FetchedViews> {
    let listings = warehouse
        .list_tables(source)
        .await
        .with_context(|| format!("Failed to list tables in {}", source))?;

    let mut fetched = FetchedViews::default();

    for listing in listings.into_iter().filter(|l| l.kind.is_view()) {
        let view_ref = source.table(&listing.name);
        fetched.view_names.push(listing.name.clone());

        match warehouse.get_table(&view_ref).await {
            Ok(Lookup::Found(definition)) => match definition.view_query {
                Some(query) => {
                    debug!("Fetched definition of {}", view_ref);
                    fetched.definitions.push(ViewDefinition::new(listing.name, query));
                }
                None => {
                    warn!("View {} has no query text. Skipping.", view_ref);
                    fetched.unavailable.push(listing.name);
                }
            },
            Ok(Lookup::NotFound) => {
                warn!("View {} not found.", view_ref);
                fetched.unavailable.push(listing.name);
            }
            Err(e) => {
                error!("Failed to fetch view {}: {:#}", view_ref, e);
                fetched.unavailable.push(listing.name);
            }
        }
    }

    info!(
        "Fetched {} of {} views from {}",
        fetched.definitions.len(),
        fetched.view_names.len(),
        source
    );
    Ok(fetched)
}
