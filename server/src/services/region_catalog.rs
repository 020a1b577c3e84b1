use std::path::Path;

use dma_heatmap_shared::RegionCatalog;
use tracing::{info, warn};

use crate::config::region_catalog_path;

/// Loads the DMA catalog named by `REGION_CATALOG_PATH`. A missing or
/// unreadable catalog leaves region names unresolved but never stops startup.
pub async fn load() -> RegionCatalog {
    let Some(path) = region_catalog_path() else {
        info!("REGION_CATALOG_PATH not set; region names come from the data only");
        return RegionCatalog::default();
    };

    match load_from(&path).await {
        Ok(catalog) => {
            info!(path = %path.display(), regions = catalog.len(), "loaded region catalog");
            catalog
        }
        Err(e) => {
            warn!(path = %path.display(), "failed to load region catalog: {e}");
            RegionCatalog::default()
        }
    }
}

async fn load_from(
    path: &Path,
) -> Result<RegionCatalog, Box<dyn std::error::Error + Send + Sync>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(RegionCatalog::from_json(&bytes)?)
}
