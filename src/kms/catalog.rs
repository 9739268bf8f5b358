//! Global resource catalog
//!
//! The kernel reports the object tables in two phases: counts first, then
//! ids into caller-sized buffers. Objects can appear between the two calls
//! (e.g. an MST hub coming up), in which case the fetched ids are
//! incomplete and the whole query is issued again.

use std::io;

use log::{debug, info};

use super::backend::DeviceQuery;
use super::error::{ModesetError, ModesetResult};
use super::types::ResourceCatalog;

/// Default bound on catalog re-queries
pub const DEFAULT_MAX_CATALOG_RETRIES: u32 = 8;

/// Read the device's connector, encoder, CRTC and framebuffer ids
pub fn read_catalog<D: DeviceQuery + ?Sized>(
    device: &D,
    max_retries: u32,
) -> ModesetResult<ResourceCatalog> {
    for attempt in 0..=max_retries {
        let counts = device.resource_counts()?;
        let fetched = device.resource_ids(&counts)?;

        if fetched.counts != counts {
            debug!(
                "DRM resource counts changed during query (attempt {}): {:?} -> {:?}",
                attempt + 1,
                counts,
                fetched.counts
            );
            continue;
        }

        let catalog = fetched.catalog;
        let found = catalog.counts();
        info!(
            "DRM resources: connectors={}, crtcs={}, encoders={}, framebuffers={}",
            found.connectors, found.crtcs, found.encoders, found.framebuffers
        );
        return Ok(catalog);
    }

    Err(ModesetError::query(
        format!("resources (counts unstable after {} retries)", max_retries),
        io::Error::from_raw_os_error(libc::EAGAIN),
    ))
}
