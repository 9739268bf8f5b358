//! One-shot discovery pass
//!
//! Walks every connector of the catalog, allocates a CRTC for each
//! connected one and provisions a framebuffer for it. Only a failure to
//! read the catalog aborts the pass; per-connector failures are logged and
//! the connector is skipped.

use log::{info, warn};

use super::allocator::find_crtc;
use super::backend::ModesetBackend;
use super::catalog::{read_catalog, DEFAULT_MAX_CATALOG_RETRIES};
use super::display::{crtc_bindings, CrtcBindings};
use super::error::{ModesetError, ModesetResult};
use super::framebuffer::{provision, PixelFormat};
use super::inspector::{inspect, Inspection};
use super::registry::{DeviceRegistry, DisplayDevice};
use super::types::{ConnectionStatus, ConnectorId, ConnectorRecord, ResourceCatalog};

/// Discovery tuning
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub max_catalog_retries: u32,
    pub format: PixelFormat,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_catalog_retries: DEFAULT_MAX_CATALOG_RETRIES,
            format: PixelFormat::default(),
        }
    }
}

/// Why a connector did not get a display
#[derive(Debug)]
pub enum SkipReason {
    /// Nothing attached
    Inactive(ConnectionStatus),
    Failed(ModesetError),
}

/// Outcome of a discovery pass
#[derive(Debug)]
pub struct Discovery {
    pub catalog: ResourceCatalog,
    pub registry: DeviceRegistry,
    /// Connectors without a display, in catalog order
    pub skipped: Vec<(ConnectorId, SkipReason)>,
}

impl Discovery {
    pub fn failures(&self) -> impl Iterator<Item = (ConnectorId, &ModesetError)> {
        self.skipped.iter().filter_map(|(id, reason)| match reason {
            SkipReason::Failed(e) => Some((*id, e)),
            SkipReason::Inactive(_) => None,
        })
    }
}

/// Discover connectors and provision a display for each connected one
///
/// Only a catalog failure is returned as an error; it is always fatal.
pub fn discover<B: ModesetBackend + ?Sized>(
    backend: &B,
    options: &DiscoveryOptions,
) -> ModesetResult<Discovery> {
    let catalog =
        read_catalog(backend, options.max_catalog_retries).map_err(ModesetError::catalog)?;
    let mut registry = DeviceRegistry::new();
    let mut skipped = Vec::new();

    let records: Vec<(ConnectorId, ModesetResult<ConnectorRecord>)> = catalog
        .connectors
        .iter()
        .map(|&id| (id, backend.connector(id)))
        .collect();

    // nothing has been programmed yet, so these are the pre-session bindings
    let bindings = crtc_bindings(
        backend,
        records.iter().filter_map(|(_, record)| record.as_ref().ok()),
    );

    for (index, (id, record)) in records.into_iter().enumerate() {
        let setup = record.and_then(|connector| {
            setup_connector(backend, &catalog, connector, &registry, &bindings, options)
        });
        match setup {
            Ok(Setup::Provisioned(device)) => {
                info!(
                    "Connector {}: CRTC {}, {} (stride={}, size={})",
                    id,
                    device.crtc(),
                    device.mode(),
                    device.stride(),
                    device.size()
                );
                if let Err(e) = register(backend, &mut registry, device) {
                    warn!("Cannot set up device for connector {}:{}: {}", index, id, e);
                    skipped.push((id, SkipReason::Failed(e)));
                }
            }
            Ok(Setup::Inactive(status)) => skipped.push((id, SkipReason::Inactive(status))),
            Err(e) => {
                warn!("Cannot set up device for connector {}:{}: {}", index, id, e);
                skipped.push((id, SkipReason::Failed(e)));
            }
        }
    }

    info!(
        "Discovery complete: {} display(s) provisioned, {} connector(s) skipped",
        registry.len(),
        skipped.len()
    );

    Ok(Discovery {
        catalog,
        registry,
        skipped,
    })
}

enum Setup {
    Provisioned(DisplayDevice),
    Inactive(ConnectionStatus),
}

fn setup_connector<B: ModesetBackend + ?Sized>(
    backend: &B,
    catalog: &ResourceCatalog,
    connector: ConnectorRecord,
    registry: &DeviceRegistry,
    bindings: &CrtcBindings,
    options: &DiscoveryOptions,
) -> ModesetResult<Setup> {
    let (connector, mode) = match inspect(connector)? {
        Inspection::Inactive(status) => return Ok(Setup::Inactive(status)),
        Inspection::Usable { connector, mode } => (connector, mode),
    };

    let crtc = find_crtc(backend, catalog, &connector, registry)?;
    let device = provision(backend, connector.id, crtc, &mode, options.format, bindings)?;
    Ok(Setup::Provisioned(device))
}

fn register<B: ModesetBackend + ?Sized>(
    backend: &B,
    registry: &mut DeviceRegistry,
    mut device: DisplayDevice,
) -> ModesetResult<()> {
    if registry.is_claimed(device.crtc()) {
        let crtc = device.crtc();
        for e in device.release(backend) {
            warn!("Cleanup: {}", e);
        }
        return Err(ModesetError::DuplicateCrtc(crtc));
    }
    registry.register(device)
}
