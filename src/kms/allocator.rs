//! CRTC allocation
//!
//! Assigns each connected connector a CRTC that no other display of this
//! session has claimed.

use log::{debug, warn};

use super::backend::DeviceQuery;
use super::error::{ModesetError, ModesetResult};
use super::registry::DeviceRegistry;
use super::types::{ConnectorRecord, CrtcId, ResourceCatalog};

/// Find a free CRTC for `connector`
///
/// The CRTC already driving the connector is kept when it is free, so an
/// already-lit display is not blanked. Otherwise encoders are tried in
/// connector order and, for each, CRTCs in capability-mask bit order.
pub fn find_crtc<D: DeviceQuery + ?Sized>(
    device: &D,
    catalog: &ResourceCatalog,
    connector: &ConnectorRecord,
    registry: &DeviceRegistry,
) -> ModesetResult<CrtcId> {
    if let Some(encoder_id) = connector.current_encoder {
        match device.encoder(encoder_id) {
            Ok(encoder) => {
                if let Some(crtc) = encoder.crtc {
                    if !registry.is_claimed(crtc) {
                        debug!(
                            "Connector {}: keeping active CRTC {} (encoder {})",
                            connector.id, crtc, encoder.id
                        );
                        return Ok(crtc);
                    }
                    debug!(
                        "Connector {}: active CRTC {} already claimed",
                        connector.id, crtc
                    );
                }
            }
            Err(e) => debug!("Connector {}: current encoder unreadable: {}", connector.id, e),
        }
    }

    for &encoder_id in &connector.encoders {
        let encoder = match device.encoder(encoder_id) {
            Ok(encoder) => encoder,
            Err(e) => {
                warn!("Connector {}: skipping encoder {}: {}", connector.id, encoder_id, e);
                continue;
            }
        };

        let free = catalog
            .filter_crtcs(encoder.possible_crtcs)
            .find(|&crtc| !registry.is_claimed(crtc));

        if let Some(crtc) = free {
            debug!(
                "Connector {}: CRTC {} via encoder {}",
                connector.id, crtc, encoder.id
            );
            return Ok(crtc);
        }
    }

    Err(ModesetError::NoSuitableCrtc {
        connector: connector.id,
    })
}
