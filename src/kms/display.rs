//! Mode setting on provisioned displays
//!
//! Activation points a claimed CRTC at the display's framebuffer; restore
//! puts back whatever the CRTC showed before this session took it.

use std::collections::HashMap;

use log::{debug, info};

use super::backend::{BufferAllocator, DeviceQuery};
use super::error::{ModesetError, ModesetResult};
use super::registry::DisplayDevice;
use super::types::{ConnectorId, ConnectorRecord, CrtcId, SavedCrtc};

/// Connectors each CRTC was driving when the session started
pub type CrtcBindings = HashMap<CrtcId, Vec<ConnectorId>>;

/// Resolve connector → current encoder → CRTC for every connector
///
/// Must run before any CRTC is programmed. Unreadable encoders are left
/// out; their CRTC is then treated as driving nothing.
pub fn crtc_bindings<'a, D, I>(device: &D, connectors: I) -> CrtcBindings
where
    D: DeviceQuery + ?Sized,
    I: IntoIterator<Item = &'a ConnectorRecord>,
{
    let mut bindings = CrtcBindings::new();
    for connector in connectors {
        let Some(encoder_id) = connector.current_encoder else {
            continue;
        };
        match device.encoder(encoder_id) {
            Ok(encoder) => {
                if let Some(crtc) = encoder.crtc {
                    bindings.entry(crtc).or_default().push(connector.id);
                }
            }
            Err(e) => debug!("Connector {}: binding unknown: {}", connector.id, e),
        }
    }
    bindings
}

/// Set the display's mode with its framebuffer on its CRTC
pub fn activate<B: BufferAllocator + ?Sized>(
    backend: &B,
    device: &mut DisplayDevice,
) -> ModesetResult<()> {
    let fb = device
        .framebuffer()
        .ok_or(ModesetError::AlreadyReleased(device.connector()))?;

    backend.set_crtc(
        device.crtc(),
        Some(fb),
        (0, 0),
        &[device.connector()],
        Some(device.mode()),
    )?;
    device.set_activated(true);

    info!(
        "Connector {}: CRTC {} now scanning out framebuffer {} ({})",
        device.connector(),
        device.crtc(),
        fb,
        device.mode()
    );
    Ok(())
}

/// Restore a CRTC to its saved configuration
///
/// The saved framebuffer goes back to the connectors it was shown on. A
/// CRTC that was off, or lit without any connector we could resolve, is
/// switched off.
pub fn restore_crtc<B: BufferAllocator + ?Sized>(
    backend: &B,
    saved: &SavedCrtc,
) -> ModesetResult<()> {
    match saved.framebuffer {
        Some(fb) if !saved.connectors.is_empty() => {
            debug!(
                "Restoring CRTC {} to framebuffer {} on {:?}",
                saved.crtc, fb, saved.connectors
            );
            backend.set_crtc(
                saved.crtc,
                Some(fb),
                saved.position,
                &saved.connectors,
                saved.mode.as_ref(),
            )
        }
        _ => {
            debug!("Disabling CRTC {}", saved.crtc);
            backend.set_crtc(saved.crtc, None, (0, 0), &[], None)
        }
    }
}
