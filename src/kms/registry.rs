//! Provisioned displays of the current session
//!
//! The registry owns every display pipeline claimed during discovery and
//! releases them again on teardown.

use std::collections::HashSet;

use log::{debug, info, warn};
use memmap2::MmapMut;

use super::backend::BufferAllocator;
use super::display;
use super::error::{ModesetError, ModesetResult};
use super::types::{BufferHandle, ConnectorId, CrtcId, DisplayMode, FramebufferId, SavedCrtc};

/// One provisioned display pipeline
///
/// Owns its framebuffer, dumb buffer and mapping. Each resource is held in
/// an `Option` and taken when released, so releasing twice is a no-op.
#[derive(Debug)]
pub struct DisplayDevice {
    connector: ConnectorId,
    crtc: CrtcId,
    mode: DisplayMode,
    stride: u32,
    size: u64,
    framebuffer: Option<FramebufferId>,
    buffer: Option<BufferHandle>,
    map: Option<MmapMut>,
    saved_crtc: Option<SavedCrtc>,
    activated: bool,
}

/// Pieces of a successfully provisioned buffer
pub(crate) struct ProvisionedBuffer {
    pub framebuffer: FramebufferId,
    pub buffer: BufferHandle,
    pub map: MmapMut,
    pub stride: u32,
    pub size: u64,
}

impl DisplayDevice {
    pub(crate) fn new(
        connector: ConnectorId,
        crtc: CrtcId,
        mode: DisplayMode,
        provisioned: ProvisionedBuffer,
        saved_crtc: SavedCrtc,
    ) -> Self {
        Self {
            connector,
            crtc,
            mode,
            stride: provisioned.stride,
            size: provisioned.size,
            framebuffer: Some(provisioned.framebuffer),
            buffer: Some(provisioned.buffer),
            map: Some(provisioned.map),
            saved_crtc: Some(saved_crtc),
            activated: false,
        }
    }

    /// Entry with no buffer resources, for allocation bookkeeping tests
    #[cfg(test)]
    pub(crate) fn detached(
        connector: ConnectorId,
        crtc: CrtcId,
        mode: DisplayMode,
        framebuffer: FramebufferId,
    ) -> Self {
        Self {
            connector,
            crtc,
            mode,
            stride: 0,
            size: 0,
            framebuffer: Some(framebuffer),
            buffer: None,
            map: None,
            saved_crtc: None,
            activated: false,
        }
    }

    pub fn connector(&self) -> ConnectorId {
        self.connector
    }

    pub fn crtc(&self) -> CrtcId {
        self.crtc
    }

    pub fn mode(&self) -> &DisplayMode {
        &self.mode
    }

    /// Bytes per row as assigned by the driver
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn saved_crtc(&self) -> Option<&SavedCrtc> {
        self.saved_crtc.as_ref()
    }

    #[cfg(test)]
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub(crate) fn set_activated(&mut self, activated: bool) {
        self.activated = activated;
    }

    /// Mapped pixel memory, `stride * height` bytes or more
    #[cfg(test)]
    pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        self.map.as_deref_mut()
    }

    /// Whether teardown still has anything to undo for this entry
    fn holds_resources(&self) -> bool {
        self.activated || self.framebuffer.is_some() || self.buffer.is_some() || self.map.is_some()
    }

    /// Release everything this entry still holds
    ///
    /// Every step is attempted; failures are returned rather than
    /// stopping the teardown.
    pub fn release<B: BufferAllocator + ?Sized>(&mut self, backend: &B) -> Vec<ModesetError> {
        let mut failures = Vec::new();

        if self.activated {
            if let Some(saved) = self.saved_crtc.take() {
                if let Err(e) = display::restore_crtc(backend, &saved) {
                    failures.push(e);
                }
            }
            self.activated = false;
        }

        if self.map.take().is_some() {
            debug!("Connector {}: buffer unmapped", self.connector);
        }

        if let Some(fb) = self.framebuffer.take() {
            if let Err(e) = backend.remove_framebuffer(fb) {
                failures.push(e);
            }
        }

        if let Some(handle) = self.buffer.take() {
            if let Err(e) = backend.destroy_buffer(handle) {
                failures.push(e);
            }
        }

        failures
    }
}

/// Result of a registry teardown
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Entries this call released without a failure
    pub released: usize,
    pub failures: Vec<(ConnectorId, ModesetError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered, append-only list of provisioned displays
///
/// No two entries share a CRTC.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<DisplayDevice>,
    claimed: HashSet<CrtcId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, device: DisplayDevice) -> ModesetResult<()> {
        if !self.claimed.insert(device.crtc) {
            return Err(ModesetError::DuplicateCrtc(device.crtc));
        }
        self.devices.push(device);
        Ok(())
    }

    pub fn is_claimed(&self, crtc: CrtcId) -> bool {
        self.claimed.contains(&crtc)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayDevice> {
        self.devices.iter()
    }

    #[cfg(test)]
    pub fn get(&self, connector: ConnectorId) -> Option<&DisplayDevice> {
        self.devices.iter().find(|d| d.connector == connector)
    }

    /// Point every registered CRTC at its framebuffer
    ///
    /// Returns the number of displays that were activated.
    pub fn activate<B: BufferAllocator + ?Sized>(&mut self, backend: &B) -> usize {
        let mut activated = 0;
        for device in &mut self.devices {
            match display::activate(backend, device) {
                Ok(()) => activated += 1,
                Err(e) => warn!("Connector {}: cannot set mode: {}", device.connector, e),
            }
        }
        activated
    }

    /// Restore saved CRTCs and free all buffers, in registration order
    ///
    /// Entries released by an earlier call are skipped.
    pub fn release<B: BufferAllocator + ?Sized>(&mut self, backend: &B) -> TeardownReport {
        let mut report = TeardownReport::default();
        for device in &mut self.devices {
            if !device.holds_resources() {
                continue;
            }
            let failures = device.release(backend);
            if failures.is_empty() {
                report.released += 1;
            }
            for e in failures {
                warn!("Connector {}: teardown: {}", device.connector, e);
                report.failures.push((device.connector, e));
            }
        }
        info!(
            "Released {} display(s), {} failure(s)",
            report.released,
            report.failures.len()
        );
        report
    }
}
