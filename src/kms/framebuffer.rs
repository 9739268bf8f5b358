//! Dumb buffer provisioning
//!
//! Allocates a CPU-mappable buffer for a chosen mode, wraps it in a
//! framebuffer object and maps it. Anything created before a failing step
//! is released again before the error is returned.

use std::io;

use log::{debug, warn};

use super::backend::{BufferAllocator, DeviceQuery};
use super::display::CrtcBindings;
use super::error::{ModesetError, ModesetResult};
use super::registry::{DisplayDevice, ProvisionedBuffer};
use super::types::{BufferHandle, ConnectorId, CrtcId, DisplayMode, FramebufferId, SavedCrtc};

/// Pixel layout of provisioned buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bits per pixel
    pub bpp: u32,
    /// Color depth in bits
    pub depth: u32,
}

impl PixelFormat {
    /// XRGB8888
    pub const XRGB8888: Self = Self { bpp: 32, depth: 24 };

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bpp.div_ceil(8)
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::XRGB8888
    }
}

/// Releases a half-built buffer unless disarmed
struct PendingBuffer<'a, B: BufferAllocator + ?Sized> {
    backend: &'a B,
    buffer: Option<BufferHandle>,
    framebuffer: Option<FramebufferId>,
}

impl<B: BufferAllocator + ?Sized> Drop for PendingBuffer<'_, B> {
    fn drop(&mut self) {
        if let Some(fb) = self.framebuffer.take() {
            if let Err(e) = self.backend.remove_framebuffer(fb) {
                warn!("Cleanup: {}", e);
            }
        }
        if let Some(handle) = self.buffer.take() {
            if let Err(e) = self.backend.destroy_buffer(handle) {
                warn!("Cleanup: {}", e);
            }
        }
    }
}

/// Provision a mapped framebuffer for `mode` on `crtc`
///
/// The CRTC's current configuration, together with the connectors
/// `bindings` says it was driving, is captured so it can be restored on
/// teardown.
pub fn provision<B: DeviceQuery + BufferAllocator + ?Sized>(
    backend: &B,
    connector: ConnectorId,
    crtc: CrtcId,
    mode: &DisplayMode,
    format: PixelFormat,
    bindings: &CrtcBindings,
) -> ModesetResult<DisplayDevice> {
    let (width, height) = (mode.width(), mode.height());

    let info = backend.create_buffer(width, height, format.bpp)?;
    let mut pending = PendingBuffer {
        backend,
        buffer: Some(info.handle),
        framebuffer: None,
    };

    let row_bytes = width as u64 * format.bytes_per_pixel() as u64;
    if (info.pitch as u64) < row_bytes || info.size < info.pitch as u64 * height as u64 {
        return Err(ModesetError::buffer(
            "create",
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "driver returned undersized buffer for {}x{}: pitch={}, size={}",
                    width, height, info.pitch, info.size
                ),
            ),
        ));
    }

    let fb = backend.add_framebuffer(&info, width, height, format.bpp, format.depth)?;
    pending.framebuffer = Some(fb);

    let map = backend.map_buffer(&info)?;
    let previous = bindings.get(&crtc).cloned().unwrap_or_default();
    let saved_crtc = SavedCrtc::new(backend.crtc(crtc)?, previous);

    // from here the display entry owns the buffer
    pending.framebuffer = None;
    pending.buffer = None;

    debug!(
        "Framebuffer created: id={}, {}x{}, stride={}, size={}",
        fb, width, height, info.pitch, info.size
    );

    Ok(DisplayDevice::new(
        connector,
        crtc,
        mode.clone(),
        ProvisionedBuffer {
            framebuffer: fb,
            buffer: info.handle,
            map,
            stride: info.pitch,
            size: info.size,
        },
        saved_crtc,
    ))
}
