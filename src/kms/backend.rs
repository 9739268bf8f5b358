//! Device collaborators
//!
//! The discovery core talks to the device only through these traits.
//! `Card` implements them on top of a real DRM node.

use memmap2::MmapMut;

use super::error::ModesetResult;
use super::types::{
    BufferHandle, ConnectorId, ConnectorRecord, CrtcId, CrtcRecord, DisplayMode, DumbBufferInfo,
    EncoderId, EncoderRecord, FramebufferId, ResourceCounts, ResourceFetch,
};

/// Read access to the mode-setting object tables
pub trait DeviceQuery {
    /// First phase of the catalog query: object counts only
    fn resource_counts(&self) -> ModesetResult<ResourceCounts>;

    /// Second phase: fetch ids into buffers sized for `capacity`
    fn resource_ids(&self, capacity: &ResourceCounts) -> ModesetResult<ResourceFetch>;

    fn connector(&self, id: ConnectorId) -> ModesetResult<ConnectorRecord>;

    fn encoder(&self, id: EncoderId) -> ModesetResult<EncoderRecord>;

    fn crtc(&self, id: CrtcId) -> ModesetResult<CrtcRecord>;
}

/// Buffer and scan-out operations
pub trait BufferAllocator {
    fn create_buffer(&self, width: u32, height: u32, bpp: u32) -> ModesetResult<DumbBufferInfo>;

    fn add_framebuffer(
        &self,
        buffer: &DumbBufferInfo,
        width: u32,
        height: u32,
        bpp: u32,
        depth: u32,
    ) -> ModesetResult<FramebufferId>;

    fn map_buffer(&self, buffer: &DumbBufferInfo) -> ModesetResult<MmapMut>;

    fn remove_framebuffer(&self, fb: FramebufferId) -> ModesetResult<()>;

    fn destroy_buffer(&self, handle: BufferHandle) -> ModesetResult<()>;

    /// Program a CRTC. `None` for framebuffer and mode disables it.
    fn set_crtc(
        &self,
        crtc: CrtcId,
        fb: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&DisplayMode>,
    ) -> ModesetResult<()>;
}

/// Everything a discovery pass needs from a device
pub trait ModesetBackend: DeviceQuery + BufferAllocator {}

impl<T: DeviceQuery + BufferAllocator> ModesetBackend for T {}
