//! Scripted in-memory device for unit tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io;

use memmap2::MmapMut;

use super::backend::{BufferAllocator, DeviceQuery};
use super::error::{ModesetError, ModesetResult};
use super::types::*;

/// Side-effecting calls made against the fake device, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateBuffer(BufferHandle),
    AddFramebuffer(FramebufferId),
    Map(BufferHandle),
    RemoveFramebuffer(FramebufferId),
    DestroyBuffer(BufferHandle),
    SetCrtc(CrtcId, Option<FramebufferId>, Vec<ConnectorId>),
}

#[derive(Default)]
pub struct FakeDevice {
    pub catalog: ResourceCatalog,
    pub connectors: HashMap<ConnectorId, ConnectorRecord>,
    pub encoders: HashMap<EncoderId, EncoderRecord>,
    pub crtcs: HashMap<CrtcId, CrtcRecord>,
    /// Number of fetches that report an extra connector appearing mid-query
    pub catalog_growth: Cell<usize>,
    pub fail_catalog: bool,
    pub fail_connectors: HashSet<ConnectorId>,
    pub fail_add_framebuffer: bool,
    pub fail_map: bool,
    pub fail_set_crtc: RefCell<HashSet<CrtcId>>,
    /// Row alignment applied by the fake driver
    pub pitch_align: u32,
    pub calls: RefCell<Vec<Call>>,
    next_object: Cell<u32>,
    live_buffers: RefCell<HashSet<BufferHandle>>,
    live_framebuffers: RefCell<HashSet<FramebufferId>>,
}

pub fn mode(width: u16, height: u16) -> DisplayMode {
    DisplayMode {
        name: format!("{}x{}", width, height),
        hdisplay: width,
        vdisplay: height,
        vrefresh: 60,
        ..Default::default()
    }
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            pitch_align: 64,
            next_object: Cell::new(100),
            ..Default::default()
        }
    }

    pub fn with_crtcs(mut self, ids: &[u32]) -> Self {
        for &id in ids {
            let crtc = CrtcId(id);
            self.catalog.crtcs.push(crtc);
            self.crtcs.insert(
                crtc,
                CrtcRecord {
                    id: crtc,
                    framebuffer: None,
                    position: (0, 0),
                    mode: None,
                },
            );
        }
        self
    }

    /// Mark a CRTC as already scanning out `fb` before the session
    pub fn with_scanout(mut self, crtc: u32, fb: u32) -> Self {
        if let Some(record) = self.crtcs.get_mut(&CrtcId(crtc)) {
            record.framebuffer = Some(FramebufferId(fb));
            record.mode = Some(mode(1024, 768));
        }
        self
    }

    pub fn with_encoder(mut self, id: u32, crtc: Option<u32>, possible_crtcs: u32) -> Self {
        let encoder = EncoderId(id);
        self.catalog.encoders.push(encoder);
        self.encoders.insert(
            encoder,
            EncoderRecord {
                id: encoder,
                crtc: crtc.map(CrtcId),
                possible_crtcs,
            },
        );
        self
    }

    pub fn with_connector(
        mut self,
        id: u32,
        status: ConnectionStatus,
        modes: Vec<DisplayMode>,
        current_encoder: Option<u32>,
        encoders: &[u32],
    ) -> Self {
        let connector = ConnectorId(id);
        self.catalog.connectors.push(connector);
        self.connectors.insert(
            connector,
            ConnectorRecord {
                id: connector,
                status,
                modes,
                current_encoder: current_encoder.map(EncoderId),
                encoders: encoders.iter().copied().map(EncoderId).collect(),
                name: format!("Virtual-{}", id),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.borrow().len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.live_framebuffers.borrow().len()
    }

    fn next_object(&self) -> u32 {
        let id = self.next_object.get();
        self.next_object.set(id + 1);
        id
    }

    /// SetCrtc calls issued so far, in order
    pub fn set_crtc_calls(&self) -> Vec<(CrtcId, Option<FramebufferId>, Vec<ConnectorId>)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::SetCrtc(crtc, fb, connectors) => Some((*crtc, *fb, connectors.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

fn enoent() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOENT)
}

impl DeviceQuery for FakeDevice {
    fn resource_counts(&self) -> ModesetResult<ResourceCounts> {
        if self.fail_catalog {
            return Err(ModesetError::query(
                "resources",
                io::Error::from_raw_os_error(libc::ENODEV),
            ));
        }
        Ok(self.catalog.counts())
    }

    fn resource_ids(&self, capacity: &ResourceCounts) -> ModesetResult<ResourceFetch> {
        let mut counts = self.catalog.counts();
        let pending = self.catalog_growth.get();
        if pending > 0 {
            self.catalog_growth.set(pending - 1);
            counts.connectors += 1;
        }
        if counts != *capacity {
            return Ok(ResourceFetch {
                counts,
                catalog: ResourceCatalog::default(),
            });
        }
        Ok(ResourceFetch {
            counts,
            catalog: self.catalog.clone(),
        })
    }

    fn connector(&self, id: ConnectorId) -> ModesetResult<ConnectorRecord> {
        if self.fail_connectors.contains(&id) {
            return Err(ModesetError::query(format!("connector {}", id), enoent()));
        }
        self.connectors
            .get(&id)
            .cloned()
            .ok_or_else(|| ModesetError::query(format!("connector {}", id), enoent()))
    }

    fn encoder(&self, id: EncoderId) -> ModesetResult<EncoderRecord> {
        self.encoders
            .get(&id)
            .copied()
            .ok_or_else(|| ModesetError::query(format!("encoder {}", id), enoent()))
    }

    fn crtc(&self, id: CrtcId) -> ModesetResult<CrtcRecord> {
        self.crtcs
            .get(&id)
            .cloned()
            .ok_or_else(|| ModesetError::query(format!("CRTC {}", id), enoent()))
    }
}

impl BufferAllocator for FakeDevice {
    fn create_buffer(&self, width: u32, height: u32, bpp: u32) -> ModesetResult<DumbBufferInfo> {
        if width == 0 || height == 0 || bpp == 0 {
            return Err(ModesetError::buffer(
                "create",
                io::Error::from_raw_os_error(libc::EINVAL),
            ));
        }
        let min_pitch = width * bpp.div_ceil(8);
        let align = self.pitch_align.max(1);
        let pitch = min_pitch.div_ceil(align) * align;
        let handle = BufferHandle(self.next_object());
        self.live_buffers.borrow_mut().insert(handle);
        self.record(Call::CreateBuffer(handle));
        Ok(DumbBufferInfo {
            handle,
            pitch,
            size: pitch as u64 * height as u64,
        })
    }

    fn add_framebuffer(
        &self,
        buffer: &DumbBufferInfo,
        _width: u32,
        _height: u32,
        _bpp: u32,
        _depth: u32,
    ) -> ModesetResult<FramebufferId> {
        if self.fail_add_framebuffer || !self.live_buffers.borrow().contains(&buffer.handle) {
            return Err(ModesetError::buffer(
                "add framebuffer",
                io::Error::from_raw_os_error(libc::EINVAL),
            ));
        }
        let fb = FramebufferId(self.next_object());
        self.live_framebuffers.borrow_mut().insert(fb);
        self.record(Call::AddFramebuffer(fb));
        Ok(fb)
    }

    fn map_buffer(&self, buffer: &DumbBufferInfo) -> ModesetResult<MmapMut> {
        if self.fail_map {
            return Err(ModesetError::buffer(
                "map",
                io::Error::from_raw_os_error(libc::ENOMEM),
            ));
        }
        self.record(Call::Map(buffer.handle));
        MmapMut::map_anon(buffer.size as usize).map_err(|e| ModesetError::buffer("map", e))
    }

    fn remove_framebuffer(&self, fb: FramebufferId) -> ModesetResult<()> {
        self.record(Call::RemoveFramebuffer(fb));
        if !self.live_framebuffers.borrow_mut().remove(&fb) {
            return Err(ModesetError::buffer("remove framebuffer", enoent()));
        }
        Ok(())
    }

    fn destroy_buffer(&self, handle: BufferHandle) -> ModesetResult<()> {
        self.record(Call::DestroyBuffer(handle));
        if !self.live_buffers.borrow_mut().remove(&handle) {
            return Err(ModesetError::buffer("destroy", enoent()));
        }
        Ok(())
    }

    fn set_crtc(
        &self,
        crtc: CrtcId,
        fb: Option<FramebufferId>,
        _position: (u32, u32),
        connectors: &[ConnectorId],
        _mode: Option<&DisplayMode>,
    ) -> ModesetResult<()> {
        self.record(Call::SetCrtc(crtc, fb, connectors.to_vec()));
        if self.fail_set_crtc.borrow().contains(&crtc) {
            return Err(ModesetError::query(
                format!("set CRTC {}", crtc),
                io::Error::from_raw_os_error(libc::EINVAL),
            ));
        }
        Ok(())
    }
}
