//! DRM device node
//!
//! Opens /dev/dri/card* and implements the device collaborators on top of
//! it. Connector, encoder, CRTC and mode-set requests go through `drm`;
//! the resource table and dumb-buffer requests are issued as raw ioctls so
//! the counts and driver-assigned geometry stay visible.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::raw::c_char;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use drm::control::{connector, crtc, framebuffer, Device as ControlDevice, Mode};
use drm::{Device as BasicDevice, DriverCapability};
use log::{debug, info};
use memmap2::{MmapMut, MmapOptions};

use super::backend::{BufferAllocator, DeviceQuery};
use super::error::{ModesetError, ModesetResult};
use super::ioctl_helpers::ioctl_with_mut_arg;
use super::types::*;

/// Opened DRM device
pub struct Card {
    file: File,
    path: PathBuf,
    force_probe: bool,
}

// Trait implementations required by drm crate
impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl BasicDevice for Card {}
impl ControlDevice for Card {}

impl Card {
    /// Open DRM device and check it supports dumb buffers
    ///
    /// # Arguments
    /// * `path` - Device path (e.g., "/dev/dri/card0")
    /// * `force_probe` - Re-probe connectors instead of using cached state
    pub fn open<P: AsRef<Path>>(path: P, force_probe: bool) -> ModesetResult<Self> {
        let path = path.as_ref();
        info!("Opening DRM device: {}", path.display());

        // std opens with O_CLOEXEC
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ModesetError::unavailable(path.display().to_string(), e))?;

        let card = Self {
            file,
            path: path.to_path_buf(),
            force_probe,
        };

        match card.get_driver_capability(DriverCapability::DumbBuffer) {
            Ok(0) => {
                return Err(ModesetError::unavailable(
                    path.display().to_string(),
                    io::Error::new(io::ErrorKind::Unsupported, "dumb buffers not supported"),
                ))
            }
            Ok(_) => debug!("Dumb buffer capability present"),
            Err(e) => return Err(ModesetError::unavailable(path.display().to_string(), e)),
        }

        Ok(card)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn get_resources(&self, res: &mut drm_mode_card_res) -> ModesetResult<()> {
        ioctl_with_mut_arg(
            self.as_raw_fd(),
            DRM_IOCTL_MODE_GETRESOURCES,
            res,
            "MODE_GETRESOURCES",
        )
        .map_err(|e| ModesetError::query("resources", e))
    }
}

fn handle<T: From<drm::control::RawResourceHandle>>(what: &str, id: u32) -> ModesetResult<T> {
    drm::control::from_u32(id).ok_or_else(|| {
        ModesetError::query(
            format!("{} {}", what, id),
            io::Error::from_raw_os_error(libc::EINVAL),
        )
    })
}

impl DeviceQuery for Card {
    fn resource_counts(&self) -> ModesetResult<ResourceCounts> {
        let mut res = drm_mode_card_res::default();
        self.get_resources(&mut res)?;
        Ok(res.counts())
    }

    fn resource_ids(&self, capacity: &ResourceCounts) -> ModesetResult<ResourceFetch> {
        let mut fbs = vec![0u32; capacity.framebuffers];
        let mut crtcs = vec![0u32; capacity.crtcs];
        let mut connectors = vec![0u32; capacity.connectors];
        let mut encoders = vec![0u32; capacity.encoders];

        let mut res = drm_mode_card_res {
            fb_id_ptr: fbs.as_mut_ptr() as u64,
            crtc_id_ptr: crtcs.as_mut_ptr() as u64,
            connector_id_ptr: connectors.as_mut_ptr() as u64,
            encoder_id_ptr: encoders.as_mut_ptr() as u64,
            count_fbs: capacity.framebuffers as u32,
            count_crtcs: capacity.crtcs as u32,
            count_connectors: capacity.connectors as u32,
            count_encoders: capacity.encoders as u32,
            ..Default::default()
        };
        self.get_resources(&mut res)?;

        // the kernel fills at most the provided capacity
        let counts = res.counts();
        fbs.truncate(counts.framebuffers);
        crtcs.truncate(counts.crtcs);
        connectors.truncate(counts.connectors);
        encoders.truncate(counts.encoders);

        Ok(ResourceFetch {
            counts,
            catalog: ResourceCatalog {
                connectors: connectors.into_iter().map(ConnectorId).collect(),
                encoders: encoders.into_iter().map(EncoderId).collect(),
                crtcs: crtcs.into_iter().map(CrtcId).collect(),
                framebuffers: fbs.into_iter().map(FramebufferId).collect(),
            },
        })
    }

    fn connector(&self, id: ConnectorId) -> ModesetResult<ConnectorRecord> {
        let h: connector::Handle = handle("connector", id.0)?;
        let info = ControlDevice::get_connector(self, h, self.force_probe)
            .map_err(|e| ModesetError::query(format!("connector {}", id), e))?;

        let status = match info.state() {
            connector::State::Connected => ConnectionStatus::Connected,
            connector::State::Disconnected => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Unknown,
        };

        Ok(ConnectorRecord {
            id,
            status,
            modes: info.modes().iter().map(DisplayMode::from).collect(),
            current_encoder: info.current_encoder().map(|e| EncoderId(e.into())),
            encoders: info.encoders().iter().map(|&e| EncoderId(e.into())).collect(),
            name: format!("{:?}-{}", info.interface(), info.interface_id()),
        })
    }

    fn encoder(&self, id: EncoderId) -> ModesetResult<EncoderRecord> {
        // drm::control::encoder::Info hides the raw capability mask
        let enc = drm_ffi::mode::get_encoder(self.as_fd(), id.0)
            .map_err(|e| ModesetError::query(format!("encoder {}", id), e))?;

        Ok(EncoderRecord {
            id,
            crtc: (enc.crtc_id != 0).then_some(CrtcId(enc.crtc_id)),
            possible_crtcs: enc.possible_crtcs,
        })
    }

    fn crtc(&self, id: CrtcId) -> ModesetResult<CrtcRecord> {
        let h: crtc::Handle = handle("CRTC", id.0)?;
        let info = ControlDevice::get_crtc(self, h)
            .map_err(|e| ModesetError::query(format!("CRTC {}", id), e))?;

        Ok(CrtcRecord {
            id,
            framebuffer: info.framebuffer().map(|fb| FramebufferId(fb.into())),
            position: info.position(),
            mode: info.mode().as_ref().map(DisplayMode::from),
        })
    }
}

impl BufferAllocator for Card {
    fn create_buffer(&self, width: u32, height: u32, bpp: u32) -> ModesetResult<DumbBufferInfo> {
        let mut req = drm_mode_create_dumb {
            height,
            width,
            bpp,
            ..Default::default()
        };
        ioctl_with_mut_arg(
            self.as_raw_fd(),
            DRM_IOCTL_MODE_CREATE_DUMB,
            &mut req,
            "MODE_CREATE_DUMB",
        )
        .map_err(|e| ModesetError::buffer("create", e))?;

        Ok(DumbBufferInfo {
            handle: BufferHandle(req.handle),
            pitch: req.pitch,
            size: req.size,
        })
    }

    fn add_framebuffer(
        &self,
        buffer: &DumbBufferInfo,
        width: u32,
        height: u32,
        bpp: u32,
        depth: u32,
    ) -> ModesetResult<FramebufferId> {
        let mut fb_cmd = drm_mode_fb_cmd {
            fb_id: 0,
            width,
            height,
            pitch: buffer.pitch,
            bpp,
            depth,
            handle: buffer.handle.0,
        };
        ioctl_with_mut_arg(
            self.as_raw_fd(),
            DRM_IOCTL_MODE_ADDFB,
            &mut fb_cmd,
            "MODE_ADDFB",
        )
        .map_err(|e| ModesetError::buffer("add framebuffer", e))?;

        Ok(FramebufferId(fb_cmd.fb_id))
    }

    fn map_buffer(&self, buffer: &DumbBufferInfo) -> ModesetResult<MmapMut> {
        let mut req = drm_mode_map_dumb {
            handle: buffer.handle.0,
            ..Default::default()
        };
        ioctl_with_mut_arg(
            self.as_raw_fd(),
            DRM_IOCTL_MODE_MAP_DUMB,
            &mut req,
            "MODE_MAP_DUMB",
        )
        .map_err(|e| ModesetError::buffer("map", e))?;

        let len = usize::try_from(buffer.size).map_err(|_| {
            ModesetError::buffer("map", io::Error::from_raw_os_error(libc::EOVERFLOW))
        })?;

        // Safety: the mapping covers a buffer object this process owns; the
        // kernel keeps the pages alive until the mapping is dropped.
        unsafe {
            MmapOptions::new()
                .offset(req.offset)
                .len(len)
                .map_mut(&self.file)
        }
        .map_err(|e| ModesetError::buffer("map", e))
    }

    fn remove_framebuffer(&self, fb: FramebufferId) -> ModesetResult<()> {
        let mut fb_id = fb.0;
        ioctl_with_mut_arg(self.as_raw_fd(), DRM_IOCTL_MODE_RMFB, &mut fb_id, "MODE_RMFB")
            .map_err(|e| ModesetError::buffer("remove framebuffer", e))
    }

    fn destroy_buffer(&self, handle: BufferHandle) -> ModesetResult<()> {
        let mut req = drm_mode_destroy_dumb { handle: handle.0 };
        ioctl_with_mut_arg(
            self.as_raw_fd(),
            DRM_IOCTL_MODE_DESTROY_DUMB,
            &mut req,
            "MODE_DESTROY_DUMB",
        )
        .map_err(|e| ModesetError::buffer("destroy", e))
    }

    fn set_crtc(
        &self,
        crtc: CrtcId,
        fb: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&DisplayMode>,
    ) -> ModesetResult<()> {
        let crtc_handle: crtc::Handle = handle("CRTC", crtc.0)?;
        let fb_handle = fb
            .map(|fb| handle::<framebuffer::Handle>("framebuffer", fb.0))
            .transpose()?;
        let conn_handles = connectors
            .iter()
            .map(|c| handle::<connector::Handle>("connector", c.0))
            .collect::<ModesetResult<Vec<_>>>()?;

        ControlDevice::set_crtc(
            self,
            crtc_handle,
            fb_handle,
            position,
            &conn_handles,
            mode.map(Mode::from),
        )
        .map_err(|e| ModesetError::query(format!("set CRTC {}", crtc), e))
    }
}

impl From<&Mode> for DisplayMode {
    fn from(mode: &Mode) -> Self {
        let (hdisplay, vdisplay) = mode.size();
        let (hsync_start, hsync_end, htotal) = mode.hsync();
        let (vsync_start, vsync_end, vtotal) = mode.vsync();
        Self {
            name: mode.name().to_string_lossy().into_owned(),
            clock: mode.clock(),
            hdisplay,
            hsync_start,
            hsync_end,
            htotal,
            hskew: mode.hskew(),
            vdisplay,
            vsync_start,
            vsync_end,
            vtotal,
            vscan: mode.vscan(),
            vrefresh: mode.vrefresh(),
            flags: mode.flags().bits(),
            mode_type: mode.mode_type().bits(),
        }
    }
}

impl From<&DisplayMode> for Mode {
    fn from(mode: &DisplayMode) -> Self {
        // Safety: plain integer fields, all-zero is a valid value
        let mut raw: drm_ffi::drm_mode_modeinfo = unsafe { std::mem::zeroed() };
        raw.clock = mode.clock;
        raw.hdisplay = mode.hdisplay;
        raw.hsync_start = mode.hsync_start;
        raw.hsync_end = mode.hsync_end;
        raw.htotal = mode.htotal;
        raw.hskew = mode.hskew;
        raw.vdisplay = mode.vdisplay;
        raw.vsync_start = mode.vsync_start;
        raw.vsync_end = mode.vsync_end;
        raw.vtotal = mode.vtotal;
        raw.vscan = mode.vscan;
        raw.vrefresh = mode.vrefresh;
        raw.flags = mode.flags;
        raw.type_ = mode.mode_type;
        // keep the trailing NUL
        let max = raw.name.len() - 1;
        for (dst, &src) in raw.name.iter_mut().zip(mode.name.as_bytes().iter().take(max)) {
            *dst = src as c_char;
        }
        Mode::from(raw)
    }
}

// DRM mode ioctl structures (include/uapi/drm/drm_mode.h)

#[repr(C)]
#[derive(Debug, Default)]
struct drm_mode_card_res {
    fb_id_ptr: u64,
    crtc_id_ptr: u64,
    connector_id_ptr: u64,
    encoder_id_ptr: u64,
    count_fbs: u32,
    count_crtcs: u32,
    count_connectors: u32,
    count_encoders: u32,
    min_width: u32,
    max_width: u32,
    min_height: u32,
    max_height: u32,
}

impl drm_mode_card_res {
    fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            connectors: self.count_connectors as usize,
            encoders: self.count_encoders as usize,
            crtcs: self.count_crtcs as usize,
            framebuffers: self.count_fbs as usize,
        }
    }
}

#[repr(C)]
struct drm_mode_fb_cmd {
    fb_id: u32,
    width: u32,
    height: u32,
    pitch: u32,
    bpp: u32,
    depth: u32,
    handle: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct drm_mode_create_dumb {
    height: u32,
    width: u32,
    bpp: u32,
    flags: u32,
    handle: u32,
    pitch: u32,
    size: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
struct drm_mode_map_dumb {
    handle: u32,
    pad: u32,
    offset: u64,
}

#[repr(C)]
struct drm_mode_destroy_dumb {
    handle: u32,
}

// DRM ioctl constants: _IOWR('d', nr, type)
const DRM_IOCTL_BASE: u8 = 0x64;

const DRM_IOCTL_MODE_GETRESOURCES: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xA0,
    std::mem::size_of::<drm_mode_card_res>()
) as libc::c_ulong;

const DRM_IOCTL_MODE_ADDFB: libc::c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xAE, std::mem::size_of::<drm_mode_fb_cmd>())
        as libc::c_ulong;

const DRM_IOCTL_MODE_RMFB: libc::c_ulong =
    nix::request_code_readwrite!(DRM_IOCTL_BASE, 0xAF, std::mem::size_of::<u32>())
        as libc::c_ulong;

const DRM_IOCTL_MODE_CREATE_DUMB: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xB2,
    std::mem::size_of::<drm_mode_create_dumb>()
) as libc::c_ulong;

const DRM_IOCTL_MODE_MAP_DUMB: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xB3,
    std::mem::size_of::<drm_mode_map_dumb>()
) as libc::c_ulong;

const DRM_IOCTL_MODE_DESTROY_DUMB: libc::c_ulong = nix::request_code_readwrite!(
    DRM_IOCTL_BASE,
    0xB4,
    std::mem::size_of::<drm_mode_destroy_dumb>()
) as libc::c_ulong;
