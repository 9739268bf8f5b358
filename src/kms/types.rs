//! KMS object identifiers and raw catalog records
//!
//! Records are plain snapshots of what the device reported. They are not
//! tied to the device handle and are dropped after each inspection step.

use std::fmt;

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

object_id!(
    /// Physical display output
    ConnectorId
);
object_id!(
    /// Signal encoder between a CRTC and a connector
    EncoderId
);
object_id!(
    /// Scan-out pipeline
    CrtcId
);
object_id!(
    /// Framebuffer object
    FramebufferId
);
object_id!(
    /// GEM handle of a dumb buffer
    BufferHandle
);

/// Object counts reported by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub connectors: usize,
    pub encoders: usize,
    pub crtcs: usize,
    pub framebuffers: usize,
}

/// Global object table of a device
///
/// The position of a CRTC in `crtcs` is its index for encoder
/// capability masks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCatalog {
    pub connectors: Vec<ConnectorId>,
    pub encoders: Vec<EncoderId>,
    pub crtcs: Vec<CrtcId>,
    pub framebuffers: Vec<FramebufferId>,
}

impl ResourceCatalog {
    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            connectors: self.connectors.len(),
            encoders: self.encoders.len(),
            crtcs: self.crtcs.len(),
            framebuffers: self.framebuffers.len(),
        }
    }

    /// CRTCs selected by an encoder's capability mask, lowest index first
    pub fn filter_crtcs(&self, possible_crtcs: u32) -> impl Iterator<Item = CrtcId> + '_ {
        self.crtcs
            .iter()
            .enumerate()
            .filter(move |(index, _)| *index < 32 && possible_crtcs & (1 << index) != 0)
            .map(|(_, &crtc)| crtc)
    }
}

/// Result of the second (fetch) phase of a catalog query
///
/// `counts` holds the counts the device reported during the fetch. When
/// they differ from the counts the buffers were sized for, the ids are
/// incomplete and the query has to be issued again.
#[derive(Debug, Clone, Default)]
pub struct ResourceFetch {
    pub counts: ResourceCounts,
    pub catalog: ResourceCatalog,
}

/// Connector connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Unknown,
}

/// Display timing descriptor
///
/// Carries the full timing so the mode can be handed back to the kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayMode {
    pub name: String,
    /// Pixel clock in kHz
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub mode_type: u32,
}

impl DisplayMode {
    pub fn width(&self) -> u32 {
        self.hdisplay as u32
    }

    pub fn height(&self) -> u32 {
        self.vdisplay as u32
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}Hz", self.hdisplay, self.vdisplay, self.vrefresh)
    }
}

/// Connector snapshot
#[derive(Debug, Clone)]
pub struct ConnectorRecord {
    pub id: ConnectorId,
    pub status: ConnectionStatus,
    /// Supported modes in driver preference order
    pub modes: Vec<DisplayMode>,
    pub current_encoder: Option<EncoderId>,
    pub encoders: Vec<EncoderId>,
    /// Human-readable interface name (e.g. "HDMI-A-1")
    pub name: String,
}

/// Encoder snapshot
#[derive(Debug, Clone, Copy)]
pub struct EncoderRecord {
    pub id: EncoderId,
    pub crtc: Option<CrtcId>,
    /// Bit `j` set means the CRTC at catalog index `j` can be driven
    pub possible_crtcs: u32,
}

/// CRTC state as reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcRecord {
    pub id: CrtcId,
    pub framebuffer: Option<FramebufferId>,
    pub position: (u32, u32),
    pub mode: Option<DisplayMode>,
}

/// CRTC configuration captured before this session claimed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCrtc {
    pub crtc: CrtcId,
    pub framebuffer: Option<FramebufferId>,
    pub position: (u32, u32),
    pub mode: Option<DisplayMode>,
    /// Connectors the CRTC was driving, via their current encoder
    pub connectors: Vec<ConnectorId>,
}

impl SavedCrtc {
    pub fn new(record: CrtcRecord, connectors: Vec<ConnectorId>) -> Self {
        Self {
            crtc: record.id,
            framebuffer: record.framebuffer,
            position: record.position,
            mode: record.mode,
            connectors,
        }
    }
}

/// Dumb buffer as allocated by the driver
///
/// `pitch` and `size` are driver-assigned. Rows must be addressed by
/// `pitch`, never by `width * bytes_per_pixel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbBufferInfo {
    pub handle: BufferHandle,
    pub pitch: u32,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_crtcs(ids: &[u32]) -> ResourceCatalog {
        ResourceCatalog {
            crtcs: ids.iter().copied().map(CrtcId).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_crtcs_follows_mask_bits() {
        let catalog = catalog_with_crtcs(&[41, 42, 43, 44]);
        let picked: Vec<_> = catalog.filter_crtcs(0b1010).collect();
        assert_eq!(picked, vec![CrtcId(42), CrtcId(44)]);
        assert_eq!(catalog.filter_crtcs(0).count(), 0);
    }

    #[test]
    fn test_filter_crtcs_ignores_bits_past_catalog() {
        let catalog = catalog_with_crtcs(&[41]);
        let picked: Vec<_> = catalog.filter_crtcs(u32::MAX).collect();
        assert_eq!(picked, vec![CrtcId(41)]);
    }

    #[test]
    fn test_mode_display() {
        let mode = DisplayMode {
            hdisplay: 1920,
            vdisplay: 1080,
            vrefresh: 60,
            ..Default::default()
        };
        assert_eq!(mode.to_string(), "1920x1080@60Hz");
        assert_eq!((mode.width(), mode.height()), (1920, 1080));
    }
}
