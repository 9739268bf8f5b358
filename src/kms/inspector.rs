//! Connector inspection and mode selection

use log::debug;

use super::error::{ModesetError, ModesetResult};
use super::types::{ConnectionStatus, ConnectorRecord, DisplayMode};

/// Outcome of inspecting one connector
#[derive(Debug)]
pub enum Inspection {
    /// No monitor attached (or the driver cannot tell); nothing to provision
    Inactive(ConnectionStatus),
    /// Connected with at least one mode
    Usable {
        connector: ConnectorRecord,
        mode: DisplayMode,
    },
}

/// Pick the mode for a queried connector
///
/// The driver lists modes in preference order, so the first one is taken
/// as is. A connected connector without modes is an error.
pub fn inspect(connector: ConnectorRecord) -> ModesetResult<Inspection> {
    let id = connector.id;

    if connector.status != ConnectionStatus::Connected {
        debug!(
            "Ignoring unused connector {} ({}, {:?})",
            id, connector.name, connector.status
        );
        return Ok(Inspection::Inactive(connector.status));
    }

    let mode = connector
        .modes
        .first()
        .cloned()
        .ok_or(ModesetError::ConnectorUnusable {
            connector: id,
            reason: "connected but reports no modes",
        })?;

    debug!("Mode for connector {} ({}) is {}", id, connector.name, mode);
    Ok(Inspection::Usable { connector, mode })
}
