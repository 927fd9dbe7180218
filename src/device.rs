//! Device boundary: open a modem endpoint and start the right port on it.
//!
//! Discovery (which tty is the AT port, which cdc-wdm node carries MBIM) and
//! line configuration belong to whoever calls [`create_port`]. This module
//! only opens the path and picks the protocol.

use std::fs::OpenOptions;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use anyhow::{Context, Result};

use crate::at::AtPort;
use crate::mbim::MbimPort;

/// Which protocol a device endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    /// AT command port (serial tty).
    At,
    /// MBIM control channel.
    Mbim {
        /// Negotiated max control transfer.
        max_control_transfer: u32,
    },
}

/// A started port of either role.
#[derive(Debug)]
pub enum DevicePort {
    /// AT port.
    At(AtPort),
    /// MBIM port.
    Mbim(MbimPort),
}

impl DevicePort {
    /// Port name.
    pub fn name(&self) -> &str {
        match self {
            Self::At(port) => port.handle().name(),
            Self::Mbim(port) => port.handle().name(),
        }
    }

    /// Ask the port loop to stop and wait for it.
    pub fn close(&self) -> Result<()> {
        match self {
            Self::At(port) => {
                port.handle().terminate();
                port.handle().join()
            }
            Self::Mbim(port) => {
                port.handle().terminate();
                port.handle().join()
            }
        }
    }
}

/// Open `path` read/write, non-blocking, without making it the controlling tty.
pub fn open_device(path: &Path) -> Result<OwnedFd> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
        .open(path)
        .with_context(|| format!("Failed to open device {}", path.display()))?;
    Ok(OwnedFd::from(file))
}

/// Open `path` and start a port loop for `role` on it.
///
/// The port is named after the last path component.
pub fn create_port(path: &Path, role: PortRole) -> Result<DevicePort> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let fd = open_device(path)?;

    log::info!("Starting {role:?} port {name} on {}", path.display());
    let port = match role {
        PortRole::At => DevicePort::At(AtPort::spawn(&name, fd)?),
        PortRole::Mbim {
            max_control_transfer,
        } => DevicePort::Mbim(MbimPort::spawn(&name, fd, max_control_transfer)?),
    };
    Ok(port)
}
