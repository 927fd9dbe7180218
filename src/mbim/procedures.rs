//! Multi-step MBIM procedures run from a caller thread.
//!
//! Each step is one blocking [`MbimPort::request`]; a step that fails or
//! comes back with a non-success status aborts the procedure.

use std::net::Ipv4Addr;

use anyhow::{bail, Context, Result};

use super::frame::{FunctionMessage, MessageType};
use super::message::{self, ActivationCommand, ConnectRequest};
use super::port::MbimPort;
use super::status::{ActivationState, Status};

/// Fail unless `msg` carries a success status.
pub fn expect_success(msg: &FunctionMessage, step: &str) -> Result<()> {
    match msg.status() {
        Some(status) if msg.message_type == MessageType::FunctionError => {
            bail!("{step}: function error ({status})")
        }
        Some(status) if status.is_success() => Ok(()),
        Some(status) => bail!("{step} failed: {status}"),
        None => bail!("{step}: unexpected {:?} answer", msg.message_type),
    }
}

/// Open the function and subscribe to the default indications.
pub fn initialize(port: &MbimPort) -> Result<()> {
    let done = port
        .request(message::open(port.max_control_transfer()))
        .context("OPEN")?;
    expect_success(&done, "OPEN")?;
    log::info!("[mbim:{}] function opened", port.handle().name());

    let caps = port
        .request(message::query_device_capabilities())
        .context("query device caps")?;
    expect_success(&caps, "query device caps")?;

    let subscribed = port
        .request(message::set_subscribe_list(&message::default_subscriptions()))
        .context("set subscribe list")?;
    expect_success(&subscribed, "set subscribe list")?;

    log::info!("[mbim:{}] init done", port.handle().name());
    Ok(())
}

/// Clear every subscription and close the function.
///
/// Returns the `CLOSE_DONE` status.
pub fn shutdown(port: &MbimPort) -> Result<Status> {
    let cleared = port
        .request(message::set_subscribe_list(&[]))
        .context("clear subscribe list")?;
    if let Err(e) = expect_success(&cleared, "clear subscribe list") {
        log::warn!("[mbim:{}] {e:#}", port.handle().name());
    }

    let done = port.request(message::close()).context("CLOSE")?;
    let status = done
        .status()
        .with_context(|| format!("CLOSE: unexpected {:?} answer", done.message_type))?;
    log::info!("[mbim:{}] close done with {status}", port.handle().name());
    Ok(status)
}

/// Bring the internet session up or down on `apn`.
///
/// On activation the session's IPv4 configuration is queried and returned
/// when the device reports one.
pub fn connect(
    port: &MbimPort,
    activation: ActivationCommand,
    apn: Option<&str>,
) -> Result<Option<Ipv4Configuration>> {
    let ready = port
        .request(message::query_subscriber_ready_status())
        .context("query subscriber ready status")?;
    if let Some(status) = ready.status() {
        log::debug!("[mbim:{}] subscriber ready status: {status}", port.handle().name());
    }

    let request = ConnectRequest::internet(activation, apn.map(str::as_bytes));
    let msg = message::set_connect(&request).context("building SET CONNECT")?;
    let done = port.request(msg).context("SET CONNECT")?;
    expect_success(&done, "SET CONNECT")?;

    if let Some(info) = done.command_done().and_then(|d| ConnectInfo::parse(d.information)) {
        log::info!(
            "[mbim:{}] session {} {}",
            port.handle().name(),
            info.session_id,
            info.activation_state
        );
    }

    if activation == ActivationCommand::Deactivate {
        return Ok(None);
    }

    let ip = port
        .request(message::query_ip_configuration(request.session_id))
        .context("query IP configuration")?;
    expect_success(&ip, "query IP configuration")?;
    let config = ip
        .command_done()
        .and_then(|d| Ipv4Configuration::parse(d.information));
    if let Some(config) = &config {
        log::info!("[mbim:{}] {config}", port.handle().name());
    }
    Ok(config)
}

// ─── Information buffers ───────────────────────────────────────────────────

fn u32_at(buf: &[u8], off: usize) -> Option<u32> {
    let bytes = buf.get(off..off + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn ipv4_at(buf: &[u8], off: usize) -> Option<Ipv4Addr> {
    let b = buf.get(off..off + 4)?;
    Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
}

/// Leading fields of `MBIM_CONNECT_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectInfo {
    /// Session id.
    pub session_id: u32,
    /// Activation state.
    pub activation_state: ActivationState,
    /// Network error code (0 when none).
    pub nw_error: u32,
}

impl ConnectInfo {
    /// Parse a `CONNECT` information buffer.
    pub fn parse(info: &[u8]) -> Option<Self> {
        Some(Self {
            session_id: u32_at(info, 0)?,
            activation_state: ActivationState::from_u32(u32_at(info, 4)?),
            nw_error: u32_at(info, 32).unwrap_or(0),
        })
    }
}

/// Default handler for `CONNECT` indications.
pub fn log_connect_indication(msg: FunctionMessage) {
    let Some(info) = msg.indication().and_then(|ind| ConnectInfo::parse(ind.information)) else {
        log::warn!("CONNECT indication too short ({} bytes)", msg.payload.len());
        return;
    };
    log::info!(
        "CONNECT indication: session {} {}",
        info.session_id,
        info.activation_state
    );
}

const IPV4_ADDRESS_AVAILABLE: u32 = 0x1;
const IPV4_GATEWAY_AVAILABLE: u32 = 0x2;
const IPV4_DNS_AVAILABLE: u32 = 0x4;
const IPV4_MTU_AVAILABLE: u32 = 0x8;

/// IPv4 part of `MBIM_IP_CONFIGURATION_INFO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Configuration {
    /// Session id.
    pub session_id: u32,
    /// Addresses with their on-link prefix length.
    pub addresses: Vec<(Ipv4Addr, u32)>,
    /// Default gateway.
    pub gateway: Option<Ipv4Addr>,
    /// DNS servers.
    pub dns: Vec<Ipv4Addr>,
    /// Link MTU.
    pub mtu: Option<u32>,
}

impl Ipv4Configuration {
    /// Parse an `IP_CONFIGURATION` information buffer.
    ///
    /// Returns `None` when the buffer is malformed or carries no IPv4 data.
    pub fn parse(info: &[u8]) -> Option<Self> {
        let session_id = u32_at(info, 0)?;
        let available = u32_at(info, 4)?;
        if available == 0 {
            return None;
        }

        let mut addresses = Vec::new();
        if available & IPV4_ADDRESS_AVAILABLE != 0 {
            let count = u32_at(info, 12)? as usize;
            let offset = u32_at(info, 16)? as usize;
            for i in 0..count {
                let element = offset + i * 8;
                addresses.push((ipv4_at(info, element + 4)?, u32_at(info, element)?));
            }
        }

        let gateway = if available & IPV4_GATEWAY_AVAILABLE != 0 {
            Some(ipv4_at(info, u32_at(info, 28)? as usize)?)
        } else {
            None
        };

        let mut dns = Vec::new();
        if available & IPV4_DNS_AVAILABLE != 0 {
            let count = u32_at(info, 36)? as usize;
            let offset = u32_at(info, 40)? as usize;
            for i in 0..count {
                dns.push(ipv4_at(info, offset + i * 4)?);
            }
        }

        let mtu = if available & IPV4_MTU_AVAILABLE != 0 {
            Some(u32_at(info, 52)?)
        } else {
            None
        };

        Some(Self {
            session_id,
            addresses,
            gateway,
            dns,
            mtu,
        })
    }
}

impl std::fmt::Display for Ipv4Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session {} ipv4", self.session_id)?;
        for (addr, prefix) in &self.addresses {
            write!(f, " {addr}/{prefix}")?;
        }
        if let Some(gw) = self.gateway {
            write!(f, " gw {gw}")?;
        }
        for server in &self.dns {
            write!(f, " dns {server}")?;
        }
        if let Some(mtu) = self.mtu {
            write!(f, " mtu {mtu}")?;
        }
        Ok(())
    }
}
