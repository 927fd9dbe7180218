//! MBIM host messages and their builders.
//!
//! Builders produce an [`MbimMessage`] value and never touch a port. A
//! command message carries the command body that follows the fragment
//! header on the wire:
//!
//! ```text
//! [16: service UUID] [u32 CID] [u32 CommandType] [u32 InfoLen] [InfoLen bytes]
//! ```
//!
//! The transaction id and the message/fragment headers are added by the
//! frame engine when the message is sent (see [`super::frame`]).

// Rust guideline compliant 2026-02

use uuid::Uuid;

use super::services::{context_type, CommandCode, Service};

/// Command type of a `COMMAND_MSG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Query (0).
    Query,
    /// Set (1).
    Set,
}

impl CommandType {
    /// Wire value.
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Query => 0,
            Self::Set => 1,
        }
    }
}

/// Body of a `COMMAND_MSG`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    /// Device service UUID.
    pub service: Uuid,
    /// Command identifier within the service.
    pub cid: u32,
    /// Query or set.
    pub command_type: CommandType,
    /// Information buffer.
    pub information: Vec<u8>,
}

impl CommandMessage {
    fn new(code: CommandCode, command_type: CommandType, information: Vec<u8>) -> Self {
        Self {
            service: code.service_uuid(),
            cid: code.cid(),
            command_type,
            information,
        }
    }

    /// Serialize the command body (everything after the fragment header).
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(16 + 12 + self.information.len());
        body.extend_from_slice(self.service.as_bytes());
        body.extend_from_slice(&self.cid.to_le_bytes());
        body.extend_from_slice(&self.command_type.as_u32().to_le_bytes());
        body.extend_from_slice(&(self.information.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.information);
        body
    }

    /// The command code this body addresses, if it is in the table.
    pub fn code(&self) -> Option<CommandCode> {
        CommandCode::lookup(&self.service, self.cid)
    }
}

/// A host-to-device MBIM message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MbimMessage {
    /// `MBIM_OPEN_MSG`.
    Open {
        /// Largest control transfer the host will accept.
        max_control_transfer: u32,
    },
    /// `MBIM_CLOSE_MSG`.
    Close,
    /// `MBIM_COMMAND_MSG`.
    Command(CommandMessage),
}

impl MbimMessage {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Open { .. } => "OPEN".to_string(),
            Self::Close => "CLOSE".to_string(),
            Self::Command(cmd) => match cmd.code() {
                Some(code) => format!("{:?} {code}", cmd.command_type),
                None => format!("{:?} {}:{}", cmd.command_type, cmd.service, cmd.cid),
            },
        }
    }
}

/// Why a builder refused to produce a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Input ended in the middle of a UTF-8 sequence.
    IncompleteUtf8 {
        /// Which field.
        field: &'static str,
    },
    /// Input is not valid UTF-8.
    InvalidUtf8 {
        /// Which field.
        field: &'static str,
        /// Byte offset of the bad sequence.
        offset: usize,
    },
    /// A code point does not fit in a single UTF-16 unit.
    OutsideBmp {
        /// Which field.
        field: &'static str,
        /// The offending character.
        ch: char,
    },
    /// The encoded string is longer than the field allows.
    TooLong {
        /// Which field.
        field: &'static str,
        /// Encoded length in bytes.
        len: usize,
        /// Maximum encoded length in bytes.
        max: usize,
    },
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompleteUtf8 { field } => write!(f, "{field}: incomplete UTF-8 sequence"),
            Self::InvalidUtf8 { field, offset } => {
                write!(f, "{field}: invalid UTF-8 at byte {offset}")
            }
            Self::OutsideBmp { field, ch } => {
                write!(f, "{field}: U+{:04X} is outside the basic multilingual plane", *ch as u32)
            }
            Self::TooLong { field, len, max } => {
                write!(f, "{field}: encoded length {len} exceeds {max} bytes")
            }
        }
    }
}

impl std::error::Error for MessageError {}

// ─── String encoding ───────────────────────────────────────────────────────

/// Encode UTF-8 input as UTF-16LE restricted to the basic multilingual plane.
///
/// Every code point becomes exactly one 16-bit unit; anything that would need
/// a surrogate pair is rejected, as is malformed or truncated UTF-8.
pub fn encode_utf16le(field: &'static str, input: &[u8]) -> Result<Vec<u8>, MessageError> {
    let text = std::str::from_utf8(input).map_err(|e| match e.error_len() {
        None => MessageError::IncompleteUtf8 { field },
        Some(_) => MessageError::InvalidUtf8 {
            field,
            offset: e.valid_up_to(),
        },
    })?;

    let mut out = Vec::with_capacity(text.len() * 2);
    for ch in text.chars() {
        let unit = u16::try_from(u32::from(ch)).map_err(|_| MessageError::OutsideBmp { field, ch })?;
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(out)
}

// ─── Builders ──────────────────────────────────────────────────────────────

/// `MBIM_OPEN_MSG` advertising `max_control_transfer`.
pub fn open(max_control_transfer: u32) -> MbimMessage {
    MbimMessage::Open {
        max_control_transfer,
    }
}

/// `MBIM_CLOSE_MSG`.
pub fn close() -> MbimMessage {
    MbimMessage::Close
}

/// Query device capabilities.
pub fn query_device_capabilities() -> MbimMessage {
    MbimMessage::Command(CommandMessage::new(
        CommandCode::DeviceCaps,
        CommandType::Query,
        Vec::new(),
    ))
}

/// Query subscriber ready status.
pub fn query_subscriber_ready_status() -> MbimMessage {
    MbimMessage::Command(CommandMessage::new(
        CommandCode::SubscriberReadyStatus,
        CommandType::Query,
        Vec::new(),
    ))
}

/// Size of `MBIM_IP_CONFIGURATION_INFO` without its data buffer.
const IP_CONFIGURATION_INFO_LEN: usize = 60;

/// Query the IP configuration of `session_id`.
///
/// The information buffer is a zeroed `MBIM_IP_CONFIGURATION_INFO` with only
/// the session id filled in.
pub fn query_ip_configuration(session_id: u32) -> MbimMessage {
    let mut info = vec![0u8; IP_CONFIGURATION_INFO_LEN];
    info[..4].copy_from_slice(&session_id.to_le_bytes());
    MbimMessage::Command(CommandMessage::new(
        CommandCode::IpConfiguration,
        CommandType::Query,
        info,
    ))
}

/// One entry of a device service subscribe list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGroup {
    /// Device service UUID.
    pub service: Uuid,
    /// CIDs to receive indications for.
    pub cids: Vec<u32>,
}

impl SubscriptionGroup {
    /// Group for `service` listing the CIDs of `codes`.
    ///
    /// Codes belonging to another service are skipped.
    pub fn new(service: Service, codes: &[CommandCode]) -> Self {
        Self {
            service: service.uuid(),
            cids: codes
                .iter()
                .filter(|c| c.service() == service)
                .map(|c| c.cid())
                .collect(),
        }
    }

    fn encoded_len(&self) -> usize {
        16 + 4 + 4 * self.cids.len()
    }
}

/// The indications subscribed to after a successful open.
pub fn default_subscriptions() -> Vec<SubscriptionGroup> {
    use CommandCode as C;
    vec![
        SubscriptionGroup::new(
            Service::BasicConnect,
            &[
                C::SubscriberReadyStatus,
                C::RadioState,
                C::PreferredProviders,
                C::RegisterState,
                C::PacketService,
                C::SignalState,
                C::Connect,
                C::ProvisionedContexts,
                C::IpConfiguration,
                C::EmergencyMode,
                C::MulticarrierProviders,
            ],
        ),
        SubscriptionGroup::new(
            Service::Sms,
            &[C::SmsConfiguration, C::SmsRead, C::SmsMessageStoreStatus],
        ),
        SubscriptionGroup::new(Service::Ussd, &[C::Ussd]),
        SubscriptionGroup::new(Service::Phonebook, &[C::PhonebookConfiguration]),
        SubscriptionGroup::new(Service::Stk, &[C::StkPac]),
    ]
}

/// Set the device service subscribe list.
///
/// Layout: element count, one `(offset, length)` pair per group with offsets
/// relative to the start of the information buffer, then the groups as
/// `(UUID, CID count, CIDs…)`. An empty list clears every subscription.
pub fn set_subscribe_list(groups: &[SubscriptionGroup]) -> MbimMessage {
    let header_len = 4 + 8 * groups.len();
    let total = header_len + groups.iter().map(SubscriptionGroup::encoded_len).sum::<usize>();

    let mut info = Vec::with_capacity(total);
    info.extend_from_slice(&(groups.len() as u32).to_le_bytes());
    let mut offset = header_len;
    for group in groups {
        let len = group.encoded_len();
        info.extend_from_slice(&(offset as u32).to_le_bytes());
        info.extend_from_slice(&(len as u32).to_le_bytes());
        offset += len;
    }
    for group in groups {
        info.extend_from_slice(group.service.as_bytes());
        info.extend_from_slice(&(group.cids.len() as u32).to_le_bytes());
        for cid in &group.cids {
            info.extend_from_slice(&cid.to_le_bytes());
        }
    }

    MbimMessage::Command(CommandMessage::new(
        CommandCode::DeviceServiceSubscribeList,
        CommandType::Set,
        info,
    ))
}

// ─── SET CONNECT ───────────────────────────────────────────────────────────

/// Activate or deactivate a data session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCommand {
    /// Tear the session down (0).
    Deactivate,
    /// Bring the session up (1).
    Activate,
}

/// Authentication protocol for the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    /// None (0).
    None,
    /// PAP (1).
    Pap,
    /// CHAP (2).
    Chap,
    /// MS-CHAPv2 (3).
    MsChapV2,
}

/// Requested IP type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpType {
    /// Device default (0).
    Default,
    /// IPv4 (1).
    Ipv4,
    /// IPv6 (2).
    Ipv6,
    /// Dual stack (3).
    Ipv4v6,
    /// IPv4 with IPv6 fallback (4).
    Ipv4OrIpv6,
}

/// Parameters of a `SET CONNECT` request.
///
/// Strings are raw UTF-8 bytes; validation and UTF-16 conversion happen in
/// [`set_connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest<'a> {
    /// Session id.
    pub session_id: u32,
    /// Activate or deactivate.
    pub activation: ActivationCommand,
    /// Access point name.
    pub apn: Option<&'a [u8]>,
    /// Authentication protocol.
    pub auth: AuthProtocol,
    /// User name.
    pub username: Option<&'a [u8]>,
    /// Password.
    pub password: Option<&'a [u8]>,
    /// Header compression on/off.
    pub compression: bool,
    /// Requested IP type.
    pub ip_type: IpType,
    /// Context type UUID.
    pub context_type: Uuid,
}

impl<'a> ConnectRequest<'a> {
    /// Unauthenticated IPv4 internet session 0 on `apn`.
    pub fn internet(activation: ActivationCommand, apn: Option<&'a [u8]>) -> Self {
        Self {
            session_id: 0,
            activation,
            apn,
            auth: AuthProtocol::None,
            username: None,
            password: None,
            compression: false,
            ip_type: IpType::Ipv4,
            context_type: context_type::INTERNET,
        }
    }
}

/// Largest encoded access string.
pub const MAX_APN_LEN: usize = 400;
/// Largest encoded user name or password.
pub const MAX_CREDENTIAL_LEN: usize = 1020;

/// Fixed part of `MBIM_SET_CONNECT`: eleven u32 fields and the context UUID.
const SET_CONNECT_FIXED_LEN: usize = 11 * 4 + 16;

fn encode_field(
    field: &'static str,
    value: Option<&[u8]>,
    max: usize,
) -> Result<Vec<u8>, MessageError> {
    let encoded = encode_utf16le(field, value.unwrap_or_default())?;
    if encoded.len() > max {
        return Err(MessageError::TooLong {
            field,
            len: encoded.len(),
            max,
        });
    }
    Ok(encoded)
}

fn pad_len(len: usize) -> usize {
    // UTF-16 lengths are even, so two bytes always reach the next boundary.
    if len % 4 == 0 {
        0
    } else {
        2
    }
}

/// Build `SET CONNECT`.
pub fn set_connect(req: &ConnectRequest<'_>) -> Result<MbimMessage, MessageError> {
    let apn = encode_field("apn", req.apn, MAX_APN_LEN)?;
    let user = encode_field("username", req.username, MAX_CREDENTIAL_LEN)?;
    let pwd = encode_field("password", req.password, MAX_CREDENTIAL_LEN)?;

    let apn_off = SET_CONNECT_FIXED_LEN;
    let user_off = apn_off + apn.len() + pad_len(apn.len());
    let pwd_off = user_off + user.len() + pad_len(user.len());
    let total = pwd_off + pwd.len() + pad_len(pwd.len());

    // Empty strings are (0, 0), not a pointer past the previous string.
    let pair = |off: usize, s: &[u8]| if s.is_empty() { (0, 0) } else { (off as u32, s.len() as u32) };
    let (apn_off, apn_len) = pair(apn_off, &apn);
    let (user_off, user_len) = pair(user_off, &user);
    let (pwd_off, pwd_len) = pair(pwd_off, &pwd);

    let activation = match req.activation {
        ActivationCommand::Deactivate => 0u32,
        ActivationCommand::Activate => 1,
    };
    let auth = match req.auth {
        AuthProtocol::None => 0u32,
        AuthProtocol::Pap => 1,
        AuthProtocol::Chap => 2,
        AuthProtocol::MsChapV2 => 3,
    };
    let ip_type = match req.ip_type {
        IpType::Default => 0u32,
        IpType::Ipv4 => 1,
        IpType::Ipv6 => 2,
        IpType::Ipv4v6 => 3,
        IpType::Ipv4OrIpv6 => 4,
    };

    let mut info = Vec::with_capacity(total);
    for word in [
        req.session_id,
        activation,
        apn_off,
        apn_len,
        user_off,
        user_len,
        pwd_off,
        pwd_len,
        u32::from(req.compression),
        auth,
        ip_type,
    ] {
        info.extend_from_slice(&word.to_le_bytes());
    }
    info.extend_from_slice(req.context_type.as_bytes());
    for s in [&apn, &user, &pwd] {
        info.extend_from_slice(s);
        info.resize(info.len() + pad_len(s.len()), 0);
    }
    debug_assert_eq!(info.len(), total);

    Ok(MbimMessage::Command(CommandMessage::new(
        CommandCode::Connect,
        CommandType::Set,
        info,
    )))
}
