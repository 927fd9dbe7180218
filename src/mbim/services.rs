//! MBIM device services and the command code table.
//!
//! Every MBIM command is addressed by a `(service UUID, CID)` pair. The
//! crate names each pair with a [`CommandCode`]; the mapping is a fixed
//! table and is the only place either value is spelled out.
//!
//! UUIDs are written to the wire as their 16 raw bytes in the textual order
//! shown here (`Uuid::as_bytes`).

use uuid::{uuid, Uuid};

// ─── Services ──────────────────────────────────────────────────────────────

/// MBIM device services this crate knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Basic connectivity.
    BasicConnect,
    /// SMS.
    Sms,
    /// USSD.
    Ussd,
    /// Phonebook.
    Phonebook,
    /// SIM toolkit.
    Stk,
    /// Authentication (AKA, AKA', SIM).
    Auth,
    /// Device service stream.
    Dss,
}

impl Service {
    /// All services, in table order.
    pub const ALL: [Service; 7] = [
        Service::BasicConnect,
        Service::Sms,
        Service::Ussd,
        Service::Phonebook,
        Service::Stk,
        Service::Auth,
        Service::Dss,
    ];

    /// The service UUID.
    pub const fn uuid(self) -> Uuid {
        match self {
            Service::BasicConnect => uuid!("a289cc33-bcbb-8b4f-b6b0-133ec2aae6df"),
            Service::Sms => uuid!("533fbeeb-14fe-4467-9f90-33a223e56c3f"),
            Service::Ussd => uuid!("e550a0c8-5e82-479e-82f7-10abf4c3351f"),
            Service::Phonebook => uuid!("4bf38476-1e6a-41db-b1d8-bed289c25bdb"),
            Service::Stk => uuid!("d8f20131-fcb5-4e17-8602-d6ed3816164c"),
            Service::Auth => uuid!("1d2b5ff7-0aa1-48b2-aa52-50f15767174e"),
            Service::Dss => uuid!("c08a26dd-7718-4382-8482-6e0d583c4d0e"),
        }
    }

    /// Look a service up by UUID.
    pub fn from_uuid(id: &Uuid) -> Option<Service> {
        Self::ALL.into_iter().find(|s| s.uuid() == *id)
    }
}

// ─── Command codes ─────────────────────────────────────────────────────────

macro_rules! command_table {
    ($( $(#[$doc:meta])* $code:ident => ($service:ident, $cid:expr) ),+ $(,)?) => {
        /// Named `(service, CID)` pairs.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandCode {
            $( $(#[$doc])* $code, )+
        }

        impl CommandCode {
            /// Every command code, in table order.
            pub const ALL: &'static [CommandCode] = &[ $( CommandCode::$code, )+ ];

            /// The service this command belongs to.
            pub const fn service(self) -> Service {
                match self {
                    $( CommandCode::$code => Service::$service, )+
                }
            }

            /// The command identifier within its service.
            pub const fn cid(self) -> u32 {
                match self {
                    $( CommandCode::$code => $cid, )+
                }
            }
        }
    };
}

command_table! {
    /// Device capabilities.
    DeviceCaps => (BasicConnect, 1),
    /// Subscriber ready status.
    SubscriberReadyStatus => (BasicConnect, 2),
    /// Radio power state.
    RadioState => (BasicConnect, 3),
    /// PIN operations.
    Pin => (BasicConnect, 4),
    /// PIN list.
    PinList => (BasicConnect, 5),
    /// Home provider.
    HomeProvider => (BasicConnect, 6),
    /// Preferred providers.
    PreferredProviders => (BasicConnect, 7),
    /// Visible providers.
    VisibleProviders => (BasicConnect, 8),
    /// Registration state.
    RegisterState => (BasicConnect, 9),
    /// Packet service attach state.
    PacketService => (BasicConnect, 10),
    /// Signal state.
    SignalState => (BasicConnect, 11),
    /// Data session connect/disconnect.
    Connect => (BasicConnect, 12),
    /// Provisioned contexts.
    ProvisionedContexts => (BasicConnect, 13),
    /// Service activation.
    ServiceActivation => (BasicConnect, 14),
    /// IP configuration of a session.
    IpConfiguration => (BasicConnect, 15),
    /// Supported device services.
    DeviceServices => (BasicConnect, 16),
    /// Indication subscription list.
    DeviceServiceSubscribeList => (BasicConnect, 19),
    /// Packet statistics.
    PacketStatistics => (BasicConnect, 20),
    /// Network idle hint.
    NetworkIdleHint => (BasicConnect, 21),
    /// Emergency mode.
    EmergencyMode => (BasicConnect, 22),
    /// IP packet filters.
    IpPacketFilters => (BasicConnect, 23),
    /// Multicarrier providers.
    MulticarrierProviders => (BasicConnect, 24),

    /// SMS configuration.
    SmsConfiguration => (Sms, 1),
    /// SMS read.
    SmsRead => (Sms, 2),
    /// SMS send.
    SmsSend => (Sms, 3),
    /// SMS delete.
    SmsDelete => (Sms, 4),
    /// SMS message store status.
    SmsMessageStoreStatus => (Sms, 5),

    /// USSD.
    Ussd => (Ussd, 1),

    /// Phonebook configuration.
    PhonebookConfiguration => (Phonebook, 1),
    /// Phonebook read.
    PhonebookRead => (Phonebook, 2),
    /// Phonebook delete.
    PhonebookDelete => (Phonebook, 3),
    /// Phonebook write.
    PhonebookWrite => (Phonebook, 4),

    /// Proactive command (SIM toolkit).
    StkPac => (Stk, 1),
    /// SIM toolkit terminal response.
    StkTerminalResponse => (Stk, 2),
    /// SIM toolkit envelope.
    StkEnvelope => (Stk, 3),

    /// AKA authentication.
    AuthAka => (Auth, 1),
    /// AKA' authentication.
    AuthAkap => (Auth, 2),
    /// SIM authentication.
    AuthSim => (Auth, 3),

    /// Device service stream connect.
    DssConnect => (Dss, 1),
}

impl CommandCode {
    /// Resolve a wire `(UUID, CID)` pair.
    pub fn lookup(service: &Uuid, cid: u32) -> Option<CommandCode> {
        let service = Service::from_uuid(service)?;
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.service() == service && c.cid() == cid)
    }

    /// The service UUID of this command.
    pub fn service_uuid(self) -> Uuid {
        self.service().uuid()
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

// ─── Context types ─────────────────────────────────────────────────────────

/// Context type UUIDs used by `SET CONNECT` and provisioned contexts.
pub mod context_type {
    use uuid::{uuid, Uuid};

    /// No context type.
    pub const NONE: Uuid = uuid!("b43f758c-a560-4b46-b35e-c5869641fb54");
    /// Internet access.
    pub const INTERNET: Uuid = uuid!("7e5e2a7e-4e6f-7272-736b-656e7e5e2a7e");
    /// VPN.
    pub const VPN: Uuid = uuid!("9b9f7bbe-8952-44b7-83ac-ca41318df7a0");
    /// Voice over IP.
    pub const VOICE: Uuid = uuid!("88918294-0ef4-4396-8cca-a8588fbc02b2");
    /// Video share.
    pub const VIDEO_SHARE: Uuid = uuid!("05a2a716-7c34-4b4d-9a91-c5ef0c7aaacc");
    /// Purchase.
    pub const PURCHASE: Uuid = uuid!("b3272496-ac6c-422b-a8c0-acf687a27217");
    /// IMS.
    pub const IMS: Uuid = uuid!("21610d01-3074-4bce-9425-b53a07d697d6");
    /// MMS.
    pub const MMS: Uuid = uuid!("46726664-7269-6bc6-9624-d1d35389aca9");
    /// Local.
    pub const LOCAL: Uuid = uuid!("a57a9afc-b09f-45d7-bb40-033c39f60db9");
}
