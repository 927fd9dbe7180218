//! MBIM status codes and connection activation states.

/// Status code carried by `OPEN_DONE`, `CLOSE_DONE` and `COMMAND_DONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Success,
    /// Busy.
    Busy,
    /// Failure.
    Failure,
    /// SIM not inserted.
    SimNotInserted,
    /// Bad SIM.
    BadSim,
    /// PIN required.
    PinRequired,
    /// PIN disabled.
    PinDisabled,
    /// Not registered.
    NotRegistered,
    /// Providers not found.
    ProvidersNotFound,
    /// No device support.
    NoDeviceSupport,
    /// Provider not visible.
    ProviderNotVisible,
    /// Data class not available.
    DataClassNotAvailable,
    /// Packet service detached.
    PacketServiceDetached,
    /// Max activated contexts.
    MaxActivatedContexts,
    /// Not initialized.
    NotInitialized,
    /// Voice call in progress.
    VoiceCallInProgress,
    /// Context not activated.
    ContextNotActivated,
    /// Service not activated.
    ServiceNotActivated,
    /// Invalid access string.
    InvalidAccessString,
    /// Invalid user name or password.
    InvalidUserNamePwd,
    /// Radio power off.
    RadioPowerOff,
    /// Invalid parameters.
    InvalidParameters,
    /// Read failure.
    ReadFailure,
    /// Write failure.
    WriteFailure,
    /// No phonebook.
    NoPhonebook,
    /// Parameter too long.
    ParameterTooLong,
    /// SIM toolkit busy.
    StkBusy,
    /// Operation not allowed.
    OperationNotAllowed,
    /// Memory failure.
    MemoryFailure,
    /// Invalid memory index.
    InvalidMemoryIndex,
    /// Memory full.
    MemoryFull,
    /// Filter not supported.
    FilterNotSupported,
    /// Device service stream instance limit.
    DssInstanceLimit,
    /// Invalid device service operation.
    InvalidDeviceServiceOperation,
    /// Incorrect AUTN.
    AuthIncorrectAutn,
    /// Authentication sync failure.
    AuthSyncFailure,
    /// AMF not set.
    AuthAmfNotSet,
    /// Context not supported.
    ContextNotSupported,
    /// Unknown SMSC address.
    SmsUnknownSmscAddress,
    /// SMS network timeout.
    SmsNetworkTimeout,
    /// SMS language not supported.
    SmsLangNotSupported,
    /// SMS encoding not supported.
    SmsEncodingNotSupported,
    /// SMS format not supported.
    SmsFormatNotSupported,
    /// Reserved or device-service specific code.
    Other(u32),
}

impl Status {
    /// Decode a wire status value.
    pub fn from_u32(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Busy,
            2 => Self::Failure,
            3 => Self::SimNotInserted,
            4 => Self::BadSim,
            5 => Self::PinRequired,
            6 => Self::PinDisabled,
            7 => Self::NotRegistered,
            8 => Self::ProvidersNotFound,
            9 => Self::NoDeviceSupport,
            10 => Self::ProviderNotVisible,
            11 => Self::DataClassNotAvailable,
            12 => Self::PacketServiceDetached,
            13 => Self::MaxActivatedContexts,
            14 => Self::NotInitialized,
            15 => Self::VoiceCallInProgress,
            16 => Self::ContextNotActivated,
            17 => Self::ServiceNotActivated,
            18 => Self::InvalidAccessString,
            19 => Self::InvalidUserNamePwd,
            20 => Self::RadioPowerOff,
            21 => Self::InvalidParameters,
            22 => Self::ReadFailure,
            23 => Self::WriteFailure,
            25 => Self::NoPhonebook,
            26 => Self::ParameterTooLong,
            27 => Self::StkBusy,
            28 => Self::OperationNotAllowed,
            29 => Self::MemoryFailure,
            30 => Self::InvalidMemoryIndex,
            31 => Self::MemoryFull,
            32 => Self::FilterNotSupported,
            33 => Self::DssInstanceLimit,
            34 => Self::InvalidDeviceServiceOperation,
            35 => Self::AuthIncorrectAutn,
            36 => Self::AuthSyncFailure,
            37 => Self::AuthAmfNotSet,
            38 => Self::ContextNotSupported,
            100 => Self::SmsUnknownSmscAddress,
            101 => Self::SmsNetworkTimeout,
            102 => Self::SmsLangNotSupported,
            103 => Self::SmsEncodingNotSupported,
            104 => Self::SmsFormatNotSupported,
            other => Self::Other(other),
        }
    }

    /// Whether this is [`Status::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(code) => write!(f, "status {code}"),
            known => write!(f, "{known:?}"),
        }
    }
}

/// Activation state reported in `MBIM_CONNECT_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Unknown.
    Unknown,
    /// Activated.
    Activated,
    /// Activating.
    Activating,
    /// Deactivated.
    Deactivated,
    /// Deactivating.
    Deactivating,
}

impl ActivationState {
    /// Decode a wire activation state; out-of-range values are `Unknown`.
    pub fn from_u32(state: u32) -> Self {
        match state {
            1 => Self::Activated,
            2 => Self::Activating,
            3 => Self::Deactivated,
            4 => Self::Deactivating,
            _ => Self::Unknown,
        }
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Activated => "Activated",
            Self::Activating => "Activating",
            Self::Deactivated => "Deactivated",
            Self::Deactivating => "Deactivating",
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
