use std::fmt;

#[derive(Debug)]
pub enum CaptureError {
    /// The platform has no usable graphics capture API.
    Unsupported(String),

    NoForegroundWindow,

    NullMonitorHandle,

    /// A native activation or creation call returned a non-zero status.
    Interop {
        context: &'static str,
        status: i32,
    },

    /// A creation call reported success but handed back a null item.
    NullItem(String),

    AccessDenied(String),

    Timeout,

    DeviceCreationFailed(String),

    Encode(String),

    InvalidConfig(String),

    BufferOverflow,

    Platform(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureErrorClass {
    InvalidInput,
    Unsupported,
    Transient,
    Fatal,
}

impl CaptureError {
    pub fn class(&self) -> CaptureErrorClass {
        match self {
            Self::NoForegroundWindow
            | Self::NullMonitorHandle
            | Self::InvalidConfig(_) => CaptureErrorClass::InvalidInput,
            Self::Unsupported(_) | Self::AccessDenied(_) => CaptureErrorClass::Unsupported,
            Self::Interop { .. } | Self::NullItem(_) | Self::Timeout => {
                CaptureErrorClass::Transient
            }
            Self::DeviceCreationFailed(_)
            | Self::Encode(_)
            | Self::BufferOverflow
            | Self::Platform(_) => CaptureErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), CaptureErrorClass::Transient)
    }

    /// Errors after which no capture tier may be attempted for the rest of
    /// the engine's lifetime.
    pub fn is_fatal_for_engine(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::DeviceCreationFailed(_))
    }

    /// Create a string-based copy of this error suitable for caching or
    /// sending through channels. The `Platform` variant loses its inner
    /// `anyhow::Error` chain and becomes a formatted string.
    pub fn to_sendable(&self) -> Self {
        match self {
            Self::Unsupported(s) => Self::Unsupported(s.clone()),
            Self::NoForegroundWindow => Self::NoForegroundWindow,
            Self::NullMonitorHandle => Self::NullMonitorHandle,
            Self::Interop { context, status } => Self::Interop {
                context,
                status: *status,
            },
            Self::NullItem(s) => Self::NullItem(s.clone()),
            Self::AccessDenied(s) => Self::AccessDenied(s.clone()),
            Self::Timeout => Self::Timeout,
            Self::DeviceCreationFailed(s) => Self::DeviceCreationFailed(s.clone()),
            Self::Encode(s) => Self::Encode(s.clone()),
            Self::InvalidConfig(s) => Self::InvalidConfig(s.clone()),
            Self::BufferOverflow => Self::BufferOverflow,
            Self::Platform(inner) => Self::Platform(anyhow::anyhow!("{inner:#}")),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(message) => {
                write!(f, "graphics capture is not supported: {message}")
            }
            Self::NoForegroundWindow => write!(f, "no foreground window"),
            Self::NullMonitorHandle => write!(f, "HMONITOR is null"),
            Self::Interop { context, status } => {
                write!(f, "{context} failed with HRESULT 0x{:08X}", *status as u32)
            }
            Self::NullItem(context) => {
                write!(f, "{context} succeeded but returned a null capture item")
            }
            Self::AccessDenied(status) => write!(f, "graphics capture access denied: {status}"),
            Self::Timeout => write!(f, "no frame arrived within the capture timeout"),
            Self::DeviceCreationFailed(message) => {
                write!(f, "GPU device creation failed: {message}")
            }
            Self::Encode(message) => write!(f, "image encoding failed: {message}"),
            Self::BufferOverflow => write!(f, "frame buffer size overflow"),
            Self::InvalidConfig(message) => write!(f, "invalid capture configuration: {message}"),
            Self::Platform(inner) => write!(f, "{inner:#}"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Platform(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;
