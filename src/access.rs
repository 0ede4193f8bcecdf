use std::fmt;

use tracing::{debug, warn};

use crate::backend::CaptureBackend;
use crate::error::{CaptureError, CaptureResult};

/// Result of a programmatic capture access request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    Allowed,
    DeniedByUser,
    DeniedBySystem,
    Unspecified,
}

impl AccessStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "Allowed",
            Self::DeniedByUser => "DeniedByUser",
            Self::DeniedBySystem => "DeniedBySystem",
            Self::Unspecified => "Unspecified",
        }
    }

    pub const fn is_denied(self) -> bool {
        matches!(self, Self::DeniedByUser | Self::DeniedBySystem)
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional platform features, probed once per engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// The programmatic access request API exists.
    pub access_api: bool,
    /// Sessions expose the border-suppression property.
    pub border_property: bool,
}

/// Why the gate let the capture proceed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(AccessStatus),
    /// The platform predates the access API; capture proceeds unasked.
    ApiAbsent,
    /// The request itself failed; capture proceeds and the platform gets
    /// the final word when the session starts.
    Indeterminate(String),
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted(status) => write!(f, "{status}"),
            Self::ApiAbsent => f.write_str("N/A (API not present)"),
            Self::Indeterminate(reason) => write!(f, "unknown ({reason})"),
        }
    }
}

/// Requests programmatic capture access where the platform supports it.
pub struct AccessGate<'a, B: ?Sized> {
    backend: &'a B,
    capabilities: PlatformCapabilities,
}

impl<'a, B: CaptureBackend + ?Sized> AccessGate<'a, B> {
    pub fn new(backend: &'a B, capabilities: PlatformCapabilities) -> Self {
        Self {
            backend,
            capabilities,
        }
    }

    /// Only an explicit denial stops the capture.
    pub fn check(&self) -> CaptureResult<AccessDecision> {
        if !self.capabilities.access_api {
            debug!("capture access API not present; skipping request");
            return Ok(AccessDecision::ApiAbsent);
        }
        match self.backend.request_access() {
            Ok(status) if status.is_denied() => {
                warn!(%status, "graphics capture access denied");
                Err(CaptureError::AccessDenied(status.as_str().into()))
            }
            Ok(status) => {
                debug!(%status, "graphics capture access granted");
                Ok(AccessDecision::Granted(status))
            }
            Err(err) => {
                debug!(error = %err, "capture access request failed; proceeding");
                Ok(AccessDecision::Indeterminate(err.to_string()))
            }
        }
    }
}
