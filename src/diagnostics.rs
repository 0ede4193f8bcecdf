use std::fmt;

use crate::encode::EncodedImage;

/// Which tier of the fallback chain produced the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureTier {
    Monitor,
    Window,
    LegacyMonitor,
    LegacyDesktop,
}

impl CaptureTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::Window => "window",
            Self::LegacyMonitor => "legacy-monitor",
            Self::LegacyDesktop => "legacy-desktop",
        }
    }

    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::LegacyMonitor | Self::LegacyDesktop)
    }
}

/// Line-oriented troubleshooting report, appended to in call order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    text: String,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, line: impl fmt::Display) {
        use fmt::Write as _;
        let _ = writeln!(self.text, "{line}");
    }

    pub fn append(&mut self, other: Diagnostics) {
        self.text.push_str(&other.text);
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Result of a diagnostic capture: the image if any tier produced one,
/// and the report, which is always populated.
#[derive(Clone, Debug)]
pub struct CaptureReport {
    pub image: Option<EncodedImage>,
    pub tier: Option<CaptureTier>,
    pub diagnostics: String,
}

impl CaptureReport {
    pub(crate) fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            image: None,
            tier: None,
            diagnostics: diagnostics.into_string(),
        }
    }

    pub(crate) fn captured(
        image: EncodedImage,
        tier: CaptureTier,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            image: Some(image),
            tier: Some(tier),
            diagnostics: diagnostics.into_string(),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.image.as_ref().map(EncodedImage::bytes)
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.image.map(EncodedImage::into_bytes)
    }

    pub fn succeeded(&self) -> bool {
        self.image.is_some()
    }
}
