use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
#[cfg(feature = "tokio")]
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::TargetSelector;
use crate::access::PlatformCapabilities;
use crate::backend::CaptureBackend;
use crate::config::{CaptureConfig, clamp_timeout};
use crate::device::DeviceManager;
use crate::diagnostics::{CaptureReport, Diagnostics};
use crate::encode::{EncodedImage, ImageEncoder};
use crate::error::{CaptureError, CaptureResult};
use crate::fallback::FallbackChain;
use crate::monitor::MonitorInfo;
use crate::platform::PlatformBackend;

/// Long-lived capture entry point.
///
/// Owns the backend, the lazily created GPU device, and the once-per-engine
/// support and capability probes. Attempts are serialized behind an
/// admission gate unless the config turns it off.
pub struct CaptureEngine<B: CaptureBackend = PlatformBackend> {
    backend: B,
    config: CaptureConfig,
    encoder: ImageEncoder,
    devices: DeviceManager<B::Device>,
    support: OnceLock<Result<(), String>>,
    capabilities: OnceLock<PlatformCapabilities>,
    admission: Mutex<()>,
}

pub struct CaptureEngineBuilder<B> {
    backend: B,
    config: CaptureConfig,
}

impl CaptureEngine {
    pub fn builder() -> CaptureEngineBuilder<PlatformBackend> {
        CaptureEngineBuilder {
            backend: PlatformBackend::new(),
            config: CaptureConfig::from_env(),
        }
    }

    /// Process-wide engine on the platform backend, configured from the
    /// environment on first use.
    pub fn shared() -> &'static CaptureEngine {
        static SHARED: OnceLock<CaptureEngine> = OnceLock::new();
        SHARED.get_or_init(|| {
            let config = CaptureConfig::from_env();
            let encoder =
                ImageEncoder::new(config.target_width, config.jpeg_quality).unwrap_or_default();
            CaptureEngine::assemble(PlatformBackend::new(), config, encoder)
        })
    }
}

impl<B> CaptureEngineBuilder<B> {
    pub fn backend<C: CaptureBackend>(self, backend: C) -> CaptureEngineBuilder<C> {
        CaptureEngineBuilder {
            backend,
            config: self.config,
        }
    }

    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = clamp_timeout(timeout);
        self
    }

    pub fn target_width(mut self, target_width: u32) -> Self {
        self.config.target_width = target_width;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }
}

impl<B: CaptureBackend> CaptureEngineBuilder<B> {
    pub fn build(self) -> CaptureResult<CaptureEngine<B>> {
        self.config.validate()?;
        let encoder = ImageEncoder::new(self.config.target_width, self.config.jpeg_quality)?;
        let config = CaptureConfig {
            timeout: clamp_timeout(self.config.timeout),
            ..self.config
        };
        Ok(CaptureEngine::assemble(self.backend, config, encoder))
    }
}

impl<B: CaptureBackend> CaptureEngine<B> {
    fn assemble(backend: B, config: CaptureConfig, encoder: ImageEncoder) -> Self {
        Self {
            backend,
            config,
            encoder,
            devices: DeviceManager::new(),
            support: OnceLock::new(),
            capabilities: OnceLock::new(),
            admission: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        self.backend.enumerate_monitors()
    }

    /// Probed on first use; an absent API is remembered for the lifetime
    /// of the engine.
    pub fn ensure_supported(&self) -> CaptureResult<()> {
        self.support
            .get_or_init(|| match self.backend.is_supported() {
                Ok(true) => Ok(()),
                Ok(false) => Err("graphics capture API is not present".into()),
                Err(err) => Err(err.to_string()),
            })
            .clone()
            .map_err(CaptureError::Unsupported)
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        *self
            .capabilities
            .get_or_init(|| self.backend.probe_capabilities())
    }

    /// Capture the selected monitor, or the monitor under the foreground
    /// window, with the configured timeout. `Ok(None)` when no tier
    /// produced an image.
    pub fn capture(&self, selector: &TargetSelector) -> CaptureResult<Option<EncodedImage>> {
        self.ensure_supported()?;
        let _admission = self.admit();
        let _apartment = match self.backend.enter_apartment() {
            Ok(apartment) => apartment,
            Err(err) => {
                warn!(error = %err, "could not initialize the capture apartment");
                return Ok(None);
            }
        };
        self.chain().capture(selector, self.config.timeout)
    }

    /// Run the full fallback chain and report every step. Never fails:
    /// errors end up in the report.
    pub fn capture_with_diagnostics(
        &self,
        selector: &TargetSelector,
        timeout: Duration,
    ) -> CaptureReport {
        if let Err(err) = self.ensure_supported() {
            let mut diagnostics = Diagnostics::new();
            diagnostics.line("IsSupported: false");
            diagnostics.line("Result: EXCEPTION");
            diagnostics.line(format_args!("Exception: {err}"));
            return CaptureReport::failed(diagnostics);
        }

        let _admission = self.admit();
        let _apartment = match self.backend.enter_apartment() {
            Ok(apartment) => apartment,
            Err(err) => {
                warn!(error = %err, "could not initialize the capture apartment");
                let mut diagnostics = Diagnostics::new();
                diagnostics.line("Result: EXCEPTION");
                diagnostics.line(format_args!("Exception: {err}"));
                return CaptureReport::failed(diagnostics);
            }
        };
        let timeout = clamp_timeout(timeout);
        debug!(timeout_ms = timeout.as_millis() as u64, "diagnostic capture");
        self.chain().run(selector, timeout)
    }

    fn chain(&self) -> FallbackChain<'_, B> {
        FallbackChain::new(
            &self.backend,
            &self.devices,
            self.capabilities(),
            &self.config,
            self.encoder,
        )
    }

    fn admit(&self) -> Option<MutexGuard<'_, ()>> {
        self.config
            .serialize_attempts
            .then(|| self.admission.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(feature = "tokio")]
impl<B: CaptureBackend + 'static> CaptureEngine<B> {
    pub async fn capture_async(
        self: Arc<Self>,
        selector: TargetSelector,
    ) -> CaptureResult<Option<EncodedImage>> {
        tokio::task::spawn_blocking(move || self.capture(&selector))
            .await
            .map_err(join_error)?
    }

    pub async fn capture_with_diagnostics_async(
        self: Arc<Self>,
        selector: TargetSelector,
        timeout: Duration,
    ) -> CaptureResult<CaptureReport> {
        tokio::task::spawn_blocking(move || self.capture_with_diagnostics(&selector, timeout))
            .await
            .map_err(join_error)
    }
}

#[cfg(feature = "tokio")]
fn join_error(err: tokio::task::JoinError) -> CaptureError {
    CaptureError::Platform(anyhow::anyhow!("capture task failed: {err}"))
}
