//! Daemon bootstrap and lifecycle

use std::future::Future;

use anyhow::{Context, Result};
use tracing::info;
use vibrad_ff::{DevInput, FfBackend, FfDevice};

use crate::config::ServiceConfig;
use crate::dispatch::Dispatcher;
use crate::props::PropertyStore;
use crate::server;

/// The assembled service: device, dispatcher and configuration, ready to
/// bind its transports and serve.
pub struct VibratorService<B: FfBackend + Send + 'static> {
    dispatcher: Dispatcher<B>,
    config: ServiceConfig,
}

impl VibratorService<DevInput> {
    /// Open and probe the motor device named by `config`. Fails when the
    /// device is missing or supports no usable effect type; the daemon
    /// does not start without a motor.
    pub fn open(config: ServiceConfig) -> Result<Self> {
        let device = FfDevice::open(&config.device_path).with_context(|| {
            format!("opening vibrator device {}", config.device_path.display())
        })?;
        info!(
            "vibrator device ready, capabilities {:#x}",
            device.capabilities()
        );
        Ok(Self::with_device(device, config))
    }
}

impl<B: FfBackend + Send + 'static> VibratorService<B> {
    /// Assemble the service around an already probed device.
    pub fn with_device(device: FfDevice<B>, config: ServiceConfig) -> Self {
        let props = PropertyStore::open(&config.property_path);
        Self {
            dispatcher: Dispatcher::new(device, props),
            config,
        }
    }

    /// Bind both transports and serve until `shutdown` resolves.
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        let listeners = server::bind_listeners(&self.config)?;
        server::serve(self.dispatcher, listeners, shutdown).await?;
        let _ = std::fs::remove_file(&self.config.socket_path);
        info!("vibrad stopped");
        Ok(())
    }
}
