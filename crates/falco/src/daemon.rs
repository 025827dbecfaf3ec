//! Process-level composition and supervision.
//!
//! `FalcoDaemon` wires controller, heartbeat, sensor and control surface from
//! a [`FalcoConfig`], then keeps the controller and the heartbeat alive:
//! whenever one stops being live (a `reinit`, a failed start, or a line that
//! failed to reopen) it is shut down and started again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use falcoconf::{AudioBackend, FalcoConfig};
use tracing::{error, info, warn};

use crate::control::{http, ControlSurface};
use crate::controller::MotionController;
use crate::device::{AudioDevice, SilentDevice};
use crate::heartbeat::Heartbeat;
use crate::player::ClipPlayer;
use crate::policy::DeterrentPolicy;
use crate::resource::{FileResourceLoader, ResourceLoader};
use crate::sensor::MotionSensor;

/// How often liveness is checked.
pub const SUPERVISE_INTERVAL: Duration = Duration::from_millis(250);

pub struct FalcoDaemon {
    controller: MotionController,
    heartbeat: Option<Arc<Heartbeat>>,
    surface: ControlSurface,
    http_addr: Option<String>,
}

impl FalcoDaemon {
    /// Assemble the daemon from already-built parts.
    pub fn new(controller: MotionController, heartbeat: Option<Heartbeat>) -> Self {
        let surface = ControlSurface::new(&controller);
        Self {
            controller,
            heartbeat: heartbeat.map(Arc::new),
            surface,
            http_addr: None,
        }
    }

    /// Serve the control surface over HTTP on `addr` while running.
    pub fn with_http(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = Some(addr.into());
        self
    }

    pub fn from_config(config: &FalcoConfig) -> Result<Self> {
        let device = build_device(config)?;
        let sound_dir = config.infra.sounds.dir.clone();
        info!("sounds from {}", sound_dir.display());
        let loader: Arc<dyn ResourceLoader> = Arc::new(FileResourceLoader::new(sound_dir));

        let deterrent = ClipPlayer::new("deterrent", Arc::clone(&device), Arc::clone(&loader));
        let mut builder = MotionController::builder(deterrent, config.infra.sounds.deterrent.clone())
            .policy(DeterrentPolicy::from_config(&config.behavior.policy));
        if let Some(sensor) = build_sensor(config)? {
            builder = builder.sensor(sensor);
        }
        let controller = builder.build();

        let heartbeat = config.behavior.heartbeat.enabled.then(|| {
            Heartbeat::new(
                ClipPlayer::new("heartbeat", device, loader),
                config.infra.sounds.heartbeat.clone(),
                config.behavior.heartbeat.period(),
            )
        });

        let daemon = Self::new(controller, heartbeat);
        let addr = config.infra.control.http_addr.trim();
        Ok(if addr.is_empty() {
            daemon
        } else {
            daemon.with_http(addr)
        })
    }

    pub fn controller(&self) -> &MotionController {
        &self.controller
    }

    pub fn heartbeat(&self) -> Option<&Heartbeat> {
        self.heartbeat.as_deref()
    }

    pub fn surface(&self) -> &ControlSurface {
        &self.surface
    }

    /// Start heartbeat and controller. Failures are logged and retried by
    /// [`FalcoDaemon::supervise`].
    pub fn start(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            if let Err(e) = heartbeat.start() {
                warn!("heartbeat not started: {}", e);
            }
        }
        match self.controller.startup() {
            Ok(()) => info!("falco started"),
            Err(e) => error!("controller startup failed: {}", e),
        }
    }

    /// One supervision pass. Returns whether the controller is live afterwards.
    pub fn supervise(&self) -> bool {
        if let Some(heartbeat) = &self.heartbeat {
            recycle_heartbeat_if_dead(heartbeat);
        }
        recycle_if_dead(&self.controller)
    }

    /// Stop heartbeat and controller.
    pub fn stop(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.stop();
        }
        self.controller.shutdown();
    }

    /// Start, supervise until `shutdown` resolves, then stop.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let daemon = Arc::new(self);

        // Opening sounds and claiming the sensor block.
        let starting = Arc::clone(&daemon);
        tokio::task::spawn_blocking(move || starting.start())
            .await
            .context("startup task failed")?;

        let server = match &daemon.http_addr {
            Some(addr) => {
                let listener = tokio::net::TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("Failed to bind to {}", addr))?;
                info!("control surface on http://{}", addr);
                let app = http::router(daemon.surface.clone());
                Some(tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!("control server failed: {}", e);
                    }
                }))
            }
            None => None,
        };

        let mut interval = tokio::time::interval(SUPERVISE_INTERVAL);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let supervising = Arc::clone(&daemon);
                    if let Err(e) = tokio::task::spawn_blocking(move || supervising.supervise()).await {
                        error!("supervision task failed: {}", e);
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        if let Some(server) = server {
            server.abort();
        }
        tokio::task::spawn_blocking(move || daemon.stop())
            .await
            .context("shutdown task failed")?;
        info!("falco stopped");
        Ok(())
    }
}

/// Restart `controller` if it is no longer live.
pub fn recycle_if_dead(controller: &MotionController) -> bool {
    if controller.is_live() {
        return true;
    }
    controller.shutdown();
    match controller.startup() {
        Ok(()) => {
            info!("falco recycled");
            true
        }
        Err(e) => {
            error!("controller restart failed: {}", e);
            false
        }
    }
}

/// Restart `heartbeat` if it never started or its player lost its line.
pub fn recycle_heartbeat_if_dead(heartbeat: &Heartbeat) -> bool {
    if heartbeat.is_live() {
        return true;
    }
    heartbeat.stop();
    match heartbeat.start() {
        Ok(()) => {
            info!("falco recycled");
            true
        }
        Err(e) => {
            error!("heartbeat restart failed: {}", e);
            false
        }
    }
}

fn build_device(config: &FalcoConfig) -> Result<Arc<dyn AudioDevice>> {
    match config.infra.audio.backend {
        AudioBackend::Silent => Ok(Arc::new(SilentDevice::new())),
        #[cfg(feature = "pipewire")]
        AudioBackend::PipeWire => {
            use crate::device::{PipeWireDevice, PipeWireOutputConfig};
            Ok(Arc::new(PipeWireDevice::new(PipeWireOutputConfig {
                name: "falco".to_string(),
                sample_rate: config.infra.audio.sample_rate,
                latency_frames: config.infra.audio.latency_frames,
            })))
        }
        #[cfg(not(feature = "pipewire"))]
        AudioBackend::PipeWire => {
            anyhow::bail!("PipeWire backend requested but falco was built without the `pipewire` feature")
        }
    }
}

#[cfg(feature = "gpio")]
fn build_sensor(config: &FalcoConfig) -> Result<Option<Box<dyn MotionSensor>>> {
    let sensor = crate::sensor::GpioSensor::new(config.infra.sensor.gpio_pin)
        .context("failed to claim motion sensor pin")?;
    Ok(Some(Box::new(sensor)))
}

#[cfg(not(feature = "gpio"))]
fn build_sensor(config: &FalcoConfig) -> Result<Option<Box<dyn MotionSensor>>> {
    warn!(
        "built without GPIO support; ignoring sensor on BCM {}, motion only via the control surface",
        config.infra.sensor.gpio_pin
    );
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::generate_test_wav;
    use crate::device::RecordingDevice;
    use crate::error::FalcoError;
    use crate::resource::MemoryResourceLoader;

    fn daemon() -> (FalcoDaemon, RecordingDevice) {
        let device = RecordingDevice::new();
        let loader = MemoryResourceLoader::new().with("hawk.wav", generate_test_wav(480, 48000));
        let player = ClipPlayer::new("deterrent", Arc::new(device.clone()), Arc::new(loader));
        let controller = MotionController::builder(player, "hawk.wav").build();
        (FalcoDaemon::new(controller, None), device)
    }

    #[test]
    fn reinit_is_recovered_by_supervision() {
        let (daemon, device) = daemon();
        daemon.start();
        assert!(daemon.controller().is_live());

        daemon.surface().reinit().unwrap();
        assert!(!daemon.controller().is_live());

        assert!(daemon.supervise());
        assert!(daemon.controller().is_live());
        assert_eq!(device.lines_acquired(), 2);
    }

    #[test]
    fn failed_startup_is_retried() {
        let (daemon, device) = daemon();
        device.fail_next_acquire(FalcoError::DeviceUnavailable("busy".to_string()));
        daemon.start();
        assert!(!daemon.controller().is_live());

        assert!(daemon.supervise());
        daemon.stop();
        assert!(!daemon.controller().is_live());
    }

    fn daemon_with_heartbeat() -> (FalcoDaemon, RecordingDevice) {
        let (base, _) = daemon();
        let device = RecordingDevice::new();
        let loader = MemoryResourceLoader::new().with("heartbeat.wav", generate_test_wav(48, 48000));
        let player = ClipPlayer::new("heartbeat", Arc::new(device.clone()), Arc::new(loader));
        let heartbeat = Heartbeat::new(player, "heartbeat.wav", Duration::from_secs(3600));
        let daemon = FalcoDaemon::new(base.controller().clone(), Some(heartbeat));
        (daemon, device)
    }

    fn eventually(cond: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn heartbeat_without_a_line_is_recycled() {
        let (daemon, device) = daemon_with_heartbeat();
        daemon.start();
        assert!(eventually(|| device.starts() == 1));

        device.fail_next_open(FalcoError::DeviceUnavailable("unplugged".to_string()));
        assert!(device.complete_playback());
        let heartbeat = daemon.heartbeat().unwrap();
        assert!(!heartbeat.is_live());

        assert!(daemon.supervise());
        assert!(heartbeat.is_live());
        // The restarted heartbeat beats straight away on its new line.
        assert!(eventually(|| device.starts() == 2));
        daemon.stop();
    }

    #[test]
    fn failed_heartbeat_start_is_retried() {
        let (daemon, device) = daemon_with_heartbeat();
        device.fail_next_acquire(FalcoError::DeviceUnavailable("busy".to_string()));
        daemon.start();
        let heartbeat = daemon.heartbeat().unwrap();
        assert!(!heartbeat.is_running());

        daemon.supervise();
        assert!(heartbeat.is_running());
        assert!(eventually(|| device.starts() == 1));
        daemon.stop();
    }

    #[test]
    fn default_config_builds_silent_daemon() {
        let mut config = FalcoConfig::default();
        config.infra.control.http_addr = String::new();
        let daemon = FalcoDaemon::from_config(&config).unwrap();

        assert!(daemon.heartbeat().is_some());
        assert!(daemon.http_addr.is_none());
    }
}
