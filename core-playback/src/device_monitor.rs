//! # Output Device Monitor
//!
//! Keeps the live sink on the OS default output device. Every poll compares
//! the current default with the last one seen and rebinds the sink when it
//! changed (headphones plugged in, USB DAC removed, ...). Rebinding leaves
//! the jitter buffer and the playback state untouched.
//!
//! Failures are logged and retried on the next poll; they never reach the
//! session.

use bridge_traits::playback::{DeviceEnumerator, OutputSink};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Followed {
    sink: Option<Arc<dyn OutputSink>>,
    last_default: Option<String>,
}

/// Follows the OS default output device.
pub struct DeviceMonitor {
    enumerator: Arc<dyn DeviceEnumerator>,
    events: EventBus,
    followed: Mutex<Followed>,
}

impl DeviceMonitor {
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>, events: EventBus) -> Self {
        Self {
            enumerator,
            events,
            followed: Mutex::new(Followed::default()),
        }
    }

    /// Follow `sink`, starting from the device it was opened on.
    pub fn attach(&self, sink: Arc<dyn OutputSink>) {
        let mut followed = self.followed.lock();
        followed.last_default = sink.device_name();
        followed.sink = Some(sink);
        debug!(device = ?followed.last_default, "Device monitor attached");
    }

    /// Stop following the current sink.
    pub fn detach(&self) {
        let mut followed = self.followed.lock();
        followed.sink = None;
        followed.last_default = None;
    }

    pub fn is_attached(&self) -> bool {
        self.followed.lock().sink.is_some()
    }

    /// Name of the device the followed sink is bound to.
    pub fn current_device(&self) -> Option<String> {
        self.followed.lock().last_default.clone()
    }

    /// Run one check. Returns the new device name after a successful rebind.
    ///
    /// Blocks while the host enumerates devices.
    pub fn poll(&self) -> Option<String> {
        let (sink, last_default) = {
            let followed = self.followed.lock();
            (followed.sink.clone()?, followed.last_default.clone())
        };

        let device = match self.enumerator.default_output_device() {
            Ok(Some(device)) => device,
            Ok(None) => {
                debug!("No default output device");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to enumerate output devices");
                return None;
            }
        };

        if last_default.as_deref() == Some(device.name.as_str()) {
            return None;
        }

        if let Err(e) = sink.rebind(&device) {
            warn!(device = %device.name, error = %e, "Failed to move output to new default device");
            return None;
        }

        {
            let mut followed = self.followed.lock();
            let still_followed = followed
                .sink
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &sink));
            if !still_followed {
                return None;
            }
            followed.last_default = Some(device.name.clone());
        }

        info!(
            from = last_default.as_deref().unwrap_or("unknown"),
            to = %device.name,
            "Output followed default device"
        );
        let _ = self
            .events
            .emit(CoreEvent::Playback(PlaybackEvent::DeviceChanged {
                name: device.name.clone(),
            }));

        Some(device.name)
    }

    /// Poll every `interval` until `cancel` fires.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let monitor = Arc::clone(&self);
                        if let Err(e) = tokio::task::spawn_blocking(move || monitor.poll()).await {
                            warn!(error = %e, "Device poll task failed");
                        }
                    }
                }
            }
            debug!("Device monitor stopped");
        })
    }
}
