//! `Dummy` backend: a timer-driven process thread with virtual hardware ports.
//!
//! Useful for running sessions without audio hardware. It can simulate the
//! device going away after a fixed time, which halts the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::backend::{Backend, BackendError, BackendParams, HardwarePort};
use super::driver::ProcessDriver;
use super::ports::{PortDirection, PortKind};
use crate::config::DummyConfig;

/// Name the backend is registered under.
pub const DUMMY_BACKEND: &str = "Dummy";

/// Reason reported when the simulated device disappears.
pub const DEVICE_REMOVED: &str = "device removed";

pub struct DummyBackend {
    config: DummyConfig,
    client_name: String,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DummyBackend {
    /// Create a backend for `params.client_name`.
    pub fn new(config: DummyConfig, params: &BackendParams) -> Result<Self, BackendError> {
        if params.client_name.trim().is_empty() {
            return Err(BackendError::Configuration(
                "client name must not be empty".to_string(),
            ));
        }
        if params.client_name.contains(':') {
            return Err(BackendError::Configuration(format!(
                "client name '{}' must not contain ':'",
                params.client_name
            )));
        }

        Ok(Self {
            config,
            client_name: params.client_name.clone(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(self.config.buffer_size as f64 / self.config.sample_rate as f64)
    }
}

impl Backend for DummyBackend {
    fn name(&self) -> &str {
        DUMMY_BACKEND
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn buffer_size(&self) -> u32 {
        self.config.buffer_size
    }

    fn max_ports(&self) -> usize {
        self.config.max_ports
    }

    fn hardware_ports(&self) -> Vec<HardwarePort> {
        let count = self.config.hardware_ports;
        let capture = (1..=count).map(|n| HardwarePort {
            name: format!("system:capture_{}", n),
            kind: PortKind::Audio,
            direction: PortDirection::Output,
        });
        let playback = (1..=count).map(|n| HardwarePort {
            name: format!("system:playback_{}", n),
            kind: PortKind::Audio,
            direction: PortDirection::Input,
        });
        let midi = [
            HardwarePort {
                name: "system:midi_capture_1".to_string(),
                kind: PortKind::Midi,
                direction: PortDirection::Output,
            },
            HardwarePort {
                name: "system:midi_playback_1".to_string(),
                kind: PortKind::Midi,
                direction: PortDirection::Input,
            },
        ];

        capture.chain(playback).chain(midi).collect()
    }

    fn start(&mut self, driver: ProcessDriver) -> Result<(), BackendError> {
        if self.thread.is_some() {
            return Err(BackendError::Other("already running".to_string()));
        }
        if self.config.sample_rate == 0 || self.config.buffer_size == 0 {
            return Err(BackendError::Configuration(format!(
                "invalid period: {} frames at {} Hz",
                self.config.buffer_size, self.config.sample_rate
            )));
        }

        let period = self.period();
        let nframes = self.config.buffer_size;
        let halt_after = self.config.halt_after_ms.map(Duration::from_millis);
        let stop_flag = self.stop_flag.clone();
        stop_flag.store(false, Ordering::Release);

        let thread = thread::Builder::new()
            .name(format!("{}-process", self.client_name))
            .spawn(move || {
                driver.thread_init();
                let started = Instant::now();
                let mut deadline = started;

                while !stop_flag.load(Ordering::Acquire) {
                    if halt_after.is_some_and(|limit| started.elapsed() >= limit) {
                        driver.halt(Some(DEVICE_REMOVED));
                        return;
                    }

                    driver.process(nframes);

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        // Late: skip the missed cycles instead of bursting.
                        deadline = now;
                    }
                }
                debug!("Dummy process thread exiting");
            })?;

        self.thread = Some(thread);
        info!(
            sample_rate = self.config.sample_rate,
            buffer_size = self.config.buffer_size,
            period_us = period.as_micros() as u64,
            "Dummy backend running"
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        let Some(thread) = self.thread.take() else {
            return Err(BackendError::NotRunning);
        };

        self.stop_flag.store(true, Ordering::Release);
        thread
            .join()
            .map_err(|_| BackendError::Other("process thread panicked".to_string()))?;
        debug!("Dummy backend stopped");
        Ok(())
    }
}

impl Drop for DummyBackend {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}
