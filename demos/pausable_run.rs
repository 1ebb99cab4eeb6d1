//! # Example: Pausable MD run
//!
//! A fake molecular-dynamics activity runs on the worker while the main thread
//! pauses it, tweaks the thermostat through interrupt actions, restarts it and
//! finally halts the controller.
//!
//! Run with: `RUST_LOG=simvisor=debug cargo run --example pausable_run --features logging`

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use simvisor::{Activity, Controller, ControllerConfig, LogWriter, Subscribe};

/// Velocity-Verlet stand-in: one step nudges the energy towards the thermostat.
struct FakeMd {
    energy: i64,
    thermostat: Arc<AtomicI64>,
}

impl Activity for FakeMd {
    fn name(&self) -> &str {
        "fake-md"
    }

    fn pre_activity(&mut self) -> anyhow::Result<()> {
        tracing::info!(energy = self.energy, "equilibrating");
        Ok(())
    }

    fn step(&mut self) -> anyhow::Result<()> {
        let target = self.thermostat.load(Ordering::Relaxed);
        self.energy += (target - self.energy).signum();
        Ok(())
    }

    fn post_activity(&mut self) -> anyhow::Result<()> {
        tracing::info!(energy = self.energy, "final energy");
        Ok(())
    }

    fn restart(&mut self) -> anyhow::Result<()> {
        self.energy = 0;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = ControllerConfig {
        worker_name: "md-worker".into(),
        ..ControllerConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let ctl = Controller::builder(cfg).with_subscribers(subs).build();

    let thermostat = Arc::new(AtomicI64::new(300));
    let md = ctl.add_activity_with(
        FakeMd {
            energy: 0,
            thermostat: Arc::clone(&thermostat),
        },
        Some(2_000),
        0.5,
    );

    ctl.start()?;
    ctl.unpause().wait()?;
    thread::sleep(Duration::from_millis(100));

    ctl.pause().wait()?;
    tracing::info!(steps = md.steps_completed(), "paused; raising the thermostat");
    let t = Arc::clone(&thermostat);
    let previous = ctl
        .submit_action_named("raise-thermostat", move || Ok(t.swap(450, Ordering::Relaxed)))
        .wait()?;
    tracing::info!(previous, "thermostat raised");

    ctl.restart_current_activity().wait()?;
    md.set_sleep_period_millis(0.1);
    ctl.toggle().wait()?;

    ctl.halt()?;
    tracing::info!(outcome = ?md.outcome(), steps = md.steps_completed(), "done");
    Ok(())
}
