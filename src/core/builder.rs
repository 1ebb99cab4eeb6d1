use std::sync::Arc;

use crate::{config::ControllerConfig, events::Bus, subscribers::Subscribe};

use super::{controller::Controller, pump::EventPump, shared::Shared};

/// Builder for constructing a [`Controller`] with optional subscribers.
pub struct ControllerBuilder {
    cfg: ControllerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ControllerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ControllerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with bounded
    /// queues, hosted on an events thread named `"<worker_name>-events"`.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the controller.
    ///
    /// The worker thread is not started here; it is spawned on `start()` or on the
    /// first interrupt action. If the events thread cannot be spawned the controller
    /// still works, without subscriber delivery.
    pub fn build(self) -> Arc<Controller> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shared = Arc::new(Shared::new(bus.clone()));

        let pump = if self.subscribers.is_empty() {
            None
        } else {
            let name = format!("{}-events", self.cfg.worker_name);
            match EventPump::spawn(name, self.subscribers, bus) {
                Ok(pump) => Some(pump),
                Err(error) => {
                    tracing::error!(%error, "failed to start event pump; subscribers disabled");
                    None
                }
            }
        };

        Arc::new(Controller::new_internal(self.cfg, shared, pump))
    }
}
