//! Tower layer wiring the admission controller into a service stack.

use std::sync::Arc;
use tower_layer::Layer;

use super::service::AdmissionService;
use crate::config::LimiterConfig;
use crate::ratelimit::AdmissionController;

/// A layer that evaluates every request with an [`AdmissionController`].
///
/// Cloning the layer shares the controller, and with it every token bucket.
#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    controller: Arc<AdmissionController>,
}

impl AdmissionLayer {
    /// Create a layer around an existing controller.
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self { controller }
    }

    /// Build a controller for `config` and wrap it.
    pub fn from_config(config: LimiterConfig) -> Self {
        Self::new(Arc::new(AdmissionController::new(config)))
    }

    /// The shared controller.
    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService::new(inner, Arc::clone(&self.controller))
    }
}
