pub mod identity;
pub mod orders;
pub mod reconciliation;
pub mod resume;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::gateway::GatewayClient;
use crate::store::OrderStore;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<orders::OrderService>,
    pub reconciliation: Arc<reconciliation::ReconciliationEngine>,
    pub resume: Arc<resume::ResumeCoordinator>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn GatewayClient>,
        events: EventSender,
        config: &AppConfig,
    ) -> Self {
        let resolver = Arc::new(identity::IdentityResolver::new(
            store.clone(),
            gateway.clone(),
        ));
        let engine = Arc::new(reconciliation::ReconciliationEngine::new(
            store.clone(),
            gateway.clone(),
            events.clone(),
        ));
        let orders = Arc::new(orders::OrderService::new(
            store.clone(),
            gateway.clone(),
            resolver.clone(),
            events.clone(),
            config.currency.clone(),
        ));
        let resume = Arc::new(resume::ResumeCoordinator::new(
            store,
            gateway,
            resolver,
            engine.clone(),
            events,
        ));

        Self {
            orders,
            reconciliation: engine,
            resume,
        }
    }
}
