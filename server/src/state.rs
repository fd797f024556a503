use std::sync::Arc;

use crate::auth::SessionKeys;
use crate::config::Config;
use crate::mail::Mailer;
use crate::payment::PaymentProvider;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub payments: Arc<dyn PaymentProvider>,
    pub mailer: Arc<dyn Mailer>,
    pub sessions: SessionKeys,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentProvider>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let sessions = SessionKeys::new(&config.auth_secret, config.session_ttl);
        Self {
            config: Arc::new(config),
            store,
            payments,
            mailer,
            sessions,
        }
    }
}
