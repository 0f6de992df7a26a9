use crate::auth::InitDataVerifier;
use crate::config::AppConfig;
use crate::store::UsageStore;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub verifier: Arc<InitDataVerifier>,
    pub store: Arc<UsageStore>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let mut verifier = InitDataVerifier::new(config.bot_token.expose());
        if let Some(max_age) = config.auth_max_age {
            verifier = verifier.with_max_age(max_age);
        }
        let mut store = UsageStore::new();
        if let Some(max_groups) = config.max_groups {
            store = store.with_max_groups(max_groups);
        }
        Self {
            config,
            verifier: Arc::new(verifier),
            store: Arc::new(store),
        }
    }
}
