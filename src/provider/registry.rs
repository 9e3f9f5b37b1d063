//! Provider registry
//!
//! Name-keyed lookup of [`AuthProvider`] implementations, built once at
//! startup and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::{AuthProvider, ProviderError};

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn AuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl AuthProvider + 'static) {
        let name = provider.name();
        info!(provider = name, "registering auth provider");
        self.providers.insert(name.to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AuthProvider>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotRegistered(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Authenticated, TokenSet};
    use chrono::{Duration, Utc};
    use futures_util::future::BoxFuture;

    struct MockProvider;

    impl AuthProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn auth_url(&self, state: &str) -> String {
            format!("https://auth.example/consent?state={state}")
        }

        fn exchange_code<'a>(
            &'a self,
            code: &'a str,
        ) -> BoxFuture<'a, Result<Authenticated, ProviderError>> {
            Box::pin(async move {
                if code == "good" {
                    Ok(Authenticated {
                        user_id: "user@example.com".to_string(),
                        token: TokenSet {
                            access_token: "at".to_string(),
                            refresh_token: None,
                            expires_at: Utc::now() + Duration::hours(1),
                        },
                    })
                } else {
                    Err(ProviderError::TokenExchange("bad code".to_string()))
                }
            })
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = ProviderRegistry::new();
        registry.register(MockProvider);

        assert!(registry.has("mock"));
        assert!(registry.get("mock").is_ok());
        assert!(matches!(
            registry.get("github").unwrap_err(),
            ProviderError::NotRegistered(_)
        ));
    }

    #[tokio::test]
    async fn registered_provider_exchanges_codes() {
        let mut registry = ProviderRegistry::new();
        registry.register(MockProvider);

        let provider = registry.get("mock").unwrap();
        let auth = provider.exchange_code("good").await.unwrap();
        assert_eq!(auth.user_id, "user@example.com");
        assert!(auth.token.is_valid());

        assert!(provider.exchange_code("bad").await.is_err());
    }
}
