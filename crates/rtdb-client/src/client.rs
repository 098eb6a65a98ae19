//! Client facade wiring transport, credentials and the operation surfaces.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::{spawn_refresh_loop, CredentialProvider, PasswordAuth, StaticToken};
use crate::config::{AuthConfig, DatabaseConfig};
use crate::deletion::DeletionEngine;
use crate::dispatcher::RequestDispatcher;
use crate::error::{RtdbError, RtdbResult};
use crate::retention::RetentionManager;
use crate::store::RecordStore;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Entry point bundling the dispatcher with the store, deletion and retention surfaces.
#[derive(Clone)]
pub struct RtdbClient {
    dispatcher: Arc<RequestDispatcher>,
    credentials: Arc<dyn CredentialProvider>,
    store: RecordStore,
    deletion: DeletionEngine,
    retention: RetentionManager,
    refresh_interval: Duration,
}

impl RtdbClient {
    /// Build a client over injected collaborators with default pacing.
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let config = DatabaseConfig::new(base_url);
        Self::assemble(&config, transport, credentials)
    }

    /// Build a client from configuration without contacting any server.
    ///
    /// A password account starts without a token; call [`RtdbClient::connect`] to sign
    /// in first, or rely on the 401 refresh of the first request.
    pub fn from_config(config: &DatabaseConfig) -> RtdbResult<Self> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        let credentials: Arc<dyn CredentialProvider> = match &config.auth {
            AuthConfig::Anonymous => Arc::new(StaticToken::anonymous()),
            AuthConfig::Static { token } => Arc::new(StaticToken::new(token.clone())),
            AuthConfig::Password {
                api_key,
                email,
                password,
            } => Arc::new(PasswordAuth::new(
                api_key.clone(),
                email.clone(),
                password.clone(),
            )),
        };
        Ok(Self::assemble(config, transport, credentials))
    }

    /// Build a client from configuration and obtain an initial credential.
    pub async fn connect(config: &DatabaseConfig) -> RtdbResult<Self> {
        let client = Self::from_config(config)?;
        client
            .credentials
            .force_refresh()
            .await
            .map_err(|e| RtdbError::config(format!("initial sign-in failed: {}", e)))?;
        info!("connected to {}", client.dispatcher.base_url());
        Ok(client)
    }

    fn assemble(
        config: &DatabaseConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let dispatcher = Arc::new(RequestDispatcher::new(
            config.base_url(),
            transport,
            credentials.clone(),
        ));
        let deletion =
            DeletionEngine::new(dispatcher.clone()).with_child_pause(config.child_delete_pause());
        let store = RecordStore::with_deletion(dispatcher.clone(), deletion.clone());
        let retention = RetentionManager::new(dispatcher.clone(), deletion.clone())
            .with_trim_pause(config.trim_pause());
        Self {
            dispatcher,
            credentials,
            store,
            deletion,
            retention,
            refresh_interval: config.token_refresh_interval(),
        }
    }

    /// CRUD operations.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Size-aware subtree deletion.
    pub fn deletion(&self) -> &DeletionEngine {
        &self.deletion
    }

    /// Retention policies.
    pub fn retention(&self) -> &RetentionManager {
        &self.retention
    }

    /// The shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Start refreshing the credential every configured interval.
    pub fn spawn_token_refresh(&self) -> JoinHandle<()> {
        spawn_refresh_loop(self.credentials.clone(), self.refresh_interval)
    }
}
