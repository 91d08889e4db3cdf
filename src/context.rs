use std::sync::Arc;

use crate::api::{Connection, DpxClient, Reauthenticate};
use crate::config::AppConfig;

/// Everything a command needs: the configuration and a logged-in connection.
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub conn: Connection,
}

impl AppContext {
    /// Log into the configured server.
    ///
    /// Returns `Ok(None)` when the server refuses the credentials.
    pub async fn connect(
        config: AppConfig,
        password: &str,
        reauth: Box<dyn Reauthenticate>,
    ) -> anyhow::Result<Option<Self>> {
        let client = DpxClient::new(&config.host, config.request_timeout())?;
        let Some(session) = client.login(&config.user, password).await? else {
            return Ok(None);
        };

        let conn = Connection::new(client, session, reauth, config.reauth_attempts);
        Ok(Some(Self {
            config: Arc::new(config),
            conn,
        }))
    }
}
