use async_trait::async_trait;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use common::{JobConf, JobStatus};

/// Aviso de fin de job. Se manda una sola vez, después de la limpieza,
/// termine como termine el job.
#[async_trait]
pub trait JobEndNotifier: Send + Sync {
    async fn notify(&self, conf: &JobConf, status: &JobStatus);
}

/// Reemplaza `$jobId` y `$jobStatus` en la URL configurada.
pub fn notification_url(template: &str, status: &JobStatus) -> String {
    template
        .replace("$jobId", &status.job_id.to_string())
        .replace("$jobStatus", status.run_state.as_str())
}

/// Hace un GET a `end_notification_url`, con reintentos si así se configuró.
pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobEndNotifier for HttpNotifier {
    async fn notify(&self, conf: &JobConf, status: &JobStatus) {
        let Some(template) = conf.end_notification_url.as_deref() else {
            debug!("job {} sin URL de aviso de fin", status.job_id);
            return;
        };
        let url = notification_url(template, status);
        let attempts = conf.end_notification_retries + 1;

        for attempt in 1..=attempts {
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("aviso de fin del job {} enviado a {}", status.job_id, url);
                    return;
                }
                Ok(resp) => warn!(
                    "aviso de fin del job {} respondió {} (intento {}/{})",
                    status.job_id,
                    resp.status(),
                    attempt,
                    attempts
                ),
                Err(e) => warn!(
                    "aviso de fin del job {} falló: {} (intento {}/{})",
                    status.job_id, e, attempt, attempts
                ),
            }

            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(
                    conf.end_notification_retry_interval_ms,
                ))
                .await;
            }
        }
    }
}

/// Sólo deja el aviso en el log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl JobEndNotifier for LogNotifier {
    async fn notify(&self, _conf: &JobConf, status: &JobStatus) {
        info!(
            "job {} terminó en {}",
            status.job_id,
            status.run_state.as_str()
        );
    }
}
