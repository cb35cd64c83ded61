use anyhow::{anyhow, Context};
use quorum_core::dispatcher::ClaimedTask;
use reqwest::Client;
use std::time::Duration;
use url::Url;

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_REDIRECTS: usize = 3;

/// Pushes the effects of executed tasks to the transport webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    http: Client,
    endpoint: Url,
}

impl WebhookSink {
    pub fn new(webhook_url: &str, timeout: Duration) -> anyhow::Result<WebhookSink> {
        let endpoint = Url::parse(webhook_url).context("invalid transport webhook url")?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quorum-server/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(WebhookSink { http, endpoint })
    }

    /// Deliver one claimed task as a JSON POST. Transport failures and 5xx
    /// responses are retried with exponential backoff; a 4xx response is a
    /// permanent rejection and fails immediately.
    pub async fn deliver(&self, claimed: &ClaimedTask) -> anyhow::Result<()> {
        let mut last_err = anyhow!("no attempts made");
        for attempt in 0..MAX_RETRIES {
            match self.http.post(self.endpoint.clone()).json(claimed).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if resp.status().is_server_error() => {
                    last_err = anyhow!("webhook returned {}", resp.status());
                }
                Ok(resp) => {
                    return Err(anyhow!(
                        "webhook rejected the delivery with {}",
                        resp.status()
                    ));
                }
                Err(err) => last_err = anyhow!(err),
            }
            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
            }
        }
        Err(last_err)
    }
}
