//! HTTP helpers with rate-limit retry
//!
//! Only HTTP 429 triggers retries (random 100-1000 ms back-off, up to 10
//! attempts); any other non-2xx response fails immediately with the status
//! and body in the error.

use rand::Rng;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::types::{Result, VerifyError};

const MAX_NUM_RETRY: u32 = 10;

/// GETs a URL, retrying on 429.
pub async fn get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let mut retry_count = 0;

    loop {
        let response = client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait_ms = rand::thread_rng().gen_range(100..=1000);
            debug!(url, wait_ms, "rate limited, backing off");
            sleep(Duration::from_millis(wait_ms)).await;

            retry_count += 1;
            if retry_count <= MAX_NUM_RETRY {
                continue;
            }

            return Err(VerifyError::Transport(format!(
                "still getting {status} from {url} after {MAX_NUM_RETRY} retries"
            )));
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Transport(format!(
                "got {status} from {url}: {body}"
            )));
        }

        return Ok(response);
    }
}

/// GETs a URL and returns the response body as text.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    Ok(get(client, url).await?.text().await?)
}

/// GETs a URL and decodes the response body as JSON.
pub async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    Ok(get(client, url).await?.json().await?)
}

/// POSTs a JSON body and decodes the JSON response.
pub async fn post_json(client: &reqwest::Client, url: &str, body: &Value) -> Result<Value> {
    let response = client.post(url).json(body).send().await?;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(VerifyError::Transport(format!(
            "got {status} from {url}: {body}"
        )));
    }

    Ok(response.json().await?)
}
