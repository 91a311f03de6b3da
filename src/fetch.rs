use crate::config::FetchConfig;
use crate::lookup::{LookupError, LookupFuture, PageFetcher};
use reqwest::Client;
use std::time::Duration;

/// Live page fetcher with a bounded timeout and redirect count.
pub struct HttpPageFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

fn classify(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Unavailable(e.to_string())
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> LookupFuture<'a, String> {
        Box::pin(async move {
            let mut response = self.client.get(url).send().await.map_err(classify)?;

            let status = response.status();
            if !status.is_success() {
                return Err(LookupError::Unavailable(format!("HTTP {status} from {url}")));
            }

            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(classify)? {
                let room = self.max_body_bytes.saturating_sub(body.len());
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if body.len() >= self.max_body_bytes {
                    log::debug!("Truncated body of {url} at {} bytes", self.max_body_bytes);
                    break;
                }
            }

            Ok(String::from_utf8_lossy(&body).into_owned())
        })
    }
}
