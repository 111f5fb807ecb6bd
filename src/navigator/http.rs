use super::random_user_agent;
use crate::{NavError, Navigator, NavigatorFactory};
use std::time::Duration;
use tracing::debug;

/// Plain HTTP session: the served HTML is the document.
///
/// Suitable for server-rendered pages only; disclosure actions that depend on
/// client-side scripts are reported as unsupported.
pub struct HttpNavigator {
    client: reqwest::Client,
    current: Option<String>,
}

impl HttpNavigator {
    pub fn new(page_load_timeout: Duration) -> Result<Self, NavError> {
        let client = reqwest::Client::builder()
            .user_agent(random_user_agent())
            .timeout(page_load_timeout)
            .build()?;
        Ok(HttpNavigator {
            client,
            current: None,
        })
    }
}

#[async_trait::async_trait]
impl Navigator for HttpNavigator {
    async fn load(&mut self, url: &str) -> Result<(), NavError> {
        debug!("Visit {}", url);
        let html = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        self.current = Some(html);
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<String, NavError> {
        self.current.clone().ok_or(NavError::NoDocument)
    }

    async fn invoke_action(&mut self, selector: &str) -> Result<(), NavError> {
        Err(NavError::Unsupported(format!(
            "disclosure on {selector} needs a scripting navigator"
        )))
    }
}

pub struct HttpFactory {
    pub page_load_timeout: Duration,
}

#[async_trait::async_trait]
impl NavigatorFactory for HttpFactory {
    type Navigator = HttpNavigator;

    async fn acquire(&self) -> Result<HttpNavigator, NavError> {
        HttpNavigator::new(self.page_load_timeout)
    }
}
