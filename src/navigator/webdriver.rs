use super::random_user_agent;
use crate::{NavError, Navigator, NavigatorFactory};
use std::time::Duration;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tracing::debug;

impl From<WebDriverError> for NavError {
    fn from(err: WebDriverError) -> Self {
        NavError::Driver(err.to_string())
    }
}

/// Chrome session driven over the WebDriver protocol.
pub struct WebDriverNavigator {
    driver: Option<WebDriver>,
}

impl WebDriverNavigator {
    fn driver(&self) -> Result<&WebDriver, NavError> {
        self.driver
            .as_ref()
            .ok_or_else(|| NavError::Driver("session already closed".to_string()))
    }
}

#[async_trait::async_trait]
impl Navigator for WebDriverNavigator {
    async fn load(&mut self, url: &str) -> Result<(), NavError> {
        debug!("Visit {}", url);
        self.driver()?.goto(url).await?;
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<String, NavError> {
        Ok(self.driver()?.source().await?)
    }

    async fn invoke_action(&mut self, selector: &str) -> Result<(), NavError> {
        let element = self
            .driver()?
            .find(By::Css(selector))
            .await
            .map_err(|_| NavError::NotFound(selector.to_string()))?;
        element.scroll_into_view().await?;
        element.click().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), NavError> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await?;
        }
        Ok(())
    }
}

pub struct WebDriverFactory {
    pub server_url: String,
    pub headless: bool,
    pub page_load_timeout: Duration,
}

#[async_trait::async_trait]
impl NavigatorFactory for WebDriverFactory {
    type Navigator = WebDriverNavigator;

    async fn acquire(&self) -> Result<WebDriverNavigator, NavError> {
        let mut caps = DesiredCapabilities::chrome();
        if self.headless {
            caps.set_headless()?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--window-size=1920,1080")?;
        caps.add_arg(&format!("--user-agent={}", random_user_agent()))?;

        let driver = WebDriver::new(self.server_url.as_str(), caps).await?;
        driver.set_page_load_timeout(self.page_load_timeout).await?;
        Ok(WebDriverNavigator {
            driver: Some(driver),
        })
    }
}
