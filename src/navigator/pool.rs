use crate::{NavError, Navigator, NavigatorFactory};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Idle sessions waiting to be handed to the next unit of work.
///
/// A checked-out navigator belongs to one worker until it is checked back in;
/// sessions reported unhealthy are closed instead of reused.
pub struct NavigatorPool<F: NavigatorFactory> {
    factory: F,
    idle: Mutex<Vec<F::Navigator>>,
}

impl<F: NavigatorFactory> NavigatorPool<F> {
    pub fn new(factory: F) -> Self {
        NavigatorPool {
            factory,
            idle: Mutex::new(vec![]),
        }
    }

    pub async fn checkout(&self) -> Result<F::Navigator, NavError> {
        let idle = self.idle.lock().await.pop();
        match idle {
            Some(nav) => Ok(nav),
            None => {
                debug!("Opening navigator session");
                self.factory.acquire().await
            }
        }
    }

    pub async fn checkin(&self, mut nav: F::Navigator, healthy: bool) {
        if healthy {
            self.idle.lock().await.push(nav);
        } else if let Err(e) = nav.close().await {
            warn!("Failed to close unhealthy navigator: {}", e);
        }
    }

    pub async fn close_all(&self) {
        let sessions: Vec<F::Navigator> = self.idle.lock().await.drain(..).collect();
        for mut nav in sessions {
            if let Err(e) = nav.close().await {
                warn!("Failed to close navigator: {}", e);
            }
        }
    }
}
