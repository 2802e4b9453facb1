//! Chrome engine over the DevTools protocol

use crate::browser::{BrowserEngine, BrowserError, BrowserPage, LaunchProfile};
use crate::config::GeoPoint;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide::cdp::browser_protocol::emulation::SetGeolocationOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Launches local Chrome/Chromium processes
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    request_timeout: Duration,
}

impl ChromiumEngine {
    /// `request_timeout` bounds every single DevTools command
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let (width, height) = profile.window;
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.request_timeout)
            .window_size(width, height)
            .user_data_dir(&profile.profile_dir)
            .arg(format!("--window-size={},{}", width, height));

        if !profile.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &profile.executable {
            builder = builder.chrome_executable(executable);
        }
        for arg in &profile.args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder.build().map_err(BrowserError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let label = profile.label.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // Unknown CDP messages are reported here; the connection stays usable.
                    trace!(browser = %label, "CDP handler event error: {}", e);
                }
            }
        });

        let mut chromium = ChromiumPage {
            browser,
            handler,
            page: None,
        };
        let page = chromium
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        chromium.page = Some(page);

        debug!(browser = %profile.label, dir = %profile.profile_dir.display(), "Chrome launched");
        Ok(Box::new(chromium))
    }
}

/// A Chrome process with its single tab
///
/// Dropping aborts the event handler; chromiumoxide kills the child process
/// when the `Browser` is dropped.
struct ChromiumPage {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Option<Page>,
}

impl ChromiumPage {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Crashed("page already closed".to_string()))
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

fn map_cdp(e: CdpError) -> BrowserError {
    match e {
        CdpError::Timeout => BrowserError::Timeout(e.to_string()),
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            BrowserError::Crashed(e.to_string())
        }
        other => BrowserError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn add_init_script(&mut self, source: &str) -> Result<(), BrowserError> {
        self.page()?
            .execute(AddScriptToEvaluateOnNewDocumentParams {
                source: source.to_string(),
                include_command_line_api: None,
                world_name: None,
                run_immediately: None,
            })
            .await
            .map_err(map_cdp)?;
        Ok(())
    }

    async fn set_user_agent(
        &mut self,
        user_agent: &str,
        accept_language: &str,
        platform: &str,
    ) -> Result<(), BrowserError> {
        self.page()?
            .execute(SetUserAgentOverrideParams {
                user_agent: user_agent.to_string(),
                accept_language: Some(accept_language.to_string()),
                platform: Some(platform.to_string()),
                user_agent_metadata: None,
            })
            .await
            .map_err(map_cdp)?;
        Ok(())
    }

    async fn set_extra_headers(
        &mut self,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), BrowserError> {
        let headers = serde_json::to_value(headers)
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        self.page()?
            .execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
            .await
            .map_err(map_cdp)?;
        Ok(())
    }

    async fn set_geolocation(&mut self, point: &GeoPoint) -> Result<(), BrowserError> {
        if let Err(e) = self
            .browser
            .execute(GrantPermissionsParams::new(vec![PermissionType::Geolocation]))
            .await
        {
            debug!("Geolocation permission grant failed: {}", e);
        }

        self.page()?
            .execute(
                SetGeolocationOverrideParams::builder()
                    .latitude(point.latitude)
                    .longitude(point.longitude)
                    .accuracy(point.accuracy)
                    .build(),
            )
            .await
            .map_err(map_cdp)?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page()?.goto(url).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        let url = self.page()?.url().await.map_err(map_cdp)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool, BrowserError> {
        match self.page()?.find_element(selector).await {
            Ok(_) => Ok(true),
            Err(e) => match map_cdp(e) {
                crashed @ BrowserError::Crashed(_) => Err(crashed),
                _ => Ok(false),
            },
        }
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        self.page()?.content().await.map_err(map_cdp)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        self.page()?
            .screenshot(CaptureScreenshotParams {
                format: Some(CaptureScreenshotFormat::Png),
                capture_beyond_viewport: Some(true),
                ..Default::default()
            })
            .await
            .map_err(map_cdp)
    }

    async fn shutdown(&mut self) -> Result<(), BrowserError> {
        self.page = None;
        let closed = self.browser.close().await.map_err(map_cdp);
        let waited = self
            .browser
            .wait()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()));
        self.handler.abort();
        closed?;
        waited?;
        Ok(())
    }
}
