//! Mock construction helpers

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use message_pipeline::assets::{HttpFetch, HttpResponse};
use message_pipeline::notify::{ChannelNotifier, Notification};
use message_pipeline::pipeline::PipelineEnvironment;
use message_pipeline::{PipelineError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Serves canned responses and records every requested URL
#[derive(Default)]
pub struct StaticHttp {
    responses: HashMap<String, HttpResponse>,
    requests: Mutex<Vec<String>>,
}

impl StaticHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            HttpResponse {
                status: 200,
                status_text: "OK".to_string(),
                body: Some(body.to_vec()),
                content_type: None,
            },
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16, status_text: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            HttpResponse {
                status,
                status_text: status_text.to_string(),
                body: None,
                content_type: None,
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpFetch for StaticHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::Player(format!("no route to {}", url)))
    }
}

/// Environment with a channel notifier and the given HTTP transport
pub fn test_environment(http: Arc<StaticHttp>) -> (PipelineEnvironment, Receiver<Notification>) {
    let (notifier, rx) = ChannelNotifier::new();
    (PipelineEnvironment::new(Arc::new(notifier), http), rx)
}
