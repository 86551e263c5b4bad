//! A job that polls one Torn endpoint per run, rotating through the key pool.
//!
//! What happens to the payload is up to the `on_payload` sink; the worker
//! binary only logs it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::api::{ApiResponse, RequestOptions, TornClient};
use crate::keys::{mask_key, ApiKeyRotator};
use crate::scheduler::{JobError, JobHandler, JobOutcome};

pub type PayloadSink = Arc<dyn Fn(&str, serde_json::Value) + Send + Sync>;

pub struct EndpointPollJob {
    name: String,
    client: TornClient,
    rotator: Arc<ApiKeyRotator>,
    path: String,
    path_params: HashMap<String, String>,
    query_params: HashMap<String, String>,
    on_payload: Option<PayloadSink>,
}

impl EndpointPollJob {
    pub fn new(
        name: impl Into<String>,
        client: TornClient,
        rotator: Arc<ApiKeyRotator>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            rotator,
            path: path.into(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            on_payload: None,
        }
    }

    pub fn path_params(mut self, params: HashMap<String, String>) -> Self {
        self.path_params = params;
        self
    }

    pub fn query_params(mut self, params: HashMap<String, String>) -> Self {
        self.query_params = params;
        self
    }

    pub fn on_payload(mut self, sink: PayloadSink) -> Self {
        self.on_payload = Some(sink);
        self
    }

    fn request_options(&self, api_key: &str) -> RequestOptions {
        let mut options = RequestOptions::new(api_key);
        for (name, value) in &self.path_params {
            options = options.path_param(name.clone(), value);
        }
        let mut query: Vec<_> = self.query_params.iter().collect();
        query.sort();
        for (name, value) in query {
            options = options.query(name.clone(), value);
        }
        options
    }
}

#[async_trait]
impl JobHandler for EndpointPollJob {
    async fn run(&self) -> Result<JobOutcome, JobError> {
        let api_key = self.rotator.next_key();
        debug!("'{}' polling {} with key {}", self.name, self.path, mask_key(api_key));

        let options = self.request_options(api_key);
        match self.client.get::<serde_json::Value>(&self.path, &options).await? {
            ApiResponse::Success(payload) => {
                if let Some(sink) = &self.on_payload {
                    sink(&self.name, payload);
                }
                Ok(JobOutcome::Completed)
            }
            ApiResponse::Error(e) => Err(JobError::failed(format!(
                "Torn API error {}: {}",
                e.code, e.error
            ))),
        }
    }
}
