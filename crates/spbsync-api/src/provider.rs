//! SpbApiProvider - port implementations over [`ApiClient`]
//!
//! Implements [`ISubmissionClient`] and [`ISpbSource`] so the sync engine
//! and the orchestration controller can talk to the SPB service without
//! knowing about HTTP.

use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use spbsync_core::domain::{FetchScope, SpbDocument};
use spbsync_core::ports::{AdjustRequest, ISpbSource, ISubmissionClient, SubmissionError};

use crate::client::ApiClient;

/// Remote SPB service adapter
#[derive(Debug, Clone)]
pub struct SpbApiProvider {
    client: Arc<ApiClient>,
}

impl SpbApiProvider {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl ISubmissionClient for SpbApiProvider {
    async fn submit(&self, request: &AdjustRequest) -> Result<(), SubmissionError> {
        self.client.adjust(request).await.map_err(|e| {
            warn!(record_key = %request.record_key, error = %e, "Adjust request failed");
            SubmissionError::from(e)
        })
    }

    async fn check_already_processed(&self, record_key: &str) -> Result<bool, SubmissionError> {
        Ok(self.client.is_processed(record_key).await?)
    }
}

#[async_trait::async_trait]
impl ISpbSource for SpbApiProvider {
    async fn fetch_documents(&self, scope: &FetchScope) -> anyhow::Result<Vec<SpbDocument>> {
        self.client
            .list_spb(scope)
            .await
            .with_context(|| format!("Failed to fetch SPB list for user {}", scope.user_id))
    }
}
