//! Natural-language advice for an evaluation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::coaching::CoachingEvaluation;
use crate::error::AdviceError;

/// Body sent to the advice backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceRequest {
    pub last_move: String,
    pub eval_before: i32,
    pub eval_after: i32,
    pub best_move: String,
    /// Space-separated SAN.
    pub pv: String,
}

impl From<&CoachingEvaluation> for AdviceRequest {
    fn from(eval: &CoachingEvaluation) -> Self {
        Self {
            last_move: eval.mv.clone(),
            eval_before: eval.eval_before,
            eval_after: eval.eval_after,
            best_move: eval.best_move.clone(),
            pv: eval.pv.join(" "),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdviceReply {
    advice: String,
}

#[derive(Debug, Deserialize)]
struct AdviceFailure {
    error: String,
}

/// Something that can explain an evaluation in words.
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn advise(&self, request: &AdviceRequest) -> Result<String, AdviceError>;
}

/// Posts evaluations as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpAdviceClient {
    url: String,
    client: reqwest::Client,
}

impl HttpAdviceClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AdviceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AdviceGenerator for HttpAdviceClient {
    #[instrument(skip_all, fields(url = %self.url, last_move = %request.last_move))]
    async fn advise(&self, request: &AdviceRequest) -> Result<String, AdviceError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        debug!(%status, "Advice response");

        if status.is_success() {
            let reply: AdviceReply = response.json().await?;
            return Ok(reply.advice);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AdviceFailure>(&body)
            .map(|failure| failure.error)
            .unwrap_or(body);
        warn!(%status, %message, "Advice service refused");
        Err(AdviceError::Status {
            status: status.as_u16(),
            message,
        })
    }
}
