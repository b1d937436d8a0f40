use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::extract::{first_array_at, first_string_at};
use super::retry::with_retry;
use super::{InterviewApi, PriorAttempt, StopReceipt};
use crate::config::ApiConfig;
use crate::error::ApiError;

const RECORDING_ID_PATHS: &[&str] = &[
    "data.recordingId",
    "recordingId",
    "data.id",
    "id",
    "data.result.recordingId",
    "result.recordingId",
];

const INTERVIEW_UUID_PATHS: &[&str] = &[
    "data.interviewUuid",
    "interviewUuid",
    "data.result.interviewUuid",
    "result.interviewUuid",
];

const QUESTION_LIST_PATHS: &[&str] = &["questions", "result.questions", "data.questions"];

const PRIOR_TEXT_PATHS: &[&str] = &["result.question", "result.title", "question", "title"];

const STOP_PATH: &str = "/api/recordings/stop";

/// `InterviewApi` over the backend's REST endpoints
pub struct HttpInterviewApi {
    client: reqwest::Client,
    base_url: Arc<str>,
    generate_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpInterviewApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!("Interview API at {}", config.base_url);

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(
        &self,
        operation: &'static str,
        path: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ApiError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        read_body(operation, request.send().await?).await
    }
}

/// JSON body of a successful response; an empty body reads as `null`
async fn read_body(operation: &'static str, response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status { operation, status });
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ApiError::Other(format!("{}: {}", operation, e)))
}

#[async_trait]
impl InterviewApi for HttpInterviewApi {
    async fn start_recording(&self, live_session_id: &str) -> Result<String, ApiError> {
        let body = json!({ "interviewId": live_session_id });
        let response = with_retry(
            "start recording",
            self.max_retries,
            self.retry_base_delay,
            || self.post_json("start recording", "/api/recordings/start", &body, None),
        )
        .await?;

        let recording_id = first_string_at(&response, RECORDING_ID_PATHS).ok_or_else(|| {
            warn!("Start response has no recording id: {}", response);
            ApiError::MissingField {
                operation: "start recording",
                field: "recordingId",
            }
        })?;

        info!("Recording {} started for {}", recording_id, live_session_id);
        Ok(recording_id)
    }

    async fn stop_recording(&self, recording_id: &str) -> Result<StopReceipt, ApiError> {
        let body = json!({ "recordingId": recording_id });
        let response = with_retry(
            "stop recording",
            self.max_retries,
            self.retry_base_delay,
            || self.post_json("stop recording", STOP_PATH, &body, None),
        )
        .await?;

        info!("Recording {} stopped", recording_id);
        Ok(StopReceipt {
            interview_uuid: first_string_at(&response, INTERVIEW_UUID_PATHS),
        })
    }

    async fn generate_next_question_set(&self, session_id: &str) -> Result<Vec<Value>, ApiError> {
        let body = json!({ "interviewUuid": session_id });
        let response = self
            .post_json(
                "generate questions",
                "/api/interview/generateQuestions",
                &body,
                Some(self.generate_timeout),
            )
            .await?;

        first_array_at(&response, QUESTION_LIST_PATHS).ok_or(ApiError::MissingField {
            operation: "generate questions",
            field: "questions",
        })
    }

    async fn lookup_prior_attempt_text(&self, attempt_id: &str) -> Result<PriorAttempt, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/feedback/{}", attempt_id)))
            .send()
            .await?;
        let body = read_body("feedback lookup", response).await?;

        Ok(PriorAttempt {
            text: first_string_at(&body, PRIOR_TEXT_PATHS),
        })
    }

    fn detach_recording(&self, recording_id: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to detach recording {}", recording_id);
            return;
        };

        let request = self
            .client
            .post(self.url(STOP_PATH))
            .json(&json!({ "recordingId": recording_id }));
        let recording_id = recording_id.to_string();

        runtime.spawn(async move {
            if let Err(e) = request.send().await {
                error!("Detach notification for {} failed: {}", recording_id, e);
            }
        });
    }
}
