use std::time::Duration;

use async_trait::async_trait;
use fleetquote_core::config::SubmissionConfig;
use fleetquote_core::submission::{
    FieldErrors, SubmissionError, SubmissionPayload, SubmissionReceipt, SubmissionTransport,
};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

/// Posts quote payloads as JSON to the configured quote backend.
pub struct HttpSubmissionTransport {
    client: Client,
    endpoint: String,
    api_token: SecretString,
}

#[derive(Debug, Default, Deserialize)]
struct RejectionBody {
    #[serde(default)]
    errors: FieldErrors,
}

impl HttpSubmissionTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SubmissionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SubmissionError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), api_token })
    }

    pub fn from_config(config: &SubmissionConfig) -> Result<Self, SubmissionError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            SubmissionError::Transport("submission.endpoint is not configured".to_string())
        })?;
        let api_token = config.api_token.clone().ok_or_else(|| {
            SubmissionError::Transport("submission.api_token is not configured".to_string())
        })?;
        Self::new(endpoint, api_token, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl SubmissionTransport for HttpSubmissionTransport {
    async fn submit(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let auth = format!("Bearer {}", self.api_token.expose_secret());
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", auth)
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "cli.submission.send_failed",
                    endpoint = %self.endpoint,
                    error = %error,
                    "quote backend request failed"
                );
                SubmissionError::Transport(error.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| SubmissionError::Transport(error.to_string()))?;
        info!(
            event_name = "cli.submission.response",
            endpoint = %self.endpoint,
            status = status.as_u16(),
            "quote backend responded"
        );
        interpret_response(status, &body)
    }
}

/// Maps a backend response onto the submission outcome.
pub fn interpret_response(
    status: StatusCode,
    body: &str,
) -> Result<SubmissionReceipt, SubmissionError> {
    if status.is_success() {
        return Ok(serde_json::from_str::<SubmissionReceipt>(body).unwrap_or_default());
    }

    if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY) {
        if let Ok(rejection) = serde_json::from_str::<RejectionBody>(body) {
            if !rejection.errors.is_empty() {
                return Err(SubmissionError::Rejected(rejection.errors));
            }
        }
    }

    Err(SubmissionError::Transport(format!("quote backend returned {status}")))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::interpret_response;
    use fleetquote_core::submission::SubmissionError;

    #[test]
    fn success_reads_quote_id_when_present() {
        let receipt = interpret_response(StatusCode::CREATED, r#"{"quoteId":"srv-9"}"#)
            .expect("2xx is accepted");
        assert_eq!(receipt.quote_id.as_deref(), Some("srv-9"));

        let receipt = interpret_response(StatusCode::NO_CONTENT, "").expect("2xx is accepted");
        assert_eq!(receipt.quote_id, None);
    }

    #[test]
    fn unprocessable_with_field_errors_is_a_rejection() {
        let body = r#"{"errors":{"planProductId":["not sellable"],"unitCount":["too low"]}}"#;
        match interpret_response(StatusCode::UNPROCESSABLE_ENTITY, body) {
            Err(SubmissionError::Rejected(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors["planProductId"], vec!["not sellable".to_string()]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn bad_request_without_field_errors_is_a_transport_error() {
        let outcome = interpret_response(StatusCode::BAD_REQUEST, "<html>oops</html>");
        assert!(matches!(outcome, Err(SubmissionError::Transport(_))));
    }

    #[test]
    fn server_errors_are_transport_errors() {
        let outcome = interpret_response(StatusCode::BAD_GATEWAY, r#"{"errors":{"a":["b"]}}"#);
        assert_eq!(
            outcome,
            Err(SubmissionError::Transport("quote backend returned 502 Bad Gateway".to_string()))
        );
    }
}
