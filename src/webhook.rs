//! Outgoing webhook delivery (`spec.md` §6.4). Best-effort: no retries,
//! failures are logged and never affect job state.

use reqwest::{Client, Method};
use tracing::{debug, warn};

use crate::job::{JobResult, WebhookSpec};

/// Sends `job_id`'s terminal result to `spec`'s configured endpoint.
/// Never returns an error to the caller — delivery failures are logged
/// and swallowed, matching the "best-effort" contract.
pub async fn deliver(spec: &WebhookSpec, job_id: &str, result: &JobResult) {
    let method = parse_method(&spec.method);
    let body = serde_json::json!({
        "id": job_id,
        "result": result_text(result),
    });

    let client = match Client::builder().timeout(spec.timeout()).build() {
        Ok(client) => client,
        Err(err) => {
            warn!(webhook = %spec.name, error = %err, "failed to build webhook http client");
            return;
        }
    };

    let mut request = client.request(method, &spec.url).json(&body);
    for (key, value) in &spec.headers {
        request = request.header(key, value);
    }
    if !spec.cookies.is_empty() {
        let cookie_header = spec
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        request = request.header(reqwest::header::COOKIE, cookie_header);
    }
    if let Some((user, pass)) = &spec.basic_auth {
        request = request.basic_auth(user, Some(pass));
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            debug!(webhook = %spec.name, job_id, "webhook delivered");
        }
        Ok(response) => {
            warn!(webhook = %spec.name, job_id, status = %response.status(), "webhook returned non-success status");
        }
        Err(err) => {
            warn!(webhook = %spec.name, job_id, error = %err, "webhook delivery failed");
        }
    }
}

fn parse_method(method: &str) -> Method {
    method.to_uppercase().parse().unwrap_or(Method::POST)
}

fn result_text(result: &JobResult) -> String {
    match result {
        JobResult::Success { retval } => retval.to_string(),
        JobResult::Failure { error } => error.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_method_defaults_to_post() {
        assert_eq!(parse_method("banana"), Method::POST);
        assert_eq!(parse_method("put"), Method::PUT);
    }

    #[test]
    fn result_text_extracts_error_message_on_failure() {
        let result = JobResult::Failure {
            error: crate::job::JobError {
                kind: crate::error::ErrorKind::Timeout,
                message: "operation timed out".into(),
            },
        };
        assert_eq!(result_text(&result), "operation timed out");
    }
}
