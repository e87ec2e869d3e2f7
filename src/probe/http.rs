//! HTTP probe implementation.

use std::time::Instant;

use reqwest::Method;

use super::CheckResult;
use crate::config::Target;

/// Run a single HTTP health check against the given target.
///
/// The request uses the target's method, URL and timeout. The outcome is
/// classified into the returned result:
/// - response status equals the expected status: success
/// - response received with a different status: failure
/// - timeout, connection error or anything else: failure with cause text
pub async fn check(client: &reqwest::Client, target: &Target) -> CheckResult {
    let method = Method::from_bytes(target.method.as_bytes()).unwrap_or(Method::GET);
    let start = Instant::now();

    let response = client
        .request(method, &target.url)
        .timeout(target.timeout_duration())
        .send()
        .await;

    let response_time = start.elapsed().as_secs_f64();

    match response {
        Ok(response) => {
            let status = response.status().as_u16();
            if status == target.expected_status {
                CheckResult::ok(status, response_time)
            } else {
                CheckResult::fail(
                    Some(status),
                    response_time,
                    format!("status code {} != expected {}", status, target.expected_status),
                )
            }
        }
        Err(e) if e.is_timeout() => CheckResult::fail(
            None,
            response_time,
            format!("timeout after {}s", target.timeout),
        ),
        Err(e) if e.is_connect() => CheckResult::fail(
            None,
            response_time,
            format!("connection error: {}", e),
        ),
        Err(e) => CheckResult::fail(None, response_time, format!("request error: {}", e)),
    }
}
