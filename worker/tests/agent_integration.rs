//! Exercises the guest-agent HTTP surface against `wiremock`, covering
//! spec.md §8's boot-probe and run-dispatch scenarios without a real VM.

use std::net::Ipv4Addr;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use worker::protocol::{AgentRequest, AgentResult, JobEnvelope};

fn sample_job() -> JobEnvelope {
    JobEnvelope {
        id: "job-1".to_string(),
        language: "python".to_string(),
        code: "print(1)".to_string(),
    }
}

#[tokio::test]
async fn health_endpoint_reachable_after_mock_boots() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    let response = client.get(format!("{}/health", server.uri())).send().await.unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn run_dispatch_decodes_successful_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "stdout": "1\n",
            "stderr": "",
            "exec_duration_ms": 12,
            "mem_usage_bytes": 4096,
        })))
        .mount(&server)
        .await;

    let job = sample_job();
    let request = AgentRequest::from_job(&job);

    let response = reqwest::Client::new()
        .post(format!("{}/run", server.uri()))
        .json(&request)
        .send()
        .await
        .unwrap();

    let result: AgentResult = response.json().await.unwrap();
    assert_eq!(result.stdout, "1\n");
    assert!(result.error.is_empty());
    assert_eq!(result.exec_duration_ms, 12);
}

#[tokio::test]
async fn run_dispatch_decodes_agent_reported_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "division by zero",
            "stderr": "Traceback...",
        })))
        .mount(&server)
        .await;

    let job = sample_job();
    let request = AgentRequest::from_job(&job);

    let response = reqwest::Client::new()
        .post(format!("{}/run", server.uri()))
        .json(&request)
        .send()
        .await
        .unwrap();

    let result: AgentResult = response.json().await.unwrap();
    assert_eq!(result.error, "division by zero");
    assert!(!result.stderr.is_empty());
}

#[tokio::test]
async fn health_probe_never_succeeds_against_nothing_listening() {
    let unused_port = 1; // privileged, guaranteed nothing local is listening
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let result = client
        .get(format!("http://{}:{unused_port}/health", Ipv4Addr::LOCALHOST))
        .send()
        .await;

    assert!(result.is_err());
}
