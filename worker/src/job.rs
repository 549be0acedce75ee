//! Runs a single job to completion against a VM borrowed from the pool.
//!
//! Grounded on the teacher's `benchJob.run` for the step ordering (publish a
//! status before and after the risky part) and on `vm_task_impl`'s
//! `tokio::select!` composition for races between the job's own work and an
//! external teardown signal.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::broker::Broker;
use crate::hypervisor::RunningVm;
use crate::pool::{self, Pool};
use crate::protocol::{AgentRequest, AgentResult, JobEnvelope, JobStatusRecord};

/// Acquire a warm VM and drive `job` through the fixed status sequence from
/// spec.md §4.5: `received` → (acquire) → `running` → dispatch → `done` or
/// `failed`. The VM is always torn down before returning, regardless of
/// which branch is taken.
pub async fn run(job: JobEnvelope, pool: Arc<tokio::sync::Mutex<Pool>>, broker: Arc<Broker>) {
    publish(&broker, JobStatusRecord::received(&job.id)).await;

    let mut vm = {
        let mut pool = pool.lock().await;
        match pool::acquire(&mut pool).await {
            Some(vm) => vm,
            None => {
                error!(id = %job.id, "pool closed, cannot run job");
                publish(&broker, JobStatusRecord::failed(&job.id, "no vm available")).await;
                return;
            }
        }
    };

    publish(&broker, JobStatusRecord::running(&job.id)).await;

    let outcome = dispatch(&vm, &job).await;
    vm.teardown().await;

    match outcome {
        Ok((status, result)) if status == reqwest::StatusCode::OK => {
            info!(id = %job.id, "job done");
            publish(&broker, JobStatusRecord::done(&job.id, result)).await;
        }
        Ok((status, result)) => {
            warn!(id = %job.id, %status, error = %result.error, "agent reported non-200 status");
            publish(&broker, JobStatusRecord::failed_with_result(&job.id, result)).await;
        }
        Err(e) => {
            warn!(id = %job.id, error = %e, "job dispatch failed");
            publish(&broker, JobStatusRecord::failed(&job.id, e.to_string())).await;
        }
    }
}

/// Dispatch the execution request and return the raw HTTP status alongside
/// the decoded body. Per spec.md §4.5/§7.5, only the HTTP status decides
/// `done` vs `failed` — the body's `error` field is surfaced either way, but
/// a populated `error` under a 200 is still a `done` result (the guest
/// program itself failed, which is not a worker-level failure).
async fn dispatch(vm: &RunningVm, job: &JobEnvelope) -> eyre::Result<(reqwest::StatusCode, AgentResult)> {
    let url = format!("http://{}:{}/run", vm.guest_ip, vm.agent_port);
    dispatch_to(&url, job).await
}

async fn dispatch_to(url: &str, job: &JobEnvelope) -> eyre::Result<(reqwest::StatusCode, AgentResult)> {
    let request = AgentRequest::from_job(job);

    let response = reqwest::Client::new().post(url).json(&request).send().await?;
    let status = response.status();
    let result = response.json::<AgentResult>().await?;

    Ok((status, result))
}

async fn publish(broker: &Broker, record: JobStatusRecord) {
    if let Err(e) = broker.publish_status(&record).await {
        error!(id = %record.id, error = %e, "failed to publish status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_job() -> JobEnvelope {
        JobEnvelope {
            id: "job-1".to_string(),
            language: "python".to_string(),
            code: "print(1)".to_string(),
        }
    }

    #[tokio::test]
    async fn http_200_with_error_body_is_still_a_done_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "division by zero",
                "stderr": "Traceback...",
            })))
            .mount(&server)
            .await;

        let (status, result) = dispatch_to(&format!("{}/run", server.uri()), &sample_job())
            .await
            .unwrap();

        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(result.error, "division by zero");
    }

    #[tokio::test]
    async fn non_200_status_is_reported_even_with_empty_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let (status, result) = dispatch_to(&format!("{}/run", server.uri()), &sample_job())
            .await
            .unwrap();

        assert_ne!(status, reqwest::StatusCode::OK);
        assert!(result.error.is_empty());
    }
}
