//! Wire types exchanged with the broker and the in-guest agent.
//!
//! See spec.md §3 and §6 for the exact shapes. Nothing here interprets a
//! field beyond distinguishing transport success from agent-reported
//! failure — the worker is a transparent forwarder.

use serde::{Deserialize, Serialize};

/// A job as delivered by the broker. Unknown fields are ignored by serde's
/// default behavior, matching spec.md §6.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEnvelope {
    pub id: String,
    pub language: String,
    pub code: String,
}

/// Toolchain variant hard-coded to `"TODO"` per the source worker and
/// spec.md §9's open question: its semantics are left to the agent.
pub const AGENT_VARIANT: &str = "TODO";

/// The request dispatched once to the in-guest agent's `/run` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub id: String,
    pub language: String,
    pub code: String,
    pub variant: String,
}

impl AgentRequest {
    pub fn from_job(job: &JobEnvelope) -> Self {
        Self {
            id: job.id.clone(),
            language: job.language.clone(),
            code: job.code.clone(),
            variant: AGENT_VARIANT.to_string(),
        }
    }
}

/// The result produced by the in-guest agent, whether or not the user's
/// program itself succeeded. Every field defaults so a partial agent
/// response still decodes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentResult {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exec_duration_ms: u64,
    #[serde(default)]
    pub mem_usage_bytes: u64,
}

/// The four publishable job states, spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatusKind {
    Received,
    Running,
    Done,
    Failed,
}

/// A status record published to `jobs_status_ex`. Matches the wire shape in
/// spec.md §6 exactly, including field names (`exec_duration`/`mem_usage`,
/// not the `_ms`/`_bytes` suffixed names used internally for `AgentResult`).
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusRecord {
    pub id: String,
    pub status: JobStatusKind,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub exec_duration: u64,
    #[serde(default)]
    pub mem_usage: u64,
}

impl JobStatusRecord {
    pub fn received(id: &str) -> Self {
        Self::empty(id, JobStatusKind::Received)
    }

    pub fn running(id: &str) -> Self {
        Self::empty(id, JobStatusKind::Running)
    }

    pub fn failed(id: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::empty(id, JobStatusKind::Failed)
        }
    }

    pub fn failed_with_result(id: &str, result: AgentResult) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatusKind::Failed,
            message: result.message,
            error: result.error,
            stderr: result.stderr,
            stdout: result.stdout,
            exec_duration: 0,
            mem_usage: 0,
        }
    }

    pub fn done(id: &str, result: AgentResult) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatusKind::Done,
            message: result.message,
            error: result.error,
            stderr: result.stderr,
            stdout: result.stdout,
            exec_duration: result.exec_duration_ms,
            mem_usage: result.mem_usage_bytes,
        }
    }

    fn empty(id: &str, status: JobStatusKind) -> Self {
        Self {
            id: id.to_string(),
            status,
            message: String::new(),
            error: String::new(),
            stderr: String::new(),
            stdout: String::new(),
            exec_duration: 0,
            mem_usage: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_envelope_ignores_unknown_fields() {
        let json = r#"{"id":"abc","language":"python","code":"print(1)","extra":true}"#;
        let job: JobEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(job.id, "abc");
        assert_eq!(job.language, "python");
    }

    #[test]
    fn agent_request_carries_fixed_variant() {
        let job = JobEnvelope {
            id: "1".to_string(),
            language: "python".to_string(),
            code: "print(1)".to_string(),
        };
        let request = AgentRequest::from_job(&job);
        assert_eq!(request.variant, AGENT_VARIANT);
    }

    #[test]
    fn status_records_serialize_lowercase_status() {
        let record = JobStatusRecord::received("1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "received");
    }

    #[test]
    fn agent_result_defaults_on_partial_response() {
        let result: AgentResult = serde_json::from_str(r#"{"stdout":"hi"}"#).unwrap();
        assert_eq!(result.stdout, "hi");
        assert_eq!(result.error, "");
        assert_eq!(result.exec_duration_ms, 0);
    }

    #[test]
    fn done_carries_timing_and_memory_from_result() {
        let result = AgentResult {
            stdout: "hi".to_string(),
            exec_duration_ms: 42,
            mem_usage_bytes: 1024,
            ..Default::default()
        };
        let record = JobStatusRecord::done("1", result);
        assert_eq!(record.exec_duration, 42);
        assert_eq!(record.mem_usage, 1024);
        assert_eq!(record.status, JobStatusKind::Done);
    }
}
