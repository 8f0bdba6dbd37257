//! CloudStack JSON response shapes.
//!
//! Every response is wrapped in an object keyed by the lower-cased command
//! name plus `response`, for example `listvirtualmachinesresponse`. Errors
//! use the same envelope with `errorcode` and `errortext`.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::control_plane::{JobStatus, RawInstanceRecord, TransportError};

/// Reply to an asynchronous command.
#[derive(Debug, Deserialize)]
pub(super) struct AsyncAccepted {
    pub(super) jobid: String,
    /// Deploy replies carry the new instance identifier up front.
    #[serde(default)]
    pub(super) id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VirtualMachineReply {
    pub(super) virtualmachine: RawInstanceRecord,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct VirtualMachineList {
    #[serde(default)]
    pub(super) virtualmachine: Vec<RawInstanceRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AsyncJobResult {
    pub(super) jobstatus: u8,
    #[serde(default)]
    pub(super) jobresult: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiFailure {
    #[serde(default)]
    errorcode: u16,
    #[serde(default)]
    errortext: String,
}

/// A sibling resource entry in a `list*` reply.
#[derive(Debug, Deserialize)]
pub(super) struct NamedEntry {
    pub(super) id: String,
    #[serde(default)]
    pub(super) name: String,
}

/// Unwraps the command envelope, turning API error payloads into
/// [`TransportError::Api`].
pub(super) fn unwrap_envelope(command: &str, status: u16, body: &[u8]) -> Result<Value, TransportError> {
    let key = format!("{}response", command.to_ascii_lowercase());
    let parsed: Result<Value, _> = serde_json::from_slice(body);
    let inner = parsed
        .ok()
        .and_then(|mut root| root.get_mut(&key).map(Value::take));

    let Some(inner) = inner else {
        let text = String::from_utf8_lossy(body).into_owned();
        if (200..300).contains(&status) {
            return Err(TransportError::Decode {
                message: format!("{command}: response has no '{key}' member"),
            });
        }
        return Err(status_error(status, text));
    };

    if inner.get("errorcode").is_some() {
        let failure: ApiFailure = serde_json::from_value(inner).unwrap_or_default();
        let code = if failure.errorcode == 0 { status } else { failure.errorcode };
        return Err(TransportError::Api {
            code,
            message: failure.errortext,
        });
    }
    if !(200..300).contains(&status) {
        return Err(status_error(status, inner.to_string()));
    }
    Ok(inner)
}

fn status_error(status: u16, message: String) -> TransportError {
    if status >= 500 {
        TransportError::Unavailable {
            message: format!("HTTP {status}: {message}"),
        }
    } else {
        TransportError::Api {
            code: status,
            message,
        }
    }
}

/// Decodes an unwrapped reply into `T`.
pub(super) fn decode<T: DeserializeOwned>(command: &str, inner: Value) -> Result<T, TransportError> {
    serde_json::from_value(inner).map_err(|err| TransportError::Decode {
        message: format!("{command}: {err}"),
    })
}

/// Decodes the entries of a `list*` reply stored under `key`. CloudStack
/// omits the member entirely when nothing matches.
pub(super) fn decode_list<T: DeserializeOwned>(
    command: &str,
    key: &str,
    mut inner: Value,
) -> Result<Vec<T>, TransportError> {
    match inner.get_mut(key).map(Value::take) {
        Some(entries) => decode(command, entries),
        None => Ok(Vec::new()),
    }
}

/// Maps `queryAsyncJobResult` onto [`JobStatus`]: `0` pending, `1` done, `2`
/// failed.
pub(super) fn job_status(result: AsyncJobResult) -> Result<JobStatus, TransportError> {
    match result.jobstatus {
        0 => Ok(JobStatus::Pending),
        1 => {
            let record = result
                .jobresult
                .and_then(|mut payload| payload.get_mut("virtualmachine").map(Value::take))
                .map(|vm| decode::<RawInstanceRecord>("queryAsyncJobResult", vm))
                .transpose()?;
            Ok(JobStatus::Succeeded(record))
        }
        2 => {
            let failure = result
                .jobresult
                .and_then(|payload| serde_json::from_value::<ApiFailure>(payload).ok())
                .unwrap_or_default();
            let reason = if failure.errortext.is_empty() {
                String::from("job failed without an error message")
            } else {
                failure.errortext
            };
            Ok(JobStatus::Failed(reason))
        }
        other => Err(TransportError::Decode {
            message: format!("queryAsyncJobResult: unknown job status {other}"),
        }),
    }
}
