//! Status values and the structured detail records they carry.

use crate::code::Code;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use prost_types::Any;
use serde::Serialize;
use std::collections::HashMap;

/// A call outcome in the gRPC code space.
///
/// Carries the code, a human readable message and an ordered list of
/// opaque detail records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
    pub details: Vec<Any>,
}

impl Status {
    /// Create a status without details
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Append a typed detail record.
    ///
    /// Fails only if the record cannot be packed into an `Any`.
    pub fn with_detail<M: prost::Name>(mut self, detail: &M) -> Result<Self, prost::EncodeError> {
        self.details.push(Any::from_msg(detail)?);
        Ok(self)
    }

    /// First `ErrorInfo` record among the details, if any decodes.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        self.details.iter().find_map(|any| any.to_msg::<ErrorInfo>().ok())
    }

    /// Code of a call result; `Ok` for success.
    pub fn code_of<T>(result: &Result<T, Status>) -> Code {
        match result {
            Ok(_) => Code::Ok,
            Err(status) => status.code,
        }
    }

    /// Render as a JSON body for HTTP callers.
    ///
    /// `ErrorInfo` details are expanded, any other detail keeps its raw
    /// bytes base64-encoded under `value`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let details = self
            .details
            .iter()
            .map(|any| match any.to_msg::<ErrorInfo>() {
                Ok(info) => serde_json::json!({
                    "@type": any.type_url,
                    "reason": info.reason,
                    "domain": info.domain,
                    "metadata": info.metadata,
                }),
                Err(_) => serde_json::json!({
                    "@type": any.type_url,
                    "value": STANDARD.encode(&any.value),
                }),
            })
            .collect();

        serde_json::to_string(&StatusBody {
            code: self.code.as_i32(),
            message: &self.message,
            details,
        })
    }
}

#[derive(Serialize)]
struct StatusBody<'a> {
    code: i32,
    message: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<serde_json::Value>,
}

/// `google.rpc.ErrorInfo`
#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorInfo {
    #[prost(string, tag = "1")]
    pub reason: String,
    #[prost(string, tag = "2")]
    pub domain: String,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
}

impl prost::Name for ErrorInfo {
    const NAME: &'static str = "ErrorInfo";
    const PACKAGE: &'static str = "google.rpc";

    fn type_url() -> String {
        "type.googleapis.com/google.rpc.ErrorInfo".to_string()
    }
}

/// Status as exchanged between sidecars on the internal invocation API.
#[derive(Clone, PartialEq, prost::Message)]
pub struct InternalStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<Any>,
}

impl From<Status> for InternalStatus {
    fn from(status: Status) -> Self {
        Self {
            code: status.code.as_i32(),
            message: status.message,
            details: status.details,
        }
    }
}
