//! Mapping between HTTP status codes and gRPC status codes.
//!
//! Both directions are total: any input yields exactly one output. The
//! mapping is lossy, so a round trip does not always return the original
//! code (`FailedPrecondition` and `OutOfRange` become 400, which maps back
//! to `Internal`; `Aborted` becomes 409, which maps back to
//! `AlreadyExists`).

use http::StatusCode;
use std::collections::HashMap;
use tandem_core::keys::{
    ERROR_INFO_DOMAIN, ERROR_INFO_HTTP_CODE_METADATA, ERROR_INFO_HTTP_ERROR_METADATA,
    MAX_METADATA_VALUE_LEN,
};
use tandem_core::{Code, ErrorInfo, InternalStatus, Status};
use tracing::warn;

/// HTTP response status for a gRPC code.
///
/// See <https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto>.
pub fn http_status_from_code(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Canceled => StatusCode::REQUEST_TIMEOUT,
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        // 400, not 412 Precondition Failed.
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// gRPC code for an HTTP response status.
///
/// See <https://github.com/grpc/grpc/blob/master/doc/http-grpc-status-mapping.md>.
pub fn code_from_http_status(status: u16) -> Code {
    if (200..300).contains(&status) {
        return Code::Ok;
    }

    match status {
        408 => Code::Canceled,
        500 => Code::Unknown,
        400 => Code::Internal,
        504 => Code::DeadlineExceeded,
        404 => Code::NotFound,
        409 => Code::AlreadyExists,
        403 => Code::PermissionDenied,
        401 => Code::Unauthenticated,
        429 => Code::ResourceExhausted,
        501 => Code::Unimplemented,
        503 => Code::Unavailable,
        _ => Code::Unknown,
    }
}

/// Status for a failed HTTP response, `None` for 2xx.
///
/// The status message is the HTTP reason phrase. An `ErrorInfo` detail
/// records the original code and the first 63 characters of `detail`.
pub fn error_from_http_response_code(status: u16, detail: &str) -> Option<Status> {
    let code = code_from_http_status(status);
    if code == Code::Ok {
        return None;
    }

    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    let bare = Status::new(code, reason);

    let info = ErrorInfo {
        reason: reason.to_string(),
        domain: ERROR_INFO_DOMAIN.to_string(),
        metadata: HashMap::from([
            (ERROR_INFO_HTTP_CODE_METADATA.to_string(), status.to_string()),
            (ERROR_INFO_HTTP_ERROR_METADATA.to_string(), truncate_chars(detail, MAX_METADATA_VALUE_LEN)),
        ]),
    };

    match bare.clone().with_detail(&info) {
        Ok(with_details) => Some(with_details),
        Err(e) => {
            warn!(error = %e, status, "failed to attach error details");
            Some(bare)
        }
    }
}

/// Status carried over the internal invocation API, passed through as-is
pub fn error_from_internal_status(internal: &InternalStatus) -> Status {
    Status {
        code: Code::from(internal.code),
        message: internal.message.clone(),
        details: internal.details.clone(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::Any;

    #[test]
    fn test_success_range() {
        for status in 200..300 {
            assert_eq!(code_from_http_status(status), Code::Ok);
            assert!(error_from_http_response_code(status, "fine").is_none());
        }
    }

    #[test]
    fn test_code_from_http_status() {
        assert_eq!(code_from_http_status(400), Code::Internal);
        assert_eq!(code_from_http_status(401), Code::Unauthenticated);
        assert_eq!(code_from_http_status(403), Code::PermissionDenied);
        assert_eq!(code_from_http_status(404), Code::NotFound);
        assert_eq!(code_from_http_status(408), Code::Canceled);
        assert_eq!(code_from_http_status(409), Code::AlreadyExists);
        assert_eq!(code_from_http_status(429), Code::ResourceExhausted);
        assert_eq!(code_from_http_status(500), Code::Unknown);
        assert_eq!(code_from_http_status(501), Code::Unimplemented);
        assert_eq!(code_from_http_status(503), Code::Unavailable);
        assert_eq!(code_from_http_status(504), Code::DeadlineExceeded);
        assert_eq!(code_from_http_status(418), Code::Unknown);
        assert_eq!(code_from_http_status(302), Code::Unknown);
    }

    #[test]
    fn test_http_status_from_code_is_total() {
        for code in Code::ALL {
            let status = http_status_from_code(code);
            assert!(status.is_success() || status.is_client_error() || status.is_server_error());
        }
        assert_eq!(http_status_from_code(Code::Aborted), StatusCode::CONFLICT);
        assert_eq!(http_status_from_code(Code::DataLoss), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_lossy_pairs() {
        for code in [Code::FailedPrecondition, Code::OutOfRange] {
            let status = http_status_from_code(code);
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(code_from_http_status(status.as_u16()), Code::Internal);
        }
        let status = http_status_from_code(Code::Aborted);
        assert_eq!(code_from_http_status(status.as_u16()), Code::AlreadyExists);
    }

    #[test]
    fn test_error_from_http_response_code() {
        let status = error_from_http_response_code(404, "no such method").unwrap();
        assert_eq!(status.code, Code::NotFound);
        assert_eq!(status.message, "Not Found");

        let info = status.error_info().unwrap();
        assert_eq!(info.reason, "Not Found");
        assert_eq!(info.domain, "dapr.io");
        assert_eq!(info.metadata["http.code"], "404");
        assert_eq!(info.metadata["http.error_message"], "no such method");
    }

    #[test]
    fn test_error_detail_truncated() {
        let detail = "x".repeat(37) + &"y".repeat(63);
        let status = error_from_http_response_code(404, &detail).unwrap();

        let message = &status.error_info().unwrap().metadata["http.error_message"];
        assert_eq!(message.chars().count(), 63);
        assert_eq!(message.as_str(), &detail[..63]);
    }

    #[test]
    fn test_error_detail_truncation_is_char_safe() {
        let detail = "é".repeat(70);
        let status = error_from_http_response_code(500, &detail).unwrap();
        let message = &status.error_info().unwrap().metadata["http.error_message"];
        assert_eq!(message.chars().count(), 63);
    }

    #[test]
    fn test_unknown_http_status_has_empty_reason() {
        let status = error_from_http_response_code(599, "").unwrap();
        assert_eq!(status.code, Code::Unknown);
        assert_eq!(status.message, "");
    }

    #[test]
    fn test_error_from_internal_status() {
        let internal = InternalStatus {
            code: Code::ResourceExhausted.as_i32(),
            message: "slow down".to_string(),
            details: vec![Any {
                type_url: "type.googleapis.com/example.Quota".to_string(),
                value: vec![1, 2],
            }],
        };

        let status = error_from_internal_status(&internal);
        assert_eq!(status.code, Code::ResourceExhausted);
        assert_eq!(status.message, "slow down");
        assert_eq!(status.details, internal.details);
    }
}
