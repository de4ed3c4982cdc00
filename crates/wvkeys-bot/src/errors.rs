//! Error handling for the bot.
//!
//! Classifies serenity errors into an [`ErrorOutcome`] so failures are
//! logged at the right level, and renders bridge errors for chat replies.

use serenity::http::HttpError;
use tracing::{debug, error, warn};
use wvkeys_rpc::{RpcError, TransportError};

/// Broad class of a failed Discord call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    PermissionDenied,
    Network,
    Other,
}

/// A classified Discord failure.
#[derive(Debug, Clone)]
pub struct GatewayFailure {
    pub action: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl GatewayFailure {
    fn new(action: &str, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            category,
            message: message.into(),
        }
    }
}

/// Result of handling a Discord API error.
#[derive(Debug)]
pub enum ErrorOutcome {
    /// The same call will keep failing: missing target or permission.
    Permanent(GatewayFailure),
    /// Anything else; log and continue.
    Transient(GatewayFailure),
}

/// Classify a serenity `Error` and return the appropriate `ErrorOutcome`.
pub fn classify(action: &str, err: &serenity::Error) -> ErrorOutcome {
    match err {
        serenity::Error::Http(http_err) => classify_http(action, http_err),
        serenity::Error::Other(msg) => {
            ErrorOutcome::Transient(GatewayFailure::new(action, ErrorCategory::Other, *msg))
        }
        _ => {
            debug!("Non-HTTP serenity error on '{}': {}", action, err);
            ErrorOutcome::Transient(GatewayFailure::new(
                action,
                ErrorCategory::Network,
                err.to_string(),
            ))
        }
    }
}

/// True when Discord answered 404 or an `Unknown *` (10xxx) code.
pub fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        classify("lookup", err),
        ErrorOutcome::Permanent(GatewayFailure {
            category: ErrorCategory::NotFound,
            ..
        })
    )
}

/// Log a serenity error at the appropriate level.
pub fn log_error(action: &str, context: &str, err: &serenity::Error) {
    match classify(action, err) {
        ErrorOutcome::Permanent(f) => {
            error!("{} [{:?}] on '{}': {}", context, f.category, f.action, f.message);
        }
        ErrorOutcome::Transient(f) => {
            warn!("{} [{:?}] on '{}': {}", context, f.category, f.action, f.message);
        }
    }
}

fn classify_http(action: &str, http_err: &HttpError) -> ErrorOutcome {
    match http_err {
        HttpError::UnsuccessfulRequest(resp) => {
            let status = resp.status_code.as_u16();
            let raw_code = resp.error.code;
            let failure = GatewayFailure::new(
                action,
                categorize(status, raw_code),
                resp.error.message.clone(),
            );

            match failure.category {
                ErrorCategory::NotFound | ErrorCategory::PermissionDenied => {
                    debug!(
                        "Permanent Discord error on '{}' (HTTP {} / code {})",
                        action, status, raw_code
                    );
                    ErrorOutcome::Permanent(failure)
                }
                _ => ErrorOutcome::Transient(failure),
            }
        }
        _ => {
            debug!("Network-level HTTP error on '{}': {}", action, http_err);
            ErrorOutcome::Transient(GatewayFailure::new(
                action,
                ErrorCategory::Network,
                http_err.to_string(),
            ))
        }
    }
}

fn categorize(status: u16, raw_code: isize) -> ErrorCategory {
    match (status, raw_code) {
        (404, _) | (_, 10000..=10999) => ErrorCategory::NotFound,
        (403, _) | (_, 50001) | (_, 50013) => ErrorCategory::PermissionDenied,
        _ => ErrorCategory::Other,
    }
}

/// Text shown in chat when a bridge call fails.
pub fn describe_rpc_error(err: &RpcError) -> String {
    match err {
        RpcError::Remote(message) => message.clone(),
        RpcError::Timeout { .. } => {
            "the account service did not answer in time, please try again later".to_string()
        }
        RpcError::Transport(TransportError::Closed) => {
            "the connection to the account service is closed, please try again later".to_string()
        }
        RpcError::Transport(e) => format!("{}, please try again later", e),
        other => other.to_string(),
    }
}
