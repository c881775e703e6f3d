use thiserror::Error;

use crate::domain::request::RequestStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("purchase request `{0}` not found")]
    NotFound(String),
    #[error("actor `{actor_id}` is not allowed to {action} this request")]
    Forbidden { actor_id: String, action: &'static str },
    #[error("cannot {action} a request in status `{status:?}`")]
    InvalidState { status: RequestStatus, action: &'static str },
}

/// How a failure should be presented at the boundary. Internal detail stays
/// in `message` for the logs; callers show `user_message` to people.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    BadRequest,
    NotFound,
    Forbidden,
    Conflict,
    Internal,
}

impl InterfaceErrorKind {
    fn label(self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::NotFound => "not found",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Internal => "internal error",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}: {message}", kind.label())]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn new(
        kind: InterfaceErrorKind,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self { kind, message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn internal(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(InterfaceErrorKind::Internal, message, correlation_id)
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind {
            InterfaceErrorKind::BadRequest => {
                "The request could not be processed. Check inputs and try again."
            }
            InterfaceErrorKind::NotFound => "The purchase request could not be found.",
            InterfaceErrorKind::Forbidden => "You are not allowed to perform this action.",
            InterfaceErrorKind::Conflict => {
                "The request changed while you were working. Reload and try again."
            }
            InterfaceErrorKind::Internal => "An unexpected internal error occurred.",
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let kind = match &self {
            WorkflowError::Validation(_) => InterfaceErrorKind::BadRequest,
            WorkflowError::NotFound(_) => InterfaceErrorKind::NotFound,
            WorkflowError::Forbidden { .. } => InterfaceErrorKind::Forbidden,
            WorkflowError::InvalidState { .. } => InterfaceErrorKind::Conflict,
        };
        InterfaceError::new(kind, self.to_string(), correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestStatus;
    use crate::errors::{InterfaceErrorKind, WorkflowError};

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface = WorkflowError::Validation("rejection reason is required".to_owned())
            .into_interface("corr-1");

        assert_eq!(interface.kind, InterfaceErrorKind::BadRequest);
        assert_eq!(interface.correlation_id, "corr-1");
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
        assert_eq!(
            interface.to_string(),
            "bad request: validation failed: rejection reason is required"
        );
    }

    #[test]
    fn invalid_state_maps_to_conflict() {
        let interface =
            WorkflowError::InvalidState { status: RequestStatus::Purchased, action: "cancel" }
                .into_interface("corr-2");

        assert_eq!(interface.kind, InterfaceErrorKind::Conflict);
        assert_eq!(
            interface.user_message(),
            "The request changed while you were working. Reload and try again."
        );
    }

    #[test]
    fn forbidden_and_not_found_keep_their_interface_classes() {
        let forbidden = WorkflowError::Forbidden { actor_id: "U-9".to_owned(), action: "approve" }
            .into_interface("corr-3");
        assert_eq!(forbidden.kind, InterfaceErrorKind::Forbidden);

        let not_found = WorkflowError::NotFound("req-404".to_owned()).into_interface("corr-4");
        assert_eq!(not_found.kind, InterfaceErrorKind::NotFound);
    }
}
