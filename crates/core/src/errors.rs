use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::LifecycleTransitionError;
use crate::ports::StoreError;
use crate::pricing::PricingViolation;

/// Coarse classification used at the boundary to pick a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    NotFound,
    Conflict,
    Forbidden,
    Storage,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::BusinessRule => "business_rule",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Storage => "storage",
            Self::Configuration => "configuration",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRule {
    MaxPricePerUnitCapacity,
    MinSystemSize,
    MaxSystemSize,
    MaxContractorsPerRequest,
    RequestStatus,
    AssignmentStatus,
    ReviewStatus,
    SubmissionEligibility,
}

impl BusinessRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxPricePerUnitCapacity => "max_price_per_unit_capacity",
            Self::MinSystemSize => "min_system_size",
            Self::MaxSystemSize => "max_system_size",
            Self::MaxContractorsPerRequest => "max_contractors_per_request",
            Self::RequestStatus => "request_status",
            Self::AssignmentStatus => "assignment_status",
            Self::ReviewStatus => "review_status",
            Self::SubmissionEligibility => "submission_eligibility",
        }
    }
}

impl fmt::Display for BusinessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Pricing(#[from] PricingViolation),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleTransitionError),
    #[error("business rule `{rule}` violated: {message}")]
    BusinessRule {
        rule: BusinessRule,
        message: String,
        actual: Option<String>,
        limit: Option<String>,
    },
    #[error("too many contractors selected: {requested} exceeds limit {limit}")]
    TooManyContractors { requested: usize, limit: usize },
    #[error("invalid input for `{field}`: {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Pricing(violation) => violation.kind(),
            Self::Lifecycle(_) | Self::BusinessRule { .. } | Self::TooManyContractors { .. } => {
                ErrorKind::BusinessRule
            }
            Self::InvalidInput { .. } => ErrorKind::Validation,
        }
    }

    /// Identifier of the violated rule, when the error is a rule violation.
    pub fn rule(&self) -> Option<BusinessRule> {
        match self {
            Self::Pricing(violation) => violation.rule(),
            Self::Lifecycle(_) => Some(BusinessRule::RequestStatus),
            Self::BusinessRule { rule, .. } => Some(*rule),
            Self::TooManyContractors { .. } => Some(BusinessRule::MaxContractorsPerRequest),
            Self::InvalidInput { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(error) => error.kind(),
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Persistence(_) => ErrorKind::Storage,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<PricingViolation> for ApplicationError {
    fn from(value: PricingViolation) -> Self {
        Self::Domain(value.into())
    }
}

impl From<LifecycleTransitionError> for ApplicationError {
    fn from(value: LifecycleTransitionError) -> Self {
        Self::Domain(value.into())
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(message) | StoreError::Stale(message) => Self::Conflict(message),
            StoreError::Unavailable(message) | StoreError::Corrupt(message) => {
                Self::Persistence(message)
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Unprocessable { .. } => 422,
            Self::Internal { .. } => 500,
            Self::ServiceUnavailable { .. } => 503,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unprocessable { .. } => "The request breaks a marketplace rule.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => "A matching record already exists.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value.kind() {
            ErrorKind::Validation => Self::BadRequest { message, correlation_id },
            ErrorKind::BusinessRule => Self::Unprocessable { message, correlation_id },
            ErrorKind::NotFound => Self::NotFound { message, correlation_id },
            ErrorKind::Conflict => Self::Conflict { message, correlation_id },
            ErrorKind::Forbidden => Self::Forbidden { message, correlation_id },
            ErrorKind::Storage => Self::ServiceUnavailable { message, correlation_id },
            ErrorKind::Configuration => Self::Internal { message, correlation_id },
        }
    }
}
