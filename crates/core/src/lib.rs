pub mod assignments;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod ports;
pub mod pricing;
pub mod service;

pub use assignments::AssignmentCoordinator;
pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditEventType, AuditOutcome, AuditSink,
    InMemoryAuditSink, TracingAuditSink,
};
pub use domain::assignment::{AssignmentDecision, AssignmentId, AssignmentStatus, ContractorAssignment};
pub use domain::contractor::{Actor, ContractorId, ContractorInfo, Role, UserId};
pub use domain::pricing::PricingRules;
pub use domain::quote::{ContractorQuote, ContractorQuoteId, FinancialBreakdown, LineItem, ReviewStatus};
pub use domain::request::{QuoteRequest, QuoteRequestId, RequestStatus};
pub use errors::{ApplicationError, BusinessRule, DomainError, ErrorKind, InterfaceError};
pub use lifecycle::{QuoteRequestLifecycle, RequestEvent, SubmissionGate};
pub use ports::StoreError;
pub use pricing::{PricingConfigProvider, PricingInput, PricingViolation, QuotationTotals};
pub use service::{
    CallContext, ContractorResponse, EngineSettings, NewQuoteRequest, QuoteService,
    QuoteSubmission, ServicePorts,
};
