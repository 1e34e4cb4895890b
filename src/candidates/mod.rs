//! Unconfirmed entities and relationships pending promotion, with an
//! append-only audit log for provenance.

mod store;
mod types;

pub use store::CandidateStore;
pub use types::{
    AuditAction, AuditEvent, Candidate, CandidateEntity, CandidateFilter, CandidateKind,
    CandidatePayload, CandidateRelationship, CandidateStats, CandidateStatus, EndpointRef,
    RetireReason, StatusFilter, Submission, SubmissionOutcome,
};
