pub mod access;
pub mod autosave;
pub mod conflicts;
pub mod criteria;
pub mod domain;
pub mod error;
pub mod export;
pub mod memory;
pub mod ports;
pub mod project;
pub mod query;
pub mod screening;

pub use conflicts::{ConflictDetails, ConflictQueueState, ConflictScope, ConflictScopeMode};
pub use domain::{
    Conflict, Criterion, CriterionDraft, Decision, ExportRow, NewPaper, Paper, PaperView, Project,
    ProjectPaper, Review, ReviewerNote, Role, UserCredentials, UserProfile,
};
pub use error::{CoreError, CoreResult};
pub use ports::{
    CriteriaGenerationService, DatabaseService, PortError, PortResult, RelevancyScoringService,
};
pub use query::{DecisionFilter, PaperPage, PaperQuery, SortDirection, SortField};
pub use screening::{ScreeningFlow, ScreeningState, SubmitOutcome};
