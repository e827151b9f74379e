//! Intake flow — multi-step question wizard with reload recovery.
//!
//! Answers come from three places: the server-confirmed session, a locally
//! cached draft, and the snapshot of the in-progress UI position. The
//! reconciler merges them, the reducer in `state` drives navigation, and
//! the controller executes the resulting effects against the adapters.

pub mod adapters;
pub mod bridge;
pub mod catalog;
pub mod controller;
pub mod model;
pub mod reconcile;
pub mod routes;
pub mod sequencer;
pub mod state;
pub mod validator;
pub mod wizard;

pub use adapters::{
    BroadcastNotifier, DraftCache, MemoryDraftCache, MemorySessionAdapter, MemorySnapshotSlot,
    Notice, NoticeLevel, Notifier, SessionAdapter, SnapshotSlot, TracingNotifier,
};
pub use catalog::QuestionCatalog;
pub use controller::{StepController, StepDeps};
pub use model::{
    AnswerMap, AnsweredSet, DraftRecord, Entry, FieldAddress, FormData, IntakeSession,
    QuestionDefinition, Snapshot, StepDefinition, StepLayout,
};
pub use routes::{IntakeRouteState, intake_routes};
pub use state::{Command, Effect, Phase, StepState, StepView, reduce};
pub use wizard::{IntakeWizard, WizardStatus};
