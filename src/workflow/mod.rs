/*!
 * The translation workflow.
 *
 * - `document`: shared document, section and run-input types
 * - `validator`: content-type gate and section splitting
 * - `translator`: one section, with translation-memory context
 * - `combiner`: deterministic merge and persistence
 * - `notifier`: completion e-mail with a signed download link
 * - `coordinator`: the run state machine and bounded fan-out
 * - `state`: run records and their lifecycle
 * - `starter`: run-start interface
 * - `dispatcher`: upload events to run starts
 */

pub mod combiner;
pub mod coordinator;
pub mod dispatcher;
pub mod document;
pub mod notifier;
pub mod starter;
pub mod state;
pub mod translator;
pub mod validator;

pub use combiner::DocumentCombiner;
pub use coordinator::{CoordinatorSettings, ProgressCallback, WorkflowCoordinator};
pub use dispatcher::{DispatchReport, UploadDispatcher, UploadEvent, UploadRecord};
pub use document::{CombinedDocument, Document, RunInput, Section, TranslatedSection};
pub use notifier::{CompletionNotifier, NotifierSettings};
pub use starter::{LocalRunStarter, RunHandle, RunStarter, StartRunRequest};
pub use state::{MemoryRunStore, RunStore, SqliteRunStore};
pub use translator::{SectionRequest, SectionTranslator, TranslatorSettings};
pub use validator::{DocumentValidator, ValidatorSettings};
