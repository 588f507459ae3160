pub mod chromium;
pub mod extract;
pub mod fetch;
pub mod orchestrator;
pub mod scroll;
pub mod session;

pub use chromium::{BrowserKind, ChromiumSession, LaunchOptions};
pub use extract::{CandidateExtractor, CandidateSet, ExtractError};
pub use fetch::{Classification, FetchClassifier, FetchError, Fetcher, HttpFetcher, Rejection};
pub use orchestrator::{AcquisitionError, AcquisitionOrchestrator, KeywordOutcome};
pub use scroll::ScrollController;
pub use session::{ElementLocator, SessionError, UiSession};
