//! Client-side workflow for submitting plant images to the inference service,
//! tracking its readiness, and fetching follow-up treatment advice.

pub mod controller;
pub mod locale;
pub mod messages;
pub mod preview;
pub mod service;
pub mod session;

pub use controller::{load_image, DetectionController};
pub use locale::language_name;
pub use messages::{EnglishCatalog, MessageCatalog, MessageKey};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use service::{DetectionService, HealthReport, HttpDetectionService, ServiceError};
pub use session::{
    Applied, ServiceStatus, Session, SessionSnapshot, SubmissionState, TreatmentState,
};
