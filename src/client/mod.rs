//! Upload client: builds one relay request per image and tracks each item's state

pub mod orchestrator;
pub mod params;
pub mod queue;
pub mod storage;

pub use orchestrator::{BatchReport, ClientSession, Orchestrator};
pub use params::{ModeParams, Percentage, ResizeControls, ResizeParams};
pub use queue::{ItemId, ItemStatus, UploadItem, UploadQueue};
pub use storage::LocalStorage;
