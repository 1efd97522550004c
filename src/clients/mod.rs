pub mod import_client;
pub mod status_poller;

pub use import_client::{ImportClient, UploadForm};
pub use status_poller::{PollOutcome, StatusPoller, StatusSource};
