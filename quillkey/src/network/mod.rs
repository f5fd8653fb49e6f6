pub mod error;
pub mod refiner;
pub mod transcriber;

pub use error::{RemoteError, RemoteErrorKind, TransportFault, classify, classify_reqwest, truncate_body};
pub use refiner::RefineClient;
pub use transcriber::{TranscribeClient, extract_transcript, silence_wav};
