mod error;

pub use error::{ErrorBody, ErrorEnvelope, HttpError};
