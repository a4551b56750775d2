// The `utils` module provides shared plumbing: HTTP, Google auth and templating.

pub mod context_hub;
pub mod google_auth;
pub mod http;
pub mod template;

pub use crate::utils::http::{HttpClient, HttpError, HttpResponse};
pub use crate::utils::template::{TEngine, TEngineError};
