//! Output backends. Exactly one is compiled into a build via feature
//! selection; [`default_backend`] constructs it.

#[cfg(feature = "backend-cpal")]
mod cpal;

#[cfg(feature = "backend-cpal")]
pub use self::cpal::CpalBackend;

use super::device::OutputBackend;

/// Construct the backend this build was compiled with.
#[cfg(feature = "backend-cpal")]
pub fn default_backend(preferred_device: Option<String>) -> Box<dyn OutputBackend> {
    Box::new(CpalBackend::new(preferred_device))
}
