use std::error::Error;
use std::fmt::Display;
use std::marker::PhantomData;

/// Indicates that a [`Deferred`][1] was dropped before it was resolved or rejected.
///
/// A [`Promise`][2] whose deferred disconnects completes with this error, which counts as a
/// rejection for aggregation purposes.
///
/// [1]: crate::Deferred
/// [2]: crate::Promise
#[derive(Debug)]
pub struct Disconnected {
    _private: PhantomData<()>,
}

impl Disconnected {
    pub(crate) fn new() -> Self {
        Self {
            _private: PhantomData,
        }
    }
}

impl Error for Disconnected {}

impl Display for Disconnected {
    #[cfg_attr(test, mutants::skip)] // No API contract for error message.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deferred was dropped without being resolved or rejected")
    }
}
