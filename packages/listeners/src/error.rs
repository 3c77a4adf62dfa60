use futures::task::SpawnError;
use thiserror::Error;

/// The failure value returned by a listener, a validator or a rejected [`Deferred`][1].
///
/// Any error type can be boxed into this, including plain strings via `.into()`.
///
/// [1]: crate::Deferred
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when registering listeners or dispatching events.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller provided an argument that the operation cannot accept.
    #[error("invalid argument '{argument}': {problem}")]
    InvalidArgument {
        /// Name of the offending argument.
        argument: &'static str,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A listener returned an error during a synchronous fire pass.
    ///
    /// Listeners registered before the failing one (which fire after it) were not invoked.
    #[error("listener failed during event dispatch")]
    Dispatch(#[source] ListenerError),

    /// At least one deferred handed out during an asynchronous fire pass was rejected.
    ///
    /// Carries the first rejection that was observed.
    #[error("asynchronous listener rejected its deferred")]
    AsyncDispatch(#[source] ListenerError),

    /// The executor refused to accept the task that awaits asynchronous listeners.
    #[error("executor refused to run asynchronous dispatch")]
    Spawn(#[from] SpawnError),

    /// The operation is not valid in the current state of the target.
    #[error("illegal state: {message}")]
    IllegalState {
        /// A human-readable description of the violated state requirement.
        message: &'static str,
    },
}

impl Error {
    pub(crate) fn invalid_argument(argument: &'static str, problem: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            problem: problem.into(),
        }
    }
}

/// A specialized `Result` type for listener operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
