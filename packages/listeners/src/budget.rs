use std::num::NonZero;

use crate::Error;

/// How many more times a listener may be invoked before it is removed from its list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CallBudget {
    /// The listener stays registered until explicitly removed.
    Unlimited,

    /// The listener is removed after this many more invocations.
    Remaining(NonZero<u32>),
}

impl CallBudget {
    /// A budget of exactly one call.
    pub const ONCE: Self = Self::Remaining(NonZero::<u32>::MIN);

    /// Converts a raw call count into a budget.
    ///
    /// `-1` means unlimited and any positive value means that many calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for zero and for negative values other than `-1`.
    ///
    /// # Example
    ///
    /// ```
    /// use listeners::CallBudget;
    ///
    /// assert_eq!(CallBudget::from_calls(-1).unwrap(), CallBudget::Unlimited);
    /// assert_eq!(CallBudget::from_calls(1).unwrap(), CallBudget::ONCE);
    /// assert!(CallBudget::from_calls(0).is_err());
    /// ```
    pub fn from_calls(calls: i32) -> crate::Result<Self> {
        if calls == -1 {
            return Ok(Self::Unlimited);
        }

        u32::try_from(calls)
            .ok()
            .and_then(NonZero::new)
            .map(Self::Remaining)
            .ok_or_else(|| {
                Error::invalid_argument(
                    "calls",
                    format!("{calls} is not a valid call count, expected -1 or a positive integer"),
                )
            })
    }

    /// Returns the raw call count, with `-1` standing for unlimited.
    #[must_use]
    pub fn as_calls(self) -> i64 {
        match self {
            Self::Unlimited => -1,
            Self::Remaining(n) => i64::from(n.get()),
        }
    }

    /// Consumes one call from the budget.
    ///
    /// Returns `true` if that was the last permitted call. An exhausted budget is left at one
    /// remaining call; the owner is expected to retire the listener instead of consulting
    /// the budget again.
    pub(crate) fn consume(&mut self) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Remaining(n) => match n.get().checked_sub(1).and_then(NonZero::new) {
                Some(rest) => {
                    *n = rest;
                    false
                }
                None => true,
            },
        }
    }
}
