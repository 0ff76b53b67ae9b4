//! Retry policy, status-code classes and retry predicates.
//!
//! A [`RetryPolicy`] bounds how many times a failed call is attempted again,
//! which statuses are worth retrying, and how long to wait in between.

use crate::request::Request;
use crate::response::Response;
use crate::{Error, Result};
use http::StatusCode;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A status code or a coarse range of status codes.
///
/// Parses from `"404"`, `"4xx"` or `"5XX"`, and deserializes from either a
/// number or one of those strings.
///
/// # Examples
///
/// ```
/// use duplex::retry::StatusClass;
/// use http::StatusCode;
///
/// let class: StatusClass = "4xx".parse().unwrap();
/// assert!(class.matches(StatusCode::NOT_FOUND));
/// assert!(!class.matches(StatusCode::BAD_GATEWAY));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StatusClassRepr", into = "String")]
pub enum StatusClass {
    /// Exactly this status code.
    Code(u16),
    /// Any status from 400 to 499.
    ClientErrors,
    /// Any status from 500 to 599.
    ServerErrors,
}

impl StatusClass {
    /// Returns `true` if `status` belongs to this class.
    pub fn matches(&self, status: StatusCode) -> bool {
        let code = status.as_u16();
        match self {
            StatusClass::Code(expected) => code == *expected,
            StatusClass::ClientErrors => (400..500).contains(&code),
            StatusClass::ServerErrors => (500..600).contains(&code),
        }
    }
}

impl FromStr for StatusClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("4xx") {
            return Ok(StatusClass::ClientErrors);
        }
        if trimmed.eq_ignore_ascii_case("5xx") {
            return Ok(StatusClass::ServerErrors);
        }
        trimmed
            .parse::<u16>()
            .map(StatusClass::Code)
            .map_err(|_| Error::ClientBadConfiguration(format!("Invalid status class: {}", s)))
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusClass::Code(code) => write!(f, "{}", code),
            StatusClass::ClientErrors => f.write_str("4xx"),
            StatusClass::ServerErrors => f.write_str("5xx"),
        }
    }
}

impl From<u16> for StatusClass {
    fn from(code: u16) -> Self {
        StatusClass::Code(code)
    }
}

impl From<StatusClass> for String {
    fn from(class: StatusClass) -> Self {
        class.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusClassRepr {
    Code(u16),
    Text(String),
}

impl TryFrom<StatusClassRepr> for StatusClass {
    type Error = Error;

    fn try_from(repr: StatusClassRepr) -> Result<Self> {
        match repr {
            StatusClassRepr::Code(code) => Ok(StatusClass::Code(code)),
            StatusClassRepr::Text(text) => text.parse(),
        }
    }
}

/// How long to wait between attempts.
///
/// # Examples
///
/// ```
/// use duplex::retry::Backoff;
/// use std::time::Duration;
///
/// // Fixed: 1.5s, 1.5s, 1.5s...
/// let fixed = Backoff::Fixed { delay_in_seconds: 1.5 };
/// assert_eq!(fixed.delay_for_attempt(3), Some(Duration::from_millis(1500)));
///
/// // Exponential: 100ms, 200ms, 400ms... capped at 2s
/// let exponential = Backoff::Exponential {
///     initial_delay_ms: 100,
///     max_delay_ms: 2_000,
///     jitter: false,
/// };
/// assert_eq!(exponential.delay_for_attempt(3), Some(Duration::from_millis(400)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,

    /// Wait the same delay before every retry.
    Fixed {
        /// The delay in seconds.
        delay_in_seconds: f64,
    },

    /// Wait `initial_delay_ms * 2^(retry - 1)`, capped at `max_delay_ms`.
    ///
    /// Optional jitter scales each delay by a random factor between 0.5 and 1.
    Exponential {
        /// The delay before the first retry.
        initial_delay_ms: u64,
        /// The maximum delay between retries.
        max_delay_ms: u64,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },
}

impl Backoff {
    /// Returns the delay before the given retry, or `None` to retry immediately.
    ///
    /// # Arguments
    ///
    /// * `retry` - The retry number (1-indexed, so 1 = first retry)
    pub fn delay_for_attempt(&self, retry: usize) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Fixed { delay_in_seconds } => {
                if delay_in_seconds.is_finite() && *delay_in_seconds > 0.0 {
                    Duration::try_from_secs_f64(*delay_in_seconds).ok()
                } else {
                    None
                }
            }
            Backoff::Exponential {
                initial_delay_ms,
                max_delay_ms,
                jitter,
            } => {
                let multiplier = 2u64.saturating_pow(retry.saturating_sub(1) as u32);
                let base_delay = initial_delay_ms.saturating_mul(multiplier);
                let delay = Duration::from_millis(base_delay.min(*max_delay_ms));

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(jitter_factor))
                } else {
                    Some(delay)
                }
            }
        }
    }
}

/// Client-level retry configuration.
///
/// `max_retry` is the number of extra attempts after the first one. When a
/// failed response matches a `not_on` class it is never retried. Otherwise,
/// if `on` is set, only matching responses are retried. With neither list
/// configured every failure is retried.
///
/// # Examples
///
/// ```
/// use duplex::RetryPolicy;
/// use duplex::retry::StatusClass;
///
/// let policy = RetryPolicy::new(3)
///     .on([StatusClass::ServerErrors])
///     .not_on([StatusClass::Code(501)])
///     .delay_in_seconds(0.5);
/// assert_eq!(policy.max_retry, 3);
///
/// let from_config: RetryPolicy =
///     serde_json::from_str(r#"{"max_retry": 2, "on": ["5xx", 429]}"#).unwrap();
/// assert_eq!(from_config.on.unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first one. Negative values are rejected.
    pub max_retry: i32,
    /// Statuses worth retrying.
    pub on: Option<Vec<StatusClass>>,
    /// Statuses never worth retrying. Checked before `on`.
    pub not_on: Option<Vec<StatusClass>>,
    /// Delay between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retry` retries of any failure.
    pub fn new(max_retry: i32) -> Self {
        Self {
            max_retry,
            ..Self::default()
        }
    }

    /// Sets the statuses worth retrying.
    pub fn on(mut self, classes: impl IntoIterator<Item = StatusClass>) -> Self {
        self.on = Some(classes.into_iter().collect());
        self
    }

    /// Sets the statuses never worth retrying.
    pub fn not_on(mut self, classes: impl IntoIterator<Item = StatusClass>) -> Self {
        self.not_on = Some(classes.into_iter().collect());
        self
    }

    /// Sets the backoff between attempts.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Waits a fixed number of seconds between attempts.
    pub fn delay_in_seconds(self, seconds: f64) -> Self {
        self.backoff(Backoff::Fixed {
            delay_in_seconds: seconds,
        })
    }

    /// Total attempts allowed, first attempt included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMaxRetry`] if `max_retry` is negative, and
    /// [`Error::ClientBadConfiguration`] if a fixed delay does not fit in a
    /// [`Duration`].
    pub fn max_attempts(&self) -> Result<usize> {
        if let Backoff::Fixed { delay_in_seconds } = self.backoff {
            if delay_in_seconds.is_finite()
                && delay_in_seconds > 0.0
                && Duration::try_from_secs_f64(delay_in_seconds).is_err()
            {
                return Err(Error::ClientBadConfiguration(format!(
                    "retry delay of {} seconds is out of range",
                    delay_in_seconds
                )));
            }
        }
        usize::try_from(self.max_retry)
            .map(|retries| retries.saturating_add(1))
            .map_err(|_| Error::InvalidMaxRetry(self.max_retry))
    }

    /// Applies the `not_on` and `on` lists to a status.
    pub fn allows(&self, status: StatusCode) -> bool {
        let matches_any = |classes: &[StatusClass]| classes.iter().any(|c| c.matches(status));

        if let Some(not_on) = &self.not_on {
            if matches_any(not_on) {
                return false;
            }
        }
        match &self.on {
            Some(on) => matches_any(on),
            None => true,
        }
    }
}

impl RetryPredicate for RetryPolicy {
    fn should_retry(&self, _request: &Request, response: &Response<Value>) -> bool {
        self.allows(response.status)
    }
}

/// Decides whether a failed attempt should be retried.
///
/// Attempts are only retried while the retry budget lasts; a predicate can
/// stop retries early but cannot extend the budget. Closures taking the
/// request and the raw response implement this trait.
///
/// # Examples
///
/// ```
/// use duplex::{Request, Response, RetryPredicate};
/// use serde_json::Value;
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, _request: &Request, response: &Response<Value>) -> bool {
///         response.status.as_u16() == 429
///     }
/// }
///
/// let predicate = |_request: &Request, response: &Response<Value>| {
///     response.body["retryable"] == true
/// };
/// # fn assert_predicate(_: impl RetryPredicate) {}
/// # assert_predicate(RetryOnRateLimit);
/// # assert_predicate(predicate);
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the call should be attempted again.
    ///
    /// # Arguments
    ///
    /// * `request` - The logical request being retried
    /// * `response` - The response of the failed attempt
    fn should_retry(&self, request: &Request, response: &Response<Value>) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(&Request, &Response<Value>) -> bool + Send + Sync,
{
    fn should_retry(&self, request: &Request, response: &Response<Value>) -> bool {
        self(request, response)
    }
}
