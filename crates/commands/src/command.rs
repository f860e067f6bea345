use serde::{Serialize, de::DeserializeOwned};

/// A command payload: a request for an asynchronous side effect.
///
/// Commands express **intent** ("notify user 42 about a new message"). They are
/// wrapped in a [`CommandEnvelope`](crate::CommandEnvelope) which carries the
/// identity and creation time, then handed to a broker and consumed by exactly
/// one handler type.
///
/// ## Required fields
///
/// Fields that the side effect cannot do without must be plain (non-`Option`)
/// fields set by the payload's constructor. A payload that can exist is a
/// payload that can be handled; missing data is a construction-time error, not
/// a handler-time one.
///
/// ## Design Constraints
///
/// Commands must be:
/// - **Cloneable**: the broker may redeliver the same value
/// - **Serializable**: payloads travel through the broker as JSON
/// - **Send + Sync + 'static**: they are handled on runtime worker tasks
pub trait Command:
    Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable command type name used for routing and log correlation
    /// (e.g. `"SendMessageNotificationCommand"`).
    fn command_type() -> &'static str;
}
