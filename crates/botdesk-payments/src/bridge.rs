//! In-page bridge contract between the payment page and the client.
//!
//! The bootstrap script exposes `TelegramWebviewProxy.postEvent(type, data)`
//! to the page and forwards every call to the bound callback, which receives
//! the call arguments as a JSON array `[eventType, argumentsJson]`.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Name of the callback bound on the embedded surface.
pub const BRIDGE_CALLBACK_NAME: &str = "buy_callback";

/// Event type carrying collected payment credentials.
pub const PAYMENT_FORM_SUBMIT_EVENT: &str = "payment_form_submit";

/// Script injected before navigation; forwards `postEvent` into the callback.
pub const BRIDGE_BOOTSTRAP_SCRIPT: &str = "(function(){\
window.TelegramWebviewProxy = {\
postEvent: function(eventType, eventData) {\
if (window.buy_callback) {\
window.buy_callback(eventType, eventData);\
}\
}\
};\
}());";

/// Decoded bridge message.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The page submitted the payment form.
    Submit(PaymentFormSubmit),
    /// Any other event; carries only its type.
    Other {
        /// Event type reported by the page.
        event_type: String,
    },
}

/// Arguments of a `payment_form_submit` event.
#[derive(Clone, PartialEq)]
pub struct PaymentFormSubmit {
    /// Title shown by the payment page.
    pub title: String,
    /// Provider-specific credentials object.
    pub credentials: Map<String, Value>,
}

impl PaymentFormSubmit {
    /// Compact JSON serialization of the credentials object.
    pub fn credentials_json(&self) -> String {
        Value::Object(self.credentials.clone()).to_string()
    }
}

impl fmt::Debug for PaymentFormSubmit {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PaymentFormSubmit")
            .field("title", &self.title)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

/// Reasons a bridge message is rejected.
///
/// Display strings never include payload content.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Outer payload is not valid JSON.
    #[error("failed to parse bridge payload: {0}")]
    Decode(#[source] serde_json::Error),
    /// Outer payload is not a JSON array.
    #[error("bridge payload is not an array")]
    NotAnArray,
    /// Second array element is not a string.
    #[error("bridge event arguments are not a string")]
    ArgumentsNotString,
    /// Argument string is not valid JSON.
    #[error("failed to parse bridge event arguments: {0}")]
    ArgumentsDecode(#[source] serde_json::Error),
    /// Argument JSON is not an object.
    #[error("bridge event arguments are not an object")]
    ArgumentsNotObject,
    /// `title` is absent or not a string.
    #[error("payment form submit is missing a title string")]
    MissingTitle,
    /// `credentials` is absent or not an object.
    #[error("payment credentials are not an object")]
    CredentialsNotObject,
}

/// Decodes one raw bridge message.
///
/// Events other than [`PAYMENT_FORM_SUBMIT_EVENT`] are returned as
/// [`BridgeEvent::Other`] without inspecting their arguments.
///
/// # Errors
/// Returns [`BridgeError`] when the payload violates the bridge contract.
pub fn parse_bridge_event(raw: &[u8]) -> Result<BridgeEvent, BridgeError> {
    let outer: Value = serde_json::from_slice(raw).map_err(BridgeError::Decode)?;
    let Value::Array(list) = outer else {
        return Err(BridgeError::NotAnArray);
    };

    let event_type = list.first().and_then(Value::as_str).unwrap_or_default();
    if event_type != PAYMENT_FORM_SUBMIT_EVENT {
        return Ok(BridgeEvent::Other {
            event_type: event_type.to_string(),
        });
    }

    let arguments = list
        .get(1)
        .and_then(Value::as_str)
        .ok_or(BridgeError::ArgumentsNotString)?;
    let document: Value =
        serde_json::from_str(arguments).map_err(BridgeError::ArgumentsDecode)?;
    let Value::Object(mut root) = document else {
        return Err(BridgeError::ArgumentsNotObject);
    };

    let title = match root.remove("title") {
        Some(Value::String(title)) => title,
        _ => return Err(BridgeError::MissingTitle),
    };
    let credentials = match root.remove("credentials") {
        Some(Value::Object(credentials)) => credentials,
        _ => return Err(BridgeError::CredentialsNotObject),
    };

    Ok(BridgeEvent::Submit(PaymentFormSubmit { title, credentials }))
}
