#![warn(missing_docs)]
//! # botdesk-payments
//!
//! ## Purpose
//! Runs the remote payment handshake started by a `Buy` button.
//!
//! ## Responsibilities
//! - Request the payment form for a message and open an embedded surface.
//! - Bridge the payment page to the client through a bound callback.
//! - Validate submitted credentials and send them to the server.
//! - Tear the surface down and restore focus on every terminal transition.
//!
//! ## Data flow
//! [`PaymentFlows::start`] -> `PaymentsApi::request_payment_form` ->
//! [`PaymentFlows::on_form_result`] opens a [`WebviewSurface`] -> page calls
//! the bridge -> [`PaymentFlows::on_bridge_message`] ->
//! `PaymentsApi::send_payment_form` -> [`PaymentFlows::on_submit_result`].
//!
//! ## Ownership and lifetimes
//! [`PaymentFlows`] owns every live [`PaymentHandshake`]; each handshake owns
//! its surface and drops it on completion. Completions are correlated by
//! [`RequestId`], so a late or repeated completion is ignored. The one
//! exception is an accepted payment whose submit already timed out: its
//! updates are still applied.
//!
//! ## Error model
//! Server errors become toasts plus focus restore. Malformed page input is
//! logged and dropped. Nothing here is fatal.
//!
//! ## Security and privacy notes
//! Credentials are never persisted or logged; [`PaymentSubmission`] and
//! [`PaymentFormSubmit`] redact them from `Debug` output.

mod bridge;
mod handshake;

use std::fmt;

use botdesk_core::{MsgId, Session};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

pub use bridge::{
    BRIDGE_BOOTSTRAP_SCRIPT, BRIDGE_CALLBACK_NAME, BridgeError, BridgeEvent,
    PAYMENT_FORM_SUBMIT_EVENT, PaymentFormSubmit, parse_bridge_event,
};
pub use handshake::{
    FailureReason, HandshakeOutcome, HandshakeState, PaymentFlows, PaymentHandshake,
    PaymentServices,
};

/// Toast prefix for form request failures.
pub const FORM_ERROR_PREFIX: &str = "payments.getPaymentForm";

/// Toast prefix for submit failures.
pub const SUBMIT_ERROR_PREFIX: &str = "payments.sendPaymentForm";

/// Key of one live handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandshakeId(pub u64);

/// Correlation id of one outstanding server request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Screen geometry of the embedded surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in logical pixels.
    pub width: u32,
    /// Height in logical pixels.
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 100,
            y: 100,
            width: 1280,
            height: 960,
        }
    }
}

/// Handshake tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Deadline for the payment form request.
    pub form_timeout_ms: u64,
    /// Deadline for the page to submit credentials.
    pub credentials_timeout_ms: u64,
    /// Deadline for the submit request.
    pub submit_timeout_ms: u64,
    /// Surface geometry.
    pub viewport: Viewport,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            form_timeout_ms: 30_000,
            credentials_timeout_ms: 15 * 60 * 1_000,
            submit_timeout_ms: 60_000,
            viewport: Viewport::default(),
        }
    }
}

/// Payment form returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentForm {
    /// Page hosting the provider's checkout.
    pub url: String,
}

/// Opaque state updates returned with a successful payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdates(pub Vec<u8>);

/// Server reply to a payment submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    /// Payment accepted.
    Success {
        /// Updates to apply to the session.
        updates: StateUpdates,
    },
    /// Provider demands an extra verification step.
    VerificationNeeded {
        /// Verification page.
        url: String,
    },
}

/// Server-reported request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} ({code})")]
pub struct RpcError {
    /// Numeric error code.
    pub code: i32,
    /// Error type string, e.g. `PAYMENT_FAILED`.
    pub kind: String,
}

impl RpcError {
    /// Creates an error.
    pub fn new(code: i32, kind: impl Into<String>) -> Self {
        Self {
            code,
            kind: kind.into(),
        }
    }

    /// Local error used when a request misses its deadline.
    pub fn timeout() -> Self {
        Self::new(408, "TIMEOUT")
    }
}

/// Payment submission sent to the server.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentSubmission {
    /// Message carrying the invoice.
    pub msg_id: MsgId,
    /// Saved order info id; always empty for single-path checkout.
    pub requested_info_id: String,
    /// Chosen shipping option; always empty for single-path checkout.
    pub shipping_option_id: String,
    /// Compact JSON credentials produced by the provider page.
    pub credentials_json: String,
    /// Stable key letting the server collapse resubmissions.
    pub idempotency_key: String,
}

impl fmt::Debug for PaymentSubmission {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PaymentSubmission")
            .field("msg_id", &self.msg_id)
            .field("requested_info_id", &self.requested_info_id)
            .field("shipping_option_id", &self.shipping_option_id)
            .field("credentials_json", &"<redacted>")
            .field("idempotency_key", &self.idempotency_key)
            .finish()
    }
}

/// Failure to create an embedded surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("embedded surface unavailable: {0}")]
pub struct SurfaceError(pub String);

/// Local failures while preparing the payment page.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Form URL is unparsable or not HTTPS.
    #[error("invalid payment form url: {0}")]
    InvalidFormUrl(String),
    /// Surface could not be opened.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

impl PaymentError {
    /// Error type shown in the failure toast.
    pub fn toast_kind(&self) -> &'static str {
        match self {
            PaymentError::InvalidFormUrl(_) => "URL_INVALID",
            PaymentError::Surface(_) => "WEBVIEW_UNAVAILABLE",
        }
    }
}

/// Network collaborator for payment requests.
///
/// Completions must be delivered to [`PaymentFlows`] after the call returns,
/// on the same thread, at most once per [`RequestId`].
pub trait PaymentsApi: Send + Sync {
    /// Requests the payment form for `msg_id`.
    fn request_payment_form(&self, request: RequestId, session: &Session, msg_id: MsgId);

    /// Submits collected credentials.
    fn send_payment_form(
        &self,
        request: RequestId,
        session: &Session,
        submission: &PaymentSubmission,
    );

    /// Applies server state updates to `session`.
    fn apply_updates(&self, session: &Session, updates: &StateUpdates);
}

/// Creates embedded browser surfaces.
pub trait SurfaceFactory: Send + Sync {
    /// Opens a surface for `handshake`.
    ///
    /// The host must forward bytes received on the bound callback to
    /// [`PaymentFlows::on_bridge_message`] with the same handshake id, and
    /// report a user-initiated close through
    /// [`PaymentFlows::on_surface_closed`].
    ///
    /// # Errors
    /// Returns [`SurfaceError`] when no surface can be created.
    fn open(
        &self,
        handshake: HandshakeId,
        viewport: Viewport,
    ) -> Result<Box<dyn WebviewSurface>, SurfaceError>;
}

/// One embedded browser surface.
pub trait WebviewSurface: Send {
    /// Binds a page callback named `name`.
    fn bind(&mut self, name: &str);

    /// Injects a script run before any page script.
    fn init(&mut self, script: &str);

    /// Navigates to `url`.
    fn navigate(&mut self, url: &str);

    /// Closes the surface.
    fn close(&mut self);
}

/// Validates a server-supplied payment form URL.
///
/// # Errors
/// Returns [`PaymentError::InvalidFormUrl`] for unparsable or non-HTTPS URLs.
pub fn validate_form_url(raw: &str) -> Result<Url, PaymentError> {
    let parsed = Url::parse(raw)
        .map_err(|error| PaymentError::InvalidFormUrl(format!("unparsable url: {error}")))?;
    if parsed.scheme() != "https" {
        return Err(PaymentError::InvalidFormUrl(
            "payment page must use https".to_string(),
        ));
    }
    Ok(parsed)
}

/// Derives the submission idempotency key from message id and credentials.
pub fn idempotency_key(msg_id: MsgId, credentials_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(msg_id.0.to_be_bytes());
    hasher.update(credentials_json.as_bytes());
    hex::encode(hasher.finalize())
}
