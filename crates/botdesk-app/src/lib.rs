#![warn(missing_docs)]
//! # botdesk-app
//!
//! ## Purpose
//! Wires session resolution, button routing, payments and settings into one
//! facade for the desktop client.
//!
//! ## Responsibilities
//! - Read runtime configuration from the environment.
//! - Initialize structured logging.
//! - Build the [`Facade`] from host-supplied collaborators.
//! - Serialize payment handshake events through [`PaymentDesk`].
//!
//! ## Data flow
//! Host UI press -> [`Facade::press_button`] -> router -> dispatcher / bot api /
//! [`PaymentDesk`]. Network and surface completions re-enter through the
//! `PaymentDesk::on_*` methods.
//!
//! ## Error model
//! Startup failures (configuration, logging, settings) are wrapped in
//! [`AppError`]. Runtime routing never fails.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use botdesk_core::{Clock, Message, MsgId, Session};
use botdesk_payments::{
    HandshakeId, HandshakeOutcome, PaymentConfig, PaymentFlows, PaymentForm, PaymentResult,
    PaymentServices, PaymentsApi, RequestId, RpcError, SurfaceFactory,
};
use botdesk_router::{BotActionRouter, BotApi, PaymentStarter};
use botdesk_session::{AccountDomain, SessionDispatcher, SessionResolver, WindowHost};
use botdesk_settings::SettingsError;
use botdesk_ui::UiShell;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("BOTDESK_VERSION");

/// Env var holding the log filter directive.
pub const LOG_FILTER_ENV: &str = "BOTDESK_LOG";

const FORM_TIMEOUT_ENV: &str = "BOTDESK_PAYMENT_FORM_TIMEOUT_MS";
const CREDENTIALS_TIMEOUT_ENV: &str = "BOTDESK_PAYMENT_CREDENTIALS_TIMEOUT_MS";
const SUBMIT_TIMEOUT_ENV: &str = "BOTDESK_PAYMENT_SUBMIT_TIMEOUT_MS";
const LOG_JSON_ENV: &str = "BOTDESK_LOG_JSON";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Runtime configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Payment handshake tuning.
    pub payments: PaymentConfig,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl AppConfig {
    /// Reads configuration through `lookup`; absent keys keep defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for non-numeric or zero timeouts and for
    /// unrecognized boolean flags.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = timeout(&lookup, FORM_TIMEOUT_ENV)? {
            config.payments.form_timeout_ms = value;
        }
        if let Some(value) = timeout(&lookup, CREDENTIALS_TIMEOUT_ENV)? {
            config.payments.credentials_timeout_ms = value;
        }
        if let Some(value) = timeout(&lookup, SUBMIT_TIMEOUT_ENV)? {
            config.payments.submit_timeout_ms = value;
        }
        if let Some(raw) = lookup(LOG_JSON_ENV) {
            config.log_json = parse_flag(LOG_JSON_ENV, &raw)?;
        }
        Ok(config)
    }

    /// Reads configuration from the process environment.
    ///
    /// # Errors
    /// See [`AppConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn timeout(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::NotANumber {
        key,
        value: raw.clone(),
    })?;
    if value == 0 {
        return Err(ConfigError::ZeroTimeout { key });
    }
    Ok(Some(value))
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" | "" => Ok(false),
        _ => Err(ConfigError::NotAFlag {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Installs the global tracing subscriber.
///
/// The filter comes from [`LOG_FILTER_ENV`] and falls back to `info`.
///
/// # Errors
/// Returns [`AppError::Logging`] when a global subscriber is already set.
pub fn init_logging(config: &AppConfig) -> Result<(), AppError> {
    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Serialized entry point for payment handshakes.
///
/// Collaborators must not call back into the desk from inside a request they
/// received from it. Such a call is dropped with an error log and trips a
/// debug assertion.
pub struct PaymentDesk {
    flows: Mutex<PaymentFlows>,
    owner: Mutex<Option<ThreadId>>,
    clock: Arc<dyn Clock>,
}

impl PaymentDesk {
    /// Creates a desk with no live handshakes.
    pub fn new(services: PaymentServices, config: PaymentConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            flows: Mutex::new(PaymentFlows::new(services, config)),
            owner: Mutex::new(None),
            clock,
        }
    }

    /// Starts paying the invoice of `msg_id`. `None` when re-entered.
    pub fn start(&self, session: Session, msg_id: MsgId) -> Option<HandshakeId> {
        let now = self.clock.now_ms();
        self.with_flows(None, |flows| Some(flows.start(session, msg_id, now)))
    }

    /// Delivers a payment form completion.
    pub fn on_form_result(
        &self,
        request: RequestId,
        result: Result<PaymentForm, RpcError>,
    ) -> Option<HandshakeOutcome> {
        let now = self.clock.now_ms();
        self.with_flows(None, |flows| flows.on_form_result(request, result, now))
    }

    /// Delivers one bridge callback message.
    pub fn on_bridge_message(&self, handshake: HandshakeId, raw: &[u8]) {
        let now = self.clock.now_ms();
        self.with_flows((), |flows| flows.on_bridge_message(handshake, raw, now));
    }

    /// Delivers a submit completion.
    pub fn on_submit_result(
        &self,
        request: RequestId,
        result: Result<PaymentResult, RpcError>,
    ) -> Option<HandshakeOutcome> {
        self.with_flows(None, |flows| flows.on_submit_result(request, result))
    }

    /// Records a user-initiated surface close.
    pub fn on_surface_closed(&self, handshake: HandshakeId) -> Option<HandshakeOutcome> {
        self.with_flows(None, |flows| flows.on_surface_closed(handshake))
    }

    /// Expires handshakes whose deadline passed.
    pub fn tick(&self) -> Vec<(HandshakeId, HandshakeOutcome)> {
        let now = self.clock.now_ms();
        self.with_flows(Vec::new(), |flows| flows.on_tick(now))
    }

    /// Number of live handshakes.
    pub fn active(&self) -> usize {
        self.with_flows(0, |flows| flows.active())
    }

    fn with_flows<T>(&self, skipped: T, apply: impl FnOnce(&mut PaymentFlows) -> T) -> T {
        let current = thread::current().id();
        let reentered = *self.owner() == Some(current);
        if reentered {
            error!("payment desk re-entered from a collaborator call; event dropped");
            debug_assert!(!reentered, "payment desk re-entered from a collaborator call");
            return skipped;
        }

        let mut flows = self.flows.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner() = Some(current);
        let _owner = OwnerReset(&self.owner);
        apply(&mut flows)
    }

    fn owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the desk owner when the flows lock is released.
struct OwnerReset<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for OwnerReset<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl PaymentStarter for PaymentDesk {
    fn start_payment(&self, message: &Message) {
        if let Some(handshake) = self.start(message.session(), message.id) {
            info!(handshake = handshake.0, msg_id = message.id.0, "payment started");
        }
    }
}

/// Host-supplied collaborators.
#[derive(Clone)]
pub struct Collaborators {
    /// Account registry.
    pub domain: Arc<dyn AccountDomain>,
    /// Main window lookup.
    pub windows: Arc<dyn WindowHost>,
    /// Process-wide UI shell.
    pub shell: Arc<dyn UiShell>,
    /// Bot network actions.
    pub bots: Arc<dyn BotApi>,
    /// Payment network requests.
    pub payments: Arc<dyn PaymentsApi>,
    /// Embedded browser surfaces.
    pub surfaces: Arc<dyn SurfaceFactory>,
    /// Time source for handshake deadlines.
    pub clock: Arc<dyn Clock>,
}

/// Session-scoped dispatch facade.
pub struct Facade {
    dispatcher: SessionDispatcher,
    router: BotActionRouter,
    payments: Arc<PaymentDesk>,
}

impl Facade {
    /// Wires the facade.
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        let Collaborators {
            domain,
            windows,
            shell,
            bots,
            payments,
            surfaces,
            clock,
        } = collaborators;

        let resolver = SessionResolver::new(domain, windows);
        let dispatcher = SessionDispatcher::new(resolver, Arc::clone(&shell));
        let desk = Arc::new(PaymentDesk::new(
            PaymentServices {
                api: payments,
                surfaces,
                shell: Arc::clone(&shell),
            },
            config.payments,
            clock,
        ));
        let starter: Arc<dyn PaymentStarter> = desk.clone();
        let router = BotActionRouter::new(dispatcher.clone(), shell, bots, starter);

        Self {
            dispatcher,
            router,
            payments: desk,
        }
    }

    /// Handles a press on the button at `(row, column)` of `message`.
    pub fn press_button(&self, message: &Message, row: usize, column: usize) {
        self.router.handle(message, row, column);
    }

    /// Session-scoped navigation.
    pub fn dispatcher(&self) -> &SessionDispatcher {
        &self.dispatcher
    }

    /// Button router.
    pub fn router(&self) -> &BotActionRouter {
        &self.router
    }

    /// Payment handshakes.
    pub fn payments(&self) -> &PaymentDesk {
        &self.payments
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Timeout is not an unsigned integer.
    #[error("{key} must be a number of milliseconds, got {value:?}")]
    NotANumber {
        /// Env var name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// Timeout is zero.
    #[error("{key} must be greater than zero")]
    ZeroTimeout {
        /// Env var name.
        key: &'static str,
    },
    /// Boolean flag is not recognized.
    #[error("{key} must be one of 1/0/true/false/on/off, got {value:?}")]
    NotAFlag {
        /// Env var name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

/// App startup error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Logging could not be installed.
    #[error("logging error: {0}")]
    Logging(#[from] TryInitError),
    /// Settings runtime error.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}
