//! Payment handshake state machine and the registry of live handshakes.

use std::collections::BTreeMap;
use std::sync::Arc;

use botdesk_core::{MsgId, Session};
use botdesk_ui::{Notice, UiShell};
use tracing::{debug, info, warn};

use crate::bridge::{BRIDGE_BOOTSTRAP_SCRIPT, BRIDGE_CALLBACK_NAME, BridgeEvent, parse_bridge_event};
use crate::{
    FORM_ERROR_PREFIX, HandshakeId, PaymentConfig, PaymentError, PaymentForm, PaymentResult,
    PaymentSubmission, PaymentsApi, RequestId, RpcError, SUBMIT_ERROR_PREFIX, SurfaceFactory,
    WebviewSurface, idempotency_key, validate_form_url,
};

/// Why a handshake ended without payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The form could not be fetched or shown; carries the toast error type.
    Form(RpcError),
    /// The submit request failed or timed out.
    Submit(RpcError),
    /// The user closed the surface.
    Abandoned,
    /// The page never submitted credentials.
    CredentialsTimedOut,
}

/// Terminal result of a handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Payment accepted and updates applied.
    Succeeded,
    /// Provider asked for extra verification.
    VerificationNeeded,
    /// Handshake failed.
    Failed(FailureReason),
}

/// Handshake state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Created, no request issued yet.
    Idle,
    /// Payment form requested.
    AwaitingForm {
        /// Outstanding form request.
        request: RequestId,
        /// Epoch milliseconds after which the request is abandoned.
        deadline_ms: u64,
    },
    /// Surface open, waiting for the page to submit.
    AwaitingCredentials {
        /// Epoch milliseconds after which the surface is torn down.
        deadline_ms: u64,
    },
    /// Credentials sent, waiting for the server.
    Submitting {
        /// Outstanding submit request.
        request: RequestId,
        /// Epoch milliseconds after which the request is abandoned.
        deadline_ms: u64,
    },
    /// Terminal.
    Done(HandshakeOutcome),
}

impl HandshakeState {
    fn pending_request(&self) -> Option<RequestId> {
        match self {
            HandshakeState::AwaitingForm { request, .. }
            | HandshakeState::Submitting { request, .. } => Some(*request),
            _ => None,
        }
    }
}

/// Timed-out submits still accepted for late updates; oldest dropped first.
const EXPIRED_SUBMIT_CAPACITY: usize = 64;

/// Collaborators shared by all handshakes.
#[derive(Clone)]
pub struct PaymentServices {
    /// Network requests.
    pub api: Arc<dyn PaymentsApi>,
    /// Embedded surfaces.
    pub surfaces: Arc<dyn SurfaceFactory>,
    /// Toasts and focus.
    pub shell: Arc<dyn UiShell>,
}

#[derive(Debug, Default)]
struct RequestIds {
    next: u64,
}

impl RequestIds {
    fn allocate(&mut self) -> RequestId {
        self.next += 1;
        RequestId(self.next)
    }
}

/// One payment attempt for one invoice message.
pub struct PaymentHandshake {
    id: HandshakeId,
    session: Session,
    msg_id: MsgId,
    state: HandshakeState,
    surface: Option<Box<dyn WebviewSurface>>,
}

impl PaymentHandshake {
    fn new(id: HandshakeId, session: Session, msg_id: MsgId) -> Self {
        Self {
            id,
            session,
            msg_id,
            state: HandshakeState::Idle,
            surface: None,
        }
    }

    /// Handshake key.
    pub fn id(&self) -> HandshakeId {
        self.id
    }

    /// Invoice message id.
    pub fn msg_id(&self) -> MsgId {
        self.msg_id
    }

    /// Current state.
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Terminal outcome, once reached.
    pub fn outcome(&self) -> Option<&HandshakeOutcome> {
        match &self.state {
            HandshakeState::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Returns `true` while an embedded surface is open.
    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    fn begin(
        &mut self,
        services: &PaymentServices,
        config: &PaymentConfig,
        requests: &mut RequestIds,
        now_ms: u64,
    ) {
        let request = requests.allocate();
        self.state = HandshakeState::AwaitingForm {
            request,
            deadline_ms: now_ms.saturating_add(config.form_timeout_ms),
        };
        info!(handshake = self.id.0, msg_id = self.msg_id.0, "requesting payment form");
        services
            .api
            .request_payment_form(request, &self.session, self.msg_id);
    }

    fn on_form_result(
        &mut self,
        services: &PaymentServices,
        config: &PaymentConfig,
        result: Result<PaymentForm, RpcError>,
        now_ms: u64,
    ) {
        let form = match result {
            Ok(form) => form,
            Err(error) => {
                warn!(handshake = self.id.0, %error, "payment form request failed");
                self.fail_form(services, error);
                return;
            }
        };

        match self.open_surface(services, config, &form) {
            Ok(surface) => {
                self.surface = Some(surface);
                self.state = HandshakeState::AwaitingCredentials {
                    deadline_ms: now_ms.saturating_add(config.credentials_timeout_ms),
                };
                info!(handshake = self.id.0, "payment page opened");
            }
            Err(error) => {
                warn!(handshake = self.id.0, %error, "payment page could not be shown");
                self.fail_form(services, RpcError::new(0, error.toast_kind()));
            }
        }
    }

    fn open_surface(
        &self,
        services: &PaymentServices,
        config: &PaymentConfig,
        form: &PaymentForm,
    ) -> Result<Box<dyn WebviewSurface>, PaymentError> {
        validate_form_url(&form.url)?;
        let mut surface = services.surfaces.open(self.id, config.viewport)?;
        surface.bind(BRIDGE_CALLBACK_NAME);
        surface.init(BRIDGE_BOOTSTRAP_SCRIPT);
        surface.navigate(&form.url);
        Ok(surface)
    }

    fn on_bridge_message(
        &mut self,
        services: &PaymentServices,
        config: &PaymentConfig,
        requests: &mut RequestIds,
        raw: &[u8],
        now_ms: u64,
    ) {
        let submit = match parse_bridge_event(raw) {
            Ok(BridgeEvent::Submit(submit)) => submit,
            Ok(BridgeEvent::Other { event_type }) => {
                debug!(handshake = self.id.0, %event_type, "ignoring payment page event");
                return;
            }
            Err(error) => {
                warn!(handshake = self.id.0, %error, "dropping malformed payment page message");
                return;
            }
        };

        match self.state {
            HandshakeState::AwaitingCredentials { .. } => {}
            HandshakeState::Submitting { .. } => {
                warn!(handshake = self.id.0, "payment already submitting; dropping resubmission");
                return;
            }
            _ => {
                debug!(handshake = self.id.0, "payment submit outside credential collection");
                return;
            }
        }

        let credentials_json = submit.credentials_json();
        let submission = PaymentSubmission {
            msg_id: self.msg_id,
            requested_info_id: String::new(),
            shipping_option_id: String::new(),
            idempotency_key: idempotency_key(self.msg_id, &credentials_json),
            credentials_json,
        };
        let request = requests.allocate();
        self.state = HandshakeState::Submitting {
            request,
            deadline_ms: now_ms.saturating_add(config.submit_timeout_ms),
        };
        info!(handshake = self.id.0, msg_id = self.msg_id.0, "submitting payment form");
        services
            .api
            .send_payment_form(request, &self.session, &submission);
    }

    fn on_submit_result(
        &mut self,
        services: &PaymentServices,
        result: Result<PaymentResult, RpcError>,
    ) {
        self.close_surface();
        services.shell.activate_main_window();

        match result {
            Ok(PaymentResult::Success { updates }) => {
                info!(handshake = self.id.0, "payment accepted");
                services.api.apply_updates(&self.session, &updates);
                self.state = HandshakeState::Done(HandshakeOutcome::Succeeded);
            }
            Ok(PaymentResult::VerificationNeeded { .. }) => {
                info!(handshake = self.id.0, "payment needs verification");
                services
                    .shell
                    .show_toast(Notice::PaymentVerificationNeeded.lang_key());
                self.state = HandshakeState::Done(HandshakeOutcome::VerificationNeeded);
            }
            Err(error) => {
                warn!(handshake = self.id.0, %error, "payment submit failed");
                self.fail_submit(services, error);
            }
        }
    }

    fn on_surface_closed(&mut self) {
        // Already closed by the user; only release the handle.
        match self.state {
            HandshakeState::Done(_) => {}
            HandshakeState::Submitting { .. } => {
                self.surface = None;
                info!(
                    handshake = self.id.0,
                    "payment page closed while submitting; awaiting server reply"
                );
            }
            _ => {
                self.surface = None;
                info!(handshake = self.id.0, "payment page closed by user");
                self.state =
                    HandshakeState::Done(HandshakeOutcome::Failed(FailureReason::Abandoned));
            }
        }
    }

    /// Returns the submit request abandoned by a submit deadline, if any.
    fn on_tick(&mut self, services: &PaymentServices, now_ms: u64) -> Option<RequestId> {
        match self.state {
            HandshakeState::AwaitingForm { deadline_ms, .. } if now_ms >= deadline_ms => {
                warn!(handshake = self.id.0, "payment form request timed out");
                self.fail_form(services, RpcError::timeout());
            }
            HandshakeState::AwaitingCredentials { deadline_ms } if now_ms >= deadline_ms => {
                warn!(handshake = self.id.0, "payment page idle past deadline");
                self.close_surface();
                services.shell.activate_main_window();
                self.state =
                    HandshakeState::Done(HandshakeOutcome::Failed(FailureReason::CredentialsTimedOut));
            }
            HandshakeState::Submitting {
                request,
                deadline_ms,
            } if now_ms >= deadline_ms => {
                warn!(handshake = self.id.0, "payment submit timed out");
                self.close_surface();
                services.shell.activate_main_window();
                self.fail_submit(services, RpcError::timeout());
                return Some(request);
            }
            _ => {}
        }
        None
    }

    fn fail_form(&mut self, services: &PaymentServices, error: RpcError) {
        self.close_surface();
        services.shell.activate_main_window();
        services
            .shell
            .show_toast(&format!("{FORM_ERROR_PREFIX}: {}", error.kind));
        self.state = HandshakeState::Done(HandshakeOutcome::Failed(FailureReason::Form(error)));
    }

    fn fail_submit(&mut self, services: &PaymentServices, error: RpcError) {
        services
            .shell
            .show_toast(&format!("{SUBMIT_ERROR_PREFIX}: {}", error.kind));
        self.state = HandshakeState::Done(HandshakeOutcome::Failed(FailureReason::Submit(error)));
    }

    fn close_surface(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.close();
        }
    }
}

impl Drop for PaymentHandshake {
    fn drop(&mut self) {
        self.close_surface();
    }
}

/// Registry of live handshakes and router of their completions.
///
/// Every `on_*` method returns the outcome when the call finished a
/// handshake; finished handshakes are removed immediately.
pub struct PaymentFlows {
    services: PaymentServices,
    config: PaymentConfig,
    requests: RequestIds,
    next_handshake: u64,
    flows: BTreeMap<HandshakeId, PaymentHandshake>,
    expired_submits: BTreeMap<RequestId, Session>,
}

impl PaymentFlows {
    /// Creates an empty registry.
    pub fn new(services: PaymentServices, config: PaymentConfig) -> Self {
        Self {
            services,
            config,
            requests: RequestIds::default(),
            next_handshake: 0,
            flows: BTreeMap::new(),
            expired_submits: BTreeMap::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Starts a handshake for the invoice in `msg_id`.
    pub fn start(&mut self, session: Session, msg_id: MsgId, now_ms: u64) -> HandshakeId {
        self.next_handshake += 1;
        let id = HandshakeId(self.next_handshake);
        let mut handshake = PaymentHandshake::new(id, session, msg_id);
        handshake.begin(&self.services, &self.config, &mut self.requests, now_ms);
        self.flows.insert(id, handshake);
        id
    }

    /// Delivers the payment form completion for `request`.
    pub fn on_form_result(
        &mut self,
        request: RequestId,
        result: Result<PaymentForm, RpcError>,
        now_ms: u64,
    ) -> Option<HandshakeOutcome> {
        let id = self.awaiting(request, |state| {
            matches!(state, HandshakeState::AwaitingForm { .. })
        })?;
        if let Some(handshake) = self.flows.get_mut(&id) {
            handshake.on_form_result(&self.services, &self.config, result, now_ms);
        }
        self.reap(id)
    }

    /// Delivers one message received on the bridge callback of `handshake`.
    pub fn on_bridge_message(&mut self, handshake: HandshakeId, raw: &[u8], now_ms: u64) {
        let Some(flow) = self.flows.get_mut(&handshake) else {
            debug!(handshake = handshake.0, "bridge message for unknown handshake");
            return;
        };
        flow.on_bridge_message(&self.services, &self.config, &mut self.requests, raw, now_ms);
    }

    /// Delivers the submit completion for `request`.
    pub fn on_submit_result(
        &mut self,
        request: RequestId,
        result: Result<PaymentResult, RpcError>,
    ) -> Option<HandshakeOutcome> {
        if let Some(session) = self.expired_submits.remove(&request) {
            self.on_late_submit_result(request, &session, result);
            return None;
        }
        let id = self.awaiting(request, |state| {
            matches!(state, HandshakeState::Submitting { .. })
        })?;
        if let Some(handshake) = self.flows.get_mut(&id) {
            handshake.on_submit_result(&self.services, result);
        }
        self.reap(id)
    }

    /// Reply to a submit that already timed out. Only an accepted payment
    /// has an effect: its updates are applied without any UI.
    fn on_late_submit_result(
        &self,
        request: RequestId,
        session: &Session,
        result: Result<PaymentResult, RpcError>,
    ) {
        match result {
            Ok(PaymentResult::Success { updates }) => {
                info!(request = request.0, "late payment acceptance; applying updates");
                self.services.api.apply_updates(session, &updates);
            }
            Ok(PaymentResult::VerificationNeeded { .. }) | Err(_) => {
                debug!(request = request.0, "ignoring late payment reply");
            }
        }
    }

    /// Records that the user closed the surface of `handshake`.
    pub fn on_surface_closed(&mut self, handshake: HandshakeId) -> Option<HandshakeOutcome> {
        self.flows.get_mut(&handshake)?.on_surface_closed();
        self.reap(handshake)
    }

    /// Fails every handshake whose current deadline passed.
    pub fn on_tick(&mut self, now_ms: u64) -> Vec<(HandshakeId, HandshakeOutcome)> {
        for handshake in self.flows.values_mut() {
            if let Some(request) = handshake.on_tick(&self.services, now_ms) {
                self.expired_submits.insert(request, handshake.session);
            }
        }
        while self.expired_submits.len() > EXPIRED_SUBMIT_CAPACITY {
            self.expired_submits.pop_first();
        }

        let finished: Vec<HandshakeId> = self
            .flows
            .iter()
            .filter(|(_, handshake)| handshake.outcome().is_some())
            .map(|(id, _)| *id)
            .collect();
        finished
            .into_iter()
            .filter_map(|id| self.reap(id).map(|outcome| (id, outcome)))
            .collect()
    }

    /// Live handshake by id.
    pub fn get(&self, handshake: HandshakeId) -> Option<&PaymentHandshake> {
        self.flows.get(&handshake)
    }

    /// Number of live handshakes.
    pub fn active(&self) -> usize {
        self.flows.len()
    }

    fn awaiting(
        &self,
        request: RequestId,
        expected: impl Fn(&HandshakeState) -> bool,
    ) -> Option<HandshakeId> {
        let found = self.flows.values().find(|handshake| {
            handshake.state.pending_request() == Some(request) && expected(&handshake.state)
        });
        if found.is_none() {
            debug!(request = request.0, "ignoring stale payment completion");
        }
        found.map(PaymentHandshake::id)
    }

    fn reap(&mut self, id: HandshakeId) -> Option<HandshakeOutcome> {
        let outcome = self.flows.get(&id)?.outcome()?.clone();
        self.flows.remove(&id);
        Some(outcome)
    }
}
