//! Recording fakes for payment handshake tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use botdesk_core::{AccountId, MsgId, Session, SessionId};
use botdesk_payments::{
    HandshakeId, PaymentConfig, PaymentFlows, PaymentServices, PaymentSubmission, PaymentsApi,
    RequestId, StateUpdates, SurfaceError, SurfaceFactory, Viewport, WebviewSurface,
};
use botdesk_ui::{ConfirmPrompt, Notice, OnAccept, UiShell};

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Call {
    RequestForm(RequestId, MsgId),
    Submit(RequestId, PaymentSubmission),
    ApplyUpdates(StateUpdates),
    OpenSurface(HandshakeId, Viewport),
    Bind(String),
    Init(String),
    Navigate(String),
    CloseSurface,
    Toast(String),
    Inform(Notice),
    ActivateMainWindow,
}

/// Shared call log implementing every payment collaborator.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    surface_unavailable: AtomicBool,
}

#[allow(dead_code)]
impl Recorder {
    pub fn record(&self, call: Call) {
        self.calls.lock().expect("call log lock").push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("call log lock").clone()
    }

    pub fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matcher(call)).count()
    }

    pub fn toasts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Toast(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_form_request(&self) -> RequestId {
        self.calls()
            .iter()
            .rev()
            .find_map(|call| match call {
                Call::RequestForm(request, _) => Some(*request),
                _ => None,
            })
            .expect("a form request should have been issued")
    }

    pub fn submissions(&self) -> Vec<(RequestId, PaymentSubmission)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Submit(request, submission) => Some((request, submission)),
                _ => None,
            })
            .collect()
    }

    pub fn fail_surfaces(&self) {
        self.surface_unavailable.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.calls.lock().expect("call log lock").clear();
    }
}

impl PaymentsApi for Recorder {
    fn request_payment_form(&self, request: RequestId, _session: &Session, msg_id: MsgId) {
        self.record(Call::RequestForm(request, msg_id));
    }

    fn send_payment_form(
        &self,
        request: RequestId,
        _session: &Session,
        submission: &PaymentSubmission,
    ) {
        self.record(Call::Submit(request, submission.clone()));
    }

    fn apply_updates(&self, _session: &Session, updates: &StateUpdates) {
        self.record(Call::ApplyUpdates(updates.clone()));
    }
}

struct FakeSurface {
    log: Arc<Recorder>,
}

impl WebviewSurface for FakeSurface {
    fn bind(&mut self, name: &str) {
        self.log.record(Call::Bind(name.to_string()));
    }

    fn init(&mut self, script: &str) {
        self.log.record(Call::Init(script.to_string()));
    }

    fn navigate(&mut self, url: &str) {
        self.log.record(Call::Navigate(url.to_string()));
    }

    fn close(&mut self) {
        self.log.record(Call::CloseSurface);
    }
}

/// Surface factory sharing the recorder.
pub struct Surfaces(pub Arc<Recorder>);

impl SurfaceFactory for Surfaces {
    fn open(
        &self,
        handshake: HandshakeId,
        viewport: Viewport,
    ) -> Result<Box<dyn WebviewSurface>, SurfaceError> {
        if self.0.surface_unavailable.load(Ordering::SeqCst) {
            return Err(SurfaceError("no webview runtime".to_string()));
        }
        self.0.record(Call::OpenSurface(handshake, viewport));
        Ok(Box::new(FakeSurface {
            log: Arc::clone(&self.0),
        }))
    }
}

impl UiShell for Recorder {
    fn show_toast(&self, text: &str) {
        self.record(Call::Toast(text.to_string()));
    }

    fn inform(&self, notice: Notice) {
        self.record(Call::Inform(notice));
    }

    fn confirm(&self, _prompt: ConfirmPrompt, _on_accept: OnAccept) {}

    fn activate_main_window(&self) {
        self.record(Call::ActivateMainWindow);
    }

    fn open_url(&self, _url: &str) {}

    fn open_url_with_confirmation(&self, _url: &str) {}

    fn hide_settings_and_layer(&self) {}

    fn hide_media_view(&self) {}
}

/// Session used by every fixture.
pub fn session() -> Session {
    Session {
        id: SessionId(1),
        account: AccountId(100),
    }
}

/// Builds flows wired to one recorder.
pub fn flows(config: PaymentConfig) -> (PaymentFlows, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let services = PaymentServices {
        api: recorder.clone(),
        surfaces: Arc::new(Surfaces(recorder.clone())),
        shell: recorder.clone(),
    };
    (PaymentFlows::new(services, config), recorder)
}

/// Encodes a bridge message the way the bootstrap script delivers it.
#[allow(dead_code)]
pub fn bridge_message(event_type: &str, arguments: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!([event_type, arguments]))
        .expect("bridge message should encode")
}

/// Valid submit arguments with a recognizable secret.
#[allow(dead_code)]
pub const VALID_ARGUMENTS: &str =
    r#"{"title":"Visa *4242","credentials":{"token":"tok_secret_4242","type":"card"}}"#;
