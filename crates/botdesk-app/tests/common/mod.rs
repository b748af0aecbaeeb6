//! Recording fakes for facade integration tests.
//!
//! Session `n` always belongs to account `n`; activating an account rebinds
//! the process window to its session unless rebinding is switched off.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use botdesk_app::{AppConfig, Collaborators, Facade};
use botdesk_core::{
    AccountId, BotInfo, Button, ButtonPosition, Clock, Message, MsgId, Peer, PeerId, PeerKind,
    PollFlags, ReplyMarkup, Session, SessionId, UserId,
};
use botdesk_payments::{
    HandshakeId, PaymentSubmission, PaymentsApi, RequestId, StateUpdates, SurfaceError,
    SurfaceFactory, Viewport, WebviewSurface,
};
use botdesk_router::{BotApi, SendOptions};
use botdesk_session::{AccountDomain, WindowHost};
use botdesk_ui::{ConfirmPrompt, HistoryPosition, Notice, OnAccept, SessionWindow, UiShell};

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Event {
    Activate(AccountId),
    SendBotCommand {
        peer: PeerId,
        bot: Option<UserId>,
        command: String,
        reply_to: Option<MsgId>,
    },
    HideKeyboard(PeerId, MsgId),
    InsertCommand(String),
    PollComposer {
        peer: PeerId,
        reply_to: Option<MsgId>,
        chosen: PollFlags,
        disabled: PollFlags,
    },
    InlineSwitch {
        query: String,
        same_peer_bot: Option<UserId>,
        reply_to: Option<MsgId>,
    },
    InlineLayer(String),
    ShowHistory(PeerId, HistoryPosition),
    ChatsList,
    PeerInfo(PeerId),
    CloseFolder,
    Search(String, Option<PeerId>),
    Toast(String),
    Inform(Notice),
    Confirm(ConfirmPrompt),
    ActivateMainWindow,
    OpenUrl(String),
    OpenUrlConfirmed(String),
    HideLayer,
    HideMedia,
    Callback(MsgId, ButtonPosition),
    CallbackWithPassword(MsgId, ButtonPosition),
    ShareContact(PeerId, SendOptions),
    UrlAuth(MsgId, ButtonPosition),
    RequestForm(RequestId, MsgId),
    Submit(RequestId, PaymentSubmission),
    ApplyUpdates(StateUpdates),
    OpenSurface(HandshakeId),
    Navigate(String),
    CloseSurface,
}

/// Shared, ordered call log.
#[derive(Default)]
pub struct Log(Mutex<Vec<Event>>);

impl Log {
    fn push(&self, event: Event) {
        self.0.lock().expect("log lock").push(event);
    }
}

/// Every host collaborator at once.
pub struct World {
    log: Arc<Log>,
    bound: Mutex<Option<SessionId>>,
    active: Mutex<Option<AccountId>>,
    rebind_on_activate: AtomicBool,
    inline_handled: AtomicBool,
    folder_open: AtomicBool,
    pending_confirm: Mutex<Option<OnAccept>>,
    now: AtomicU64,
}

#[allow(dead_code)]
impl World {
    pub fn events(&self) -> Vec<Event> {
        self.log.0.lock().expect("log lock").clone()
    }

    pub fn clear(&self) {
        self.log.0.lock().expect("log lock").clear();
    }

    pub fn activations(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Activate(_)))
            .count()
    }

    pub fn bind(&self, session: Option<SessionId>) {
        *self.bound.lock().expect("bound lock") = session;
    }

    pub fn set_active(&self, account: Option<AccountId>) {
        *self.active.lock().expect("active lock") = account;
    }

    pub fn set_rebind_on_activate(&self, rebind: bool) {
        self.rebind_on_activate.store(rebind, Ordering::SeqCst);
    }

    pub fn set_inline_handled(&self, handled: bool) {
        self.inline_handled.store(handled, Ordering::SeqCst);
    }

    pub fn set_folder_open(&self, open: bool) {
        self.folder_open.store(open, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Accepts the pending confirmation prompt, if any.
    pub fn accept_confirm(&self) -> bool {
        let pending = self.pending_confirm.lock().expect("confirm lock").take();
        match pending {
            Some(on_accept) => {
                on_accept();
                true
            }
            None => false,
        }
    }

    pub fn last_form_request(&self) -> RequestId {
        self.events()
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::RequestForm(request, _) => Some(*request),
                _ => None,
            })
            .expect("a form request should have been issued")
    }

    pub fn last_surface(&self) -> HandshakeId {
        self.events()
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::OpenSurface(handshake) => Some(*handshake),
                _ => None,
            })
            .expect("a surface should have been opened")
    }
}

impl Default for World {
    fn default() -> Self {
        Self {
            log: Arc::new(Log::default()),
            bound: Mutex::new(Some(SessionId(1))),
            active: Mutex::new(Some(AccountId(1))),
            rebind_on_activate: AtomicBool::new(true),
            inline_handled: AtomicBool::new(true),
            folder_open: AtomicBool::new(false),
            pending_confirm: Mutex::new(None),
            now: AtomicU64::new(1_000),
        }
    }
}

struct FakeWindow {
    session: SessionId,
    log: Arc<Log>,
    inline_handled: bool,
    folder_open: bool,
}

impl SessionWindow for FakeWindow {
    fn session_id(&self) -> SessionId {
        self.session
    }

    fn send_bot_command(
        &self,
        peer: &Peer,
        bot: Option<UserId>,
        command: &str,
        reply_to: Option<MsgId>,
    ) {
        self.log.push(Event::SendBotCommand {
            peer: peer.id,
            bot,
            command: command.to_string(),
            reply_to,
        });
    }

    fn hide_single_use_keyboard(&self, peer: &Peer, message: MsgId) {
        self.log.push(Event::HideKeyboard(peer.id, message));
    }

    fn insert_bot_command(&self, command: &str) -> bool {
        self.log.push(Event::InsertCommand(command.to_string()));
        true
    }

    fn open_poll_composer(
        &self,
        peer: &Peer,
        reply_to: Option<MsgId>,
        chosen: PollFlags,
        disabled: PollFlags,
    ) {
        self.log.push(Event::PollComposer {
            peer: peer.id,
            reply_to,
            chosen,
            disabled,
        });
    }

    fn switch_inline_bot_button_received(
        &self,
        query: &str,
        same_peer_bot: Option<&BotInfo>,
        same_peer_reply_to: Option<MsgId>,
    ) -> bool {
        self.log.push(Event::InlineSwitch {
            query: query.to_string(),
            same_peer_bot: same_peer_bot.map(|bot| bot.user_id),
            reply_to: same_peer_reply_to,
        });
        self.inline_handled
    }

    fn open_inline_switch_layer(&self, text: &str) {
        self.log.push(Event::InlineLayer(text.to_string()));
    }

    fn show_peer_history(&self, peer: PeerId, position: HistoryPosition) {
        self.log.push(Event::ShowHistory(peer, position));
    }

    fn show_chats_list(&self) {
        self.log.push(Event::ChatsList);
    }

    fn show_peer_info(&self, peer: &Peer) {
        self.log.push(Event::PeerInfo(peer.id));
    }

    fn has_opened_folder(&self) -> bool {
        self.folder_open
    }

    fn close_folder(&self) {
        self.log.push(Event::CloseFolder);
    }

    fn search_messages(&self, query: &str, in_chat: Option<PeerId>) {
        self.log.push(Event::Search(query.to_string(), in_chat));
    }
}

impl WindowHost for World {
    fn current_window(&self) -> Option<Arc<dyn SessionWindow>> {
        let session = (*self.bound.lock().expect("bound lock"))?;
        Some(Arc::new(FakeWindow {
            session,
            log: Arc::clone(&self.log),
            inline_handled: self.inline_handled.load(Ordering::SeqCst),
            folder_open: self.folder_open.load(Ordering::SeqCst),
        }))
    }
}

impl AccountDomain for World {
    fn active_account(&self) -> Option<AccountId> {
        *self.active.lock().expect("active lock")
    }

    fn activate(&self, account: AccountId) {
        self.log.push(Event::Activate(account));
        self.set_active(Some(account));
        if self.rebind_on_activate.load(Ordering::SeqCst) {
            self.bind(Some(SessionId(account.0)));
        }
    }
}

impl UiShell for World {
    fn show_toast(&self, text: &str) {
        self.log.push(Event::Toast(text.to_string()));
    }

    fn inform(&self, notice: Notice) {
        self.log.push(Event::Inform(notice));
    }

    fn confirm(&self, prompt: ConfirmPrompt, on_accept: OnAccept) {
        self.log.push(Event::Confirm(prompt));
        *self.pending_confirm.lock().expect("confirm lock") = Some(on_accept);
    }

    fn activate_main_window(&self) {
        self.log.push(Event::ActivateMainWindow);
    }

    fn open_url(&self, url: &str) {
        self.log.push(Event::OpenUrl(url.to_string()));
    }

    fn open_url_with_confirmation(&self, url: &str) {
        self.log.push(Event::OpenUrlConfirmed(url.to_string()));
    }

    fn hide_settings_and_layer(&self) {
        self.log.push(Event::HideLayer);
    }

    fn hide_media_view(&self) {
        self.log.push(Event::HideMedia);
    }
}

impl BotApi for World {
    fn send_callback(&self, message: &Message, position: ButtonPosition) {
        self.log.push(Event::Callback(message.id, position));
    }

    fn send_callback_with_password(&self, message: &Message, position: ButtonPosition) {
        self.log.push(Event::CallbackWithPassword(message.id, position));
    }

    fn share_own_contact(&self, _session: &Session, peer: &Peer, options: SendOptions) {
        self.log.push(Event::ShareContact(peer.id, options));
    }

    fn activate_url_auth(&self, message: &Message, position: ButtonPosition) {
        self.log.push(Event::UrlAuth(message.id, position));
    }
}

impl PaymentsApi for World {
    fn request_payment_form(&self, request: RequestId, _session: &Session, msg_id: MsgId) {
        self.log.push(Event::RequestForm(request, msg_id));
    }

    fn send_payment_form(
        &self,
        request: RequestId,
        _session: &Session,
        submission: &PaymentSubmission,
    ) {
        self.log.push(Event::Submit(request, submission.clone()));
    }

    fn apply_updates(&self, _session: &Session, updates: &StateUpdates) {
        self.log.push(Event::ApplyUpdates(updates.clone()));
    }
}

struct FakeSurface(Arc<Log>);

impl WebviewSurface for FakeSurface {
    fn bind(&mut self, _name: &str) {}

    fn init(&mut self, _script: &str) {}

    fn navigate(&mut self, url: &str) {
        self.0.push(Event::Navigate(url.to_string()));
    }

    fn close(&mut self) {
        self.0.push(Event::CloseSurface);
    }
}

impl SurfaceFactory for World {
    fn open(
        &self,
        handshake: HandshakeId,
        _viewport: Viewport,
    ) -> Result<Box<dyn WebviewSurface>, SurfaceError> {
        self.log.push(Event::OpenSurface(handshake));
        Ok(Box::new(FakeSurface(Arc::clone(&self.log))))
    }
}

impl Clock for World {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Facade wired to one [`World`].
pub struct Harness {
    pub world: Arc<World>,
    pub facade: Facade,
}

/// Harness bound to session 1 with account 1 active.
pub fn harness() -> Harness {
    harness_with(AppConfig::default())
}

#[allow(dead_code)]
pub fn harness_with(config: AppConfig) -> Harness {
    let world = Arc::new(World::default());
    let collaborators = Collaborators {
        domain: world.clone(),
        windows: world.clone(),
        shell: world.clone(),
        bots: world.clone(),
        payments: world.clone(),
        surfaces: world.clone(),
        clock: world.clone(),
    };
    let facade = Facade::new(collaborators, &config);
    Harness { world, facade }
}

pub fn session(n: u64) -> Session {
    Session {
        id: SessionId(n),
        account: AccountId(n),
    }
}

#[allow(dead_code)]
pub fn group(session: Session) -> Peer {
    Peer {
        id: PeerId(-100),
        session,
        kind: PeerKind::Group,
    }
}

#[allow(dead_code)]
pub fn user_chat(session: Session) -> Peer {
    Peer {
        id: PeerId(77),
        session,
        kind: PeerKind::User,
    }
}

#[allow(dead_code)]
pub fn bot(verified: bool) -> BotInfo {
    BotInfo {
        user_id: UserId(500),
        username: "shopbot".to_string(),
        verified,
        is_bot: true,
        inline_return_to: None,
    }
}

/// Message in `peer` with one row holding `buttons`.
#[allow(dead_code)]
pub fn message(id: i64, peer: Peer, bot: Option<BotInfo>, buttons: Vec<Button>) -> Message {
    Message {
        id: MsgId(id),
        peer,
        from_user: Some(UserId(500)),
        bot,
        markup: ReplyMarkup::new(vec![buttons]),
    }
}
