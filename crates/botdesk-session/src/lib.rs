#![warn(missing_docs)]
//! # botdesk-session
//!
//! ## Purpose
//! Locates the window that must handle an action for a given session and
//! forwards facade operations to it.
//!
//! ## Responsibilities
//! - [`resolve_active_window`]: pure lookup over `(session, current binding)`
//!   that activates the owning account when needed.
//! - [`SessionResolver`]: the same lookup bound to injected collaborators.
//! - [`SessionDispatcher`]: forwards chat operations through the resolver.
//!
//! ## Data flow
//! Caller names a [`Session`] -> resolver checks the bound window ->
//! optionally activates the account through [`AccountDomain`] -> re-checks ->
//! dispatcher calls the [`SessionWindow`] or skips.
//!
//! ## Error model
//! A missing window is not an error. Every dispatcher operation degrades to a
//! silent no-op (or `false`) when no window serves the session, because the
//! window may legitimately close while an action is in flight.
//!
//! ## Example
//! ```rust,ignore
//! let resolver = SessionResolver::new(domain, windows);
//! if let Some(window) = resolver.resolve(&message.session()) {
//!     window.show_chats_list();
//! }
//! ```

use std::sync::Arc;

use botdesk_core::{AccountId, BotInfo, Message, MsgId, Peer, PollFlags, Session, UserId};
use botdesk_ui::{HistoryPosition, SessionWindow, UiShell};
use tracing::debug;

/// Collaborator that owns the set of accounts and the active one.
pub trait AccountDomain: Send + Sync {
    /// Currently active account, if any.
    fn active_account(&self) -> Option<AccountId>;

    /// Requests activation of `account`.
    ///
    /// Implementations may rebind the process window synchronously or later.
    fn activate(&self, account: AccountId);
}

/// Collaborator exposing the window currently bound in this process.
pub trait WindowHost: Send + Sync {
    /// Window bound right now, if any.
    fn current_window(&self) -> Option<Arc<dyn SessionWindow>>;
}

/// Returns the bound window when it serves `session`, activating the owning
/// account first if the bound window belongs to another session.
pub fn resolve_active_window(
    session: &Session,
    windows: &dyn WindowHost,
    domain: &dyn AccountDomain,
) -> Option<Arc<dyn SessionWindow>> {
    if let Some(window) = serving_window(session, windows) {
        return Some(window);
    }

    if domain.active_account() != Some(session.account) {
        debug!(account = session.account.0, "activating account for action");
        domain.activate(session.account);
    }

    let window = serving_window(session, windows);
    if window.is_none() {
        debug!(session = session.id.0, "no window serves session; skipping");
    }
    window
}

fn serving_window(session: &Session, windows: &dyn WindowHost) -> Option<Arc<dyn SessionWindow>> {
    windows
        .current_window()
        .filter(|window| window.session_id() == session.id)
}

/// [`resolve_active_window`] bound to injected collaborators.
#[derive(Clone)]
pub struct SessionResolver {
    domain: Arc<dyn AccountDomain>,
    windows: Arc<dyn WindowHost>,
}

impl SessionResolver {
    /// Creates a resolver.
    pub fn new(domain: Arc<dyn AccountDomain>, windows: Arc<dyn WindowHost>) -> Self {
        Self { domain, windows }
    }

    /// Resolves the window serving `session`.
    pub fn resolve(&self, session: &Session) -> Option<Arc<dyn SessionWindow>> {
        resolve_active_window(session, self.windows.as_ref(), self.domain.as_ref())
    }

    /// Window bound right now, without any activation.
    pub fn current(&self) -> Option<Arc<dyn SessionWindow>> {
        self.windows.current_window()
    }
}

/// Forwards session-scoped facade operations to the resolved window.
#[derive(Clone)]
pub struct SessionDispatcher {
    resolver: SessionResolver,
    shell: Arc<dyn UiShell>,
}

impl SessionDispatcher {
    /// Creates a dispatcher.
    pub fn new(resolver: SessionResolver, shell: Arc<dyn UiShell>) -> Self {
        Self { resolver, shell }
    }

    /// Underlying resolver.
    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    /// Sends a bot command into `peer`.
    pub fn send_bot_command(
        &self,
        peer: &Peer,
        bot: Option<UserId>,
        command: &str,
        reply_to: Option<MsgId>,
    ) {
        if let Some(window) = self.resolver.resolve(&peer.session) {
            window.send_bot_command(peer, bot, command, reply_to);
        }
    }

    /// Hides the single-use keyboard of the chat owning `message`.
    pub fn hide_single_use_keyboard(&self, message: &Message) {
        if let Some(window) = self.resolver.resolve(&message.session()) {
            window.hide_single_use_keyboard(&message.peer, message.id);
        }
    }

    /// Inserts a bot command into the current window's message field.
    ///
    /// Never activates another account. Returns `false` without a window.
    pub fn insert_bot_command(&self, command: &str) -> bool {
        self.resolver
            .current()
            .is_some_and(|window| window.insert_bot_command(command))
    }

    /// Searches for `tag`, scoped to `in_peer` when it is a group or channel.
    pub fn search_by_hashtag(&self, tag: &str, in_peer: Option<&Peer>) {
        let window = match in_peer {
            Some(peer) => self.resolver.resolve(&peer.session),
            None => self.resolver.current(),
        };
        let Some(window) = window else {
            return;
        };

        if window.has_opened_folder() {
            window.close_folder();
        }
        self.shell.hide_settings_and_layer();
        self.shell.hide_media_view();

        let scope = in_peer.filter(|peer| !peer.is_user()).map(|peer| peer.id);
        window.search_messages(&format!("{tag} "), scope);
    }

    /// Shows the profile of `peer`.
    pub fn show_peer_profile(&self, peer: &Peer) {
        if let Some(window) = self.resolver.resolve(&peer.session) {
            window.show_peer_info(peer);
        }
    }

    /// Shows the chats list of `session`.
    pub fn show_chats_list(&self, session: &Session) {
        if let Some(window) = self.resolver.resolve(session) {
            window.show_chats_list();
        }
    }

    /// Shows the history of `peer` at `position`.
    pub fn show_peer_history(&self, peer: &Peer, position: HistoryPosition) {
        if let Some(window) = self.resolver.resolve(&peer.session) {
            window.show_peer_history(peer.id, position);
        }
    }

    /// Shows the history of the chat owning `message`, at that message.
    pub fn show_peer_history_at_item(&self, message: &Message) {
        self.show_peer_history(&message.peer, HistoryPosition::AtMessage(message.id));
    }

    /// Delivers an inline-switch query. Returns `false` without a window.
    pub fn switch_inline_bot_button_received(
        &self,
        session: &Session,
        query: &str,
        same_peer_bot: Option<&BotInfo>,
        same_peer_reply_to: Option<MsgId>,
    ) -> bool {
        self.resolver.resolve(session).is_some_and(|window| {
            window.switch_inline_bot_button_received(query, same_peer_bot, same_peer_reply_to)
        })
    }

    /// Opens the inline chat chooser of `session` prefilled with `text`.
    pub fn open_inline_switch_layer(&self, session: &Session, text: &str) {
        if let Some(window) = self.resolver.resolve(session) {
            window.open_inline_switch_layer(text);
        }
    }

    /// Opens the poll composer for `peer`.
    pub fn open_poll_composer(
        &self,
        peer: &Peer,
        reply_to: Option<MsgId>,
        chosen: PollFlags,
        disabled: PollFlags,
    ) {
        if let Some(window) = self.resolver.resolve(&peer.session) {
            window.open_poll_composer(peer, reply_to, chosen, disabled);
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for window resolution.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use botdesk_core::{PeerId, SessionId};

    use super::*;

    struct StubWindow(SessionId);

    impl SessionWindow for StubWindow {
        fn session_id(&self) -> SessionId {
            self.0
        }
        fn send_bot_command(&self, _: &Peer, _: Option<UserId>, _: &str, _: Option<MsgId>) {}
        fn hide_single_use_keyboard(&self, _: &Peer, _: MsgId) {}
        fn insert_bot_command(&self, _: &str) -> bool {
            true
        }
        fn open_poll_composer(&self, _: &Peer, _: Option<MsgId>, _: PollFlags, _: PollFlags) {}
        fn switch_inline_bot_button_received(
            &self,
            _: &str,
            _: Option<&BotInfo>,
            _: Option<MsgId>,
        ) -> bool {
            true
        }
        fn open_inline_switch_layer(&self, _: &str) {}
        fn show_peer_history(&self, _: PeerId, _: HistoryPosition) {}
        fn show_chats_list(&self) {}
        fn show_peer_info(&self, _: &Peer) {}
        fn has_opened_folder(&self) -> bool {
            false
        }
        fn close_folder(&self) {}
        fn search_messages(&self, _: &str, _: Option<PeerId>) {}
    }

    struct Binding {
        bound: Mutex<Option<Arc<dyn SessionWindow>>>,
        active: Mutex<Option<AccountId>>,
        rebind_on_activate: Option<SessionId>,
        activations: AtomicUsize,
    }

    impl WindowHost for Binding {
        fn current_window(&self) -> Option<Arc<dyn SessionWindow>> {
            self.bound.lock().expect("binding lock").clone()
        }
    }

    impl AccountDomain for Binding {
        fn active_account(&self) -> Option<AccountId> {
            *self.active.lock().expect("active lock")
        }

        fn activate(&self, account: AccountId) {
            self.activations.fetch_add(1, Ordering::SeqCst);
            *self.active.lock().expect("active lock") = Some(account);
            if let Some(session) = self.rebind_on_activate {
                *self.bound.lock().expect("binding lock") = Some(Arc::new(StubWindow(session)));
            }
        }
    }

    fn session(id: u64) -> Session {
        Session {
            id: SessionId(id),
            account: AccountId(id * 10),
        }
    }

    #[test]
    fn bound_window_is_returned_without_activation() {
        let binding = Binding {
            bound: Mutex::new(Some(Arc::new(StubWindow(SessionId(1))))),
            active: Mutex::new(Some(AccountId(10))),
            rebind_on_activate: None,
            activations: AtomicUsize::new(0),
        };

        let window = resolve_active_window(&session(1), &binding, &binding);
        assert!(window.is_some());
        assert_eq!(binding.activations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn other_session_is_activated_then_resolved() {
        let binding = Binding {
            bound: Mutex::new(Some(Arc::new(StubWindow(SessionId(1))))),
            active: Mutex::new(Some(AccountId(10))),
            rebind_on_activate: Some(SessionId(2)),
            activations: AtomicUsize::new(0),
        };

        let window = resolve_active_window(&session(2), &binding, &binding)
            .expect("window should rebind after activation");
        assert_eq!(window.session_id(), SessionId(2));
        assert_eq!(binding.activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unresolvable_session_yields_none() {
        let binding = Binding {
            bound: Mutex::new(None),
            active: Mutex::new(None),
            rebind_on_activate: None,
            activations: AtomicUsize::new(0),
        };

        assert!(resolve_active_window(&session(3), &binding, &binding).is_none());
        assert_eq!(binding.activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn already_active_account_is_not_reactivated() {
        let binding = Binding {
            bound: Mutex::new(None),
            active: Mutex::new(Some(AccountId(30))),
            rebind_on_activate: None,
            activations: AtomicUsize::new(0),
        };

        assert!(resolve_active_window(&session(3), &binding, &binding).is_none());
        assert_eq!(binding.activations.load(Ordering::SeqCst), 0);
    }
}
