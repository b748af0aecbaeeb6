#![warn(missing_docs)]
//! # botdesk-router
//!
//! ## Purpose
//! Routes presses on message buttons to the matching collaborator.
//!
//! ## Responsibilities
//! - Look up the pressed button and decode it into a [`ButtonAction`].
//! - Run one handler per action variant.
//! - Apply the untrusted-link policy for URL buttons.
//!
//! ## Data flow
//! UI press `(message, row, column)` -> [`BotActionRouter::handle`] ->
//! [`SessionDispatcher`] / [`BotApi`] / [`PaymentStarter`] / [`UiShell`].
//!
//! ## Error model
//! None. A missing button, bot or window is a silent no-op.

use std::sync::Arc;

use botdesk_core::{
    BotInfo, ButtonAction, ButtonPosition, Message, MsgId, Peer, PollRequestFlags, Session,
};
use botdesk_session::SessionDispatcher;
use botdesk_ui::{ConfirmPrompt, HistoryPosition, Notice, UiShell};
use tracing::debug;

/// Options for messages sent on the user's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Message to reply to.
    pub reply_to: Option<MsgId>,
    /// Whether the chat draft is cleared after sending.
    pub clear_draft: bool,
}

/// Bot-facing network actions.
pub trait BotApi: Send + Sync {
    /// Sends the callback data of the button at `position`.
    fn send_callback(&self, message: &Message, position: ButtonPosition);

    /// Sends callback data after obtaining the two-factor password.
    fn send_callback_with_password(&self, message: &Message, position: ButtonPosition);

    /// Shares the signed-in user's own contact into `peer`.
    fn share_own_contact(&self, session: &Session, peer: &Peer, options: SendOptions);

    /// Starts the URL authorization flow for the button at `position`.
    fn activate_url_auth(&self, message: &Message, position: ButtonPosition);
}

/// Starts payment handshakes for `Buy` buttons.
pub trait PaymentStarter: Send + Sync {
    /// Starts paying the invoice carried by `message`.
    fn start_payment(&self, message: &Message);
}

/// Dispatches button presses.
#[derive(Clone)]
pub struct BotActionRouter {
    dispatcher: SessionDispatcher,
    shell: Arc<dyn UiShell>,
    bots: Arc<dyn BotApi>,
    payments: Arc<dyn PaymentStarter>,
}

impl BotActionRouter {
    /// Creates a router.
    pub fn new(
        dispatcher: SessionDispatcher,
        shell: Arc<dyn UiShell>,
        bots: Arc<dyn BotApi>,
        payments: Arc<dyn PaymentStarter>,
    ) -> Self {
        Self {
            dispatcher,
            shell,
            bots,
            payments,
        }
    }

    /// Handles a press on the button at `(row, column)` of `message`.
    pub fn handle(&self, message: &Message, row: usize, column: usize) {
        let position = ButtonPosition { row, column };
        let Some(button) = message.button(position) else {
            debug!(msg_id = message.id.0, row, column, "pressed button no longer exists");
            return;
        };

        match button.action() {
            ButtonAction::SendCommand { command } => self.send_command(message, &command),
            ButtonAction::Callback => self.bots.send_callback(message, position),
            ButtonAction::CallbackWithPassword => {
                self.bots.send_callback_with_password(message, position)
            }
            ButtonAction::Buy => self.payments.start_payment(message),
            ButtonAction::OpenUrl { url } => self.open_url(message, &url),
            ButtonAction::RequestLocation => self.request_location(message),
            ButtonAction::RequestPhone => self.request_phone(message),
            ButtonAction::RequestPoll(flags) => self.request_poll(message, flags),
            ButtonAction::SwitchInline { query, same_peer } => {
                self.switch_inline(message, &query, same_peer)
            }
            ButtonAction::UrlAuth => self.bots.activate_url_auth(message, position),
        }
    }

    fn send_command(&self, message: &Message, command: &str) {
        self.dispatcher.send_bot_command(
            &message.peer,
            message.from_user,
            command,
            message.id.as_reply_target(),
        );
    }

    fn open_url(&self, message: &Message, url: &str) {
        let verified = message.bot.as_ref().is_some_and(|bot| bot.verified);
        if verified {
            self.shell.open_url(url);
        } else {
            self.shell.open_url_with_confirmation(url);
        }
    }

    fn request_location(&self, message: &Message) {
        self.dispatcher.hide_single_use_keyboard(message);
        self.shell.inform(Notice::ShareLocationUnavailable);
    }

    fn request_phone(&self, message: &Message) {
        self.dispatcher.hide_single_use_keyboard(message);

        let dispatcher = self.dispatcher.clone();
        let bots = Arc::clone(&self.bots);
        let peer = message.peer;
        let reply_to = message.id;
        self.shell.confirm(
            ConfirmPrompt::share_phone(),
            Box::new(move || {
                dispatcher.show_peer_history(&peer, HistoryPosition::AtEnd);
                bots.share_own_contact(
                    &peer.session,
                    &peer,
                    SendOptions {
                        reply_to: Some(reply_to),
                        clear_draft: false,
                    },
                );
            }),
        );
    }

    fn request_poll(&self, message: &Message, flags: PollRequestFlags) {
        self.dispatcher.hide_single_use_keyboard(message);
        self.dispatcher
            .open_poll_composer(&message.peer, None, flags.chosen, flags.disabled);
    }

    fn switch_inline(&self, message: &Message, query: &str, same_peer: bool) {
        let session = message.session();
        // Activation comes first, even when the message has no bot.
        if self.dispatcher.resolver().resolve(&session).is_none() {
            return;
        }
        let Some(bot) = message.bot.as_ref() else {
            return;
        };

        let switched = if same_peer {
            self.dispatcher.switch_inline_bot_button_received(
                &session,
                query,
                Some(bot),
                Some(message.id),
            );
            true
        } else {
            can_return_inline(bot)
                && self
                    .dispatcher
                    .switch_inline_bot_button_received(&session, query, None, None)
        };

        if !switched {
            self.dispatcher
                .open_inline_switch_layer(&session, &format!("@{} {}", bot.username, query));
        }
    }
}

fn can_return_inline(bot: &BotInfo) -> bool {
    bot.is_bot && bot.inline_return_to.is_some()
}
