#![warn(missing_docs)]
//! # botdesk-ui
//!
//! ## Purpose
//! Defines the UI-facing collaborators the facade drives.
//!
//! ## Responsibilities
//! - [`UiShell`]: process-wide UI effects (toasts, notices, confirmation
//!   prompts, link opening, main window focus).
//! - [`SessionWindow`]: the window bound to one session and the chat
//!   operations it offers.
//! - Value types carried through those calls ([`Notice`], [`ConfirmPrompt`],
//!   [`HistoryPosition`]).
//!
//! ## Data flow
//! Router and payment logic call into these traits as opaque side effects; no
//! return value except the boolean "handled" replies is consumed.
//!
//! ## Ownership and lifetimes
//! Windows are shared as `Arc<dyn SessionWindow>` handles so a resolved window
//! can be captured by deferred confirmation callbacks.
//!
//! ## Security and privacy notes
//! Nothing passed through these traits contains payment credentials.

use botdesk_core::{BotInfo, MsgId, Peer, PeerId, PollFlags, SessionId, UserId};

/// User-visible informational notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Location sharing is not available from a bot keyboard.
    ShareLocationUnavailable,
    /// The payment provider requested extra verification.
    PaymentVerificationNeeded,
}

impl Notice {
    /// Localization key for the notice text.
    pub fn lang_key(self) -> &'static str {
        match self {
            Notice::ShareLocationUnavailable => "lng_bot_share_location_unavailable",
            Notice::PaymentVerificationNeeded => "payments.paymentVerificationNeeded",
        }
    }
}

/// Confirmation dialog content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    /// Localization key of the body text.
    pub text_key: &'static str,
    /// Localization key of the accept button.
    pub confirm_key: &'static str,
}

impl ConfirmPrompt {
    /// Prompt shown before sharing the user's phone number with a bot.
    pub fn share_phone() -> Self {
        Self {
            text_key: "lng_bot_share_phone",
            confirm_key: "lng_bot_share_phone_confirm",
        }
    }
}

/// Where to scroll a chat history when showing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPosition {
    /// Scroll to one message.
    AtMessage(MsgId),
    /// Scroll to the newest message.
    AtEnd,
}

/// Callback run once when the user accepts a confirmation prompt.
pub type OnAccept = Box<dyn FnOnce() + Send>;

/// Process-wide UI effects.
pub trait UiShell: Send + Sync {
    /// Shows a transient toast with raw text.
    fn show_toast(&self, text: &str);

    /// Shows a modal informational notice.
    fn inform(&self, notice: Notice);

    /// Shows a confirmation prompt; `on_accept` runs only when accepted.
    fn confirm(&self, prompt: ConfirmPrompt, on_accept: OnAccept);

    /// Brings the main window to the front.
    fn activate_main_window(&self);

    /// Opens a link without confirmation.
    fn open_url(&self, url: &str);

    /// Opens a link after the user confirmed the full target.
    fn open_url_with_confirmation(&self, url: &str);

    /// Closes settings and any layer shown above the chats.
    fn hide_settings_and_layer(&self);

    /// Closes the media viewer.
    fn hide_media_view(&self);
}

/// Window bound to one session.
pub trait SessionWindow: Send + Sync {
    /// Session this window currently serves.
    fn session_id(&self) -> SessionId;

    /// Sends `command` to `peer`, addressed to `bot` when known.
    fn send_bot_command(
        &self,
        peer: &Peer,
        bot: Option<UserId>,
        command: &str,
        reply_to: Option<MsgId>,
    );

    /// Hides a single-use bot keyboard shown for `message` in `peer`.
    fn hide_single_use_keyboard(&self, peer: &Peer, message: MsgId);

    /// Inserts `command` into the message field. Returns `true` when inserted.
    fn insert_bot_command(&self, command: &str) -> bool;

    /// Opens the poll composer for `peer`.
    fn open_poll_composer(
        &self,
        peer: &Peer,
        reply_to: Option<MsgId>,
        chosen: PollFlags,
        disabled: PollFlags,
    );

    /// Delivers an inline-switch query. Returns `true` when it was handled.
    fn switch_inline_bot_button_received(
        &self,
        query: &str,
        same_peer_bot: Option<&BotInfo>,
        same_peer_reply_to: Option<MsgId>,
    ) -> bool;

    /// Opens the chat chooser prefilled with an inline query.
    fn open_inline_switch_layer(&self, text: &str);

    /// Shows a chat history, clearing the section stack.
    fn show_peer_history(&self, peer: PeerId, position: HistoryPosition);

    /// Shows the chats list, clearing the section stack.
    fn show_chats_list(&self);

    /// Shows the profile of `peer`.
    fn show_peer_info(&self, peer: &Peer);

    /// Returns `true` while a chat folder is open.
    fn has_opened_folder(&self) -> bool;

    /// Closes the open chat folder.
    fn close_folder(&self);

    /// Starts a message search, optionally scoped to one chat.
    fn search_messages(&self, query: &str, in_chat: Option<PeerId>);
}
