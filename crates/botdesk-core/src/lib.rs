#![warn(missing_docs)]
//! # botdesk-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `botdesk` workspace.
//!
//! ## Responsibilities
//! - Represent sessions, peers, bots, messages and their reply markup.
//! - Locate a button by `(row, column)` inside a message markup.
//! - Decode a button's opaque payload into a typed [`ButtonAction`].
//! - Decode poll-request flags carried by `RequestPoll` buttons.
//!
//! ## Data flow
//! The UI reports a press as `(message, row, column)`. Callers look the button
//! up with [`Message::button`] and convert it with [`Button::action`]; the
//! router then dispatches on the resulting [`ButtonAction`].
//!
//! ## Ownership and lifetimes
//! Messages own their markup. Actions own copies of the payload text, so a
//! dispatched action stays valid even if the source message is dropped while
//! the action runs.
//!
//! ## Example
//! ```rust
//! use botdesk_core::{Button, ButtonAction, ButtonKind, PollFlag};
//!
//! let button = Button::new(ButtonKind::RequestPoll, "Quiz", vec![1]);
//! let ButtonAction::RequestPoll(flags) = button.action() else {
//!     unreachable!();
//! };
//! assert!(flags.chosen.contains(PollFlag::Quiz));
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifier of one authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// Identifier of the account a session is authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

/// Identifier of a chat (user, group or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub i64);

/// Identifier of a user account, bots included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Message identifier inside one chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MsgId(pub i64);

impl MsgId {
    /// Returns `true` for ids assigned by the server.
    ///
    /// Locally created messages carry non-positive ids and cannot be replied
    /// to.
    pub fn is_server(self) -> bool {
        self.0 > 0
    }

    /// Returns the id as a reply target, or `None` for local messages.
    pub fn as_reply_target(self) -> Option<MsgId> {
        self.is_server().then_some(self)
    }
}

/// Handle to one authenticated account connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    /// Session identity.
    pub id: SessionId,
    /// Account the session belongs to.
    pub account: AccountId,
}

/// Kind of chat a peer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerKind {
    /// One-to-one chat with a user or bot.
    User,
    /// Basic or super group.
    Group,
    /// Broadcast channel.
    Channel,
}

/// A chat, scoped to the session it was loaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Chat identity.
    pub id: PeerId,
    /// Session owning this chat.
    pub session: Session,
    /// Chat kind.
    pub kind: PeerKind,
}

impl Peer {
    /// Returns `true` for one-to-one chats.
    pub fn is_user(&self) -> bool {
        self.kind == PeerKind::User
    }
}

/// Bot metadata relevant for button routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotInfo {
    /// Bot user id.
    pub user_id: UserId,
    /// Public username without the leading `@`.
    pub username: String,
    /// Whether the bot carries a verification badge.
    pub verified: bool,
    /// Whether the user is actually a bot account.
    pub is_bot: bool,
    /// Chat to return to after an inline-mode switch started elsewhere.
    pub inline_return_to: Option<PeerId>,
}

/// Kind tag of a markup button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonKind {
    /// Sends the button text as a bot command.
    Default,
    /// Sends callback data to the bot.
    Callback,
    /// Sends callback data after a two-factor password check.
    CallbackWithPassword,
    /// Launches a game; routed as a callback.
    Game,
    /// Starts the payment flow.
    Buy,
    /// Opens a link.
    Url,
    /// Requests the user's location.
    RequestLocation,
    /// Requests the user's phone number.
    RequestPhone,
    /// Requests a poll from the user.
    RequestPoll,
    /// Switches to inline mode in a chosen chat.
    SwitchInline,
    /// Switches to inline mode in the current chat.
    SwitchInlineSame,
    /// Runs the URL authorization flow.
    Auth,
}

/// One interactive control attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Kind tag.
    pub kind: ButtonKind,
    /// Display text.
    pub text: String,
    /// Opaque payload interpreted per kind.
    pub data: Vec<u8>,
}

impl Button {
    /// Creates a button.
    pub fn new(kind: ButtonKind, text: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind,
            text: text.into(),
            data,
        }
    }

    /// Decodes the button into its typed action.
    ///
    /// Text payloads are decoded as UTF-8 with invalid sequences replaced.
    pub fn action(&self) -> ButtonAction {
        match self.kind {
            ButtonKind::Default => ButtonAction::SendCommand {
                command: self.text.clone(),
            },
            ButtonKind::Callback | ButtonKind::Game => ButtonAction::Callback,
            ButtonKind::CallbackWithPassword => ButtonAction::CallbackWithPassword,
            ButtonKind::Buy => ButtonAction::Buy,
            ButtonKind::Url => ButtonAction::OpenUrl {
                url: self.data_text(),
            },
            ButtonKind::RequestLocation => ButtonAction::RequestLocation,
            ButtonKind::RequestPhone => ButtonAction::RequestPhone,
            ButtonKind::RequestPoll => ButtonAction::RequestPoll(decode_poll_request(&self.data)),
            ButtonKind::SwitchInline => ButtonAction::SwitchInline {
                query: self.data_text(),
                same_peer: false,
            },
            ButtonKind::SwitchInlineSame => ButtonAction::SwitchInline {
                query: self.data_text(),
                same_peer: true,
            },
            ButtonKind::Auth => ButtonAction::UrlAuth,
        }
    }

    fn data_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Typed action decoded from a [`Button`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Send `command` to the chat as a bot command.
    SendCommand {
        /// Owned copy of the button text.
        command: String,
    },
    /// Send callback data.
    Callback,
    /// Send callback data guarded by a password check.
    CallbackWithPassword,
    /// Run the payment handshake.
    Buy,
    /// Open a link.
    OpenUrl {
        /// Link target as carried by the button.
        url: String,
    },
    /// Location request (unsupported from this path).
    RequestLocation,
    /// Phone number request.
    RequestPhone,
    /// Poll request with decoded composer flags.
    RequestPoll(PollRequestFlags),
    /// Inline-mode switch.
    SwitchInline {
        /// Query to prefill.
        query: String,
        /// `true` when the switch must stay in the current chat.
        same_peer: bool,
    },
    /// URL authorization.
    UrlAuth,
}

/// Position of a button inside a message markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ButtonPosition {
    /// Zero-based row index.
    pub row: usize,
    /// Zero-based column index inside the row.
    pub column: usize,
}

/// Rows of buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMarkup {
    /// Button rows, top to bottom.
    pub rows: Vec<Vec<Button>>,
}

impl ReplyMarkup {
    /// Creates markup from rows.
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Returns the button at `position`, if present.
    pub fn button(&self, position: ButtonPosition) -> Option<&Button> {
        self.rows.get(position.row)?.get(position.column)
    }
}

/// A message from chat history, reduced to what routing needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: MsgId,
    /// Chat owning the message.
    pub peer: Peer,
    /// Original author when it is a user account.
    pub from_user: Option<UserId>,
    /// Bot the message was sent by or via.
    pub bot: Option<BotInfo>,
    /// Attached buttons.
    pub markup: ReplyMarkup,
}

impl Message {
    /// Session the message was loaded in.
    pub fn session(&self) -> Session {
        self.peer.session
    }

    /// Returns the button at `(row, column)`, if present.
    pub fn button(&self, position: ButtonPosition) -> Option<&Button> {
        self.markup.button(position)
    }
}

/// Poll option that a request may preselect or lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollFlag {
    /// Quiz mode with one correct answer.
    Quiz,
}

impl PollFlag {
    fn bit(self) -> u8 {
        match self {
            PollFlag::Quiz => 0b0000_0001,
        }
    }
}

/// Small set of [`PollFlag`] values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PollFlags(u8);

impl PollFlags {
    /// Empty set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Returns `true` when no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when `flag` is set.
    pub fn contains(self, flag: PollFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Adds `flag` to the set.
    pub fn insert(&mut self, flag: PollFlag) {
        self.0 |= flag.bit();
    }
}

impl From<PollFlag> for PollFlags {
    fn from(flag: PollFlag) -> Self {
        Self(flag.bit())
    }
}

/// Poll composer flags requested by a `RequestPoll` button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollRequestFlags {
    /// Flags preselected in the composer.
    pub chosen: PollFlags,
    /// Flags the user may not toggle.
    pub disabled: PollFlags,
}

/// Decodes `RequestPoll` payload bytes.
///
/// - empty payload: the user picks freely;
/// - any payload: quiz mode is locked;
/// - non-zero first byte: quiz mode is locked on.
pub fn decode_poll_request(data: &[u8]) -> PollRequestFlags {
    let mut flags = PollRequestFlags::default();
    if let Some(&first) = data.first() {
        flags.disabled.insert(PollFlag::Quiz);
        if first != 0 {
            flags.chosen.insert(PollFlag::Quiz);
        }
    }
    flags
}

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync {
    /// Current Unix epoch milliseconds.
    fn now_ms(&self) -> u64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default()
    }
}
