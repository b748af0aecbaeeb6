#![warn(missing_docs)]
//! # botdesk-settings
//!
//! ## Purpose
//! Owns the process-wide client settings record and its change signals.
//!
//! ## Responsibilities
//! - Hold screen-lock, layout, proxy, passcode and work-mode settings.
//! - Notify subscribers when a setting group actually changes.
//! - Guarantee a single live instance between [`SettingsRuntime::start`] and
//!   [`SettingsRuntime::finish`].
//! - Export and import the record as JSON.
//!
//! ## Ownership and lifetimes
//! The runtime is created once at startup and shared by reference (or `Arc`).
//! Values are read under a short lock and returned by clone; signal callbacks
//! run after the lock is released, so they may read settings again.
//!
//! ## Error model
//! Starting a second instance and JSON import/export failures return
//! [`SettingsError`].
//!
//! ## Security and privacy notes
//! Proxy passwords are redacted from `Debug` output and never logged.
//!
//! ## Example
//! ```rust
//! use botdesk_settings::{SettingsRuntime, WorkMode};
//!
//! let settings = SettingsRuntime::start().expect("first instance");
//! settings.set_work_mode(WorkMode::TrayOnly);
//! assert_eq!(settings.work_mode(), WorkMode::TrayOnly);
//! settings.finish();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

static STARTED: AtomicBool = AtomicBool::new(false);

/// Column layout of the main window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowLayout {
    /// Chats list or chat only.
    OneColumn,
    /// Chats list and chat.
    #[default]
    Normal,
    /// Chats list, chat and info panel.
    ThreeColumn,
}

/// Width mode of the chat column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatLayout {
    /// Messages span the column.
    #[default]
    Normal,
    /// Messages are centered with a maximum width.
    Wide,
}

/// Protocol of a configured proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyType {
    /// No proxy.
    #[default]
    None,
    /// SOCKS5 proxy.
    Socks5,
    /// HTTP CONNECT proxy.
    Http,
    /// Messenger-specific proxy with a secret.
    Mtproto,
}

/// One configured proxy endpoint.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyData {
    /// Protocol.
    pub kind: ProxyType,
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Login, if any.
    pub user: String,
    /// Password or secret, if any.
    pub password: String,
}

impl fmt::Debug for ProxyData {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProxyData")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ProxyData {
    /// Copy with the password replaced by a placeholder.
    pub fn redacted(&self) -> Self {
        Self {
            password: redact(&self.password),
            ..self.clone()
        }
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "<redacted>".to_string()
    }
}

/// How the proxy selection is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxySettings {
    /// Follow the operating system proxy.
    #[default]
    System,
    /// Use the selected proxy.
    Enabled,
    /// Connect directly.
    Disabled,
}

/// Where the client shows itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkMode {
    /// Window and tray icon.
    #[default]
    WindowAndTray,
    /// Tray icon only.
    TrayOnly,
    /// Window only.
    WindowOnly,
}

/// The settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Screen is locked by the OS.
    pub screen_is_locked: bool,
    /// Main window column layout.
    pub adaptive_window_layout: WindowLayout,
    /// Chat column width mode.
    pub adaptive_chat_layout: ChatLayout,
    /// A notification preview is on screen.
    pub notifications_demo_is_shown: bool,
    /// Try IPv6 connections.
    pub try_ipv6: bool,
    /// Known proxies.
    pub proxies_list: Vec<ProxyData>,
    /// Proxy in use when enabled.
    pub selected_proxy: ProxyData,
    /// Proxy mode.
    pub proxy_settings: ProxySettings,
    /// Route calls through the proxy too.
    pub use_proxy_for_calls: bool,
    /// A local passcode is set.
    pub local_passcode: bool,
    /// Window/tray presence.
    pub work_mode: WorkMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen_is_locked: false,
            adaptive_window_layout: WindowLayout::default(),
            adaptive_chat_layout: ChatLayout::default(),
            notifications_demo_is_shown: false,
            try_ipv6: !cfg!(windows),
            proxies_list: Vec::new(),
            selected_proxy: ProxyData::default(),
            proxy_settings: ProxySettings::default(),
            use_proxy_for_calls: false,
            local_passcode: false,
            work_mode: WorkMode::default(),
        }
    }
}

impl Settings {
    /// Serializes the record as JSON.
    ///
    /// # Errors
    /// Returns [`SettingsError::Encode`] when serialization fails.
    pub fn to_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(SettingsError::Encode)
    }

    /// Parses a record; absent fields take their defaults.
    ///
    /// # Errors
    /// Returns [`SettingsError::Decode`] for invalid JSON or field types.
    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(raw).map_err(SettingsError::Decode)
    }

    /// Copy safe to print or log: every proxy password is masked.
    pub fn redacted(&self) -> Self {
        Self {
            proxies_list: self.proxies_list.iter().map(ProxyData::redacted).collect(),
            selected_proxy: self.selected_proxy.redacted(),
            ..self.clone()
        }
    }
}

/// Handle returned by [`Signal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Change notification without payload.
#[derive(Default)]
pub struct Signal {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
}

impl Signal {
    /// Registers `listener`.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` when it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Calls every listener registered at the time of the call.
    pub fn notify(&self) {
        let listeners: Vec<Listener> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Change signals of the settings record.
#[derive(Default)]
pub struct SettingsSignals {
    /// Window or chat layout changed.
    pub adaptive_changed: Signal,
    /// Proxy, IPv6 or call routing changed.
    pub connection_type_changed: Signal,
    /// Local passcode was set or removed.
    pub local_passcode_changed: Signal,
    /// Work mode changed.
    pub work_mode_changed: Signal,
    /// An open peer chooser must close.
    pub peer_choose_cancel: Signal,
}

/// The single live settings instance.
pub struct SettingsRuntime {
    values: RwLock<Settings>,
    signals: SettingsSignals,
}

impl SettingsRuntime {
    /// Creates the instance with default values.
    ///
    /// # Errors
    /// Returns [`SettingsError::AlreadyStarted`] while another instance lives.
    pub fn start() -> Result<Self, SettingsError> {
        Self::start_with(Settings::default())
    }

    /// Creates the instance with `initial` values.
    ///
    /// # Errors
    /// Returns [`SettingsError::AlreadyStarted`] while another instance lives.
    pub fn start_with(initial: Settings) -> Result<Self, SettingsError> {
        if STARTED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SettingsError::AlreadyStarted);
        }
        info!("settings runtime started");
        Ok(Self {
            values: RwLock::new(initial),
            signals: SettingsSignals::default(),
        })
    }

    /// Returns `true` while an instance lives.
    pub fn started() -> bool {
        STARTED.load(Ordering::Acquire)
    }

    /// Destroys the instance.
    pub fn finish(self) {
        drop(self);
    }

    /// Change signals.
    pub fn signals(&self) -> &SettingsSignals {
        &self.signals
    }

    /// Copy of every value.
    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    /// Replaces every value, notifying the groups that changed.
    pub fn restore(&self, settings: Settings) {
        let Settings {
            screen_is_locked,
            adaptive_window_layout,
            adaptive_chat_layout,
            notifications_demo_is_shown,
            try_ipv6,
            proxies_list,
            selected_proxy,
            proxy_settings,
            use_proxy_for_calls,
            local_passcode,
            work_mode,
        } = settings;

        let (adaptive, connection, passcode, mode) = {
            let mut values = self.write();
            let adaptive = replace(&mut values.adaptive_window_layout, adaptive_window_layout)
                | replace(&mut values.adaptive_chat_layout, adaptive_chat_layout);
            let connection = replace(&mut values.try_ipv6, try_ipv6)
                | replace(&mut values.selected_proxy, selected_proxy)
                | replace(&mut values.proxy_settings, proxy_settings)
                | replace(&mut values.use_proxy_for_calls, use_proxy_for_calls);
            let passcode = replace(&mut values.local_passcode, local_passcode);
            let mode = replace(&mut values.work_mode, work_mode);
            values.screen_is_locked = screen_is_locked;
            values.notifications_demo_is_shown = notifications_demo_is_shown;
            values.proxies_list = proxies_list;
            (adaptive, connection, passcode, mode)
        };

        debug!(adaptive, connection, passcode, mode, "settings restored");
        notify_if(adaptive, &self.signals.adaptive_changed);
        notify_if(connection, &self.signals.connection_type_changed);
        notify_if(passcode, &self.signals.local_passcode_changed);
        notify_if(mode, &self.signals.work_mode_changed);
    }

    /// Screen lock state.
    pub fn screen_is_locked(&self) -> bool {
        self.read().screen_is_locked
    }

    /// Sets screen lock state.
    pub fn set_screen_is_locked(&self, value: bool) {
        self.write().screen_is_locked = value;
    }

    /// Main window column layout.
    pub fn adaptive_window_layout(&self) -> WindowLayout {
        self.read().adaptive_window_layout
    }

    /// Sets the column layout; notifies `adaptive_changed` on change.
    pub fn set_adaptive_window_layout(&self, value: WindowLayout) {
        let changed = replace(&mut self.write().adaptive_window_layout, value);
        notify_if(changed, &self.signals.adaptive_changed);
    }

    /// Chat column width mode.
    pub fn adaptive_chat_layout(&self) -> ChatLayout {
        self.read().adaptive_chat_layout
    }

    /// Sets the chat width mode; notifies `adaptive_changed` on change.
    pub fn set_adaptive_chat_layout(&self, value: ChatLayout) {
        let changed = replace(&mut self.write().adaptive_chat_layout, value);
        notify_if(changed, &self.signals.adaptive_changed);
    }

    /// Whether a notification preview is shown.
    pub fn notifications_demo_is_shown(&self) -> bool {
        self.read().notifications_demo_is_shown
    }

    /// Sets the notification preview flag.
    pub fn set_notifications_demo_is_shown(&self, value: bool) {
        self.write().notifications_demo_is_shown = value;
    }

    /// Whether IPv6 is tried.
    pub fn try_ipv6(&self) -> bool {
        self.read().try_ipv6
    }

    /// Sets IPv6 use; notifies `connection_type_changed` on change.
    pub fn set_try_ipv6(&self, value: bool) {
        let changed = replace(&mut self.write().try_ipv6, value);
        notify_if(changed, &self.signals.connection_type_changed);
    }

    /// Known proxies.
    pub fn proxies_list(&self) -> Vec<ProxyData> {
        self.read().proxies_list.clone()
    }

    /// Replaces the known proxies.
    pub fn set_proxies_list(&self, value: Vec<ProxyData>) {
        self.write().proxies_list = value;
    }

    /// Selected proxy.
    pub fn selected_proxy(&self) -> ProxyData {
        self.read().selected_proxy.clone()
    }

    /// Selects a proxy; notifies `connection_type_changed` on change.
    pub fn set_selected_proxy(&self, value: ProxyData) {
        let changed = replace(&mut self.write().selected_proxy, value);
        notify_if(changed, &self.signals.connection_type_changed);
    }

    /// Proxy mode.
    pub fn proxy_settings(&self) -> ProxySettings {
        self.read().proxy_settings
    }

    /// Sets the proxy mode; notifies `connection_type_changed` on change.
    pub fn set_proxy_settings(&self, value: ProxySettings) {
        let changed = replace(&mut self.write().proxy_settings, value);
        notify_if(changed, &self.signals.connection_type_changed);
    }

    /// Whether calls use the proxy.
    pub fn use_proxy_for_calls(&self) -> bool {
        self.read().use_proxy_for_calls
    }

    /// Sets call proxying; notifies `connection_type_changed` on change.
    pub fn set_use_proxy_for_calls(&self, value: bool) {
        let changed = replace(&mut self.write().use_proxy_for_calls, value);
        notify_if(changed, &self.signals.connection_type_changed);
    }

    /// Whether a local passcode is set.
    pub fn local_passcode(&self) -> bool {
        self.read().local_passcode
    }

    /// Sets the passcode flag; notifies `local_passcode_changed` on change.
    pub fn set_local_passcode(&self, value: bool) {
        let changed = replace(&mut self.write().local_passcode, value);
        notify_if(changed, &self.signals.local_passcode_changed);
    }

    /// Window/tray presence.
    pub fn work_mode(&self) -> WorkMode {
        self.read().work_mode
    }

    /// Sets the work mode; notifies `work_mode_changed` on change.
    pub fn set_work_mode(&self, value: WorkMode) {
        let changed = replace(&mut self.write().work_mode, value);
        notify_if(changed, &self.signals.work_mode_changed);
    }

    /// Asks an open peer chooser to close.
    pub fn cancel_peer_choose(&self) {
        self.signals.peer_choose_cancel.notify();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SettingsRuntime {
    fn drop(&mut self) {
        STARTED.store(false, Ordering::Release);
        info!("settings runtime finished");
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn notify_if(changed: bool, signal: &Signal) {
    if changed {
        signal.notify();
    }
}

/// Settings errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Another instance is alive.
    #[error("settings runtime already started")]
    AlreadyStarted,
    /// JSON export failure.
    #[error("settings encode failure: {0}")]
    Encode(#[source] serde_json::Error),
    /// JSON import failure.
    #[error("settings decode failure: {0}")]
    Decode(#[source] serde_json::Error),
}
