use log::{debug, info, warn};
use std::cell::Cell;
use std::ffi::c_void;
use std::io;
use std::path::PathBuf;

use crate::chatbox::{self, ChatBoxFn};
use crate::config::{self, SenderConfig};
use crate::error::SendError;
use crate::logging::{self, truncate_for_log};
use crate::memory::{self, SigScanner};
use crate::offsets;
use crate::payload::{AllocTracker, PayloadGuard};
use crate::sanitise::{self, SanitiseFlags, Sanitiser};

/// Hands out the game's current `UIModule` instance.
pub trait UiModuleProvider {
    fn ui_module(&self) -> *mut c_void;
}

impl<F> UiModuleProvider for F
where
    F: Fn() -> *mut c_void,
{
    fn ui_module(&self) -> *mut c_void {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendStats {
    pub sent: u64,
    pub rejected: u64,
    pub live_allocations: usize,
    pub allocations: u64,
    pub releases: u64,
}

/// Sends chat messages through the game's chat box, as if typed by the player.
///
/// Must be used from the game's main thread; the sender is not `Sync`.
pub struct ChatSender {
    chat_box: Box<dyn ChatBoxFn>,
    ui_module: Box<dyn UiModuleProvider>,
    sanitiser: Box<dyn Sanitiser>,
    flags: SanitiseFlags,
    alloc_size: usize,
    history_dir: Option<PathBuf>,
    allocs: AllocTracker,
    sent: Cell<u64>,
    rejected: Cell<u64>,
}

impl ChatSender {
    /// Look up the chat box routine with `scanner`. A failed scan still yields
    /// a sender; every send then fails with [`SendError::Unavailable`].
    pub fn new(
        scanner: &dyn SigScanner,
        ui_module: impl UiModuleProvider + 'static,
        sanitiser: impl Sanitiser + 'static,
        config: &SenderConfig,
    ) -> Self {
        let chat_box = chatbox::locate(scanner, &config.signature());
        Self::with_chat_box(chat_box, ui_module, sanitiser, config)
    }

    /// Scan the code of the process this library is loaded into.
    pub fn from_current_process(
        ui_module: impl UiModuleProvider + 'static,
        sanitiser: impl Sanitiser + 'static,
        config: &SenderConfig,
    ) -> io::Result<Self> {
        let scanner = memory::create_scanner()?;
        Ok(Self::new(scanner.as_ref(), ui_module, sanitiser, config))
    }

    pub fn with_chat_box(
        chat_box: Box<dyn ChatBoxFn>,
        ui_module: impl UiModuleProvider + 'static,
        sanitiser: impl Sanitiser + 'static,
        config: &SenderConfig,
    ) -> Self {
        Self {
            chat_box,
            ui_module: Box::new(ui_module),
            sanitiser: Box::new(sanitiser),
            flags: config.sanitise_flags(),
            alloc_size: config.payload_alloc_size(),
            history_dir: config.record_history.then(config::config_dir),
            allocs: AllocTracker::default(),
            sent: Cell::new(0),
            rejected: Cell::new(0),
        }
    }

    /// Record accepted messages in `dir` instead of the config directory.
    pub fn with_history_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.history_dir = dir;
        self
    }

    pub fn is_available(&self) -> bool {
        self.chat_box.is_available()
    }

    /// Check `message` without sending it.
    pub fn validate(&self, message: &str) -> Result<(), SendError> {
        if !self.is_available() {
            return Err(SendError::Unavailable);
        }

        let len = message.len();
        if len == 0 {
            return Err(SendError::Empty);
        }
        if len > offsets::MAX_MESSAGE_BYTES {
            return Err(SendError::TooLong { len });
        }

        if !sanitise::survives_sanitiser(self.sanitiser.as_ref(), message, self.flags) {
            return Err(SendError::InvalidCharacters);
        }
        Ok(())
    }

    /// Send `message` as if the player typed it into the chat box. Commands
    /// (`/say`, `/echo`, ...) are processed by the game the same way.
    pub fn send_message(&self, message: &str) -> Result<(), SendError> {
        if let Err(e) = self.validate(message) {
            warn!(
                "Rejected chat message \"{}\": {}",
                truncate_for_log(message, 80),
                e
            );
            self.rejected.set(self.rejected.get() + 1);
            return Err(e);
        }

        unsafe { self.dispatch(message.as_bytes()) };

        if let Some(dir) = &self.history_dir {
            logging::append_sent_history(dir, message);
        }
        Ok(())
    }

    /// Send raw bytes without length or character checks.
    ///
    /// # Safety
    /// The game trusts the contents; bytes it would normally strip can crash
    /// it or get the player flagged. Must be called from the game's main thread.
    pub unsafe fn send_message_unsafe(&self, message: &[u8]) -> Result<(), SendError> {
        if !self.is_available() {
            self.rejected.set(self.rejected.get() + 1);
            return Err(SendError::Unavailable);
        }
        self.dispatch(message);
        Ok(())
    }

    unsafe fn dispatch(&self, message: &[u8]) {
        let ui_module = self.ui_module.ui_module();
        let mut payload = PayloadGuard::build(message, self.alloc_size, &self.allocs);
        debug!(
            "ProcessChatBox(ui_module={:p}, len={}, alloc={})",
            ui_module,
            payload.payload().text_len,
            payload.record_len()
        );
        self.chat_box
            .invoke(ui_module, payload.record_ptr(), std::ptr::null_mut(), 0);
        drop(payload);
        self.sent.set(self.sent.get() + 1);
    }

    pub fn stats(&self) -> SendStats {
        SendStats {
            sent: self.sent.get(),
            rejected: self.rejected.get(),
            live_allocations: self.allocs.live(),
            allocations: self.allocs.allocated(),
            releases: self.allocs.released(),
        }
    }
}

impl Drop for ChatSender {
    fn drop(&mut self) {
        let stats = self.stats();
        info!(
            "ChatSender done: {} sent, {} rejected",
            stats.sent, stats.rejected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbox::UnavailableChatBox;
    use crate::sanitise::ControlCharFilter;

    fn null_ui() -> *mut c_void {
        std::ptr::null_mut()
    }

    #[test]
    fn validate_checks_in_order() {
        let sender = ChatSender::with_chat_box(
            Box::new(UnavailableChatBox),
            null_ui,
            ControlCharFilter,
            &SenderConfig::default(),
        );
        // Unavailable wins even over an empty message.
        assert_eq!(sender.validate(""), Err(SendError::Unavailable));
        assert_eq!(sender.send_message("hello"), Err(SendError::Unavailable));
        assert_eq!(sender.stats().rejected, 1);
        assert_eq!(sender.stats().allocations, 0);
    }

    #[test]
    fn unsafe_send_still_needs_chat_box() {
        let sender = ChatSender::with_chat_box(
            Box::new(UnavailableChatBox),
            null_ui,
            ControlCharFilter,
            &SenderConfig::default(),
        );
        assert_eq!(
            unsafe { sender.send_message_unsafe(b"hi") },
            Err(SendError::Unavailable)
        );
        assert_eq!(sender.stats().allocations, 0);
    }

    #[test]
    fn error_kinds() {
        assert!(!SendError::Unavailable.is_invalid_argument());
        assert!(SendError::Empty.is_invalid_argument());
        assert!(SendError::TooLong { len: 501 }.is_invalid_argument());
        assert!(SendError::InvalidCharacters.is_invalid_argument());
        assert_eq!(
            SendError::TooLong { len: 501 }.to_string(),
            "message is 501 bytes, longer than 500 bytes"
        );
    }
}
