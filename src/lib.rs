//! Send chat messages through the game's own chat box from inside the game process.
//!
//! The chat box routine is found once by signature scanning; each message is
//! checked, laid out in the record the routine expects, and handed over on
//! the game's main thread.
//!
//! ```no_run
//! use xiv_chat_sender::{ChatSender, ControlCharFilter, SenderConfig};
//!
//! let config = SenderConfig::load();
//! xiv_chat_sender::logging::setup_logging(config.log_level());
//! // UIModule::Instance() from the host
//! let ui_module = || -> *mut std::ffi::c_void { std::ptr::null_mut() };
//! let sender = ChatSender::from_current_process(ui_module, ControlCharFilter, &config)?;
//! sender.send_message("/echo hello")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod chatbox;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod offsets;
pub mod payload;
pub mod pe;
pub mod sanitise;
pub mod sender;
pub mod signature;

pub use chatbox::{ChatBoxFn, NativeChatBox, UnavailableChatBox};
pub use config::SenderConfig;
pub use error::{SendError, SignatureError};
pub use memory::{SigScanner, SliceScanner};
pub use payload::ChatPayload;
pub use sanitise::{ControlCharFilter, SanitiseFlags, Sanitiser};
pub use sender::{ChatSender, SendStats, UiModuleProvider};
pub use signature::Signature;
