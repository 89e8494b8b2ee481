use log::{info, warn};
use std::ffi::c_void;

use crate::memory::SigScanner;
use crate::signature::Signature;

/// `UIModule::ProcessChatBox(this, message, unused, a4)`
pub type ProcessChatBoxFn =
    unsafe extern "system" fn(ui_module: *mut c_void, message: *mut c_void, unused: *mut c_void, a4: u8);

/// The game's chat box routine, or a stand-in when it could not be found.
pub trait ChatBoxFn {
    fn is_available(&self) -> bool {
        true
    }

    /// # Safety
    /// `ui_module` must be the live UI module and `message` must point at a
    /// valid chat payload that outlives the call.
    unsafe fn invoke(&self, ui_module: *mut c_void, message: *mut c_void, unused: *mut c_void, flag: u8);
}

/// Resolved entry point inside the game executable.
pub struct NativeChatBox {
    func: ProcessChatBoxFn,
}

impl NativeChatBox {
    /// # Safety
    /// `address` must be the entry of a function with the `ProcessChatBoxFn` signature.
    pub unsafe fn from_address(address: usize) -> Self {
        Self {
            func: std::mem::transmute::<usize, ProcessChatBoxFn>(address),
        }
    }

    pub fn address(&self) -> usize {
        self.func as usize
    }
}

impl ChatBoxFn for NativeChatBox {
    unsafe fn invoke(&self, ui_module: *mut c_void, message: *mut c_void, unused: *mut c_void, flag: u8) {
        (self.func)(ui_module, message, unused, flag)
    }
}

/// Selected when the signature scan missed. Never called by the sender.
pub struct UnavailableChatBox;

impl ChatBoxFn for UnavailableChatBox {
    fn is_available(&self) -> bool {
        false
    }

    unsafe fn invoke(&self, _ui_module: *mut c_void, _message: *mut c_void, _unused: *mut c_void, _flag: u8) {
        warn!("chat box routine is unavailable, message dropped");
    }
}

/// Scan for the chat box routine once. A miss is not an error here; it is
/// reported when a message is sent.
pub fn locate(scanner: &dyn SigScanner, sig: &Signature) -> Box<dyn ChatBoxFn> {
    match scanner.scan_text(sig) {
        Some(address) => {
            info!("Found ProcessChatBox at 0x{:X}", address);
            Box::new(unsafe { NativeChatBox::from_address(address) })
        }
        None => {
            warn!("Could not find signature for chat sending: {}", sig);
            Box::new(UnavailableChatBox)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SliceScanner;
    use crate::offsets;

    #[test]
    fn locate_resolves_match() {
        let sig = Signature::parse(offsets::SEND_CHAT).unwrap();
        let mut code = vec![0xCC; 8];
        code.extend_from_slice(&[
            0x48, 0x89, 0x5C, 0x24, 0x08, 0x57, 0x48, 0x83, 0xEC, 0x20, 0x48, 0x8B, 0xFA, 0x48,
            0x8B, 0xD9, 0x45, 0x84, 0xC9,
        ]);
        let scanner = SliceScanner::new(0x1_4000_0000, code);
        let chat_box = locate(&scanner, &sig);
        assert!(chat_box.is_available());
    }

    #[test]
    fn locate_miss_is_unavailable() {
        let sig = Signature::parse(offsets::SEND_CHAT).unwrap();
        let scanner = SliceScanner::new(0x1000, vec![0xCC; 64]);
        assert!(!locate(&scanner, &sig).is_available());
    }

    unsafe extern "system" fn stub(_: *mut c_void, _: *mut c_void, _: *mut c_void, _: u8) {}

    #[test]
    fn native_chat_box_keeps_address() {
        let address = stub as usize;
        let chat_box = unsafe { NativeChatBox::from_address(address) };
        assert_eq!(chat_box.address(), address);
        unsafe {
            chat_box.invoke(std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null_mut(), 0)
        };
    }
}
