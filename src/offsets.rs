// Chat box send path — signatures, record layout and limits.

// ── Signatures ──────────────────────────────────────────────────────
/// Prologue of the UI module's "process chat box" routine.
pub const SEND_CHAT: &str = "48 89 5C 24 ?? 57 48 83 EC 20 48 8B FA 48 8B D9 45 84 C9";

// ── Chat payload record (32 bytes) ──────────────────────────────────
pub const PAYLOAD_TEXT_PTR: usize = 0x00; // *const u8
pub const PAYLOAD_UNK1: usize = 0x08; // u64, always 64
pub const PAYLOAD_TEXT_LEN: usize = 0x10; // u64, byte length including NUL
pub const PAYLOAD_UNK2: usize = 0x18; // u64, always 0
pub const PAYLOAD_SIZE: usize = 0x20;

pub const PAYLOAD_UNK1_VALUE: u64 = 64;
pub const PAYLOAD_UNK2_VALUE: u64 = 0;

/// The game is handed a larger block than the record itself needs.
pub const PAYLOAD_ALLOC_SIZE: usize = 400;
/// Extra bytes after the text; the NUL terminator lands in here.
pub const TEXT_SLACK: usize = 30;

// ── Message limits ──────────────────────────────────────────────────
pub const MAX_MESSAGE_BYTES: usize = 500;
/// Character allow-list passed to the game's string sanitiser for chat input.
pub const CHAT_SANITISE_FLAGS: u32 = 0x27F;
