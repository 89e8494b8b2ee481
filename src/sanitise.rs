use crate::offsets;

/// Allow-list bitmask understood by the game's string sanitiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SanitiseFlags(pub u32);

impl SanitiseFlags {
    pub const CHAT_INPUT: Self = Self(offsets::CHAT_SANITISE_FLAGS);
}

impl Default for SanitiseFlags {
    fn default() -> Self {
        Self::CHAT_INPUT
    }
}

/// The host's text sanitiser. Only used to check a message, never to rewrite it.
pub trait Sanitiser {
    fn sanitise(&self, text: &str, flags: SanitiseFlags) -> String;
}

impl<F> Sanitiser for F
where
    F: Fn(&str, SanitiseFlags) -> String,
{
    fn sanitise(&self, text: &str, flags: SanitiseFlags) -> String {
        self(text, flags)
    }
}

/// Stand-in for hosts that don't expose their sanitiser: drops control characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControlCharFilter;

impl Sanitiser for ControlCharFilter {
    fn sanitise(&self, text: &str, _flags: SanitiseFlags) -> String {
        text.chars().filter(|c| !c.is_control()).collect()
    }
}

/// Whether sanitising `text` leaves its length, in UTF-16 code units, unchanged.
pub fn survives_sanitiser(sanitiser: &dyn Sanitiser, text: &str, flags: SanitiseFlags) -> bool {
    sanitiser.sanitise(text, flags).encode_utf16().count() == text.encode_utf16().count()
}
