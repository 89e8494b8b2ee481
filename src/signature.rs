use std::fmt;
use std::str::FromStr;

use crate::error::SignatureError;

/// Byte pattern with wildcards, e.g. `"48 89 5C 24 ?? 57"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<Option<u8>>,
}

/// `offsets::SEND_CHAT` in token form.
const CHAT_BOX: [Option<u8>; 19] = [
    Some(0x48), Some(0x89), Some(0x5C), Some(0x24), None, Some(0x57), Some(0x48), Some(0x83),
    Some(0xEC), Some(0x20), Some(0x48), Some(0x8B), Some(0xFA), Some(0x48), Some(0x8B),
    Some(0xD9), Some(0x45), Some(0x84), Some(0xC9),
];

impl Signature {
    /// Built-in signature of the chat box routine.
    pub fn chat_box() -> Self {
        Self {
            bytes: CHAT_BOX.to_vec(),
        }
    }

    pub fn parse(sig: &str) -> Result<Self, SignatureError> {
        let mut bytes = Vec::new();
        for (index, token) in sig.split_whitespace().enumerate() {
            if token == "??" || token == "?" {
                bytes.push(None);
                continue;
            }
            if token.len() != 2 {
                return Err(SignatureError::InvalidToken {
                    index,
                    token: token.to_string(),
                });
            }
            let byte = u8::from_str_radix(token, 16).map_err(|_| SignatureError::InvalidToken {
                index,
                token: token.to_string(),
            })?;
            bytes.push(Some(byte));
        }

        // A pattern of only wildcards would match anywhere.
        if bytes.iter().all(Option::is_none) {
            return Err(SignatureError::Empty);
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the pattern matches at the start of `data`.
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(data)
                .all(|(sig, byte)| sig.map_or(true, |s| s == *byte))
    }

    /// Offset of the first match in `data`.
    pub fn find(&self, data: &[u8]) -> Option<usize> {
        if data.len() < self.bytes.len() {
            return None;
        }
        (0..=data.len() - self.bytes.len()).find(|&i| self.matches(&data[i..]))
    }

    /// Offsets of every match in `data`, overlapping matches included.
    pub fn find_all(&self, data: &[u8]) -> Vec<usize> {
        if data.len() < self.bytes.len() {
            return Vec::new();
        }
        (0..=data.len() - self.bytes.len())
            .filter(|&i| self.matches(&data[i..]))
            .collect()
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match byte {
                Some(b) => write!(f, "{:02X}", b)?,
                None => f.write_str("??")?,
            }
        }
        Ok(())
    }
}

/// If the match is a `call rel32` / `jmp rel32`, return the target it points at.
///
/// `data` must start at the matched instruction, which lives at `address`.
pub fn follow_relative_call(address: usize, data: &[u8]) -> usize {
    match data {
        [0xE8 | 0xE9, a, b, c, d, ..] => {
            let rel = i32::from_le_bytes([*a, *b, *c, *d]);
            (address as i64 + 5 + rel as i64) as usize
        }
        _ => address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offsets;

    #[test]
    fn parses_chat_signature() {
        let sig = Signature::parse(offsets::SEND_CHAT).unwrap();
        assert_eq!(sig.len(), 19);
        assert_eq!(sig.to_string(), offsets::SEND_CHAT);
    }

    #[test]
    fn built_in_chat_box_matches_offsets_string() {
        assert_eq!(Signature::chat_box(), Signature::parse(offsets::SEND_CHAT).unwrap());
    }

    #[test]
    fn single_question_mark_is_wildcard() {
        let sig: Signature = "48 ? 05".parse().unwrap();
        assert_eq!(sig.to_string(), "48 ?? 05");
    }

    #[test]
    fn rejects_bad_tokens() {
        assert_eq!(
            Signature::parse("48 ZZ 05"),
            Err(SignatureError::InvalidToken { index: 1, token: "ZZ".into() })
        );
        assert!(matches!(
            Signature::parse("480"),
            Err(SignatureError::InvalidToken { index: 0, .. })
        ));
        assert_eq!(Signature::parse("   "), Err(SignatureError::Empty));
        assert_eq!(Signature::parse("?? ??"), Err(SignatureError::Empty));
    }

    #[test]
    fn finds_pattern_with_wildcards() {
        let sig = Signature::parse("48 89 5C 24 ?? 57").unwrap();
        let data = [0x90, 0x90, 0x48, 0x89, 0x5C, 0x24, 0x10, 0x57, 0xC3];
        assert_eq!(sig.find(&data), Some(2));
        assert_eq!(sig.find(&data[3..]), None);
    }

    #[test]
    fn restarts_after_partial_match() {
        // The first "48 48" would defeat a scanner that doesn't back up.
        let sig = Signature::parse("48 8B 05").unwrap();
        let data = [0x48, 0x48, 0x8B, 0x05];
        assert_eq!(sig.find(&data), Some(1));
    }

    #[test]
    fn find_all_reports_every_match() {
        let sig = Signature::parse("AA ??").unwrap();
        let data = [0xAA, 0xAA, 0x00, 0xAA];
        assert_eq!(sig.find_all(&data), vec![0, 1]);
    }

    #[test]
    fn short_input_never_matches() {
        let sig = Signature::parse("01 02 03").unwrap();
        assert_eq!(sig.find(&[0x01, 0x02]), None);
        assert!(sig.find_all(&[]).is_empty());
    }

    #[test]
    fn follows_relative_calls() {
        // call +0x10 at 0x1000 lands at 0x1000 + 5 + 0x10.
        assert_eq!(follow_relative_call(0x1000, &[0xE8, 0x10, 0, 0, 0]), 0x1015);
        // jmp -5 jumps back onto itself.
        assert_eq!(follow_relative_call(0x1000, &[0xE9, 0xFB, 0xFF, 0xFF, 0xFF]), 0x1000);
        assert_eq!(follow_relative_call(0x1000, &[0x48, 0x89]), 0x1000);
    }
}
