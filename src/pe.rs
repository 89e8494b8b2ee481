//! Just enough PE header parsing to find the code section of an image,
//! either mapped in memory or as a file on disk.

use log::{debug, info, trace};

use crate::signature::Signature;

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_MAGIC: &[u8; 4] = b"PE\0\0";
const E_LFANEW: usize = 0x3C;
const FILE_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub virtual_address: usize,
    pub virtual_size: usize,
    pub raw_offset: usize,
    pub raw_size: usize,
}

impl Section {
    /// Translate an offset into the file to an RVA, if it falls inside this section's raw data.
    pub fn file_offset_to_rva(&self, offset: usize) -> Option<usize> {
        (offset >= self.raw_offset && offset - self.raw_offset < self.raw_size)
            .then(|| offset - self.raw_offset + self.virtual_address)
    }
}

/// Parse the section table. `headers` must start at the DOS header.
pub fn sections(headers: &[u8]) -> Option<Vec<Section>> {
    if headers.get(..2)? != DOS_MAGIC {
        trace!("pe: missing MZ header");
        return None;
    }
    let nt = read_u32(headers, E_LFANEW)? as usize;
    if headers.get(nt..nt + 4)? != PE_MAGIC {
        trace!("pe: missing PE signature at 0x{:X}", nt);
        return None;
    }

    let file_header = nt + 4;
    let count = read_u16(headers, file_header + 2)? as usize;
    let optional_size = read_u16(headers, file_header + 16)? as usize;
    let table = file_header + FILE_HEADER_SIZE + optional_size;

    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let base = table + i * SECTION_HEADER_SIZE;
        let raw_name = headers.get(base..base + 8)?;
        let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(8);
        sections.push(Section {
            name: String::from_utf8_lossy(&raw_name[..name_len]).into_owned(),
            virtual_size: read_u32(headers, base + 8)? as usize,
            virtual_address: read_u32(headers, base + 12)? as usize,
            raw_size: read_u32(headers, base + 16)? as usize,
            raw_offset: read_u32(headers, base + 20)? as usize,
        });
    }
    debug!("pe: {} sections", sections.len());
    Some(sections)
}

/// The `.text` section, where the game's code lives.
pub fn text_section(headers: &[u8]) -> Option<Section> {
    sections(headers)?.into_iter().find(|s| s.name == ".text")
}

/// A signature hit in an executable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatch {
    pub file_offset: usize,
    /// `None` when the file isn't a PE image.
    pub rva: Option<usize>,
}

/// Every match of `sig` in the `.text` section of a file image. Files that
/// aren't PE images are scanned whole. A section table that claims more raw
/// data than the file holds is cut to the file.
pub fn scan_text_matches(data: &[u8], sig: &Signature) -> Vec<TextMatch> {
    let Some(text) = text_section(data) else {
        info!("No PE .text section, scanning the whole file");
        return sig
            .find_all(data)
            .into_iter()
            .map(|file_offset| TextMatch { file_offset, rva: None })
            .collect();
    };

    let end = text.raw_offset.saturating_add(text.raw_size).min(data.len());
    let start = text.raw_offset.min(end);
    info!(".text raw=0x{:X}..0x{:X} rva=0x{:X}", start, end, text.virtual_address);

    sig.find_all(&data[start..end])
        .into_iter()
        .map(|i| TextMatch {
            file_offset: start + i,
            rva: text.file_offset_to_rva(start + i),
        })
        .collect()
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)
        .and_then(|s| s.try_into().ok())
        .map(u16::from_le_bytes)
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
}
