use log::{debug, info, trace, warn};
use std::io;

use crate::signature::{follow_relative_call, Signature};

/// Pattern scanning over the host's executable code.
pub trait SigScanner {
    /// Address of the first match of `sig`, with `call`/`jmp` matches resolved to their target.
    fn scan_text(&self, sig: &Signature) -> Option<usize>;
}

/// Scans a copy of a code image that was loaded at `base`.
pub struct SliceScanner {
    base: usize,
    data: Vec<u8>,
}

impl SliceScanner {
    pub fn new(base: usize, data: Vec<u8>) -> Self {
        Self { base, data }
    }
}

impl SigScanner for SliceScanner {
    fn scan_text(&self, sig: &Signature) -> Option<usize> {
        let offset = sig.find(&self.data)?;
        trace!("SliceScanner: match at +0x{:X}", offset);
        Some(follow_relative_call(self.base + offset, &self.data[offset..]))
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use log::error;
    use windows::core::PCWSTR;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::ProcessStatus::{GetModuleInformation, MODULEINFO};
    use windows::Win32::System::Threading::GetCurrentProcess;

    use crate::pe;

    const HEADER_PAGE: usize = 0x1000;

    /// Scans the `.text` section of the game executable this library is loaded into.
    pub struct ModuleScanner {
        text_start: usize,
        text_len: usize,
    }

    impl ModuleScanner {
        pub fn current() -> io::Result<Self> {
            let module = unsafe { GetModuleHandleW(PCWSTR::null()) }.map_err(|e| {
                error!("GetModuleHandleW failed: {}", e);
                io::Error::new(io::ErrorKind::NotFound, e.to_string())
            })?;

            let mut module_info = MODULEINFO::default();
            unsafe {
                GetModuleInformation(
                    GetCurrentProcess(),
                    module,
                    &mut module_info,
                    std::mem::size_of::<MODULEINFO>() as u32,
                )
            }
            .map_err(|e| {
                error!("GetModuleInformation failed: {}", e);
                io::Error::new(io::ErrorKind::Other, e.to_string())
            })?;

            let base = module_info.lpBaseOfDll as usize;
            let size = module_info.SizeOfImage as usize;
            info!("Found module base=0x{:X} size=0x{:X}", base, size);

            // The loaded image stays mapped for the lifetime of the process.
            let headers =
                unsafe { std::slice::from_raw_parts(base as *const u8, HEADER_PAGE.min(size)) };
            let text = pe::text_section(headers).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "module has no .text section")
            })?;
            if text.virtual_address + text.virtual_size > size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    ".text section extends past the module image",
                ));
            }

            info!(
                ".text at 0x{:X} ({:.1} MB)",
                base + text.virtual_address,
                text.virtual_size as f64 / (1024.0 * 1024.0)
            );
            Ok(Self {
                text_start: base + text.virtual_address,
                text_len: text.virtual_size,
            })
        }
    }

    impl SigScanner for ModuleScanner {
        fn scan_text(&self, sig: &Signature) -> Option<usize> {
            let text =
                unsafe { std::slice::from_raw_parts(self.text_start as *const u8, self.text_len) };
            let offset = sig.find(text)?;
            debug!("ModuleScanner: match at 0x{:X}", self.text_start + offset);
            Some(follow_relative_call(self.text_start + offset, &text[offset..]))
        }
    }
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};
    use std::ops::Range;
    use std::path::Path;

    const CHUNK: usize = 4 * 1024 * 1024;

    /// Scans the executable mappings of the running binary through `/proc/self/mem`.
    pub struct ModuleScanner {
        regions: Vec<Range<usize>>,
    }

    impl ModuleScanner {
        pub fn current() -> io::Result<Self> {
            let exe = std::fs::read_link("/proc/self/exe")?;
            let maps = std::fs::read_to_string("/proc/self/maps")?;
            let regions = executable_regions(&maps, &exe);
            if regions.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no executable mapping for {}", exe.display()),
                ));
            }
            info!(
                "Found {} executable region(s) for {}",
                regions.len(),
                exe.display()
            );
            Ok(Self { regions })
        }

        fn scan_region(&self, mem: &mut File, region: &Range<usize>, sig: &Signature) -> Option<usize> {
            let size = region.end - region.start;
            let mut off = 0;
            while off < size {
                let read_size = CHUNK.min(size - off);
                let read_addr = region.start + off;
                match read_chunk(mem, read_addr, read_size) {
                    Ok(data) => {
                        if let Some(i) = sig.find(&data) {
                            return Some(follow_relative_call(read_addr + i, &data[i..]));
                        }
                    }
                    Err(e) => debug!("read at 0x{:X} failed: {}", read_addr, e),
                }
                // Overlap at chunk boundaries to catch cross-boundary matches
                if sig.len() > 1 && off + CHUNK < size {
                    off += CHUNK - (sig.len() - 1);
                } else {
                    off += CHUNK;
                }
            }
            None
        }
    }

    impl SigScanner for ModuleScanner {
        fn scan_text(&self, sig: &Signature) -> Option<usize> {
            let mut mem = match File::open("/proc/self/mem") {
                Ok(f) => f,
                Err(e) => {
                    warn!("Failed to open /proc/self/mem: {}", e);
                    return None;
                }
            };
            self.regions
                .iter()
                .find_map(|region| self.scan_region(&mut mem, region, sig))
        }
    }

    fn read_chunk(mem: &mut File, address: usize, size: usize) -> io::Result<Vec<u8>> {
        trace!("Reading /proc/self/mem at 0x{:X} size={}", address, size);
        mem.seek(SeekFrom::Start(address as u64))?;
        let mut buffer = vec![0u8; size];
        let bytes_read = mem.read(&mut buffer)?;
        buffer.truncate(bytes_read);
        Ok(buffer)
    }

    /// Executable mappings backed by `exe`, in address order.
    pub(crate) fn executable_regions(maps: &str, exe: &Path) -> Vec<Range<usize>> {
        maps.lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let range = fields.next()?;
                let perms = fields.next()?;
                // offset, dev, inode
                let path = fields.nth(3)?;
                if !perms.contains('x') || Path::new(path) != exe {
                    return None;
                }
                let (start, end) = range.split_once('-')?;
                let start = usize::from_str_radix(start, 16).ok()?;
                let end = usize::from_str_radix(end, 16).ok()?;
                (end > start).then_some(start..end)
            })
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const MAPS: &str = "\
55d0c0000000-55d0c0001000 r--p 00000000 08:01 1234 /usr/bin/game
55d0c0001000-55d0c0005000 r-xp 00001000 08:01 1234 /usr/bin/game
55d0c0005000-55d0c0006000 rw-p 00005000 08:01 1234 /usr/bin/game
7f0000000000-7f0000002000 r-xp 00000000 08:01 99 /usr/lib/libc.so.6
7ffd00000000-7ffd00021000 rw-p 00000000 00:00 0 [stack]
";

        #[test]
        fn picks_only_executable_mappings_of_the_binary() {
            let regions = executable_regions(MAPS, Path::new("/usr/bin/game"));
            assert_eq!(regions, vec![0x55d0c0001000..0x55d0c0005000]);
        }

        #[test]
        fn anonymous_mappings_are_skipped() {
            let maps = "7f0000000000-7f0000002000 r-xp 00000000 00:00 0\n";
            assert!(executable_regions(maps, Path::new("/usr/bin/game")).is_empty());
        }

        #[test]
        fn current_process_has_code() {
            let scanner = ModuleScanner::current().unwrap();
            assert!(!scanner.regions.is_empty());
        }
    }
}

#[cfg(windows)]
pub use windows_impl::ModuleScanner;

#[cfg(target_os = "linux")]
pub use linux_impl::ModuleScanner;

/// Scanner over the code of the current process.
pub fn create_scanner() -> io::Result<Box<dyn SigScanner>> {
    #[cfg(any(windows, target_os = "linux"))]
    {
        Ok(Box::new(ModuleScanner::current()?))
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        warn!("Signature scanning is not supported on this platform");
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Signature scanning not supported on this platform",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_scanner_reports_absolute_address() {
        let sig = Signature::parse("57 48 83 EC 20").unwrap();
        let scanner = SliceScanner::new(0x14000_0000, vec![0xCC, 0xCC, 0x57, 0x48, 0x83, 0xEC, 0x20]);
        assert_eq!(scanner.scan_text(&sig), Some(0x14000_0002));
    }

    #[test]
    fn slice_scanner_follows_call_matches() {
        let sig = Signature::parse("E8 ?? ?? ?? ?? 90").unwrap();
        let scanner = SliceScanner::new(0x1000, vec![0x90, 0xE8, 0x20, 0, 0, 0, 0x90]);
        assert_eq!(scanner.scan_text(&sig), Some(0x1001 + 5 + 0x20));
    }

    #[test]
    fn slice_scanner_miss() {
        let sig = Signature::parse("DE AD BE EF").unwrap();
        let scanner = SliceScanner::new(0x1000, vec![0xDE, 0xAD, 0xBE]);
        assert_eq!(scanner.scan_text(&sig), None);
    }
}
