//! `sigcheck <executable> [signature]`
//!
//! Checks that a signature still matches exactly once in a game executable on
//! disk. Without a signature argument the configured chat box signature is used.
//!
//! Exit status: 0 for exactly one match, 1 for none or several, 2 when the
//! arguments are wrong, the signature doesn't parse or the file can't be read.

use std::path::Path;
use std::process::ExitCode;

use log::{error, info};
use xiv_chat_sender::{logging, pe, SenderConfig, Signature};

fn scan_file(path: &Path, sig: &Signature) -> std::io::Result<Vec<pe::TextMatch>> {
    let data = std::fs::read(path)?;
    info!("Read {} ({:.1} MB)", path.display(), data.len() as f64 / (1024.0 * 1024.0));
    Ok(pe::scan_text_matches(&data, sig))
}

fn main() -> ExitCode {
    let config = SenderConfig::load_existing();
    logging::setup_logging(config.log_level());

    let mut args = std::env::args().skip(1);
    let Some(exe) = args.next() else {
        eprintln!("usage: sigcheck <executable> [signature]");
        return ExitCode::from(2);
    };

    let sig = match args.next() {
        Some(s) => match Signature::parse(&s) {
            Ok(sig) => sig,
            Err(e) => {
                eprintln!("bad signature: {}", e);
                return ExitCode::from(2);
            }
        },
        None => config.signature(),
    };
    info!("Signature: {}", sig);

    let matches = match scan_file(Path::new(&exe), &sig) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to scan {}: {}", exe, e);
            return ExitCode::from(2);
        }
    };

    for m in &matches {
        match m.rva {
            Some(rva) => println!("file+0x{:X}  rva+0x{:X}", m.file_offset, rva),
            None => println!("file+0x{:X}", m.file_offset),
        }
    }
    println!("{} match(es)", matches.len());

    if matches.len() == 1 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
