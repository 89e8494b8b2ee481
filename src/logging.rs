use log::error;
use std::io::Write;
use std::path::Path;

use crate::config;

pub const LOG_FILE: &str = "xiv-chat-sender.log";
pub const HISTORY_FILE: &str = "sent.history";

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

fn rotate_file(path: &Path) {
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.len() >= MAX_LOG_SIZE {
            let old = path.with_extension("old");
            let _ = std::fs::rename(path, old);
        }
    }
}

/// Log to stderr and to a rotating file next to the executable.
/// Calling this twice leaves the first logger in place.
pub fn setup_logging(level: log::LevelFilter) {
    let log_path = config::config_dir().join(LOG_FILE);
    rotate_file(&log_path);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_millis(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(file) = log_file {
        dispatch = dispatch.chain(file);
    } else {
        eprintln!("Warning: could not open log file {}", log_path.display());
    }

    if let Err(e) = dispatch.apply() {
        eprintln!("Logger already initialized: {}", e);
    }
}

/// Append an accepted message to the sent history in `dir`.
pub fn append_sent_history(dir: &Path, message: &str) {
    let history_path = dir.join(HISTORY_FILE);
    rotate_file(&history_path);

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&history_path)
    else {
        error!("Failed to open sent history file");
        return;
    };

    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    if let Err(e) = writeln!(file, "[{}] {}", now, message) {
        error!("Failed to write sent history: {}", e);
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncate_for_log(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
