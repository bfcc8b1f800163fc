use std::path::PathBuf;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_MAX_UPLOAD_MB: usize = 512;
const DEFAULT_MAX_SESSIONS: usize = 64;

/// Runtime settings, read once from the environment at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Listen address (`FILEMILL_ADDR`)
    pub addr: String,
    /// ffmpeg executable (`FFMPEG_PATH`)
    pub ffmpeg_path: String,
    /// pdfium shared library file (`PDFIUM_LIB_PATH`); the system library when unset
    pub pdfium_library_path: Option<PathBuf>,
    /// Upload limit in bytes (`FILEMILL_MAX_UPLOAD_MB`)
    pub max_upload_bytes: usize,
    /// Sessions kept before the oldest is dropped (`FILEMILL_MAX_SESSIONS`)
    pub max_sessions: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            ffmpeg_path: DEFAULT_FFMPEG.to_string(),
            pdfium_library_path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_upload_bytes = match non_empty("FILEMILL_MAX_UPLOAD_MB") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(mb) => mb.saturating_mul(1024 * 1024),
                Err(_) => {
                    tracing::warn!(
                        "Ignoring FILEMILL_MAX_UPLOAD_MB={:?}, using {} MB",
                        raw,
                        DEFAULT_MAX_UPLOAD_MB
                    );
                    defaults.max_upload_bytes
                }
            },
            None => defaults.max_upload_bytes,
        };

        let max_sessions = match non_empty("FILEMILL_MAX_SESSIONS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(
                        "Ignoring FILEMILL_MAX_SESSIONS={:?}, using {}",
                        raw,
                        DEFAULT_MAX_SESSIONS
                    );
                    defaults.max_sessions
                }
            },
            None => defaults.max_sessions,
        };

        Self {
            addr: non_empty("FILEMILL_ADDR").unwrap_or(defaults.addr),
            ffmpeg_path: non_empty("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            pdfium_library_path: non_empty("PDFIUM_LIB_PATH").map(PathBuf::from),
            max_upload_bytes,
            max_sessions,
        }
    }
}
