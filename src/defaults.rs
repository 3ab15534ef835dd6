//! Default configuration constants for colloquy.
//!
//! Shared between the config layer, the CLI and the session server so that
//! every entry point agrees on the same fallbacks.

/// Messages API endpoint of the upstream generator.
pub const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Value sent in the `anthropic-version` header.
pub const API_VERSION: &str = "2023-06-01";

/// Default generation model.
pub const MODEL: &str = "claude-sonnet-4-5";

/// Upper bound on generated tokens per debate.
pub const MAX_TOKENS: u32 = 4096;

/// Whole-request timeout for a streaming debate, in seconds.
pub const TIMEOUT_SECS: u64 = 120;

/// Environment variable that holds the upstream API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Longest speaker id (in bytes) the marker scanner will wait for.
///
/// A `[` followed by more than this many id bytes is treated as prose, which
/// keeps the pending buffer bounded while a speaker is active.
pub const MAX_SPEAKER_ID_LEN: usize = 64;

/// Speaker id of the built-in moderator voice.
pub const MODERATOR_ID: &str = "moderator";

/// Default log level when neither `RUST_LOG` nor `-v` is given.
pub const LOG_LEVEL: &str = "info";

/// Socket file name used under `$XDG_RUNTIME_DIR`.
pub const SOCKET_NAME: &str = "colloquy.sock";

/// Read size for raw text sources.
pub const READ_CHUNK_BYTES: usize = 4096;

/// Minimum topic length (characters, after trimming).
pub const TOPIC_MIN_CHARS: usize = 10;

/// Maximum topic length (characters, after trimming).
pub const TOPIC_MAX_CHARS: usize = 500;

/// Minimum number of panelists in a debate request.
pub const MIN_PANELISTS: usize = 2;

/// Maximum number of panelists in a debate request.
pub const MAX_PANELISTS: usize = 5;
