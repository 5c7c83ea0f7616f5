//! Protocol constants and configuration defaults

/// Default NCID server host
pub const DEFAULT_NCID_HOST: &str = "localhost";

/// Default NCID server port
pub const DEFAULT_NCID_PORT: u16 = 3333;

/// Default display name for a monitored line
pub const DEFAULT_DISPLAY_NAME: &str = "Phone";

/// Socket buffer size for reading from TCP stream (8KB). NCID lines are short.
pub const SOCKET_BUF_SIZE: usize = 8192;

/// Maximum single line length (64KB) without a newline before the link is
/// considered corrupt and dropped.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Protocol line terminator
pub const LINE_TERMINATOR: u8 = b'\n';

/// Separator between the command token and the keyed section
pub const COMMAND_SEPARATOR: char = ':';

/// Separator between keys and values in the keyed section
pub const FIELD_SEPARATOR: char = '*';

/// Terminator of the free-text section of `MSG`/`+MSG` lines
pub const FREE_TEXT_TERMINATOR: &str = "**";

/// Gateway placeholders for "no caller name"
pub const NAME_PLACEHOLDERS: &[&str] = &["-", "NO NAME"];

/// Gateway placeholders for "no caller number"
pub const NUMBER_PLACEHOLDERS: &[&str] = &["-", "NO NMBR", "NO-NUMBER"];

/// TCP connect timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Interval at which the reader wakes up to check liveness
pub const LIVENESS_POLL_MS: u64 = 2000;

/// How long a stopping connection waits for queue room to deliver `Cancelled`
pub const CANCEL_NOTIFY_TIMEOUT_MS: u64 = 250;

/// Maximum number of queued lines before dropping
pub const MAX_LINE_QUEUE_SIZE: usize = 1000;

/// First reconnect delay in milliseconds
pub const DEFAULT_RETRY_INITIAL_MS: u64 = 500;

/// Upper bound on the reconnect delay in milliseconds
pub const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
