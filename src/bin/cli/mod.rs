pub mod args;
pub mod commands;
pub mod plain;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// Network/connection error (e.g., host unreachable, connection refused)
    pub const NETWORK_ERROR: u8 = 1;
    /// Protocol error (e.g., broker refused the CONNECT handshake)
    pub const PROTOCOL_ERROR: u8 = 3;
    /// Bad command line (e.g., malformed --url)
    pub const USAGE: u8 = 4;
}
