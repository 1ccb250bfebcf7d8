pub mod args;
pub mod commands;
pub mod plain;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// No broker could be reached, or the session lost it for good
    pub const CONNECTION_ERROR: u8 = 1;
    /// Bad connection string or command-line arguments
    pub const CONFIG_ERROR: u8 = 2;
}
