use clap::Parser;
use std::time::Duration;
use stompwire::{ConnError, ConnectOptions};

#[derive(Parser)]
#[command(name = "stomp")]
#[command(version)]
#[command(about = "Interactive STOMP client CLI")]
pub struct Cli {
    /// Broker URL (stomp://[login:passcode@]host:port); overrides the
    /// individual address and credential flags
    #[arg(short, long)]
    pub url: Option<String>,

    /// Broker host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Broker port
    #[arg(long, default_value_t = stompwire::options::DEFAULT_PORT)]
    pub port: u16,

    /// Login username
    #[arg(short, long, default_value = "guest")]
    pub login: String,

    /// Passcode
    #[arg(short, long, default_value = "guest")]
    pub passcode: String,

    /// Reconnect and retry instead of exiting on network failures
    #[arg(short, long)]
    pub reliable: bool,

    /// Pause between reconnect attempts, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub reconnect_delay: u64,

    /// Destinations to subscribe to (can be specified multiple times)
    #[arg(short, long)]
    pub subscribe: Vec<String>,
}

impl Cli {
    /// Connection options described by the command line.
    pub fn connect_options(&self) -> Result<ConnectOptions, ConnError> {
        let base = match &self.url {
            Some(url) => ConnectOptions::from_url(url)?,
            None => ConnectOptions::default()
                .address(self.host.as_str(), self.port)
                .credentials(self.login.as_str(), self.passcode.as_str()),
        };
        let opts = base
            .reliable(self.reliable)
            .reconnect_delay(Duration::from_millis(self.reconnect_delay));
        opts.validate()?;
        Ok(opts)
    }
}
