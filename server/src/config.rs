use clap::Parser;

/// Real-time session server: presence, positions and moderated chat
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 443)]
    pub port: u16,

    /// Connections beyond this are closed right after the handshake
    #[arg(short, long, env = "MAX_CONNECTIONS", default_value_t = 256)]
    pub max_connections: usize,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
