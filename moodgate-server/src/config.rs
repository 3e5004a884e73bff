//! Server configuration, parsed from CLI flags or environment.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "moodgate-server", about = "Moodgate identity front door")]
pub struct ServerConfig {
    /// Address to bind the HTTP listener on.
    #[arg(long, env = "MOODGATE_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Path to the SQLite database.
    #[arg(long, env = "MOODGATE_DB_PATH", default_value = "moodgate.db")]
    pub db_path: String,

    /// Telegram bot token shared with the login widget. Empty means
    /// identity linking is effectively disabled (every payload rejected).
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true, default_value = "")]
    pub telegram_token: String,

    /// Resource base prepended to the scope in policy decisions.
    #[arg(long, env = "MOODGATE_API_RESOURCE", default_value = "")]
    pub api_resource: String,
}
