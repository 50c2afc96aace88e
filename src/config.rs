use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "CareFlow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
/// Sessions never outlive 30 days.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 30;
pub const DATABASE_FILE: &str = "careflow.db";

/// Working hours (UTC) used to compute a doctor's bookable slots.
pub const CLINIC_OPEN_HOUR: u32 = 9;
pub const CLINIC_CLOSE_HOUR: u32 = 17;
pub const SLOT_MINUTES: i64 = 30;

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "careflow_lib=info,careflow=info,tower_http=info"
}

/// Get the application data directory
/// ~/CareFlow/ unless overridden by `CAREFLOW_DATA_DIR`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Runtime settings resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub session_ttl_hours: i64,
    /// Bootstrap administrator created on first start when no admin exists.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl ServerConfig {
    /// Read `CAREFLOW_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary lookup. Unparseable values
    /// fall back to the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("CAREFLOW_BIND") {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => tracing::warn!(value = %raw, "Ignoring invalid CAREFLOW_BIND: {e}"),
            }
        }

        if let Some(dir) = lookup("CAREFLOW_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup("CAREFLOW_SESSION_TTL_HOURS") {
            match raw.parse::<i64>() {
                Ok(hours) if (1..=MAX_SESSION_TTL_HOURS).contains(&hours) => {
                    config.session_ttl_hours = hours
                }
                _ => tracing::warn!(
                    value = %raw,
                    max = MAX_SESSION_TTL_HOURS,
                    "Ignoring invalid CAREFLOW_SESSION_TTL_HOURS"
                ),
            }
        }

        config.admin_email = lookup("CAREFLOW_ADMIN_EMAIL").filter(|v| !v.trim().is_empty());
        config.admin_password = lookup("CAREFLOW_ADMIN_PASSWORD").filter(|v| !v.is_empty());

        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            data_dir: default_data_dir(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            admin_email: None,
            admin_password: None,
        }
    }
}
