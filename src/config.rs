//! Process configuration
//!
//! Every mercury process reads one YAML file describing where the registry
//! lives, which address to bind, and which component it is.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

/// Longest component name the registry accepts.
pub const COMPONENT_NAME_MAX: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MercuryConfig {
    // ============================================
    // Registry (machined)
    // ============================================
    #[serde(default = "default_machined_ip")]
    pub machined_ip: String,

    #[serde(default = "default_machined_port")]
    pub machined_port: u16,

    /// Registry request timeout per attempt, in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Pause between lookups that found nothing, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Lookup attempts made when discovering a component
    #[serde(default = "default_find_retries")]
    pub find_retries: u32,

    // ============================================
    // This process
    // ============================================
    /// Address the nub binds; peers reach us here
    #[serde(default = "default_internal_ip")]
    pub internal_ip: String,

    /// 0 picks an ephemeral port
    #[serde(default)]
    pub internal_port: u16,

    pub component_name: String,

    #[serde(default)]
    pub component_index: i32,

    /// Singleton component to keep an anonymous channel to
    #[serde(default)]
    pub watch_component: Option<String>,

    /// Status and keepalive period, in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Ship status lines to the watched component as log frames
    #[serde(default)]
    pub log_forwarding: bool,
}

// ============================================
// Default value functions
// ============================================

fn default_machined_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_machined_port() -> u16 {
    crate::machine::MACHINED_PORT
}

fn default_query_timeout_ms() -> u64 {
    500
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_find_retries() -> u32 {
    5
}

fn default_internal_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl MercuryConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: MercuryConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: MercuryConfig = serde_yaml::from_str(contents).context("Failed to parse YAML")?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        parse_ipv4("machined_ip", &self.machined_ip)?;
        parse_ipv4("internal_ip", &self.internal_ip)?;

        anyhow::ensure!(!self.component_name.is_empty(), "component_name cannot be empty");
        anyhow::ensure!(
            self.component_name.len() <= COMPONENT_NAME_MAX,
            "component_name too long: {} bytes (max {})",
            self.component_name.len(),
            COMPONENT_NAME_MAX
        );
        if let Some(watch) = &self.watch_component {
            anyhow::ensure!(!watch.is_empty(), "watch_component cannot be empty");
            anyhow::ensure!(
                watch.len() <= COMPONENT_NAME_MAX,
                "watch_component too long: {} bytes (max {})",
                watch.len(),
                COMPONENT_NAME_MAX
            );
        }

        anyhow::ensure!(self.machined_port != 0, "machined_port cannot be 0");
        anyhow::ensure!(self.query_timeout_ms > 0, "query_timeout_ms must be non-zero");
        anyhow::ensure!(self.retry_delay_ms > 0, "retry_delay_ms must be non-zero");
        anyhow::ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be non-zero");

        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).context("Failed to serialize config to YAML")?;

        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn machined_addr(&self) -> Result<SocketAddrV4> {
        Ok(SocketAddrV4::new(
            parse_ipv4("machined_ip", &self.machined_ip)?,
            self.machined_port,
        ))
    }

    pub fn internal_addr(&self) -> Result<SocketAddrV4> {
        Ok(SocketAddrV4::new(
            parse_ipv4("internal_ip", &self.internal_ip)?,
            self.internal_port,
        ))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .parse::<Ipv4Addr>()
        .with_context(|| format!("{field} is not an IPv4 address: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> &'static str {
        r#"
component_name: "BaseApp"
"#
    }

    #[test]
    fn test_minimal_config() {
        let config = MercuryConfig::from_str(minimal_config()).unwrap();
        assert_eq!(config.component_name, "BaseApp");
        assert_eq!(config.watch_component, None);
        assert!(!config.log_forwarding);
    }

    #[test]
    fn test_default_values() {
        let config = MercuryConfig::from_str(minimal_config()).unwrap();

        assert_eq!(config.machined_ip, "127.0.0.1");
        assert_eq!(config.machined_port, 20018);
        assert_eq!(config.internal_ip, "127.0.0.1");
        assert_eq!(config.internal_port, 0);
        assert_eq!(config.query_timeout_ms, 500);
        assert_eq!(config.retry_delay_ms, 100);
        assert_eq!(config.find_retries, 5);
        assert_eq!(config.component_index, 0);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_full_config() {
        let config_str = r#"
machined_ip: "10.0.0.5"
machined_port: 30018
internal_ip: "10.0.0.9"
internal_port: 41000
query_timeout_ms: 250
retry_delay_ms: 50
find_retries: 10
component_name: "CellApp"
component_index: 3
watch_component: "CellAppMgr"
tick_interval_ms: 200
log_forwarding: true
"#;

        let config = MercuryConfig::from_str(config_str).unwrap();
        assert_eq!(
            config.machined_addr().unwrap(),
            "10.0.0.5:30018".parse::<SocketAddrV4>().unwrap()
        );
        assert_eq!(
            config.internal_addr().unwrap(),
            "10.0.0.9:41000".parse::<SocketAddrV4>().unwrap()
        );
        assert_eq!(config.query_timeout(), Duration::from_millis(250));
        assert_eq!(config.retry_delay(), Duration::from_millis(50));
        assert_eq!(config.find_retries, 10);
        assert_eq!(config.component_index, 3);
        assert_eq!(config.watch_component.as_deref(), Some("CellAppMgr"));
        assert!(config.log_forwarding);
    }

    #[test]
    fn test_missing_required_field() {
        let result = MercuryConfig::from_str("machined_port: 20018\n");
        assert!(result.is_err());

        let err_msg = format!("{:?}", result.unwrap_err());
        assert!(err_msg.contains("component_name") || err_msg.contains("missing field"));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = MercuryConfig::from_str("component_name: [this is not valid yaml\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_type() {
        let config_str = r#"
component_name: "BaseApp"
machined_port: "not_a_number"
"#;
        assert!(MercuryConfig::from_str(config_str).is_err());
    }

    #[test]
    fn test_validation_bad_ip() {
        let config_str = r#"
component_name: "BaseApp"
internal_ip: "localhost"
"#;
        let err_msg = format!("{:#}", MercuryConfig::from_str(config_str).unwrap_err());
        assert!(err_msg.contains("internal_ip"));
    }

    #[test]
    fn test_validation_empty_name() {
        let err_msg = format!("{}", MercuryConfig::from_str("component_name: \"\"\n").unwrap_err());
        assert!(err_msg.contains("component_name"));
    }

    #[test]
    fn test_validation_name_too_long() {
        let config_str = format!("component_name: \"{}\"\n", "x".repeat(COMPONENT_NAME_MAX + 1));
        let err_msg = format!("{}", MercuryConfig::from_str(&config_str).unwrap_err());
        assert!(err_msg.contains("component_name too long"));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config_str = r#"
component_name: "BaseApp"
query_timeout_ms: 0
"#;
        let err_msg = format!("{}", MercuryConfig::from_str(config_str).unwrap_err());
        assert!(err_msg.contains("query_timeout_ms"));
    }

    #[test]
    fn test_save_and_reload() {
        let mut config = MercuryConfig::from_str(minimal_config()).unwrap();
        config.watch_component = Some("DBMgr".to_string());

        let path = std::env::temp_dir().join(format!("mercury-config-{}.yaml", std::process::id()));
        config.save(&path).unwrap();
        let reloaded = MercuryConfig::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(reloaded.component_name, "BaseApp");
        assert_eq!(reloaded.watch_component.as_deref(), Some("DBMgr"));
    }
}
