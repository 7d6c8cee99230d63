use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::path::Path;

use crate::error::{Error, Result};
use crate::lease::{
    DEFAULT_PREFERRED_LIFETIME, DEFAULT_T1, DEFAULT_T2, DEFAULT_VALID_LIFETIME, Lifetimes,
};
use crate::options::{DomainListOption, Duid};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_duid: String,
    pub bind_address: Ipv6Addr,
    pub interface_index: Option<u32>,
    pub server_unicast: Option<Ipv6Addr>,
    pub pool_start: Ipv6Addr,
    pub pool_end: Ipv6Addr,
    pub t1: u32,
    pub t2: u32,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub preference: Option<u8>,
    #[serde(default = "default_commit_on_solicit")]
    pub commit_on_solicit: bool,
    pub dns_servers: Vec<Ipv6Addr>,
    pub domain_search_list: Vec<String>,
}

fn default_commit_on_solicit() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_duid: "00:03:00:01:02:00:00:00:00:01".to_string(),
            bind_address: Ipv6Addr::UNSPECIFIED,
            interface_index: None,
            server_unicast: None,
            pool_start: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x100),
            pool_end: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x1ff),
            t1: DEFAULT_T1,
            t2: DEFAULT_T2,
            preferred_lifetime: DEFAULT_PREFERRED_LIFETIME,
            valid_lifetime: DEFAULT_VALID_LIFETIME,
            preference: None,
            commit_on_solicit: true,
            dns_servers: vec![
                Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888),
                Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8844),
            ],
            domain_search_list: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.duid()?;
        self.lifetimes()?;

        if u128::from(self.pool_start) > u128::from(self.pool_end) {
            return Err(Error::InvalidConfig(
                "pool_start must be less than or equal to pool_end".to_string(),
            ));
        }

        if let Some(unicast) = self.server_unicast {
            if self.ip_in_pool(unicast) {
                return Err(Error::InvalidConfig(
                    "server_unicast must not be within the pool range".to_string(),
                ));
            }
        }

        DomainListOption::new(&self.domain_search_list)?;

        Ok(())
    }

    /// Decodes `server_duid`.
    pub fn duid(&self) -> Result<Duid> {
        Duid::from_hex(&self.server_duid)
    }

    pub fn lifetimes(&self) -> Result<Lifetimes> {
        Lifetimes::new(
            self.t1,
            self.t2,
            self.preferred_lifetime,
            self.valid_lifetime,
        )
    }

    pub fn ip_in_pool(&self, ip: Ipv6Addr) -> bool {
        let addr = u128::from(ip);
        addr >= u128::from(self.pool_start) && addr <= u128::from(self.pool_end)
    }

    pub fn pool_size(&self) -> u128 {
        u128::from(self.pool_end)
            .saturating_sub(u128::from(self.pool_start))
            .saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.duid().unwrap().len(), 10);
    }

    #[test]
    fn test_pool_start_greater_than_end() {
        let config = Config {
            pool_start: "2001:db8::200".parse().unwrap(),
            pool_end: "2001:db8::100".parse().unwrap(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_unicast_in_pool() {
        let config = Config {
            server_unicast: Some("2001:db8::150".parse().unwrap()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_duid() {
        let config = Config {
            server_duid: "not-hex".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_lifetimes() {
        let config = Config {
            t1: 4000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_domain() {
        let config = Config {
            domain_search_list: vec![format!("{}.example", "x".repeat(70))],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ip_in_pool() {
        let config = Config::default();
        assert!(config.ip_in_pool("2001:db8::150".parse().unwrap()));
        assert!(!config.ip_in_pool("2001:db8::50".parse().unwrap()));
        assert!(!config.ip_in_pool("2001:db8::250".parse().unwrap()));
    }

    #[test]
    fn test_pool_size() {
        let config = Config::default();
        assert_eq!(config.pool_size(), 256);

        let whole = Config {
            pool_start: Ipv6Addr::UNSPECIFIED,
            pool_end: Ipv6Addr::from(u128::MAX),
            ..Default::default()
        };
        assert_eq!(whole.pool_size(), u128::MAX);
    }

    #[test]
    fn test_commit_on_solicit_defaults_to_true() {
        let mut value = serde_json::to_value(Config::default()).unwrap();
        value.as_object_mut().unwrap().remove("commit_on_solicit");
        let config: Config = serde_json::from_value(value).unwrap();
        assert!(config.commit_on_solicit);
    }
}
