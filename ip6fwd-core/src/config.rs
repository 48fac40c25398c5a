//! Capability descriptor: which stack features this build of the forwarder has.
//! Resolved once at startup from defaults, a config file, then environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Feature set of the surrounding stack. Components branch on these flags at run time.
/// File: ~/.config/ip6fwd/config.toml or /etc/ip6fwd/config.toml.
/// Env overrides: IP6FWD_MULTINIC, IP6FWD_SIXLOWPAN, IP6FWD_MULTILINK, IP6FWD_STATISTICS,
/// IP6FWD_IOB_NBUFFERS, IP6FWD_IOB_BUFSIZE.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capabilities {
    /// More than one network device; source address takes part in route lookup.
    #[serde(default)]
    pub multinic: bool,
    /// Devices may use different link layers; 6LoWPAN applies only to IEEE 802.15.4 egress.
    #[serde(default)]
    pub multilink: bool,
    /// 6LoWPAN adaptation layer is available.
    #[serde(default)]
    pub sixlowpan: bool,
    #[serde(default = "default_true")]
    pub tcp: bool,
    #[serde(default = "default_true")]
    pub udp: bool,
    #[serde(default = "default_true")]
    pub icmpv6: bool,
    /// Maintain drop counters.
    #[serde(default = "default_true")]
    pub statistics: bool,
    #[serde(default)]
    pub drop_accounting: DropAccounting,
    /// Number of I/O buffers in the staging pool (default 24).
    #[serde(default = "default_iob_nbuffers")]
    pub iob_nbuffers: usize,
    /// Payload bytes per I/O buffer (default 196).
    #[serde(default = "default_iob_bufsize")]
    pub iob_bufsize: usize,
}

/// Which transport counters a dropped packet is charged to. The IPv6 counter is always charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropAccounting {
    /// Every transport counter (TCP, UDP and ICMPv6) is incremented.
    #[default]
    Blanket,
    /// Only the counter of the dropped packet's protocol.
    PerProtocol,
}

fn default_true() -> bool {
    true
}
fn default_iob_nbuffers() -> usize {
    24
}
fn default_iob_bufsize() -> usize {
    196
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            multinic: false,
            multilink: false,
            sixlowpan: false,
            tcp: true,
            udp: true,
            icmpv6: true,
            statistics: true,
            drop_accounting: DropAccounting::default(),
            iob_nbuffers: default_iob_nbuffers(),
            iob_bufsize: default_iob_bufsize(),
        }
    }
}

impl Capabilities {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Apply env-style overrides. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flags: [(&str, &mut bool); 4] = [
            ("IP6FWD_MULTINIC", &mut self.multinic),
            ("IP6FWD_SIXLOWPAN", &mut self.sixlowpan),
            ("IP6FWD_MULTILINK", &mut self.multilink),
            ("IP6FWD_STATISTICS", &mut self.statistics),
        ];
        for (key, slot) in flags {
            if let Some(b) = lookup(key).as_deref().and_then(parse_flag) {
                *slot = b;
            }
        }
        if let Some(n) = lookup("IP6FWD_IOB_NBUFFERS").and_then(|s| s.parse().ok()) {
            self.iob_nbuffers = n;
        }
        if let Some(n) = lookup("IP6FWD_IOB_BUFSIZE").and_then(|s| s.parse().ok()) {
            self.iob_bufsize = n;
        }
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Error reading or parsing a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load capabilities: merge default, then config file (if present), then env vars.
pub fn load() -> Capabilities {
    let mut c = load_file().unwrap_or_default();
    c.apply_overrides(|k| std::env::var(k).ok());
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/ip6fwd/config.toml"));
    }
    out.push(PathBuf::from("/etc/ip6fwd/config.toml"));
    out
}

fn load_file() -> Option<Capabilities> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match Capabilities::load_from(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            log::warn!("ignoring {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gives_defaults() {
        let c = Capabilities::from_toml_str("").unwrap();
        assert_eq!(c, Capabilities::default());
        assert!(c.tcp && c.udp && c.icmpv6 && c.statistics);
        assert_eq!(c.drop_accounting, DropAccounting::Blanket);
    }

    #[test]
    fn parses_all_fields() {
        let c = Capabilities::from_toml_str(
            r#"
            multinic = true
            multilink = true
            sixlowpan = true
            tcp = false
            drop_accounting = "per-protocol"
            iob_nbuffers = 4
            iob_bufsize = 64
            "#,
        )
        .unwrap();
        assert!(c.multinic && c.multilink && c.sixlowpan);
        assert!(!c.tcp);
        assert!(c.udp);
        assert_eq!(c.drop_accounting, DropAccounting::PerProtocol);
        assert_eq!(c.iob_nbuffers, 4);
        assert_eq!(c.iob_bufsize, 64);
    }

    #[test]
    fn unknown_field_rejected() {
        let r = Capabilities::from_toml_str("nat = true");
        assert!(matches!(r, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let r = Capabilities::load_from(Path::new("/nonexistent/ip6fwd/config.toml"));
        assert!(matches!(r, Err(ConfigError::Io(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("IP6FWD_MULTINIC", "1"),
            ("IP6FWD_SIXLOWPAN", "yes"),
            ("IP6FWD_STATISTICS", "off"),
            ("IP6FWD_IOB_NBUFFERS", "8"),
            ("IP6FWD_IOB_BUFSIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut c = Capabilities::default();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert!(c.multinic);
        assert!(c.sixlowpan);
        assert!(!c.multilink);
        assert!(!c.statistics);
        assert_eq!(c.iob_nbuffers, 8);
        assert_eq!(c.iob_bufsize, 196);
    }
}
