//! Target platform triples.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Wildcard axis value. Matches any concrete value.
pub const ANY: &str = "*";
/// How the wildcard is spelled inside file and archive names.
pub const ANY_STRING: &str = "ANY";

/// An (os, ws, arch) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Config {
    os: String,
    ws: String,
    arch: String,
}

impl Config {
    pub fn new(os: impl Into<String>, ws: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            ws: ws.into(),
            arch: arch.into(),
        }
    }

    /// The platform-independent configuration (`*,*,*`).
    pub fn generic() -> Self {
        Self::new(ANY, ANY, ANY)
    }

    pub fn is_generic(&self) -> bool {
        self.os == ANY && self.ws == ANY && self.arch == ANY
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn ws(&self) -> &str {
        &self.ws
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn to_string_with(&self, sep: &str) -> String {
        format!("{}{sep}{}{sep}{}", self.os, self.ws, self.arch)
    }

    pub fn to_string_replacing_any(&self, sep: &str, any: &str) -> String {
        let axis = |v: &str| if v == ANY { any.to_string() } else { v.to_string() };
        format!(
            "{}{sep}{}{sep}{}",
            axis(&self.os),
            axis(&self.ws),
            axis(&self.arch)
        )
    }

    /// Dotted name used in archive names, script names and staging folders.
    pub fn dotted_name(&self) -> String {
        self.to_string_replacing_any(".", ANY_STRING)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with(","))
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::msg(format!(
                "invalid config '{}' (expected 'os, ws, arch')",
                s.trim()
            )));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Parse a `&`-separated list of configs, e.g. `win32,win32,x86 & linux,gtk,x86`.
pub fn parse_config_list(spec: &str) -> Result<Vec<Config>> {
    let mut out: Vec<Config> = Vec::new();
    for raw in spec.split('&') {
        if raw.trim().is_empty() {
            continue;
        }
        let cfg: Config = raw.parse()?;
        if !out.contains(&cfg) {
            out.push(cfg);
        }
    }
    if out.is_empty() {
        out.push(Config::generic());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders() {
        let c: Config = " win32, win32 ,x86".parse().unwrap();
        assert_eq!(c.os(), "win32");
        assert_eq!(c.to_string(), "win32,win32,x86");
        assert_eq!(c.dotted_name(), "win32.win32.x86");
    }

    #[test]
    fn generic_config_renders_any() {
        let c: Config = "*,*,*".parse().unwrap();
        assert_eq!(c, Config::generic());
        assert!(c.is_generic());
        assert_eq!(c.dotted_name(), "ANY.ANY.ANY");
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!("linux,gtk".parse::<Config>().is_err());
        assert!("linux,,x86".parse::<Config>().is_err());
    }

    #[test]
    fn config_list_dedups_and_defaults_to_generic() {
        let list = parse_config_list("linux,gtk,x86 & linux, gtk, x86&win32,win32,x86").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(parse_config_list("  ").unwrap(), vec![Config::generic()]);
    }
}
