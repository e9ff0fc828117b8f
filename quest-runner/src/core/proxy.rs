//! Proxy descriptors and sticky round-robin assignment.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Result, anyhow, bail};

/// Tunnel protocol spoken to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks4,
    Socks4a,
    Socks5,
    Socks5h,
}

impl ProxyScheme {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks4" => Some(Self::Socks4),
            "socks4a" => Some(Self::Socks4a),
            "socks" | "socks5" => Some(Self::Socks5),
            "socks5h" => Some(Self::Socks5h),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks4 => "socks4",
            Self::Socks4a => "socks4a",
            Self::Socks5 => "socks5",
            Self::Socks5h => "socks5h",
        }
    }

    pub fn is_socks(self) -> bool {
        !matches!(self, Self::Http | Self::Https)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// One egress path loaded from the proxy list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyDescriptor {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
}

impl ProxyDescriptor {
    /// Parse `scheme://[user:pass@]host:port`, `scheme:host:port[:user:pass]`,
    /// or bare `host:port[:user:pass]` (plain HTTP).
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            bail!("empty proxy descriptor");
        }
        if let Some((scheme, rest)) = line.split_once("://") {
            return parse_uri(scheme, rest);
        }
        parse_tuple(line)
    }

    /// Address without credentials, safe to log.
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.auth {
            Some(auth) => write!(
                f,
                "{}://{}:***@{}:{}",
                self.scheme.as_str(),
                auth.username,
                self.host,
                self.port
            ),
            None => f.write_str(&self.endpoint()),
        }
    }
}

fn parse_uri(scheme: &str, rest: &str) -> Result<ProxyDescriptor> {
    let scheme =
        ProxyScheme::parse(scheme).ok_or_else(|| anyhow!("unsupported proxy scheme '{scheme}'"))?;
    let rest = rest.trim_end_matches('/');
    let (auth, host_port) = match rest.rsplit_once('@') {
        Some((userinfo, host_port)) => {
            let (username, password) = userinfo
                .split_once(':')
                .ok_or_else(|| anyhow!("proxy credentials must be user:pass"))?;
            (Some(auth(username, password)?), host_port)
        }
        None => (None, rest),
    };
    let (host, port) = host_port
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("proxy address must be host:port"))?;
    Ok(ProxyDescriptor {
        scheme,
        host: host_part(host)?,
        port: port_part(port)?,
        auth,
    })
}

fn parse_tuple(line: &str) -> Result<ProxyDescriptor> {
    let parts: Vec<&str> = line.split(':').collect();
    let (scheme, fields) = match ProxyScheme::parse(parts[0]) {
        Some(scheme) => (scheme, &parts[1..]),
        None => (ProxyScheme::Http, &parts[..]),
    };
    let auth = match fields.len() {
        2 => None,
        4 => Some(auth(fields[2], fields[3])?),
        n => bail!("expected host:port or host:port:user:pass, got {n} fields"),
    };
    Ok(ProxyDescriptor {
        scheme,
        host: host_part(fields[0])?,
        port: port_part(fields[1])?,
        auth,
    })
}

fn host_part(host: &str) -> Result<String> {
    let host = host.trim();
    if host.is_empty() {
        bail!("proxy host must not be empty");
    }
    Ok(host.to_string())
}

fn port_part(port: &str) -> Result<u16> {
    port.trim()
        .parse::<u16>()
        .map_err(|_| anyhow!("invalid proxy port '{port}'"))
}

fn auth(username: &str, password: &str) -> Result<ProxyAuth> {
    if username.is_empty() {
        bail!("proxy username must not be empty");
    }
    Ok(ProxyAuth {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Sticky per-credential proxy assignment with round-robin distribution.
///
/// The first assignment for a credential holds for the rest of the run; a
/// failed call never revokes or rotates it.
#[derive(Debug, Clone)]
pub struct ProxyRotator {
    enabled: bool,
    proxies: Vec<ProxyDescriptor>,
    cursor: usize,
    sticky: HashMap<String, ProxyDescriptor>,
}

impl ProxyRotator {
    pub fn new(enabled: bool, proxies: Vec<ProxyDescriptor>) -> Self {
        Self {
            enabled,
            proxies,
            cursor: 0,
            sticky: HashMap::new(),
        }
    }

    /// Proxy usage was requested but no descriptors are configured.
    pub fn is_degraded(&self) -> bool {
        self.enabled && self.proxies.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.proxies.is_empty()
    }

    /// Return the credential's sticky proxy, assigning the next one in
    /// round-robin order on first use. `None` means direct connection.
    pub fn assign(&mut self, address: &str) -> Option<ProxyDescriptor> {
        if !self.is_active() {
            return None;
        }
        if let Some(existing) = self.sticky.get(address) {
            return Some(existing.clone());
        }
        let descriptor = self.rotate()?;
        self.sticky.insert(address.to_string(), descriptor.clone());
        Some(descriptor)
    }

    /// Next proxy in round-robin order without recording an assignment.
    pub fn rotate(&mut self) -> Option<ProxyDescriptor> {
        if !self.is_active() {
            return None;
        }
        let descriptor = self.proxies[self.cursor % self.proxies.len()].clone();
        self.cursor = (self.cursor + 1) % self.proxies.len();
        Some(descriptor)
    }

    /// Forget all sticky assignments and restart the round-robin cursor.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.sticky.clear();
    }
}
