//! HTTP transports, direct or tunnelled through a proxy.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Proxy, Url};
use tracing::debug;

use crate::core::proxy::ProxyDescriptor;

/// An HTTP client bound to one egress path.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    proxy: Option<ProxyDescriptor>,
}

impl Transport {
    /// Build a proxy-less transport.
    pub fn direct(timeout: Duration) -> Result<Self> {
        build_transport(None, timeout)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_direct(&self) -> bool {
        self.proxy.is_none()
    }

    /// Log-safe description of the egress path.
    pub fn route(&self) -> String {
        match &self.proxy {
            Some(proxy) => proxy.to_string(),
            None => "direct".to_string(),
        }
    }
}

/// Construct the tunnelling client for a descriptor (HTTP CONNECT or SOCKS),
/// or a direct client when `descriptor` is `None`.
pub fn build_transport(descriptor: Option<&ProxyDescriptor>, timeout: Duration) -> Result<Transport> {
    let mut builder = Client::builder().timeout(timeout);
    match descriptor {
        Some(descriptor) => {
            let url = proxy_url(descriptor)?;
            let proxy = Proxy::all(url.as_str())
                .with_context(|| format!("configure proxy {descriptor}"))?;
            builder = builder.proxy(proxy);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    let client = builder.build().context("build http client")?;
    debug!(
        route = descriptor.map(ToString::to_string).as_deref().unwrap_or("direct"),
        "transport built"
    );
    Ok(Transport {
        client,
        proxy: descriptor.cloned(),
    })
}

fn proxy_url(descriptor: &ProxyDescriptor) -> Result<Url> {
    let mut url = Url::parse(&descriptor.endpoint())
        .with_context(|| format!("invalid proxy address {descriptor}"))?;
    if let Some(auth) = &descriptor.auth {
        url.set_username(&auth.username)
            .map_err(|()| anyhow::anyhow!("cannot set proxy username for {descriptor}"))?;
        url.set_password(Some(&auth.password))
            .map_err(|()| anyhow::anyhow!("cannot set proxy password for {descriptor}"))?;
    }
    Ok(url)
}

/// Lazily built transports, one per egress path, reused across calls.
#[derive(Debug)]
pub struct TransportCache {
    timeout: Duration,
    direct: Option<Transport>,
    proxied: HashMap<ProxyDescriptor, Transport>,
}

impl TransportCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            direct: None,
            proxied: HashMap::new(),
        }
    }

    pub fn direct(&mut self) -> Result<&Transport> {
        if self.direct.is_none() {
            self.direct = Some(build_transport(None, self.timeout)?);
        }
        self.direct.as_ref().context("direct transport missing")
    }

    pub fn proxied(&mut self, descriptor: &ProxyDescriptor) -> Result<&Transport> {
        if !self.proxied.contains_key(descriptor) {
            let transport = build_transport(Some(descriptor), self.timeout)?;
            self.proxied.insert(descriptor.clone(), transport);
        }
        self.proxied
            .get(descriptor)
            .with_context(|| format!("transport for {descriptor} missing"))
    }
}
