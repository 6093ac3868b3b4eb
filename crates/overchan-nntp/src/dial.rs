//! Outbound dialing, direct or through a SOCKS4a proxy.

use crate::{NntpError, NntpResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Userid field sent in SOCKS4a requests; some proxies log it.
const SOCKS_USER_ID: &[u8] = b"srndv2";

/// SOCKS4a success reply code.
const SOCKS_GRANTED: u8 = 0x5a;

/// How to reach a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyConfig {
    /// Plain TCP.
    #[default]
    None,
    /// SOCKS4a CONNECT via the given proxy address.
    Socks4a(String),
}

impl ProxyConfig {
    /// Build from the config strings `proxy_type` / `proxy_addr`.
    pub fn from_config(proxy_type: &str, proxy_addr: &str) -> NntpResult<Self> {
        match proxy_type {
            "" | "none" => Ok(ProxyConfig::None),
            "socks4a" => Ok(ProxyConfig::Socks4a(proxy_addr.to_string())),
            other => Err(NntpError::Proxy(format!("unknown proxy type: {}", other))),
        }
    }
}

/// Dial a remote feed.
pub async fn dial(proxy: &ProxyConfig, remote_addr: &str) -> NntpResult<TcpStream> {
    match proxy {
        ProxyConfig::None => {
            debug!(addr = %remote_addr, "dialing out");
            Ok(TcpStream::connect(remote_addr).await?)
        }
        ProxyConfig::Socks4a(proxy_addr) => {
            debug!(proxy = %proxy_addr, addr = %remote_addr, "dialing out via proxy");
            dial_socks4a(proxy_addr, remote_addr).await
        }
    }
}

/// SOCKS4a CONNECT: VN=4, CD=1, two port bytes, the 0.0.0.1 marker
/// address, a NUL-terminated userid, then the NUL-terminated hostname.
async fn dial_socks4a(proxy_addr: &str, remote_addr: &str) -> NntpResult<TcpStream> {
    let (host, port) = split_host_port(remote_addr)?;

    let mut stream = TcpStream::connect(proxy_addr).await?;

    let mut req = Vec::with_capacity(8 + SOCKS_USER_ID.len() + 1 + host.len() + 1);
    req.push(4);
    req.push(1);
    req.push((port >> 8) as u8);
    req.push((port & 0xff) as u8);
    req.extend_from_slice(&[0, 0, 0, 1]);
    req.extend_from_slice(SOCKS_USER_ID);
    req.push(0);
    req.extend_from_slice(host.as_bytes());
    req.push(0);

    stream.write_all(&req).await?;

    let mut resp = [0u8; 8];
    stream.read_exact(&mut resp).await?;
    if resp[1] == SOCKS_GRANTED {
        info!(addr = %remote_addr, "proxy connection established");
        Ok(stream)
    } else {
        Err(NntpError::Proxy(format!(
            "connect refused, reply {:#04x}",
            resp[1]
        )))
    }
}

/// Split `host:port`, applying the legacy port bound.
fn split_host_port(addr: &str) -> NntpResult<(&str, u16)> {
    let idx = addr
        .rfind(':')
        .ok_or_else(|| NntpError::Proxy(format!("invalid address: {}", addr)))?;
    let host = &addr[..idx];
    let port: u32 = addr[idx + 1..]
        .parse()
        .map_err(|_| NntpError::Proxy(format!("invalid port in: {}", addr)))?;
    // legacy bound kept for wire compatibility with deployed proxies
    if port >= 25536 {
        return Err(NntpError::Proxy("bad proxy port".to_string()));
    }
    Ok((host, port as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_port() {
        let (host, port) = split_host_port("news.example.onion:119").unwrap();
        assert_eq!(host, "news.example.onion");
        assert_eq!(port, 119);
    }

    #[test]
    fn rejects_high_ports() {
        assert!(split_host_port("x:25536").is_err());
        assert!(split_host_port("x:65000").is_err());
        assert!(split_host_port("x:25535").is_ok());
    }

    #[test]
    fn rejects_missing_port() {
        assert!(split_host_port("no-port").is_err());
        assert!(split_host_port("x:notaport").is_err());
    }

    #[test]
    fn proxy_config_parsing() {
        assert_eq!(
            ProxyConfig::from_config("", "").unwrap(),
            ProxyConfig::None
        );
        assert_eq!(
            ProxyConfig::from_config("none", "").unwrap(),
            ProxyConfig::None
        );
        assert_eq!(
            ProxyConfig::from_config("socks4a", "127.0.0.1:9050").unwrap(),
            ProxyConfig::Socks4a("127.0.0.1:9050".to_string())
        );
        assert!(ProxyConfig::from_config("socks5", "x").is_err());
    }
}
