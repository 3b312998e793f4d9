//! Server configuration.
//!
//! There are two parts to this module: the resolver configuration, an
//! ordered list of default server addresses taken from the platform
//! (normally the system's `/etc/resolv.conf`), and the description of the
//! one server a request is aimed at.
//!
//! Callers rarely construct a [`ServerConf`] directly. Instead they supply
//! an optional, possibly partial [`ServerSpec`] – often just a bare address
//! string – and the request fills in the blanks from the defaults and the
//! resolver configuration during construction.

use core::fmt;
use std::str::FromStr;

//------------ Configuration Constants ---------------------------------------

/// The default DNS port.
const DEF_PORT: u16 = 53;

/// Server used when the resolver configuration is empty.
///
/// This is what glibc falls back to as well.
const FALLBACK_SERVER: &str = "127.0.0.1";

//------------ Transport -----------------------------------------------------

/// The transport protocol to be used for a server.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Transport {
    /// Unencrypted UDP transport.
    #[default]
    Udp,

    /// Unencrypted TCP transport.
    Tcp,
}

impl Transport {
    /// Returns whether the transport is a streaming protocol.
    pub fn is_stream(self) -> bool {
        match self {
            Transport::Udp => false,
            Transport::Tcp => true,
        }
    }
}

//--- FromStr and Display

impl FromStr for Transport {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            _ => Err(TransportError),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("udp"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

//------------ TransportError ------------------------------------------------

/// A string did not name a known transport protocol.
#[derive(Clone, Copy, Debug)]
pub struct TransportError;

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown transport protocol")
    }
}

impl std::error::Error for TransportError {}

//------------ ServerSpec ----------------------------------------------------

/// A caller-supplied, possibly partial description of a target server.
///
/// Every field is optional; missing fields are filled in by
/// [`ServerConf::normalize`]. A bare address string converts into a spec
/// with only the address set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerSpec {
    /// The server address.
    pub addr: Option<String>,

    /// The port to send to.
    pub port: Option<u16>,

    /// The transport protocol to use.
    pub transport: Option<Transport>,
}

impl From<&str> for ServerSpec {
    fn from(addr: &str) -> Self {
        String::from(addr).into()
    }
}

impl From<String> for ServerSpec {
    fn from(addr: String) -> Self {
        ServerSpec {
            addr: Some(addr),
            port: None,
            transport: None,
        }
    }
}

//------------ ServerConf ----------------------------------------------------

/// The fully normalized description of the server a request is sent to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConf {
    /// Server address.
    ///
    /// Kept as a string: the request never interprets it, it is handed to
    /// the registry unchanged.
    pub addr: String,

    /// The port to send to.
    pub port: u16,

    /// Transport protocol.
    pub transport: Transport,
}

impl ServerConf {
    /// Normalizes a caller-supplied spec into a complete server config.
    ///
    /// The rules, applied in order: a spec without an address is discarded
    /// entirely and replaced by the first entry of the resolver
    /// configuration, with port and transport left at their defaults; an
    /// absent transport becomes UDP; an absent port becomes 53. An empty
    /// resolver configuration falls back to `127.0.0.1`.
    pub fn normalize(spec: Option<ServerSpec>, conf: &ResolvConf) -> Self {
        let spec = spec.unwrap_or_default();
        match spec.addr.filter(|addr| !addr.is_empty()) {
            Some(addr) => ServerConf {
                addr,
                port: spec.port.unwrap_or(DEF_PORT),
                transport: spec.transport.unwrap_or_default(),
            },
            None => ServerConf {
                addr: conf.first_server().unwrap_or(FALLBACK_SERVER).into(),
                port: DEF_PORT,
                transport: Transport::default(),
            },
        }
    }
}

impl fmt::Display for ServerConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.addr, self.port, self.transport)
    }
}

//------------ ResolvConf ----------------------------------------------------

/// The platform's resolver configuration.
///
/// This type only collects the ordered list of default server addresses.
/// Loading it – typically by parsing `/etc/resolv.conf` – is the business
/// of whoever constructs the value; requests merely read the first entry
/// when the caller did not name a server.
#[derive(Clone, Debug, Default)]
pub struct ResolvConf {
    /// Addresses of servers to query, in configuration order.
    servers: Vec<String>,
}

impl ResolvConf {
    /// Creates a new, empty configuration.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a server address.
    pub fn push_server(&mut self, addr: impl Into<String>) {
        self.servers.push(addr.into());
    }

    /// Returns the configured server addresses in order.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Returns the first configured server address, if any.
    pub fn first_server(&self) -> Option<&str> {
        self.servers.first().map(String::as_str)
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn conf() -> ResolvConf {
        let mut conf = ResolvConf::new();
        conf.push_server("9.9.9.9");
        conf.push_server("149.112.112.112");
        conf
    }

    #[test]
    fn bare_address_gets_defaults() {
        let server =
            ServerConf::normalize(Some("1.2.3.4".into()), &conf());
        assert_eq!(
            server,
            ServerConf {
                addr: String::from("1.2.3.4"),
                port: 53,
                transport: Transport::Udp,
            }
        );
    }

    #[test]
    fn missing_server_uses_first_resolver_entry() {
        let server = ServerConf::normalize(None, &conf());
        assert_eq!(server.addr, "9.9.9.9");
        assert_eq!(server.port, 53);
        assert_eq!(server.transport, Transport::Udp);
    }

    #[test]
    fn spec_without_address_is_discarded() {
        // A port or transport without an address does not survive; the
        // resolver entry is taken with defaults instead.
        let spec = ServerSpec {
            addr: None,
            port: Some(5353),
            transport: Some(Transport::Tcp),
        };
        let server = ServerConf::normalize(Some(spec), &conf());
        assert_eq!(server.addr, "9.9.9.9");
        assert_eq!(server.port, 53);
        assert_eq!(server.transport, Transport::Udp);
    }

    #[test]
    fn empty_address_counts_as_missing() {
        let server = ServerConf::normalize(Some("".into()), &conf());
        assert_eq!(server.addr, "9.9.9.9");
    }

    #[test]
    fn partial_spec_is_filled_in() {
        let spec = ServerSpec {
            addr: Some(String::from("1.2.3.4")),
            port: None,
            transport: Some(Transport::Tcp),
        };
        let server = ServerConf::normalize(Some(spec), &conf());
        assert_eq!(server.addr, "1.2.3.4");
        assert_eq!(server.port, 53);
        assert_eq!(server.transport, Transport::Tcp);
    }

    #[test]
    fn empty_resolv_conf_falls_back_to_loopback() {
        let server = ServerConf::normalize(None, &ResolvConf::new());
        assert_eq!(server.addr, "127.0.0.1");
        assert_eq!(server.port, 53);
    }

    #[test]
    fn transport_from_str() {
        assert_eq!("udp".parse::<Transport>().unwrap(), Transport::Udp);
        assert_eq!("tcp".parse::<Transport>().unwrap(), Transport::Tcp);
        assert!("tls".parse::<Transport>().is_err());
        assert!("UDP".parse::<Transport>().is_err());
    }
}
