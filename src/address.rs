use derive_more::Display;

use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
// Port 8125(UDP) is the statsd/dogstatsd default
pub const DEFAULT_PORT: u16 = 8125;

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[default]
    #[display("udp")]
    Udp,
    #[display("tcp")]
    Tcp,
    #[display("unix")]
    Unix,
}

/// Canonical `protocol://host:port` triple. Unix addresses keep their socket
/// path in `host` and use port 0.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    protocol: Protocol,
    host: String,
    port: u16,
}

impl Address {
    pub fn new<S: Into<String>>(protocol: Protocol, host: S, port: u16) -> Self {
        let host = host.into();
        let host = if host.is_empty() && protocol != Protocol::Unix {
            DEFAULT_HOST.to_string()
        } else {
            host
        };
        Self {
            protocol,
            host,
            port,
        }
    }
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    /// `host:port` in the form expected by socket address resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.display_host(), self.port)
    }
    fn display_host(&self) -> String {
        if self.host.contains(':') && self.protocol != Protocol::Unix {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// Parses `udp://host:port`, `tcp://host:port`, `unix://path`, or a bare
    /// `host:port`, `host`, `:port`. Missing pieces fall back to udp,
    /// [DEFAULT_HOST] and [DEFAULT_PORT].
    pub fn parse(addr: &str) -> Result<Self> {
        let bad = || Error::BadAddress(addr.to_string());
        let (protocol, rest) = match addr.split_once("://") {
            Some(("udp", rest)) => (Protocol::Udp, rest),
            Some(("tcp", rest)) => (Protocol::Tcp, rest),
            Some(("unix", path)) => {
                if path.is_empty() {
                    return Err(bad());
                }
                return Ok(Self::new(Protocol::Unix, path, 0));
            }
            Some(_) => return Err(bad()),
            None => (Protocol::Udp, addr),
        };
        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(bad)?;
            if host.is_empty() {
                return Err(bad());
            }
            match tail {
                "" => (host, None),
                tail => (host, Some(tail.strip_prefix(':').ok_or_else(bad)?)),
            }
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };
        if host.contains(['/', ' ']) {
            return Err(bad());
        }
        let port = match port {
            None | Some("") => DEFAULT_PORT,
            Some(port) => port.parse::<u16>().map_err(|_| bad())?,
        };
        Ok(Self::new(protocol, host, port))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.protocol {
            Protocol::Unix => write!(f, "unix://{}", self.host),
            protocol => write!(f, "{protocol}://{}", self.authority()),
        }
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Anything that can name a collector, in the spirit of `ToSocketAddrs`.
pub trait ToAddress {
    fn to_address(self) -> Result<Address>;
}

impl ToAddress for Address {
    fn to_address(self) -> Result<Address> {
        Ok(self)
    }
}

impl ToAddress for &str {
    fn to_address(self) -> Result<Address> {
        Address::parse(self)
    }
}

impl ToAddress for String {
    fn to_address(self) -> Result<Address> {
        Address::parse(&self)
    }
}

impl ToAddress for u16 {
    fn to_address(self) -> Result<Address> {
        Ok(Address::new(Protocol::Udp, DEFAULT_HOST, self))
    }
}

impl ToAddress for (&str, u16) {
    fn to_address(self) -> Result<Address> {
        let (host, port) = self;
        if host.contains(['/', ' ']) {
            return Err(Error::BadAddress(format!("{host}:{port}")));
        }
        Ok(Address::new(Protocol::Udp, host, port))
    }
}
