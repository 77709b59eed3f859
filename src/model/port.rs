use serde::{Deserialize, Serialize};

/// Application protocol spoken on a service port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Http,
    Http2,
    Https,
    Grpc,
}

impl Protocol {
    /// Infers the protocol from the declared transport protocol and the
    /// `<protocol>[-<suffix>]` port naming convention.
    #[must_use]
    pub fn infer(declared: &str, port_name: &str) -> Protocol {
        if declared.eq_ignore_ascii_case("udp") {
            return Protocol::Udp;
        }
        let prefix = port_name.split('-').next().unwrap_or("");
        match prefix.to_ascii_lowercase().as_str() {
            "http" => Protocol::Http,
            "http2" => Protocol::Http2,
            "https" => Protocol::Https,
            "grpc" => Protocol::Grpc,
            _ => Protocol::Tcp,
        }
    }
}

/// A named service port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
}

/// The ordered port set of a service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortList(Vec<Port>);

impl PortList {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Port> {
        self.0.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn get_by_port(&self, port: u16) -> Option<&Port> {
        self.0.iter().find(|p| p.port == port)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Port> {
        self.0.iter()
    }
}

impl From<Vec<Port>> for PortList {
    fn from(ports: Vec<Port>) -> Self {
        Self(ports)
    }
}

impl FromIterator<Port> for PortList {
    fn from_iter<I: IntoIterator<Item = Port>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PortList {
    type Item = Port;
    type IntoIter = std::vec::IntoIter<Port>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
