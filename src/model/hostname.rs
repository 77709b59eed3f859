use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully qualified service hostname, `<name>.<namespace>.svc.<suffix>`.
///
/// The hostname is the service's stable identity across the catalog; all
/// query operations address services by it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Derives the canonical hostname for a service resource.
    #[must_use]
    pub fn service(name: &str, namespace: &str, domain_suffix: &str) -> Self {
        Self(format!("{name}.{namespace}.svc.{domain_suffix}"))
    }

    /// Splits the hostname back into `(name, namespace)`.
    ///
    /// Only the first two labels are interpreted; any trailing suffix is
    /// ignored, so short `name.namespace` hostnames parse as well.
    pub fn parse(&self) -> Result<(&str, &str), Error> {
        let mut parts = self.0.split('.');
        match (parts.next(), parts.next()) {
            (Some(name), Some(namespace)) if !name.is_empty() && !namespace.is_empty() => {
                Ok((name, namespace))
            }
            _ => Err(Error::InvalidHostname(self.0.clone())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Hostname {
    fn from(hostname: String) -> Self {
        Self(hostname)
    }
}

impl From<&str> for Hostname {
    fn from(hostname: &str) -> Self {
        Self(hostname.to_string())
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
