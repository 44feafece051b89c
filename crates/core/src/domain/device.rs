use std::net::SocketAddr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A device token after resolution. `address` is either the literal the operator
/// typed or the suffixed hostname that answered on the management port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub token: String,
    pub address: String,
    pub socket: SocketAddr,
    pub reachable: bool,
}

impl DeviceTarget {
    /// Display name with any of the given domain suffixes stripped.
    pub fn host_name(&self, suffixes: &[String]) -> String {
        strip_domain_suffix(&self.address, suffixes)
    }
}

pub fn strip_domain_suffix(address: &str, suffixes: &[String]) -> String {
    let mut longest_first: Vec<&String> = suffixes.iter().collect();
    longest_first.sort_by_key(|suffix| std::cmp::Reverse(suffix.len()));
    for suffix in longest_first {
        if let Some(stripped) = address.strip_suffix(suffix.as_str()) {
            if let Some(host) = stripped.strip_suffix('.') {
                if !host.is_empty() {
                    return host.to_owned();
                }
            }
        }
    }
    address.to_owned()
}

/// Splits a comma-separated device list, dropping blanks.
pub fn split_device_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|token| !token.is_empty()).map(str::to_owned).collect()
}

#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: SecretString::from(password.into()) }
    }
}
