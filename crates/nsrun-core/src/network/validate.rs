//! Validation of names and addresses before they reach a command line.
//!
//! Nothing is ever interpolated into an external command unless it
//! passed one of these checks.

use std::net::IpAddr;

use nsrun_common::constants::MAX_IFNAME_LEN;
use nsrun_common::error::{NsrunError, Result};
use nsrun_common::types::NetworkConfig;

/// Checks a network interface or bridge name.
///
/// Accepts 1 to 15 characters from `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns an error naming the offending input otherwise.
pub fn interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_IFNAME_LEN {
        return Err(NsrunError::invalid(format!(
            "interface name {name:?} must be 1-{MAX_IFNAME_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(NsrunError::invalid(format!(
            "interface name {name:?} contains {bad:?}"
        )));
    }
    Ok(())
}

/// Checks an address in CIDR form, e.g. `10.0.0.2/24` or `fd00::2/64`.
///
/// # Errors
///
/// Returns an error if the address or prefix length is malformed or the
/// prefix exceeds the address family's width.
pub fn cidr(value: &str) -> Result<()> {
    let invalid = || NsrunError::invalid(format!("invalid CIDR address {value:?}"));
    let (addr, prefix) = value.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok(())
}

/// Checks a gateway address.
///
/// # Errors
///
/// Returns an error if `value` is not an IPv4 or IPv6 address.
pub fn gateway(value: &str) -> Result<()> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| NsrunError::invalid(format!("invalid gateway address {value:?}")))
}

/// Checks every name and address of a network configuration.
///
/// # Errors
///
/// Returns the first validation failure.
pub fn network_config(config: &NetworkConfig) -> Result<()> {
    interface_name(&config.bridge)?;
    interface_name(&config.host_if)?;
    interface_name(&config.container_if)?;
    if config.host_if == config.container_if {
        return Err(NsrunError::invalid(format!(
            "veth ends must differ, both are {:?}",
            config.host_if
        )));
    }
    cidr(&config.address)?;
    if let Some(gw) = config.gateway.as_deref().filter(|g| !g.is_empty()) {
        gateway(gw)?;
    }
    Ok(())
}
