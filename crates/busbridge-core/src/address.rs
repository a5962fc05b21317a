//! Bus coordinates.
//!
//! Every parameter slot on the bus is identified by a fixed-arity tuple
//! `[controller, zone, group, parameter]`. Addresses are plain values:
//! two addresses built from the same components are equal and hash
//! identically, which is what lets the dispatcher index subscribers by
//! address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

/// Number of components in an [`Address`].
pub const ADDRESS_ARITY: usize = 4;

/// Immutable bus coordinate `(controller, zone, group, parameter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct Address([u8; ADDRESS_ARITY]);

impl Address {
    pub const fn new(controller: u8, zone: u8, group: u8, parameter: u8) -> Self {
        Self([controller, zone, group, parameter])
    }

    /// Controller-wide address (zone, group and parameter all zero).
    pub const fn controller_address(controller: u8) -> Self {
        Self::new(controller, 0, 0, 0)
    }

    /// Zone address below a controller.
    pub const fn zone_address(controller: u8, zone: u8) -> Self {
        Self::new(controller, zone, 0, 0)
    }

    pub const fn controller(&self) -> u8 {
        self.0[0]
    }

    pub const fn zone(&self) -> u8 {
        self.0[1]
    }

    pub const fn group(&self) -> u8 {
        self.0[2]
    }

    pub const fn parameter(&self) -> u8 {
        self.0[3]
    }

    pub const fn components(&self) -> [u8; ADDRESS_ARITY] {
        self.0
    }

    /// Same slot with a different parameter index.
    pub const fn with_parameter(self, parameter: u8) -> Self {
        Self::new(self.0[0], self.0[1], self.0[2], parameter)
    }

    /// Everything below the controller: `[zone, group, parameter]`.
    ///
    /// Events sent to a controller carry this suffix.
    pub const fn suffix(&self) -> [u8; ADDRESS_ARITY - 1] {
        [self.0[1], self.0[2], self.0[3]]
    }

    /// Parse `[2,0,0,7]`, `2,0,0,7` or `2.0.0.7`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);

        if inner.trim().is_empty() {
            return Err(BusError::AddressInvalid(format!(
                "empty address literal '{}'",
                input
            )));
        }

        let mut components = Vec::with_capacity(ADDRESS_ARITY);
        for part in inner.split([',', '.']) {
            let part = part.trim();
            let value = part.parse::<u32>().map_err(|_| {
                BusError::AddressInvalid(format!(
                    "component '{}' in '{}' is not a number",
                    part, input
                ))
            })?;
            components.push(value);
        }

        Self::try_from(components.as_slice())
    }
}

impl TryFrom<&[u32]> for Address {
    type Error = BusError;

    fn try_from(components: &[u32]) -> Result<Self> {
        if components.len() != ADDRESS_ARITY {
            return Err(BusError::AddressInvalid(format!(
                "expected {} components, got {}",
                ADDRESS_ARITY,
                components.len()
            )));
        }

        let mut out = [0u8; ADDRESS_ARITY];
        for (slot, value) in out.iter_mut().zip(components) {
            *slot = u8::try_from(*value).map_err(|_| {
                BusError::AddressInvalid(format!("component {} out of range 0..=255", value))
            })?;
        }
        Ok(Self(out))
    }
}

impl TryFrom<Vec<u32>> for Address {
    type Error = BusError;

    fn try_from(components: Vec<u32>) -> Result<Self> {
        Self::try_from(components.as_slice())
    }
}

impl From<Address> for Vec<u32> {
    fn from(address: Address) -> Self {
        address.0.iter().map(|c| u32::from(*c)).collect()
    }
}

impl From<[u8; ADDRESS_ARITY]> for Address {
    fn from(components: [u8; ADDRESS_ARITY]) -> Self {
        Self(components)
    }
}

impl FromStr for Address {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c, z, g, p] = self.0;
        write!(f, "[{},{},{},{}]", c, z, g, p)
    }
}
