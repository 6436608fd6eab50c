// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::Ipv4Addr, str::FromStr};

use ipnetwork::Ipv4Network;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidrError {
    #[error("malformed CIDR {0:?}, expected A.B.C.D/prefix")]
    Malformed(String),
    #[error("prefix /{0} out of range, expected [0, 32]")]
    PrefixRange(u8),
}

/// An IPv4 CIDR range in `A.B.C.D/prefix` form.
///
/// A typed wrapper over [`Ipv4Network`] that insists on the explicit
/// `addr/prefix` spelling (a bare address is rejected, not treated as /32)
/// and normalizes host bits away, so `10.0.0.5/30` and `10.0.0.4/30`
/// denote the same range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    net: Ipv4Network,
}

impl FromStr for CidrRange {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CidrError::Malformed(s.to_string());

        let (addr, prefix) = s.split_once('/').ok_or_else(malformed)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| malformed())?;
        let prefix: u8 = prefix.parse().map_err(|_| malformed())?;
        if prefix > 32 {
            return Err(CidrError::PrefixRange(prefix));
        }

        let given = Ipv4Network::new(addr, prefix).map_err(|_| malformed())?;
        // Re-anchor on the network address so equality ignores host bits.
        let net = Ipv4Network::new(given.network(), prefix).map_err(|_| malformed())?;
        Ok(Self { net })
    }
}

impl std::fmt::Display for CidrRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.net)
    }
}

impl CidrRange {
    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn prefix(&self) -> u8 {
        self.net.prefix()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    /// Number of usable host addresses in the range.
    ///
    /// Network and broadcast are excluded for prefixes up to /30; /31 and
    /// /32 count every address.
    pub fn usable_host_count(&self) -> u64 {
        match self.net.prefix() {
            32 => 1,
            31 => 2,
            p => (1u64 << (32 - p)) - 2,
        }
    }

    /// Usable host addresses in ascending order.
    ///
    /// Lazy: a /0 expands to four billion addresses, and callers are
    /// expected to gate oversized ranges before collecting.
    pub fn usable_hosts(self) -> impl Iterator<Item = Ipv4Addr> {
        let network = self.net.network();
        let broadcast = self.net.broadcast();
        let keep_edges = self.net.prefix() >= 31;

        self.net
            .iter()
            .filter(move |ip| keep_edges || (*ip != network && *ip != broadcast))
    }
}
