//! VLAN-partitioned MAC address learning table with aging.
//!
//! The table maps (VLAN, address) to the port the address was last seen on.
//! Entries older than the aging time are stale: lookups remove them eagerly
//! and the explicit expiry passes sweep them in bulk. The table has no clock
//! of its own; every operation takes the current simulated time.

use std::collections::HashMap;

use crate::kernel::SimTime;
use crate::linklayer::mac_address::MacAddress;

/// A learned address entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AddressEntry {
    pub vlan: u16,
    pub port: u32,
    pub insertion_time: SimTime,
}

type AddressTable = HashMap<MacAddress, AddressEntry>;

/// The learning table. VLAN 0 is pre-created and never dropped.
#[derive(Debug, Clone)]
pub struct MacAddressTable {
    aging_time: f64,
    tables: HashMap<u16, AddressTable>,
}

impl MacAddressTable {
    /// `aging_time` is the duration in seconds after which a learned entry
    /// is considered stale.
    pub fn new(aging_time: f64) -> Self {
        let mut tables = HashMap::new();
        tables.insert(0, AddressTable::new());
        Self { aging_time, tables }
    }

    /// The port learned for `address` on `vlan`, or `None` if the VLAN has
    /// no table, the address is unknown, or the entry has aged out. Aged
    /// entries are removed on the spot; the boundary is exclusive, so an
    /// entry is already stale at exactly `insertion_time + aging_time`.
    pub fn lookup(&mut self, address: MacAddress, vlan: u16, now: SimTime) -> Option<u32> {
        let table = self.tables.get_mut(&vlan)?;
        let entry = *table.get(&address)?;
        if entry.insertion_time + self.aging_time <= now {
            log::debug!("dropping aged entry {address} -> port {} on vlan {vlan}", entry.port);
            table.remove(&address);
            return None;
        }
        Some(entry.port)
    }

    /// Learns `address` on `port`. Broadcast addresses are never inserted.
    /// The per-VLAN table is created on first use. Returns true iff the
    /// entry existed before (it is refreshed in place).
    pub fn learn(&mut self, port: u32, address: MacAddress, vlan: u16, now: SimTime) -> bool {
        if address.is_broadcast() {
            return false;
        }
        let table = self.tables.entry(vlan).or_default();
        match table.get_mut(&address) {
            Some(entry) => {
                log::debug!("refreshing {address} -> port {port} on vlan {vlan}");
                entry.port = port;
                entry.insertion_time = now;
                true
            }
            None => {
                log::debug!("learning {address} -> port {port} on vlan {vlan}");
                table.insert(
                    address,
                    AddressEntry {
                        vlan,
                        port,
                        insertion_time: now,
                    },
                );
                false
            }
        }
    }

    /// Removes every entry learned on `port`, across all VLANs.
    pub fn flush_port(&mut self, port: u32) {
        for table in self.tables.values_mut() {
            table.retain(|_, entry| entry.port != port);
        }
    }

    /// Rewrites every entry on port `from` to port `to`. Used when ports
    /// are renumbered.
    pub fn remap_port(&mut self, from: u32, to: u32) {
        for table in self.tables.values_mut() {
            for entry in table.values_mut() {
                if entry.port == from {
                    entry.port = to;
                }
            }
        }
    }

    /// Removes all aged entries from one VLAN.
    pub fn expire_vlan(&mut self, vlan: u16, now: SimTime) {
        let aging_time = self.aging_time;
        if let Some(table) = self.tables.get_mut(&vlan) {
            table.retain(|_, entry| entry.insertion_time + aging_time > now);
        }
    }

    /// Removes all aged entries from every VLAN.
    pub fn expire_all(&mut self, now: SimTime) {
        let aging_time = self.aging_time;
        for table in self.tables.values_mut() {
            table.retain(|_, entry| entry.insertion_time + aging_time > now);
        }
    }

    /// Total number of entries across all VLANs.
    pub fn entry_count(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(last: u8) -> MacAddress {
        MacAddress::new([0, 0, 0, 0, 0, last])
    }

    #[test]
    fn learn_and_lookup() {
        let mut table = MacAddressTable::new(1.0);
        assert!(!table.learn(3, address(1), 1, 0.0));
        assert_eq!(table.lookup(address(1), 1, 0.5), Some(3));
        // Unknown VLAN and unknown address are silent misses
        assert_eq!(table.lookup(address(1), 2, 0.5), None);
        assert_eq!(table.lookup(address(9), 1, 0.5), None);
        // Refresh moves the entry to a new port
        assert!(table.learn(7, address(1), 1, 0.5));
        assert_eq!(table.lookup(address(1), 1, 0.6), Some(7));
    }

    #[test]
    fn aging_boundary_is_exclusive() {
        let mut table = MacAddressTable::new(1.0);
        table.learn(3, address(1), 1, 0.0);
        assert_eq!(table.lookup(address(1), 1, 0.5), Some(3));
        // At exactly insertion + aging the entry is stale and removed
        assert_eq!(table.lookup(address(1), 1, 1.0), None);
        assert_eq!(table.entry_count(), 0);
    }

    #[test]
    fn broadcast_is_never_inserted() {
        let mut table = MacAddressTable::new(1.0);
        assert!(!table.learn(3, MacAddress::BROADCAST, 0, 0.0));
        assert_eq!(table.entry_count(), 0);
        assert_eq!(table.lookup(MacAddress::BROADCAST, 0, 0.1), None);
    }

    #[test]
    fn flush_and_remap_cross_vlans() {
        let mut table = MacAddressTable::new(10.0);
        table.learn(1, address(1), 0, 0.0);
        table.learn(1, address(2), 5, 0.0);
        table.learn(2, address(3), 5, 0.0);
        table.remap_port(1, 9);
        assert_eq!(table.lookup(address(1), 0, 1.0), Some(9));
        assert_eq!(table.lookup(address(2), 5, 1.0), Some(9));
        assert_eq!(table.lookup(address(3), 5, 1.0), Some(2));
        table.flush_port(9);
        assert_eq!(table.lookup(address(1), 0, 1.0), None);
        assert_eq!(table.lookup(address(2), 5, 1.0), None);
        assert_eq!(table.lookup(address(3), 5, 1.0), Some(2));
    }

    #[test]
    fn expiry_passes_sweep_aged_entries() {
        let mut table = MacAddressTable::new(1.0);
        table.learn(1, address(1), 0, 0.0);
        table.learn(2, address(2), 5, 0.5);
        table.expire_vlan(0, 1.0);
        assert_eq!(table.entry_count(), 1);
        table.learn(3, address(3), 0, 1.2);
        table.expire_all(1.6);
        // Only the entry learned at 1.2 survives; VLAN 0 itself remains
        assert_eq!(table.entry_count(), 1);
        assert_eq!(table.lookup(address(3), 0, 1.7), Some(3));
        assert!(!table.learn(4, address(4), 0, 1.7));
    }
}
