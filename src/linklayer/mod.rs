//! Link-layer helpers: MAC addresses and the switch learning table.

pub mod mac_address;
pub mod mac_table;
