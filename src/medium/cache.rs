//! Two-dimensional computation cache of the radio medium.
//!
//! One row per live transmission, one column per radio. Rows are indexed by
//! `transmission id - base transmission id` and columns by radio id; rows
//! are only ever removed from the left, advancing the base id. Any slot may
//! be absent; slots are filled lazily from arrival down to the decisions.

use std::collections::VecDeque;

use crate::common::geometry::Coord;
use crate::kernel::SimTime;
use crate::medium::types::{
    Arrival, Frame, Interference, Listening, RadioId, Reception, ReceptionDecision,
    SynchronizationDecision, TransmissionId,
};

/// Lazily filled per-(transmission, radio) computation results.
#[derive(Debug, Clone, Default)]
pub struct ReceptionCacheEntry {
    /// The frame sent to this receiver, if it passed the filters.
    pub frame: Option<Frame>,
    pub arrival: Option<Arrival>,
    pub listening: Option<Listening>,
    pub reception: Option<Reception>,
    pub interference: Option<Interference>,
    pub synchronization_decision: Option<SynchronizationDecision>,
    pub reception_decision: Option<ReceptionDecision>,
}

/// Figure record of a live transmission, kept when communication display is
/// enabled; a canvas layer outside the core consumes these.
#[derive(Debug, Clone, Copy)]
pub struct TransmissionFigure {
    pub position: Coord,
    pub start_time: SimTime,
}

/// Per-transmission cache row.
#[derive(Debug, Clone)]
pub struct TransmissionCacheEntry {
    /// The last moment this transmission can still interfere with others.
    pub interference_end_time: SimTime,
    /// The frame created by the transmitter.
    pub frame: Frame,
    pub figure: Option<TransmissionFigure>,
    reception_cache_entries: Vec<ReceptionCacheEntry>,
}

/// The cache matrix plus the id offsets that keep indices stable while the
/// left end is trimmed.
#[derive(Debug, Default)]
pub struct CommunicationCache {
    base_transmission_id: TransmissionId,
    radio_column_count: usize,
    rows: VecDeque<TransmissionCacheEntry>,
}

impl CommunicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_transmission_id(&self) -> TransmissionId {
        self.base_transmission_id
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row_index(&self, transmission: TransmissionId) -> Option<usize> {
        let index = transmission.checked_sub(self.base_transmission_id)? as usize;
        (index < self.rows.len()).then_some(index)
    }

    /// Grow every row by one column for a newly added radio.
    pub fn add_radio_column(&mut self) {
        self.radio_column_count += 1;
        for row in &mut self.rows {
            row.reception_cache_entries.push(ReceptionCacheEntry::default());
        }
    }

    /// Clear the column of a removed radio in every row. Radio ids are
    /// never reused, so the hole keeps the remaining indices stable.
    pub fn clear_radio_column(&mut self, radio: RadioId) {
        let column = radio as usize;
        for row in &mut self.rows {
            if let Some(entry) = row.reception_cache_entries.get_mut(column) {
                *entry = ReceptionCacheEntry::default();
            }
        }
    }

    /// Append the row of a freshly added transmission. Transmission ids are
    /// contiguous, so the new id is always `base + row_count`.
    pub fn add_transmission_row(
        &mut self,
        frame: Frame,
        interference_end_time: SimTime,
        figure: Option<TransmissionFigure>,
    ) {
        self.rows.push_back(TransmissionCacheEntry {
            interference_end_time,
            frame,
            figure,
            reception_cache_entries: vec![ReceptionCacheEntry::default(); self.radio_column_count],
        });
    }

    /// Drop the first `count` rows and advance the base id past them.
    pub fn evict_prefix(&mut self, count: usize) {
        self.rows.drain(..count);
        self.base_transmission_id += count as TransmissionId;
    }

    pub fn row(&self, transmission: TransmissionId) -> Option<&TransmissionCacheEntry> {
        let index = self.row_index(transmission)?;
        Some(&self.rows[index])
    }

    pub fn row_mut(&mut self, transmission: TransmissionId) -> Option<&mut TransmissionCacheEntry> {
        let index = self.row_index(transmission)?;
        Some(&mut self.rows[index])
    }

    pub fn entry(&self, transmission: TransmissionId, radio: RadioId) -> Option<&ReceptionCacheEntry> {
        self.row(transmission)?.reception_cache_entries.get(radio as usize)
    }

    pub fn entry_mut(
        &mut self,
        transmission: TransmissionId,
        radio: RadioId,
    ) -> Option<&mut ReceptionCacheEntry> {
        self.row_mut(transmission)?
            .reception_cache_entries
            .get_mut(radio as usize)
    }

    /// Iterate over live rows together with their transmission ids.
    pub fn rows(&self) -> impl Iterator<Item = (TransmissionId, &TransmissionCacheEntry)> {
        let base = self.base_transmission_id;
        self.rows
            .iter()
            .enumerate()
            .map(move |(i, row)| (base + i as TransmissionId, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linklayer::mac_address::MacAddress;
    use crate::medium::types::MacPacket;

    fn frame(id: TransmissionId) -> Frame {
        Frame {
            transmission_id: id,
            packet: MacPacket::new(MacAddress::BROADCAST, vec![0; 4]),
        }
    }

    #[test]
    fn rows_and_columns_grow_independently() {
        let mut cache = CommunicationCache::new();
        cache.add_radio_column();
        cache.add_transmission_row(frame(0), 1.0, None);
        cache.add_radio_column();
        assert!(cache.entry(0, 0).is_some());
        assert!(cache.entry(0, 1).is_some());
        assert!(cache.entry(0, 2).is_none());
        assert!(cache.entry(1, 0).is_none());
        cache.add_transmission_row(frame(1), 2.0, None);
        assert!(cache.entry(1, 1).is_some());
    }

    #[test]
    fn prefix_eviction_advances_the_base_id() {
        let mut cache = CommunicationCache::new();
        cache.add_radio_column();
        cache.add_transmission_row(frame(0), 1.0, None);
        cache.add_transmission_row(frame(1), 2.0, None);
        cache.add_transmission_row(frame(2), 3.0, None);
        cache
            .entry_mut(2, 0)
            .unwrap()
            .arrival
            .replace(Arrival {
                start_time: 2.0,
                end_time: 2.1,
                start_position: Coord::ZERO,
                end_position: Coord::ZERO,
            });
        cache.evict_prefix(2);
        assert_eq!(cache.base_transmission_id(), 2);
        assert_eq!(cache.row_count(), 1);
        // Evicted ids miss, surviving ids keep their slots
        assert!(cache.entry(0, 0).is_none());
        assert!(cache.entry(1, 0).is_none());
        assert!(cache.entry(2, 0).unwrap().arrival.is_some());
    }

    #[test]
    fn clearing_a_radio_column_drops_its_slots_only() {
        let mut cache = CommunicationCache::new();
        cache.add_radio_column();
        cache.add_radio_column();
        cache.add_transmission_row(frame(0), 1.0, None);
        cache.entry_mut(0, 0).unwrap().frame = Some(frame(0));
        cache.entry_mut(0, 1).unwrap().frame = Some(frame(0));
        cache.clear_radio_column(0);
        assert!(cache.entry(0, 0).unwrap().frame.is_none());
        assert!(cache.entry(0, 1).unwrap().frame.is_some());
    }
}
