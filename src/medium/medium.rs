//! The radio medium: registers radios, records transmissions, filters
//! potential receivers, schedules deliveries and decides receptions.
//!
//! High-level flow for a single transmission:
//! 1) The transmitter hands a MAC packet to `transmit_packet`.
//! 2) The medium builds the immutable transmission descriptor, allocates a
//!    cache row, invalidates decisions whose windows the new signal
//!    overlaps, and arms the purge timer.
//! 3) Every radio passing the mode/address/listening/range filters gets the
//!    frame scheduled at its arrival time through the kernel.
//! 4) On arrival the receiver asks for a decision; the medium lazily fills
//!    the cache pipeline arrival -> listening -> reception -> interference
//!    -> decision, reusing every already computed layer.
//!
//! Memory is bounded only by `remove_non_interfering_transmissions`, which
//! trims the left end of the transmission list once signals can no longer
//! interfere. A very long-lived head transmission therefore pins the whole
//! cache matrix; the eviction index is a simple monotone ring.

use crate::common::geometry::Coord;
use crate::error::{Error, Result};
use crate::kernel::{Kernel, SimTime, TimerToken};
use crate::medium::cache::{CommunicationCache, TransmissionFigure};
use crate::medium::comm_log::{CommunicationLog, CommunicationTrail};
use crate::medium::models::{
    Attenuation, AttenuationContext, BackgroundNoise, ConstantSpeedPropagation, FreeSpacePathLoss,
    NeighborCache, ObstacleLoss, PathLoss, Propagation, ReceiverModel, ScalarAttenuation,
    SnirReceiverModel,
};
use crate::medium::signal::frame_airtime;
use crate::medium::types::{
    Arrival, Frame, Interference, Listening, ListeningDecision, MacPacket, MediumConfig,
    MediumLimits, Radio, RadioId, RadioMode, RangeFilter, ReceivedPacket, Reception,
    ReceptionDecision, SynchronizationDecision, Transmission, TransmissionId,
};

/// Token of the only self-timer the medium owns.
pub const PURGE_TIMER: TimerToken = TimerToken(1);

/// Capacity of the communication trail ring buffer.
const TRAIL_CAPACITY: usize = 1000;

/// Event and cache counters. Each cache layer tallies a (get, hit) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediumStatistics {
    pub transmission_count: u64,
    pub send_count: u64,
    pub reception_computation_count: u64,
    pub interference_computation_count: u64,
    pub synchronization_decision_computation_count: u64,
    pub reception_decision_computation_count: u64,
    pub listening_decision_computation_count: u64,
    pub cache_reception_get_count: u64,
    pub cache_reception_hit_count: u64,
    pub cache_interference_get_count: u64,
    pub cache_interference_hit_count: u64,
    pub cache_synchronization_decision_get_count: u64,
    pub cache_synchronization_decision_hit_count: u64,
    pub cache_reception_decision_get_count: u64,
    pub cache_reception_decision_hit_count: u64,
}

/// The wireless radio medium.
pub struct RadioMedium {
    config: MediumConfig,
    propagation: Box<dyn Propagation>,
    path_loss: Box<dyn PathLoss>,
    obstacle_loss: Option<Box<dyn ObstacleLoss>>,
    attenuation: Box<dyn Attenuation>,
    background_noise: Option<Box<dyn BackgroundNoise>>,
    receiver_model: Box<dyn ReceiverModel>,
    neighbor_cache: Option<Box<dyn NeighborCache>>,
    radios: Vec<Radio>,
    transmissions: Vec<Transmission>,
    cache: CommunicationCache,
    next_radio_id: RadioId,
    next_transmission_id: TransmissionId,
    limits: MediumLimits,
    purge_timer_at: Option<SimTime>,
    statistics: MediumStatistics,
    communication_log: Option<CommunicationLog>,
    communication_trail: Option<CommunicationTrail>,
}

impl RadioMedium {
    /// Builds a medium with the default models: constant-speed propagation,
    /// free-space path loss, scalar attenuation, SNIR receiver, no obstacle
    /// loss, no background noise, no neighbor cache. Swap models with the
    /// `with_*` builders before adding radios.
    pub fn new(config: MediumConfig) -> Result<Self> {
        config.validate()?;
        let communication_log = if config.record_communication_log {
            let log = CommunicationLog::open(&config.result_dir, &config.config_name, config.run_number)
                .map_err(|error| {
                    Error::InvalidConfiguration(format!("cannot open communication log: {error}"))
                })?;
            log::info!("recording communication log to {}", log.path().display());
            Some(log)
        } else {
            None
        };
        let communication_trail = config
            .leave_communication_trail
            .then(|| CommunicationTrail::new(TRAIL_CAPACITY));
        let mut medium = Self {
            config,
            propagation: Box::new(ConstantSpeedPropagation::default()),
            path_loss: Box::new(FreeSpacePathLoss),
            obstacle_loss: None,
            attenuation: Box::new(ScalarAttenuation),
            background_noise: None,
            receiver_model: Box::new(SnirReceiverModel),
            neighbor_cache: None,
            radios: Vec::new(),
            transmissions: Vec::new(),
            cache: CommunicationCache::new(),
            next_radio_id: 0,
            next_transmission_id: 0,
            limits: MediumLimits::default(),
            purge_timer_at: None,
            statistics: MediumStatistics::default(),
            communication_log,
            communication_trail,
        };
        medium.update_limits();
        Ok(medium)
    }

    pub fn with_propagation(mut self, model: Box<dyn Propagation>) -> Self {
        self.propagation = model;
        self
    }

    pub fn with_path_loss(mut self, model: Box<dyn PathLoss>) -> Self {
        self.path_loss = model;
        self.update_limits();
        self
    }

    pub fn with_obstacle_loss(mut self, model: Box<dyn ObstacleLoss>) -> Self {
        self.obstacle_loss = Some(model);
        self
    }

    pub fn with_attenuation(mut self, model: Box<dyn Attenuation>) -> Self {
        self.attenuation = model;
        self
    }

    pub fn with_background_noise(mut self, model: Box<dyn BackgroundNoise>) -> Self {
        self.background_noise = Some(model);
        self
    }

    pub fn with_receiver_model(mut self, model: Box<dyn ReceiverModel>) -> Self {
        self.receiver_model = model;
        self
    }

    pub fn with_neighbor_cache(mut self, cache: Box<dyn NeighborCache>) -> Self {
        self.neighbor_cache = Some(cache);
        self
    }

    pub fn statistics(&self) -> &MediumStatistics {
        &self.statistics
    }

    pub fn limits(&self) -> &MediumLimits {
        &self.limits
    }

    pub fn radios(&self) -> &[Radio] {
        &self.radios
    }

    /// Live transmissions, ordered by id.
    pub fn transmissions(&self) -> &[Transmission] {
        &self.transmissions
    }

    pub fn base_transmission_id(&self) -> TransmissionId {
        self.cache.base_transmission_id()
    }

    pub fn cache_row_count(&self) -> usize {
        self.cache.row_count()
    }

    /// Segments of successful receptions, when the trail is enabled.
    pub fn communication_trail(&self) -> impl Iterator<Item = &(Coord, Coord)> {
        self.communication_trail.iter().flat_map(CommunicationTrail::segments)
    }

    /// Figure records of live transmissions, when display is enabled.
    pub fn transmission_figures(&self) -> Vec<(TransmissionId, TransmissionFigure)> {
        self.cache
            .rows()
            .filter_map(|(id, row)| row.figure.map(|figure| (id, figure)))
            .collect()
    }

    fn radio(&self, id: RadioId) -> Option<Radio> {
        self.radios.iter().find(|radio| radio.id == id).copied()
    }

    /// Transmissions are contiguous by id, so the live set is indexable.
    fn transmission(&self, id: TransmissionId) -> Option<Transmission> {
        let first = self.transmissions.first()?;
        let index = id.checked_sub(first.id)? as usize;
        self.transmissions.get(index).copied()
    }

    /// Attach a radio. The returned id stays valid for the radio's whole
    /// lifetime and is never reused.
    pub fn add_radio(&mut self, mut radio: Radio) -> RadioId {
        radio.id = self.next_radio_id;
        self.next_radio_id += 1;
        log::debug!("adding radio {} ({})", radio.id, radio.mac_address);
        self.cache.add_radio_column();
        if let Some(cache) = &mut self.neighbor_cache {
            cache.add_radio(&radio);
        }
        self.radios.push(radio);
        self.update_limits();
        radio.id
    }

    /// Detach a radio. Pending deliveries to it are the kernel's problem;
    /// its cache column is cleared, not shifted, so indices stay stable.
    pub fn remove_radio(&mut self, id: RadioId) {
        log::debug!("removing radio {id}");
        self.radios.retain(|radio| radio.id != id);
        self.cache.clear_radio_column(id);
        if let Some(cache) = &mut self.neighbor_cache {
            cache.remove_radio(id);
        }
        self.update_limits();
    }

    /// Signal path for radio mode changes.
    pub fn set_radio_mode(&mut self, id: RadioId, mode: RadioMode) {
        if let Some(radio) = self.radios.iter_mut().find(|radio| radio.id == id) {
            radio.mode = mode;
        }
        self.update_limits();
    }

    /// Signal path for position changes. Already computed arrivals keep the
    /// motion they were derived from; only future computations see the new
    /// trajectory.
    pub fn set_radio_mobility(&mut self, id: RadioId, mobility: crate::medium::types::LinearMobility) {
        if let Some(radio) = self.radios.iter_mut().find(|radio| radio.id == id) {
            radio.mobility = mobility;
        }
        self.update_limits();
    }

    /// Recomputes the limit cache as extrema over the current radios. With
    /// no radios every bound is NaN, which disables the range filters.
    fn update_limits(&mut self) {
        let max_speed = self
            .radios
            .iter()
            .map(|radio| radio.mobility.speed())
            .fold(f64::NAN, f64::max);
        let max_transmission_power_dbm = self
            .radios
            .iter()
            .map(|radio| radio.transmitter.power_dbm)
            .fold(f64::NAN, f64::max);
        let min_interference_power_dbm = self
            .radios
            .iter()
            .map(|radio| radio.receiver.energy_detection_dbm)
            .fold(f64::NAN, f64::min);
        let min_reception_power_dbm = self
            .radios
            .iter()
            .map(|radio| radio.receiver.sensitivity_dbm)
            .fold(f64::NAN, f64::min);
        let max_antenna_gain_db = self
            .radios
            .iter()
            .map(|radio| radio.antenna.gain_db)
            .fold(f64::NAN, f64::max);
        // The lowest carrier gives the longest, i.e. worst case, range
        let frequency = self
            .radios
            .iter()
            .map(|radio| radio.transmitter.center_frequency)
            .fold(f64::NAN, f64::min);
        let gain_budget = max_transmission_power_dbm + 2.0 * max_antenna_gain_db;
        let max_communication_range = self
            .config
            .max_communication_range
            .unwrap_or_else(|| {
                self.path_loss
                    .compute_range(gain_budget - min_reception_power_dbm, frequency)
            });
        let max_interference_range = self
            .config
            .max_interference_range
            .unwrap_or_else(|| {
                self.path_loss
                    .compute_range(gain_budget - min_interference_power_dbm, frequency)
            });
        self.limits = MediumLimits {
            max_speed,
            max_transmission_power_dbm,
            min_interference_power_dbm,
            min_reception_power_dbm,
            max_antenna_gain_db,
            min_interference_time: self.config.min_interference_time,
            max_transmission_duration: self.config.max_transmission_duration,
            max_communication_range,
            max_interference_range,
        };
    }

    /// How long past its end time a transmission can still interfere.
    fn max_interference_window(&self) -> f64 {
        if let Some(window) = self.config.max_interference_window {
            return window;
        }
        let range = self.limits.max_interference_range;
        let max_propagation_delay = if range.is_finite() {
            range / self.propagation.propagation_speed()
        } else {
            0.0
        };
        max_propagation_delay + self.config.min_interference_time
    }

    /// Records a transmission and fans the frame out to every potential
    /// receiver. Returns the frame delivered to the receivers.
    pub fn transmit_packet(
        &mut self,
        kernel: &mut dyn Kernel,
        transmitter_id: RadioId,
        packet: MacPacket,
    ) -> Result<Frame> {
        let transmitter = self.radio(transmitter_id).ok_or_else(|| {
            Error::InvalidInput(format!("unknown transmitter radio {transmitter_id}"))
        })?;
        let now = kernel.now();
        let duration = frame_airtime(
            packet.bit_length(),
            transmitter.transmitter.bitrate,
            transmitter.transmitter.preamble_duration,
        );
        let transmission = Transmission {
            id: self.next_transmission_id,
            transmitter_id,
            destination: packet.destination,
            start_time: now,
            end_time: now + duration,
            start_position: transmitter.mobility.position_at(now),
            end_position: transmitter.mobility.position_at(now + duration),
            power_dbm: transmitter.transmitter.power_dbm,
            center_frequency: transmitter.transmitter.center_frequency,
            bandwidth: transmitter.transmitter.bandwidth,
            bitrate: transmitter.transmitter.bitrate,
            antenna_gain_db: transmitter.antenna.gain_db,
        };
        self.next_transmission_id += 1;
        log::debug!(
            "transmission {} from radio {} at {now:.6}, {} bits",
            transmission.id,
            transmitter_id,
            packet.bit_length()
        );

        // A new signal on the medium can change decisions that depend on
        // future interference; arrivals and receptions stay valid.
        self.invalidate_cached_decisions(&transmission);

        let frame = Frame {
            transmission_id: transmission.id,
            packet,
        };
        let interference_end_time = transmission.end_time + self.max_interference_window();
        let figure = self.config.display_communication.then(|| TransmissionFigure {
            position: transmission.start_position,
            start_time: now,
        });
        self.transmissions.push(transmission);
        self.cache
            .add_transmission_row(frame.clone(), interference_end_time, figure);
        self.statistics.transmission_count += 1;

        match self.purge_timer_at {
            None => {
                kernel.schedule_timer(interference_end_time, PURGE_TIMER);
                self.purge_timer_at = Some(interference_end_time);
            }
            Some(at) if interference_end_time < at => {
                kernel.cancel_timer(PURGE_TIMER);
                kernel.schedule_timer(interference_end_time, PURGE_TIMER);
                self.purge_timer_at = Some(interference_end_time);
            }
            Some(_) => {}
        }

        if let Some(log) = &mut self.communication_log {
            log.record_transmission(&transmission, &frame.packet);
        }

        self.send_to_affected_radios(kernel, &transmitter, &transmission, &frame);
        Ok(frame)
    }

    fn send_to_affected_radios(
        &mut self,
        kernel: &mut dyn Kernel,
        transmitter: &Radio,
        transmission: &Transmission,
        frame: &Frame,
    ) {
        let candidates: Vec<RadioId> = match &self.neighbor_cache {
            Some(cache) => cache.neighbors(transmitter, self.limits.max_interference_range),
            None => self.radios.iter().map(|radio| radio.id).collect(),
        };
        for id in candidates {
            if id == transmitter.id {
                continue;
            }
            let Some(receiver) = self.radio(id) else {
                continue;
            };
            if !self.is_potential_receiver(&receiver, transmission) {
                continue;
            }
            let Some(arrival) = self.get_arrival(id, transmission.id) else {
                continue;
            };
            kernel.send_direct(id, arrival.start_time, frame.clone());
            if let Some(entry) = self.cache.entry_mut(transmission.id, id) {
                entry.frame = Some(frame.clone());
            }
            self.statistics.send_count += 1;
        }
    }

    /// AND of the enabled receiver filters. NaN range limits disable the
    /// range filter.
    fn is_potential_receiver(&self, receiver: &Radio, transmission: &Transmission) -> bool {
        if self.config.radio_mode_filter && !receiver.mode.is_receiving() {
            return false;
        }
        if self.config.mac_address_filter
            && !transmission.destination.is_broadcast()
            && transmission.destination != receiver.mac_address
        {
            return false;
        }
        if self.config.listening_filter
            && !self
                .attenuation
                .is_listening_compatible(&receiver.listening, transmission)
        {
            return false;
        }
        match self.config.range_filter {
            RangeFilter::Anywhere => true,
            RangeFilter::CommunicationRange => {
                self.is_in_range(receiver, transmission, self.limits.max_communication_range)
            }
            RangeFilter::InterferenceRange => {
                self.is_in_range(receiver, transmission, self.limits.max_interference_range)
            }
        }
    }

    fn is_in_range(&self, receiver: &Radio, transmission: &Transmission, range: f64) -> bool {
        if range.is_nan() {
            return true;
        }
        let start_position = receiver.mobility.position_at(transmission.start_time);
        let end_position = receiver.mobility.position_at(transmission.end_time);
        transmission.start_position.distance_to(&start_position) <= range
            && transmission.end_position.distance_to(&end_position) <= range
    }

    /// Minimum-overlap test of spec'd interference: the shared window of
    /// the transmission (stretched by the minimum interference time) and
    /// the given interval must reach the minimum interference time.
    fn is_interfering_window(&self, transmission: &Transmission, start: SimTime, end: SimTime) -> bool {
        let min_time = self.config.min_interference_time;
        (transmission.end_time + min_time).min(end) - transmission.start_time.max(start) >= min_time
    }

    /// Drops interference and decisions of every cache cell whose window
    /// overlaps the new transmission. Arrivals, listenings and receptions
    /// are never invalidated.
    fn invalidate_cached_decisions(&mut self, transmission: &Transmission) {
        let live_ids: Vec<TransmissionId> = self.transmissions.iter().map(|t| t.id).collect();
        for id in live_ids {
            for radio in 0..self.next_radio_id {
                let window = self.cache.entry(id, radio).and_then(|entry| {
                    entry
                        .reception
                        .map(|r| (r.start_time, r.end_time))
                        .or_else(|| entry.listening.map(|l| (l.start_time, l.end_time)))
                });
                let Some((start, end)) = window else {
                    continue;
                };
                if self.is_interfering_window(transmission, start, end) {
                    if let Some(entry) = self.cache.entry_mut(id, radio) {
                        entry.interference = None;
                        entry.synchronization_decision = None;
                        entry.reception_decision = None;
                    }
                }
            }
        }
    }

    /// When and where a transmission reaches a receiver. Cached.
    pub fn get_arrival(&mut self, receiver: RadioId, transmission_id: TransmissionId) -> Option<Arrival> {
        if let Some(arrival) = self
            .cache
            .entry(transmission_id, receiver)
            .and_then(|entry| entry.arrival)
        {
            return Some(arrival);
        }
        let transmission = self.transmission(transmission_id)?;
        let radio = self.radio(receiver)?;
        let arrival = self.propagation.compute_arrival(&transmission, &radio.mobility);
        if let Some(entry) = self.cache.entry_mut(transmission_id, receiver) {
            entry.arrival = Some(arrival);
        }
        Some(arrival)
    }

    fn get_listening(&mut self, receiver: RadioId, transmission_id: TransmissionId) -> Option<Listening> {
        if let Some(listening) = self
            .cache
            .entry(transmission_id, receiver)
            .and_then(|entry| entry.listening)
        {
            return Some(listening);
        }
        let arrival = self.get_arrival(receiver, transmission_id)?;
        let radio = self.radio(receiver)?;
        let listening = self
            .receiver_model
            .create_listening(&radio, arrival.start_time, arrival.end_time);
        if let Some(entry) = self.cache.entry_mut(transmission_id, receiver) {
            entry.listening = Some(listening);
        }
        Some(listening)
    }

    fn get_reception(&mut self, receiver: RadioId, transmission_id: TransmissionId) -> Option<Reception> {
        self.statistics.cache_reception_get_count += 1;
        if let Some(reception) = self
            .cache
            .entry(transmission_id, receiver)
            .and_then(|entry| entry.reception)
        {
            self.statistics.cache_reception_hit_count += 1;
            return Some(reception);
        }
        let transmission = self.transmission(transmission_id)?;
        let radio = self.radio(receiver)?;
        let arrival = self.get_arrival(receiver, transmission_id)?;
        let reception = {
            let context = AttenuationContext {
                path_loss: &*self.path_loss,
                obstacle_loss: self.obstacle_loss.as_deref(),
            };
            self.attenuation
                .compute_reception(&radio, &transmission, &arrival, &context)
        };
        self.statistics.reception_computation_count += 1;
        if let Some(entry) = self.cache.entry_mut(transmission_id, receiver) {
            entry.reception = Some(reception);
        }
        Some(reception)
    }

    fn get_interference(&mut self, receiver: RadioId, transmission_id: TransmissionId) -> Option<Interference> {
        self.statistics.cache_interference_get_count += 1;
        if let Some(interference) = self
            .cache
            .entry(transmission_id, receiver)
            .and_then(|entry| entry.interference.clone())
        {
            self.statistics.cache_interference_hit_count += 1;
            return Some(interference);
        }
        let listening = self.get_listening(receiver, transmission_id)?;
        let interferer_ids: Vec<TransmissionId> = self
            .transmissions
            .iter()
            .filter(|t| {
                t.id != transmission_id
                    && self.is_interfering_window(t, listening.start_time, listening.end_time)
            })
            .map(|t| t.id)
            .collect();
        let mut interfering_powers = Vec::with_capacity(interferer_ids.len());
        for id in interferer_ids {
            if let Some(reception) = self.get_reception(receiver, id) {
                interfering_powers.push((id, reception.power_dbm));
            }
        }
        let noise_power_dbm = self
            .background_noise
            .as_ref()
            .map(|model| model.compute_noise_dbm(&listening))
            .unwrap_or(f64::NEG_INFINITY);
        let interference = Interference {
            noise_power_dbm,
            interfering_powers,
        };
        self.statistics.interference_computation_count += 1;
        if let Some(entry) = self.cache.entry_mut(transmission_id, receiver) {
            entry.interference = Some(interference.clone());
        }
        Some(interference)
    }

    fn get_synchronization_decision(
        &mut self,
        receiver: RadioId,
        transmission_id: TransmissionId,
    ) -> Option<SynchronizationDecision> {
        self.statistics.cache_synchronization_decision_get_count += 1;
        if let Some(decision) = self
            .cache
            .entry(transmission_id, receiver)
            .and_then(|entry| entry.synchronization_decision)
        {
            self.statistics.cache_synchronization_decision_hit_count += 1;
            return Some(decision);
        }
        let radio = self.radio(receiver)?;
        let listening = self.get_listening(receiver, transmission_id)?;
        let reception = self.get_reception(receiver, transmission_id)?;
        let interference = self.get_interference(receiver, transmission_id)?;
        let decision = self.receiver_model.compute_synchronization_decision(
            &radio,
            &listening,
            &reception,
            &interference,
        );
        self.statistics.synchronization_decision_computation_count += 1;
        if let Some(entry) = self.cache.entry_mut(transmission_id, receiver) {
            entry.synchronization_decision = Some(decision);
        }
        Some(decision)
    }

    fn get_reception_decision(
        &mut self,
        receiver: RadioId,
        transmission_id: TransmissionId,
    ) -> Option<ReceptionDecision> {
        self.statistics.cache_reception_decision_get_count += 1;
        if let Some(decision) = self
            .cache
            .entry(transmission_id, receiver)
            .and_then(|entry| entry.reception_decision)
        {
            self.statistics.cache_reception_decision_hit_count += 1;
            return Some(decision);
        }
        let radio = self.radio(receiver)?;
        let listening = self.get_listening(receiver, transmission_id)?;
        let reception = self.get_reception(receiver, transmission_id)?;
        let interference = self.get_interference(receiver, transmission_id)?;
        let decision = self.receiver_model.compute_reception_decision(
            &radio,
            &listening,
            &reception,
            &interference,
        );
        self.statistics.reception_decision_computation_count += 1;
        if let Some(entry) = self.cache.entry_mut(transmission_id, receiver) {
            entry.reception_decision = Some(decision);
        }
        Some(decision)
    }

    /// Decides whether the receiver can lock onto the frame's preamble.
    pub fn synchronize_packet(
        &mut self,
        receiver: RadioId,
        frame: &Frame,
    ) -> Result<SynchronizationDecision> {
        self.get_synchronization_decision(receiver, frame.transmission_id)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "no live transmission {} for radio {receiver}",
                    frame.transmission_id
                ))
            })
    }

    /// Decides the reception of a delivered frame and hands the packet back
    /// together with the decision.
    pub fn receive_packet(
        &mut self,
        kernel: &dyn Kernel,
        receiver: RadioId,
        frame: &Frame,
    ) -> Result<ReceivedPacket> {
        let decision = self
            .get_reception_decision(receiver, frame.transmission_id)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "no live transmission {} for radio {receiver}",
                    frame.transmission_id
                ))
            })?;
        if let Some(log) = &mut self.communication_log {
            log.record_reception(kernel.now(), receiver, frame, &decision);
        }
        let trail_segment = if decision.successful && self.config.leave_communication_trail {
            let transmission = self.transmission(frame.transmission_id);
            let arrival = self
                .cache
                .entry(frame.transmission_id, receiver)
                .and_then(|entry| entry.arrival);
            transmission
                .zip(arrival)
                .map(|(t, a)| (t.start_position, a.start_position))
        } else {
            None
        };
        if let (Some(trail), Some((from, to))) = (self.communication_trail.as_mut(), trail_segment) {
            trail.push(from, to);
        }
        Ok(ReceivedPacket {
            packet: frame.packet.clone(),
            decision,
        })
    }

    /// Evaluates a passive listening window against everything currently on
    /// the medium. Not cached.
    pub fn listen_on_medium(
        &mut self,
        receiver: RadioId,
        listening: &Listening,
    ) -> Result<ListeningDecision> {
        let radio = self
            .radio(receiver)
            .ok_or_else(|| Error::InvalidInput(format!("unknown radio {receiver}")))?;
        let interferer_ids: Vec<TransmissionId> = self
            .transmissions
            .iter()
            .filter(|t| self.is_interfering_window(t, listening.start_time, listening.end_time))
            .map(|t| t.id)
            .collect();
        let mut interfering_powers = Vec::with_capacity(interferer_ids.len());
        for id in interferer_ids {
            if let Some(reception) = self.get_reception(receiver, id) {
                interfering_powers.push((id, reception.power_dbm));
            }
        }
        let noise_power_dbm = self
            .background_noise
            .as_ref()
            .map(|model| model.compute_noise_dbm(listening))
            .unwrap_or(f64::NEG_INFINITY);
        let interference = Interference {
            noise_power_dbm,
            interfering_powers,
        };
        let decision = self
            .receiver_model
            .compute_listening_decision(&radio, listening, &interference);
        self.statistics.listening_decision_computation_count += 1;
        Ok(decision)
    }

    /// True when the receiver would try to lock onto the transmission.
    /// Misses (evicted transmission, removed radio) are silently false.
    pub fn is_synchronization_attempted(
        &mut self,
        receiver: RadioId,
        transmission_id: TransmissionId,
    ) -> bool {
        self.get_synchronization_decision(receiver, transmission_id)
            .map(|decision| decision.attempted)
            .unwrap_or(false)
    }

    /// True when the receiver would try to receive the transmission.
    pub fn is_reception_attempted(
        &mut self,
        receiver: RadioId,
        transmission_id: TransmissionId,
    ) -> bool {
        self.get_reception_decision(receiver, transmission_id)
            .map(|decision| decision.attempted)
            .unwrap_or(false)
    }

    /// Entry point for self-timers handed back by the kernel. Anything but
    /// the purge timer is `NotApplicable`.
    pub fn handle_self_message(&mut self, kernel: &mut dyn Kernel, token: TimerToken) -> Result<()> {
        if token == PURGE_TIMER {
            self.remove_non_interfering_transmissions(kernel);
            Ok(())
        } else {
            Err(Error::NotApplicable(format!(
                "the medium only handles its purge timer, got token {}",
                token.0
            )))
        }
    }

    /// Drops the longest prefix of transmissions that can no longer
    /// interfere, frees their cache rows and re-arms the timer for the next
    /// deadline. This is the only mechanism that bounds memory.
    fn remove_non_interfering_transmissions(&mut self, kernel: &mut dyn Kernel) {
        let now = kernel.now();
        let mut count = 0;
        for transmission in &self.transmissions {
            let deadline = self
                .cache
                .row(transmission.id)
                .map(|row| row.interference_end_time)
                .unwrap_or(f64::NEG_INFINITY);
            if deadline <= now {
                count += 1;
            } else {
                break;
            }
        }
        if count > 0 {
            log::debug!("evicting {count} non-interfering transmissions at {now:.6}");
            self.transmissions.drain(..count);
            self.cache.evict_prefix(count);
        }
        self.purge_timer_at = None;
        if let Some(first) = self.transmissions.first() {
            if let Some(row) = self.cache.row(first.id) {
                kernel.schedule_timer(row.interference_end_time, PURGE_TIMER);
                self.purge_timer_at = Some(row.interference_end_time);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linklayer::mac_address::MacAddress;
    use crate::medium::models::{IsotropicBackgroundNoise, RangeNeighborCache};
    use crate::medium::types::LinearMobility;

    /// Deterministic stand-in for the surrounding discrete-event kernel:
    /// records deliveries and timers, and lets tests move the clock.
    struct TestKernel {
        now: SimTime,
        deliveries: Vec<(SimTime, RadioId, Frame)>,
        timers: Vec<(SimTime, TimerToken)>,
    }

    impl TestKernel {
        fn new() -> Self {
            Self {
                now: 0.0,
                deliveries: Vec::new(),
                timers: Vec::new(),
            }
        }

        fn pop_earliest_timer(&mut self) -> Option<(SimTime, TimerToken)> {
            let index = self
                .timers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.0.total_cmp(&b.0))
                .map(|(i, _)| i)?;
            Some(self.timers.remove(index))
        }
    }

    impl Kernel for TestKernel {
        fn now(&self) -> SimTime {
            self.now
        }

        fn send_direct(&mut self, receiver: RadioId, at: SimTime, frame: Frame) {
            self.deliveries.push((at, receiver, frame));
        }

        fn schedule_timer(&mut self, at: SimTime, token: TimerToken) {
            self.timers.push((at, token));
        }

        fn cancel_timer(&mut self, token: TimerToken) {
            self.timers.retain(|(_, t)| *t != token);
        }
    }

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([2, 0, 0, 0, 0, last])
    }

    fn radio_at(last: u8, x: f64) -> Radio {
        let mut radio = Radio::new(mac(last));
        radio.mobility = LinearMobility::stationary(Coord::new(x, 0.0, 0.0));
        radio
    }

    fn broadcast_packet(bytes: usize) -> MacPacket {
        MacPacket::new(MacAddress::BROADCAST, vec![0xAA; bytes])
    }

    #[test]
    fn frame_fanout_and_successful_reception() {
        let mut medium = RadioMedium::new(MediumConfig::default()).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let receiver = medium.add_radio(radio_at(1, 100.0));

        let frame = medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(100))
            .unwrap();
        assert_eq!(medium.statistics().transmission_count, 1);
        assert_eq!(medium.statistics().send_count, 1);
        assert_eq!(kernel.deliveries.len(), 1);
        let (at, to) = (kernel.deliveries[0].0, kernel.deliveries[0].1);
        assert_eq!(to, receiver);
        let expected_delay = 100.0 / 299_792_458.0;
        assert!((at - expected_delay).abs() < 1e-12);

        kernel.now = at;
        let received = medium.receive_packet(&kernel, receiver, &frame).unwrap();
        assert!(received.decision.attempted);
        assert!(received.decision.successful);
        assert_eq!(received.packet, frame.packet);
        assert!(medium.is_reception_attempted(receiver, frame.transmission_id));
        assert!(medium.is_synchronization_attempted(receiver, frame.transmission_id));
    }

    #[test]
    fn coincident_receiver_gets_zero_delay_arrival() {
        let mut medium = RadioMedium::new(MediumConfig::default()).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 50.0));
        let receiver = medium.add_radio(radio_at(1, 50.0));
        let frame = medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        let arrival = medium.get_arrival(receiver, frame.transmission_id).unwrap();
        assert_eq!(arrival.start_time, 0.0);
        assert_eq!(arrival.start_position, Coord::new(50.0, 0.0, 0.0));
    }

    #[test]
    fn communication_range_filter_drops_far_receivers() {
        let config = MediumConfig {
            range_filter: RangeFilter::CommunicationRange,
            max_communication_range: Some(100.0),
            ..Default::default()
        };
        let mut medium = RadioMedium::new(config).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let _far = medium.add_radio(radio_at(1, 150.0));
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        assert_eq!(medium.statistics().transmission_count, 1);
        assert_eq!(medium.statistics().send_count, 0);
        assert!(kernel.deliveries.is_empty());
    }

    #[test]
    fn radio_mode_filter_drops_non_receiving_radios() {
        let config = MediumConfig {
            radio_mode_filter: true,
            ..Default::default()
        };
        let mut medium = RadioMedium::new(config).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let mut off = radio_at(1, 50.0);
        off.mode = RadioMode::Off;
        medium.add_radio(off);
        let listening = medium.add_radio(radio_at(2, 100.0));
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        assert_eq!(medium.statistics().send_count, 1);
        assert_eq!(kernel.deliveries[0].1, listening);
    }

    #[test]
    fn mac_address_filter_keeps_unicast_private() {
        let config = MediumConfig {
            mac_address_filter: true,
            ..Default::default()
        };
        let mut medium = RadioMedium::new(config).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let addressee = medium.add_radio(radio_at(1, 50.0));
        let _bystander = medium.add_radio(radio_at(2, 100.0));

        medium
            .transmit_packet(&mut kernel, transmitter, MacPacket::new(mac(1), vec![0; 10]))
            .unwrap();
        assert_eq!(kernel.deliveries.len(), 1);
        assert_eq!(kernel.deliveries[0].1, addressee);

        kernel.deliveries.clear();
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        assert_eq!(kernel.deliveries.len(), 2);
    }

    #[test]
    fn eviction_purges_the_prefix_and_advances_the_base_id() {
        let config = MediumConfig {
            max_interference_window: Some(0.5),
            ..Default::default()
        };
        let mut medium = RadioMedium::new(config).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));

        // 1e6 bits at 1 Mbit/s: a one second transmission over [0, 1]
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(125_000))
            .unwrap();
        assert_eq!(medium.transmissions().len(), 1);
        let (deadline, token) = kernel.pop_earliest_timer().unwrap();
        assert_eq!(token, PURGE_TIMER);
        assert!((deadline - 1.5).abs() < 1e-9);

        // Second transmission over [2, 3]
        kernel.now = 2.0;
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(125_000))
            .unwrap();
        assert_eq!(medium.transmissions().len(), 2);

        medium.handle_self_message(&mut kernel, PURGE_TIMER).unwrap();
        assert_eq!(medium.base_transmission_id(), 1);
        assert_eq!(medium.cache_row_count(), 1);
        assert_eq!(medium.transmissions().len(), 1);
        let (deadline, _) = kernel.pop_earliest_timer().unwrap();
        assert!((deadline - 3.5).abs() < 1e-9);

        // Evicting the last live transmission empties the cache
        kernel.now = 4.0;
        medium.handle_self_message(&mut kernel, PURGE_TIMER).unwrap();
        assert_eq!(medium.base_transmission_id(), 2);
        assert_eq!(medium.cache_row_count(), 0);
        assert!(medium.transmissions().is_empty());
        assert!(kernel.pop_earliest_timer().is_none());
    }

    #[test]
    fn overlapping_transmission_invalidates_decisions() {
        let config = MediumConfig {
            min_interference_time: 1e-4,
            ..Default::default()
        };
        let mut medium = RadioMedium::new(config).unwrap();
        let mut kernel = TestKernel::new();
        let near_transmitter = medium.add_radio(radio_at(0, 0.0));
        let receiver = medium.add_radio(radio_at(1, 100.0));
        let far_transmitter = medium.add_radio(radio_at(2, 200.0));

        // 800 bits: transmission over [0, 0.0008]
        let first = medium
            .transmit_packet(&mut kernel, near_transmitter, broadcast_packet(100))
            .unwrap();
        let decision = medium
            .get_reception_decision(receiver, first.transmission_id)
            .unwrap();
        assert!(decision.successful);
        assert_eq!(medium.statistics().reception_decision_computation_count, 1);

        // An equally strong overlapping transmission from the other side
        kernel.now = 4e-4;
        medium
            .transmit_packet(&mut kernel, far_transmitter, broadcast_packet(100))
            .unwrap();

        let decision = medium
            .get_reception_decision(receiver, first.transmission_id)
            .unwrap();
        assert!(!decision.successful, "equal-power interferer should break reception");
        assert!(decision.snir_db < 4.0);
        assert_eq!(medium.statistics().reception_decision_computation_count, 2);
        assert_eq!(medium.statistics().interference_computation_count, 2);
        assert_eq!(medium.statistics().cache_reception_decision_hit_count, 0);
    }

    #[test]
    fn cache_layers_report_hits_on_repeated_queries() {
        let mut medium = RadioMedium::new(MediumConfig::default()).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let receiver = medium.add_radio(radio_at(1, 100.0));
        let frame = medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        medium.receive_packet(&kernel, receiver, &frame).unwrap();
        medium.receive_packet(&kernel, receiver, &frame).unwrap();
        let statistics = medium.statistics();
        assert_eq!(statistics.reception_decision_computation_count, 1);
        assert_eq!(statistics.cache_reception_decision_get_count, 2);
        assert_eq!(statistics.cache_reception_decision_hit_count, 1);
    }

    #[test]
    fn listening_hears_an_ongoing_transmission() {
        let mut medium = RadioMedium::new(MediumConfig::default()).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let receiver = medium.add_radio(radio_at(1, 100.0));
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(100))
            .unwrap();
        let listening = Listening {
            start_time: 0.0,
            end_time: 2e-3,
            center_frequency: 2.412e9,
            bandwidth: 20e6,
        };
        let decision = medium.listen_on_medium(receiver, &listening).unwrap();
        assert!(decision.busy);
        assert!(decision.power_dbm > -85.0);
        assert_eq!(medium.statistics().listening_decision_computation_count, 1);
    }

    #[test]
    fn background_noise_bounds_the_snir() {
        let mut medium = RadioMedium::new(MediumConfig::default())
            .unwrap()
            .with_background_noise(Box::new(IsotropicBackgroundNoise { power_dbm: -90.0 }));
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let receiver = medium.add_radio(radio_at(1, 100.0));
        let frame = medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        let received = medium.receive_packet(&kernel, receiver, &frame).unwrap();
        assert!(received.decision.successful);
        // About 20 dBm - 80 dB path loss + 90 dBm noise floor
        assert!((received.decision.snir_db - 29.9).abs() < 0.5);
    }

    #[test]
    fn neighbor_cache_supplies_the_candidates() {
        let mut medium = RadioMedium::new(MediumConfig::default())
            .unwrap()
            .with_neighbor_cache(Box::new(RangeNeighborCache::new()));
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let receiver = medium.add_radio(radio_at(1, 100.0));
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        assert_eq!(kernel.deliveries.len(), 1);
        assert_eq!(kernel.deliveries[0].1, receiver);
    }

    #[test]
    fn late_radios_can_still_query_live_transmissions() {
        let mut medium = RadioMedium::new(MediumConfig::default()).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let frame = medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        let late = medium.add_radio(radio_at(9, 300.0));
        let arrival = medium.get_arrival(late, frame.transmission_id).unwrap();
        assert!(arrival.start_time > 0.0);
        medium.remove_radio(late);
        assert!(medium.get_arrival(late, frame.transmission_id).is_none());
    }

    #[test]
    fn unknown_timers_are_not_applicable() {
        let mut medium = RadioMedium::new(MediumConfig::default()).unwrap();
        let mut kernel = TestKernel::new();
        assert!(matches!(
            medium.handle_self_message(&mut kernel, TimerToken(99)),
            Err(Error::NotApplicable(_))
        ));
    }

    #[test]
    fn trail_records_successful_receptions() {
        let config = MediumConfig {
            leave_communication_trail: true,
            ..Default::default()
        };
        let mut medium = RadioMedium::new(config).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        let receiver = medium.add_radio(radio_at(1, 100.0));
        let frame = medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        medium.receive_packet(&kernel, receiver, &frame).unwrap();
        let segments: Vec<_> = medium.communication_trail().collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0, Coord::ZERO);
        assert_eq!(segments[0].1, Coord::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn display_keeps_figures_for_live_transmissions() {
        let config = MediumConfig {
            display_communication: true,
            max_interference_window: Some(0.5),
            ..Default::default()
        };
        let mut medium = RadioMedium::new(config).unwrap();
        let mut kernel = TestKernel::new();
        let transmitter = medium.add_radio(radio_at(0, 0.0));
        medium
            .transmit_packet(&mut kernel, transmitter, broadcast_packet(10))
            .unwrap();
        assert_eq!(medium.transmission_figures().len(), 1);
        kernel.now = 10.0;
        medium.handle_self_message(&mut kernel, PURGE_TIMER).unwrap();
        assert!(medium.transmission_figures().is_empty());
    }
}
