//! Communication log file and the in-memory communication trail.
//!
//! The log appends one line per transmit ("T") and receive ("R") event to
//! `<result_dir>/<config_name>-<run_number>.tlog`. The trail keeps the line
//! segments of successful receptions in a bounded ring buffer for a canvas
//! layer to draw.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use std::collections::VecDeque;

use crate::common::geometry::Coord;
use crate::kernel::SimTime;
use crate::medium::types::{Frame, MacPacket, RadioId, ReceptionDecision, Transmission};

/// Append-only event log of all transmissions and receptions.
#[derive(Debug)]
pub struct CommunicationLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl CommunicationLog {
    pub fn open(result_dir: &str, config_name: &str, run_number: u32) -> io::Result<Self> {
        fs::create_dir_all(result_dir)?;
        let path = PathBuf::from(result_dir).join(format!("{config_name}-{run_number}.tlog"));
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self { writer, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn record_transmission(&mut self, transmission: &Transmission, packet: &MacPacket) {
        let result = writeln!(
            self.writer,
            "T {} {} {:.9} {:.9} {} {}",
            transmission.transmitter_id,
            transmission.id,
            transmission.start_time,
            transmission.duration(),
            packet.bit_length(),
            packet.destination,
        );
        if let Err(error) = result {
            log::warn!("communication log write failed: {error}");
        }
    }

    pub fn record_reception(
        &mut self,
        now: SimTime,
        receiver: RadioId,
        frame: &Frame,
        decision: &ReceptionDecision,
    ) {
        let result = writeln!(
            self.writer,
            "R {} {} {:.9} {} {:.2}",
            receiver,
            frame.transmission_id,
            now,
            decision.successful as u8,
            decision.snir_db,
        );
        if let Err(error) = result {
            log::warn!("communication log write failed: {error}");
        }
    }
}

impl Drop for CommunicationLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Bounded ring of successful-reception segments
/// (transmitter position, receiver position).
#[derive(Debug)]
pub struct CommunicationTrail {
    segments: VecDeque<(Coord, Coord)>,
    capacity: usize,
}

impl CommunicationTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            segments: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Push a segment, popping the oldest when at capacity.
    pub fn push(&mut self, from: Coord, to: Coord) {
        if self.segments.len() >= self.capacity {
            self.segments.pop_front();
        }
        self.segments.push_back((from, to));
    }

    pub fn segments(&self) -> impl Iterator<Item = &(Coord, Coord)> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
