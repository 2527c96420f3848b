//! Boundary to the discrete-event kernel driving the medium.
//!
//! The kernel itself (event queue, module graph) lives outside this crate.
//! The medium only consumes three primitives from it: the monotone simulated
//! clock, point-to-point frame delivery scheduled at an absolute time, and a
//! one-shot self-timer. All simulated times are `f64` seconds.

use crate::medium::types::{Frame, RadioId};

/// Simulated time in seconds since the start of the run.
pub type SimTime = f64;

/// Identifies a self-timer owned by the medium. The kernel hands the token
/// back when the timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub u32);

/// The primitives the medium consumes from the surrounding kernel.
///
/// Implementations must deliver frames and fire timers in nondecreasing time
/// order, and must not reorder deliveries between a fixed (transmitter,
/// receiver) pair. Deliveries addressed to a radio that has since been
/// removed are expected to be discarded by the kernel.
pub trait Kernel {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Schedule delivery of `frame` to `receiver` at absolute time `at`.
    fn send_direct(&mut self, receiver: RadioId, at: SimTime, frame: Frame);

    /// Arm a one-shot self-timer that calls back into the medium with
    /// `token` at absolute time `at`.
    fn schedule_timer(&mut self, at: SimTime, token: TimerToken);

    /// Disarm a previously scheduled self-timer. Unknown tokens are ignored.
    fn cancel_timer(&mut self, token: TimerToken);
}
