use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    command_executor::gpio::command_sender::GpioCommandSender,
    config::AxisSettings,
    controller::{
        PositionStore,
        sequence::{CoilPattern, Direction, STEP_SEQUENCE, StepSequence},
    },
    models::{AxisId, AxisState},
};

/// Below this distance `move_to_absolute` keeps the coils energized between
/// steps and watches for overshoot.
const FINE_ZONE: u32 = 10;
/// Above this distance `move_to_absolute` steps at full speed.
const CRAWL_ZONE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTiming {
    pub pulse_width: Duration,
    pub crawl_delay: Duration,
    pub slow_step_delay: Duration,
}

impl Default for MotionTiming {
    fn default() -> Self {
        Self {
            pulse_width: Duration::from_millis(20),
            crawl_delay: Duration::from_millis(300),
            slow_step_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coils {
    Hold,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Stepped,
    AtLimit,
}

/// One stepper axis.
///
/// Moves run on the calling thread and block it until they end. Starting a
/// move or calling [`AxisController::stop`] bumps the generation counter,
/// and any older move still running gives up before its next step.
pub struct AxisController {
    axis: AxisId,
    coil_pins: [u8; 4],
    lower_limit: i32,
    upper_limit: i32,
    timing: MotionTiming,
    gpio: GpioCommandSender,
    store: Arc<dyn PositionStore>,

    position: AtomicI32,
    sequence_index: AtomicUsize,
    moving: AtomicBool,
    calibrating: AtomicBool,
    generation: AtomicU64,
    /// Generation set by the last external stop.
    stopped_at: AtomicU64,
    completed_moves: AtomicU64,
}

impl AxisController {
    pub fn new(
        axis: AxisId,
        settings: &AxisSettings,
        timing: MotionTiming,
        gpio: GpioCommandSender,
        store: Arc<dyn PositionStore>,
    ) -> Self {
        Self {
            axis,
            coil_pins: settings.coil_pins(),
            lower_limit: settings.min,
            upper_limit: settings.max,
            timing,
            gpio,
            store,

            position: AtomicI32::new(settings.position),
            sequence_index: AtomicUsize::new(0),
            moving: AtomicBool::new(false),
            calibrating: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            stopped_at: AtomicU64::new(0),
            completed_moves: AtomicU64::new(0),
        }
    }

    pub fn axis(&self) -> AxisId {
        self.axis
    }

    pub fn position(&self) -> i32 {
        self.position.load(Ordering::SeqCst)
    }

    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }

    pub fn set_calibrating(&self, calibrating: bool) {
        self.calibrating.store(calibrating, Ordering::SeqCst);
    }

    pub fn read_state(&self) -> AxisState {
        AxisState {
            axis: self.axis,
            position: self.position(),
            lower_limit: self.lower_limit,
            upper_limit: self.upper_limit,
            sequence_index: self.sequence_index.load(Ordering::SeqCst),
            moving: self.is_moving(),
            calibrating: self.calibrating.load(Ordering::SeqCst),
            pulse_width: self.timing.pulse_width,
            generation: self.generation.load(Ordering::SeqCst),
            completed_moves: self.completed_moves.load(Ordering::SeqCst),
        }
    }

    /// Steps `steps` times in the sign's direction, stopping early at a soft
    /// limit. Releases the coils when done. Zero steps is a stop.
    pub fn move_relative(&self, steps: i32) {
        if steps == 0 {
            self.stop();
            return;
        }

        let epoch = self.begin_move();
        let direction = Direction::of(steps);
        let mut remaining = steps.unsigned_abs();
        debug!(axis = %self.axis, "Relative move of {} steps from {}", steps, self.position());

        while remaining > 0 && self.is_current(epoch) {
            if self.step(direction, Coils::Release) == StepOutcome::AtLimit {
                info!(axis = %self.axis, "Soft limit reached at position {}", self.position());
                break;
            }

            remaining -= 1;
            thread::sleep(self.timing.pulse_width * 2);
        }

        self.finish(epoch, Coils::Release);
    }

    /// Drives the axis to `target` and leaves the final pattern energized.
    /// Targets outside the soft limits are ignored.
    pub fn move_to_absolute(&self, target: i32) {
        if !(self.lower_limit..=self.upper_limit).contains(&target) {
            debug!(
                axis = %self.axis,
                "Target {} outside {}..={}, ignoring", target, self.lower_limit, self.upper_limit
            );
            return;
        }

        let epoch = self.begin_move();
        debug!(axis = %self.axis, "Moving from {} to {}", self.position(), target);

        while self.is_current(epoch) {
            let position = self.position();
            if position == target {
                break;
            }

            let direction = Direction::toward(position, target);
            let outcome = if position.abs_diff(target) < FINE_ZONE {
                let outcome = self.step(direction, Coils::Hold);
                if self.correct_overshoot(epoch, direction, target) {
                    self.finish(epoch, Coils::Release);
                    return;
                }
                outcome
            } else {
                self.step(direction, Coils::Release)
            };

            if outcome == StepOutcome::AtLimit {
                warn!(axis = %self.axis, "Blocked at {} on the way to {}", self.position(), target);
                break;
            }

            let delay = if self.position().abs_diff(target) > CRAWL_ZONE {
                self.timing.pulse_width * 2
            } else {
                self.timing.crawl_delay
            };
            thread::sleep(delay);
        }

        self.finish(epoch, Coils::Hold);
    }

    /// Fine steps with the slow inter-step delay, used by the self test.
    pub fn move_slow(&self, steps: i32) {
        if steps == 0 {
            return;
        }

        let epoch = self.begin_move();
        let direction = Direction::of(steps);
        let mut remaining = steps.unsigned_abs();

        while remaining > 0 && self.is_current(epoch) {
            if self.step(direction, Coils::Hold) == StepOutcome::AtLimit {
                info!(axis = %self.axis, "Soft limit reached at position {}", self.position());
                break;
            }

            remaining -= 1;
            thread::sleep(self.timing.slow_step_delay);
        }

        self.finish(epoch, Coils::Hold);
    }

    /// Cancels any move in flight and de-energizes the coils.
    pub fn stop(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.stopped_at.store(generation, Ordering::SeqCst);
        self.halt();
    }

    /// Writes `pattern` to the coils without touching position or index.
    pub fn raw_output(&self, pattern: CoilPattern) {
        debug!(axis = %self.axis, "Raw output {}", pattern);
        self.write_coils(pattern);
    }

    pub fn persist_position(&self) {
        let position = self.position();
        if let Err(e) = self.store.persist(self.axis, position) {
            warn!(axis = %self.axis, "Failed to persist position {}: {:#}", position, e);
        }
    }

    fn begin_move(&self) -> u64 {
        let epoch = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.moving.store(true, Ordering::SeqCst);
        epoch
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == epoch
    }

    /// Takes back a fine step that went past `target`. A superseded move
    /// leaves the position to the move that replaced it.
    fn correct_overshoot(&self, epoch: u64, direction: Direction, target: i32) -> bool {
        if !self.is_current(epoch) || !overshoots(direction, self.position(), target) {
            return false;
        }

        debug!(axis = %self.axis, "Overshot {} at {}, stepping back", target, self.position());
        self.step(direction.reverse(), Coils::Hold);
        true
    }

    /// One step: reserve the next position inside the limits, advance the
    /// sequence and pulse the coils.
    fn step(&self, direction: Direction, coils: Coils) -> StepOutcome {
        let (lower, upper) = (self.lower_limit, self.upper_limit);
        let reserved = self
            .position
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |position| {
                position
                    .checked_add(direction.delta())
                    .filter(|next| (lower..=upper).contains(next))
            });

        if reserved.is_err() {
            return StepOutcome::AtLimit;
        }

        let index = match self
            .sequence_index
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |index| {
                Some(StepSequence::advance(index, direction))
            }) {
            Ok(previous) | Err(previous) => StepSequence::advance(previous, direction),
        };

        self.write_coils(STEP_SEQUENCE.pattern(index));
        thread::sleep(self.timing.pulse_width);

        if coils == Coils::Release {
            self.write_coils(CoilPattern::OFF);
        }

        StepOutcome::Stepped
    }

    fn write_coils(&self, pattern: CoilPattern) {
        if let Err(e) = self.gpio.write_pattern_blocking(self.coil_pins, pattern) {
            warn!(axis = %self.axis, "Failed to write coil pattern {}: {}", pattern, e);
        }
    }

    /// End of a move. A superseded move only persists where it got to. If a
    /// stop superseded it, its last step may have landed after the stop's
    /// release, so the coils are released again.
    fn finish(&self, epoch: u64, coils: Coils) {
        self.persist_position();

        if !self.is_current(epoch) {
            debug!(axis = %self.axis, "Move superseded at position {}", self.position());
            if self.stopped_at.load(Ordering::SeqCst) == self.generation.load(Ordering::SeqCst) {
                self.write_coils(CoilPattern::OFF);
            }
            return;
        }

        match coils {
            Coils::Release => self.halt(),
            Coils::Hold => {
                self.moving.store(false, Ordering::SeqCst);
                self.completed_moves.fetch_add(1, Ordering::SeqCst);
                info!(axis = %self.axis, "{} stepper holding, position = {}", self.axis, self.position());
            }
        }
    }

    fn halt(&self) {
        self.moving.store(false, Ordering::SeqCst);
        self.completed_moves.fetch_add(1, Ordering::SeqCst);
        self.write_coils(CoilPattern::OFF);
        info!(axis = %self.axis, "{} stepper stopped, position = {}", self.axis, self.position());
    }
}

fn overshoots(direction: Direction, position: i32, target: i32) -> bool {
    match direction {
        Direction::Forward => position > target,
        Direction::Backward => position < target,
    }
}
