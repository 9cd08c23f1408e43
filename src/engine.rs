// src/engine.rs

use log::{debug, info, warn};

use crate::config::{EngineConfig, RecordMode};
use crate::epoch_pair::EpochPair;
use crate::error::{EngineResult, ScheduleError};
use crate::event::{TriggerEvent, TriggerKind};
use crate::ops::{OpId, Operation};
use crate::ring_buffer::RingBuffer;
use crate::transform::TransformSet;

/// Playback state. The transition to `Looping` is one-way until the
/// engine is reactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Loop not yet recorded: input passes straight through
    RecordingOnly,

    /// Loop recorded: output is read from the ring buffer
    Looping,
}

/// Snapshot of engine state for displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readback {
    pub state: PlaybackState,
    pub loop_length: usize,
    pub play_head: usize,
    pub record_head: usize,
    pub queued_ops: usize,
    pub active_ops: usize,
    pub active_transforms: usize,

    /// Loop position of the next queued operation
    pub next_start: Option<usize>,

    /// Operations dropped since activation (overflow, conflicts, overruns)
    pub dropped_ops: u64,
}

/// Real-time loop engine.
///
/// This struct runs exclusively on the audio thread.
/// All storage is allocated in `new`; `process` never allocates,
/// locks or blocks.
pub struct Engine {
    config: EngineConfig,

    /// Recorded audio and the record/play heads
    ring: RingBuffer,

    /// Operations waiting for their start, keyed by start
    queued: EpochPair,

    /// Operations running, keyed by end
    active: EpochPair,

    /// Per-kind transform state applied to the play head
    transforms: TransformSet,

    state: PlaybackState,

    next_id: OpId,

    dropped_ops: u64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let ring = RingBuffer::with_capacity(config.ring_capacity_frames)?;
        let queued = EpochPair::with_capacity("queued", config.max_queued_ops)?;
        let active = EpochPair::with_capacity("active", config.max_active_ops)?;

        info!(
            "engine created: {} Hz, ring {} frames, {} queued / {} active ops",
            config.sample_rate,
            config.ring_capacity_frames,
            config.max_queued_ops,
            config.max_active_ops
        );

        Ok(Self {
            config,
            ring,
            queued,
            active,
            transforms: TransformSet::new(),
            state: PlaybackState::RecordingOnly,
            next_id: 0,
            dropped_ops: 0,
        })
    }

    /// Create an engine with default behaviour and the given sizes.
    pub fn create(
        sample_rate: f64,
        ring_capacity_frames: usize,
        max_queued_ops: usize,
        max_active_ops: usize,
    ) -> EngineResult<Self> {
        Self::new(
            EngineConfig::new()
                .with_sample_rate(sample_rate)
                .with_ring_capacity(ring_capacity_frames)
                .with_max_ops(max_queued_ops, max_active_ops),
        )
    }

    /// Silence the loop and return to the initial state.
    ///
    /// Keeps the current loop length.
    pub fn activate(&mut self) {
        self.ring.clear();
        self.queued.clear();
        self.active.clear();
        self.transforms.clear();
        self.state = PlaybackState::RecordingOnly;
        self.dropped_ops = 0;
        debug!("engine activated, loop length {}", self.ring.loop_length());
    }

    /// Set the loop length, clamped to `[512, ring capacity]`.
    ///
    /// Cheap when unchanged, so hosts may call it every block.
    #[inline]
    pub fn set_loop_length(&mut self, frames: u32) {
        if frames as usize == self.ring.loop_length() {
            return;
        }

        let ended_at = self.ring.play_head() as u32;
        if self.ring.set_loop_length(frames as usize) {
            // The play head was past the new end: that is a wraparound.
            self.flip_epochs(ended_at);
        }
    }

    /// Queue an operation.
    ///
    /// `op.start` is a loop position; a position behind the play head
    /// means the next time round. The duration is capped at one loop.
    pub fn schedule(&mut self, mut op: Operation) -> Result<OpId, ScheduleError> {
        if op.is_none() {
            return Err(ScheduleError::EmptyOperation);
        }

        let loop_length = self.loop_length();
        let play_head = self.ring.play_head() as u32;
        let start = op.start % loop_length;

        op.start = if start >= play_head {
            start
        } else {
            start + loop_length
        };
        op.duration = op.duration.min(loop_length);

        self.enqueue(op)
    }

    /// Process one block.
    ///
    /// `events` must be sorted by `frame_offset`. Every output frame is
    /// written, whatever happens to the events.
    pub fn process(&mut self, input: &[f32], output: &mut [f32], events: &[TriggerEvent]) {
        debug_assert_eq!(input.len(), output.len());
        debug_assert!(events.windows(2).all(|w| w[0].frame_offset <= w[1].frame_offset));

        let frames = input.len().min(output.len());
        let mut pending = events.iter().peekable();

        for (frame, (sample_in, sample_out)) in input.iter().zip(output.iter_mut()).enumerate() {
            // Apply events at their frame
            while let Some(event) = pending.next_if(|e| e.frame_offset as usize <= frame) {
                self.apply_trigger(event);
            }

            *sample_out = self.process_sample(*sample_in);
        }

        for event in pending {
            warn!(
                "dropping {:?} trigger at frame {} past block end {}",
                event.kind, event.frame_offset, frames
            );
        }
    }

    #[inline]
    fn process_sample(&mut self, input: f32) -> f32 {
        if self.state == PlaybackState::RecordingOnly {
            if !self.ring.is_full() {
                self.ring.write(input);
                return input;
            }
            info!("loop of {} frames recorded, looping", self.ring.loop_length());
            self.state = PlaybackState::Looping;
        }

        let play_head = self.ring.play_head() as u32;

        // Read through whatever transforms are running
        let offset = self.transforms.read_offset(play_head);
        let output = self.ring.read_at(play_head as i64 + offset);
        let active = &mut self.active;
        self.transforms.advance(|op| {
            active.remove(op.id);
        });

        // Retire operations whose end has arrived
        while let Some(entry) = self.active.pop_due(play_head) {
            if self.transforms.retire(&entry.op) {
                debug!("{} ended at {}", entry.op, play_head);
            }
        }

        // Start operations whose start has arrived
        while let Some(entry) = self.queued.pop_due(play_head) {
            self.start_operation(entry.op, play_head);
        }

        if self.config.record_mode == RecordMode::Rolling {
            self.ring.write(input);
        }

        if self.ring.advance_play_head() {
            self.flip_epochs(self.ring.loop_length() as u32);
        }

        output
    }

    fn start_operation(&mut self, op: Operation, now: u32) {
        if op.duration == 0 {
            debug!("skipping {}, released before it started", op);
            return;
        }

        if let Err(error) = self.transforms.activate(op) {
            warn!("ignoring {}: {}", op, error);
            self.dropped_ops += 1;
            return;
        }

        // Without an end entry the transform would never retire.
        if let Err(error) = self.active.push(op, now + op.duration) {
            warn!("cancelling {}: {}", op, error);
            self.transforms.retire(&op);
            self.dropped_ops += 1;
        }
    }

    fn apply_trigger(&mut self, event: &TriggerEvent) {
        if self.state == PlaybackState::RecordingOnly {
            debug!("ignoring {:?} trigger, loop not recorded yet", event.kind);
            return;
        }

        match event.kind {
            TriggerKind::NoteOn => self.trigger_start(event),
            TriggerKind::NoteOff => self.trigger_release(event),
        }
    }

    fn trigger_start(&mut self, event: &TriggerEvent) {
        let op = Operation::new(
            event.transform,
            self.ring.play_head() as u32,
            self.hold_frames(),
        );

        if op.is_none() {
            debug!("ignoring empty trigger at frame {}", event.frame_offset);
            return;
        }

        if let Err(error) = self.enqueue(op) {
            warn!("dropping trigger at frame {}: {}", event.frame_offset, error);
            self.dropped_ops += 1;
        }
    }

    /// Shorten the most recent operation of the event's kind so that it
    /// ends now.
    fn trigger_release(&mut self, event: &TriggerEvent) {
        let kind = event.op_kind();
        let now = self.ring.play_head() as u32;

        // Started on this very sample and not yet running
        if let Some((start, op)) = self.queued.latest_due_of_kind_mut(kind, now) {
            op.duration = now.saturating_sub(start);
            debug!("{} released before starting", op);
            return;
        }

        match self.transforms.release(kind) {
            Some(op) => {
                // Its end entry no longer holds an active slot.
                self.active.remove(op.id);
                debug!("{} released at {}", op, now);
            }
            None => debug!("release of {:?} with nothing running", kind),
        }
    }

    fn enqueue(&mut self, mut op: Operation) -> Result<OpId, ScheduleError> {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        op.id = self.next_id;

        self.queued.push(op, op.start)?;
        Ok(op.id)
    }

    fn flip_epochs(&mut self, epoch_length: u32) {
        let queued = self.queued.flip(epoch_length, |_| {});
        let transforms = &mut self.transforms;
        let active = self.active.flip(epoch_length, |entry| {
            transforms.retire(&entry.op);
        });

        let discarded = queued + active;
        if discarded > 0 {
            warn!("discarded {} operations that outlived two loop epochs", discarded);
            self.dropped_ops += discarded as u64;
        }
    }

    fn hold_frames(&self) -> u32 {
        let loop_length = self.loop_length();
        self.config
            .max_hold_frames
            .map_or(loop_length, |frames| frames.min(loop_length))
    }

    #[inline]
    pub fn loop_length(&self) -> u32 {
        self.ring.loop_length() as u32
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// No operation queued or running.
    pub fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.active.is_empty()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn readback(&self) -> Readback {
        Readback {
            state: self.state,
            loop_length: self.ring.loop_length(),
            play_head: self.ring.play_head(),
            record_head: self.ring.record_head(),
            queued_ops: self.queued.len(),
            active_ops: self.active.len(),
            active_transforms: self.transforms.active_count(),
            next_start: self
                .queued
                .front()
                .map(|entry| entry.key as usize % self.ring.loop_length()),
            dropped_ops: self.dropped_ops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::ops::Transform;

    const LOOP: usize = 512;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|v| v as f32).collect()
    }

    fn run(engine: &mut Engine, input: &[f32], events: &[TriggerEvent]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        engine.process(input, &mut output, events);
        output
    }

    fn engine_with(mode: RecordMode, max_ops: usize) -> Engine {
        let config = EngineConfig::new()
            .with_ring_capacity(1024)
            .with_max_ops(max_ops, max_ops)
            .with_record_mode(mode);
        let mut engine = Engine::new(config).unwrap();
        engine.set_loop_length(LOOP as u32);
        engine
    }

    /// Engine that has recorded one pass of `0.0, 1.0, ... 511.0`, with
    /// the play head at 0.
    fn looping_engine(mode: RecordMode) -> Engine {
        let mut engine = engine_with(mode, 8);
        let input = ramp(0, LOOP);
        assert_eq!(run(&mut engine, &input, &[]), input);
        engine
    }

    #[test]
    fn test_create_rejects_small_ring() {
        assert!(matches!(
            Engine::create(48_000.0, 100, 8, 8),
            Err(EngineError::CapacityTooSmall { .. })
        ));
        assert!(Engine::create(48_000.0, 4096, 8, 8).is_ok());
    }

    #[test]
    fn test_passthrough_until_loop_recorded() {
        for loop_length in [512, 700, 1024] {
            let mut engine = engine_with(RecordMode::Rolling, 8);
            engine.set_loop_length(loop_length);

            for block in 0..(loop_length as usize / 100) {
                let input = ramp(block * 100, 100);
                assert_eq!(run(&mut engine, &input, &[]), input);
            }
            assert_eq!(engine.state(), PlaybackState::RecordingOnly);
        }
    }

    #[test]
    fn test_full_loop_is_a_delay_line() {
        let mut engine = engine_with(RecordMode::Rolling, 8);
        let input = ramp(0, 2048);
        let mut output = Vec::new();
        for block in input.chunks(128) {
            output.extend(run(&mut engine, block, &[]));
        }

        for (g, sample) in output.iter().enumerate() {
            let expected = if g < LOOP { g } else { g - LOOP };
            assert_eq!(*sample, expected as f32, "sample {}", g);
        }
        assert_eq!(engine.state(), PlaybackState::Looping);
    }

    #[test]
    fn test_reverse_reads_backward_then_resumes() {
        let mut engine = looping_engine(RecordMode::Rolling);
        let output = run(&mut engine, &ramp(LOOP, LOOP), &[TriggerEvent::note_on(100)]);

        // Takes effect one sample after the trigger.
        assert_eq!(output[100], 100.0);
        assert_eq!(output[101], 101.0);
        for k in 1..=255 {
            assert_eq!(output[101 + k], (613 - k) as f32, "k = {}", k);
        }
        // Half the duration later, forward playback is back.
        assert_eq!(output[357], 357.0);
        assert_eq!(output[400], 400.0);

        let readback = engine.readback();
        // Finishing early frees the end entry too.
        assert_eq!(readback.active_transforms, 0);
        assert_eq!(readback.active_ops, 0);
        assert_eq!(readback.play_head, 0);
        assert!(engine.is_idle());
    }

    #[test]
    fn test_note_off_ends_reverse() {
        let mut engine = looping_engine(RecordMode::Rolling);
        let events = [TriggerEvent::note_on(100), TriggerEvent::note_off(150)];
        let output = run(&mut engine, &ramp(LOOP, LOOP), &events);

        assert_eq!(output[149], 565.0);
        assert_eq!(output[150], 150.0);
        assert_eq!(output[151], 151.0);
    }

    #[test]
    fn test_released_ops_free_active_capacity() {
        let mut engine = engine_with(RecordMode::Rolling, 2);
        run(&mut engine, &ramp(0, LOOP), &[]);

        let mut events = Vec::new();
        for (on, off) in [(10, 20), (50, 60), (100, 110)] {
            events.push(TriggerEvent::note_on(on));
            events.push(TriggerEvent::note_off(off));
        }
        let output = run(&mut engine, &ramp(LOOP, LOOP), &events);

        // The third tap still reverses.
        assert_eq!(&output[101..106], &[101.0, 612.0, 611.0, 610.0, 609.0]);
        assert_eq!(output[110], 110.0);

        let readback = engine.readback();
        assert_eq!(readback.dropped_ops, 0);
        assert_eq!(readback.active_ops, 0);
    }

    #[test]
    fn test_release_ignores_later_scheduled_op() {
        let mut engine = looping_engine(RecordMode::Rolling);
        engine.schedule(Operation::reverse(400, 20)).unwrap();

        let events = [TriggerEvent::note_on(100), TriggerEvent::note_off(100)];
        let output = run(&mut engine, &ramp(LOOP, LOOP), &events);

        assert_eq!(&output[100..104], &[100.0, 101.0, 102.0, 103.0]);
        // The scheduled reverse is untouched.
        assert_eq!(output[401], 421.0);
        assert_eq!(engine.readback().dropped_ops, 0);
    }

    #[test]
    fn test_release_in_same_frame_cancels() {
        let mut engine = looping_engine(RecordMode::Rolling);
        let events = [TriggerEvent::note_on(100), TriggerEvent::note_off(100)];
        let output = run(&mut engine, &ramp(LOOP, LOOP), &events);

        assert_eq!(output, ramp(0, LOOP));
        assert_eq!(engine.readback().active_ops, 0);
    }

    #[test]
    fn test_second_reverse_is_ignored() {
        let mut engine = looping_engine(RecordMode::Rolling);
        let events = [TriggerEvent::note_on(100), TriggerEvent::note_on(110)];
        let output = run(&mut engine, &ramp(LOOP, LOOP), &events);

        assert_eq!(output[120], 594.0);
        assert_eq!(engine.readback().dropped_ops, 1);
    }

    #[test]
    fn test_queue_overflow_drops_excess() {
        let mut engine = engine_with(RecordMode::Rolling, 2);
        run(&mut engine, &ramp(0, LOOP), &[]);

        assert!(engine.schedule(Operation::reverse(300, 10)).is_ok());
        assert!(engine.schedule(Operation::relative_jump(200, 10, 5)).is_ok());
        assert_eq!(
            engine.schedule(Operation::loop_in_loop(100, 10, 4)),
            Err(ScheduleError::SchedulingOverflow {
                queue: "queued",
                capacity: 2
            })
        );
        let readback = engine.readback();
        assert_eq!(readback.queued_ops, 2);
        assert_eq!(readback.next_start, Some(200));

        // Both survivors still start, earliest first.
        let output = run(&mut engine, &ramp(LOOP, LOOP), &[]);
        assert_eq!(output[201], 206.0);
        assert_eq!(output[301], 311.0);
        assert_eq!(engine.readback().queued_ops, 0);
    }

    #[test]
    fn test_simultaneous_triggers_past_capacity() {
        let mut engine = engine_with(RecordMode::Rolling, 2);
        run(&mut engine, &ramp(0, LOOP), &[]);

        let events = [
            TriggerEvent::note_on(10),
            TriggerEvent::note_on(10),
            TriggerEvent::note_on(10),
        ];
        let output = run(&mut engine, &ramp(LOOP, LOOP), &events);

        // One overflowed the queue, one conflicted with the running reverse.
        assert_eq!(engine.readback().dropped_ops, 2);
        assert_eq!(output[12], (LOOP + 10) as f32);
    }

    #[test]
    fn test_wraparound_keeps_real_time_order() {
        let mut engine = looping_engine(RecordMode::FreezeWhenFull);
        run(&mut engine, &ramp(0, 500), &[]);
        assert_eq!(engine.readback().play_head, 500);

        // Just after the wrap (numerically smaller), then just before it.
        engine.schedule(Operation::relative_jump(5, 2, 200)).unwrap();
        engine.schedule(Operation::relative_jump(510, 3, 100)).unwrap();

        let output = run(&mut engine, &vec![0.0; 20], &[]);
        let expected: Vec<f32> = [
            500, 501, 502, 503, 504, 505, 506, 507, 508, 509, 510, // forward
            99, 100, 101, // +100 across the wrap
            2, 3, 4, 5, // forward
            206, 207, // +200
        ]
        .iter()
        .map(|&v| v as f32)
        .collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_loop_in_loop_repeats() {
        let mut engine = looping_engine(RecordMode::FreezeWhenFull);
        engine.schedule(Operation::loop_in_loop(0, 10, 4)).unwrap();

        let output = run(&mut engine, &vec![0.0; 12], &[]);
        assert_eq!(
            output,
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 11.0]
        );
    }

    #[test]
    fn test_absolute_jump_from_trigger() {
        let mut engine = looping_engine(RecordMode::FreezeWhenFull);
        let jump = Transform::AbsoluteJump { position: 300 };
        let events = [
            TriggerEvent::start(jump, 10),
            TriggerEvent::release(jump, 13),
        ];

        let output = run(&mut engine, &vec![0.0; 16], &events);
        assert_eq!(&output[10..14], &[10.0, 300.0, 301.0, 13.0]);
    }

    #[test]
    fn test_freeze_keeps_first_pass() {
        let mut engine = looping_engine(RecordMode::FreezeWhenFull);
        for _ in 0..3 {
            let output = run(&mut engine, &vec![-1.0; LOOP], &[]);
            assert_eq!(output, ramp(0, LOOP));
        }
        assert_eq!(engine.readback().record_head, 0);
    }

    #[test]
    fn test_triggers_ignored_while_recording() {
        let mut engine = engine_with(RecordMode::Rolling, 8);
        let input = ramp(0, 256);
        let output = run(&mut engine, &input, &[TriggerEvent::note_on(10)]);

        assert_eq!(output, input);
        assert_eq!(engine.readback().queued_ops, 0);
    }

    #[test]
    fn test_trigger_past_block_end_is_dropped() {
        let mut engine = looping_engine(RecordMode::Rolling);
        run(&mut engine, &ramp(LOOP, 64), &[TriggerEvent::note_on(64)]);
        assert_eq!(engine.readback().queued_ops, 0);
    }

    #[test]
    fn test_shrinking_loop_wraps_play_head() {
        let mut engine = engine_with(RecordMode::Rolling, 8);
        engine.set_loop_length(1024);
        run(&mut engine, &ramp(0, 1024 + 700), &[]);
        assert_eq!(engine.readback().play_head, 700);

        engine.set_loop_length(512);
        let readback = engine.readback();
        assert_eq!(readback.loop_length, 512);
        assert_eq!(readback.play_head, 0);
        assert_eq!(readback.state, PlaybackState::Looping);
    }

    #[test]
    fn test_activate_resets() {
        let mut engine = looping_engine(RecordMode::Rolling);
        run(&mut engine, &ramp(LOOP, 50), &[TriggerEvent::note_on(0)]);

        engine.activate();
        let readback = engine.readback();
        assert_eq!(readback.state, PlaybackState::RecordingOnly);
        assert_eq!(readback.play_head, 0);
        assert_eq!(readback.queued_ops + readback.active_ops, 0);
        assert_eq!(readback.active_transforms, 0);
        assert_eq!(readback.loop_length, LOOP);
        assert_eq!(readback.next_start, None);
        assert!(engine.is_idle());

        let input = ramp(7, 100);
        assert_eq!(run(&mut engine, &input, &[]), input);
    }
}
