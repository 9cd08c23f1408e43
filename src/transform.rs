// src/transform.rs
//
// Per-kind state of the transforms currently bending the play head.
//
// Each kind has one slot, so at most one operation of a kind runs at a
// time. The read position for a sample is the play head plus the sum of
// every active slot's offset.

use crate::error::ScheduleError;
use crate::ops::{OpKind, Operation, Transform};

#[derive(Copy, Clone, Debug)]
struct ActiveTransform {
    op: Operation,

    /// Samples played since the transform took effect
    elapsed: u32,

    /// Reverse: read offset, shrinks by 2 per sample
    reverser_offset: i64,

    /// Speed ramp: accumulated read drift in samples
    drift: f32,
}

impl ActiveTransform {
    fn new(op: Operation) -> Self {
        Self {
            op,
            elapsed: 0,
            reverser_offset: op.duration as i64,
            drift: 0.0,
        }
    }

    /// Offset added to the play head for the current sample.
    #[inline]
    fn read_offset(&self, play_head: u32) -> i64 {
        match self.op.transform {
            Transform::None => 0,

            Transform::Reverse => self.reverser_offset,

            Transform::AbsoluteJump { position } => {
                position as i64 + self.elapsed as i64 - play_head as i64
            }

            Transform::RelativeJump { offset } => offset as i64,

            Transform::LoopInLoop { loop_size } => {
                if loop_size == 0 {
                    return 0;
                }
                let cycles = self.elapsed / loop_size;
                -((cycles as i64) * (loop_size as i64))
            }

            Transform::SpeedRamp { .. } => self.drift.floor() as i64,
        }
    }

    /// Step to the next sample. Returns `false` once the transform has run
    /// its course.
    #[inline]
    fn advance(&mut self) -> bool {
        match self.op.transform {
            Transform::Reverse => {
                self.reverser_offset -= 2;
                if self.reverser_offset <= 0 {
                    return false;
                }
            }

            Transform::SpeedRamp {
                start_speed,
                end_speed,
            } => {
                let progress = self.elapsed as f32 / self.op.duration.max(1) as f32;
                let speed = start_speed + (end_speed - start_speed) * progress.min(1.0);
                self.drift += speed - 1.0;
            }

            _ => {}
        }

        self.elapsed = self.elapsed.saturating_add(1);
        true
    }
}

/// Active transforms, one slot per operation kind.
#[derive(Debug, Default)]
pub struct TransformSet {
    slots: [Option<ActiveTransform>; OpKind::COUNT],
}

impl TransformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.slots = [None; OpKind::COUNT];
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Start applying `op`.
    ///
    /// A kind that is already active keeps running and the new
    /// activation is refused.
    pub fn activate(&mut self, op: Operation) -> Result<(), ScheduleError> {
        let kind = op.kind();
        if kind == OpKind::None {
            return Err(ScheduleError::EmptyOperation);
        }

        let slot = &mut self.slots[kind.index()];
        if slot.is_some() {
            return Err(ScheduleError::ConflictingActivation { kind });
        }

        *slot = Some(ActiveTransform::new(op));
        Ok(())
    }

    /// Stop `op` if it is the one occupying its slot.
    ///
    /// Returns `false` for stale entries: the operation already ended, or
    /// was released and its slot reused.
    pub fn retire(&mut self, op: &Operation) -> bool {
        let slot = &mut self.slots[op.kind().index()];
        if slot.as_ref().is_some_and(|active| active.op.id == op.id) {
            *slot = None;
            return true;
        }
        false
    }

    /// End whatever operation of `kind` is running.
    pub fn release(&mut self, kind: OpKind) -> Option<Operation> {
        self.slots[kind.index()].take().map(|active| active.op)
    }

    /// Offset from the play head to read at for this sample.
    #[inline]
    pub fn read_offset(&self, play_head: u32) -> i64 {
        self.slots
            .iter()
            .flatten()
            .map(|active| active.read_offset(play_head))
            .sum()
    }

    /// Step every active transform by one sample. Transforms that run
    /// their course are cleared and handed to `finished`.
    #[inline]
    pub fn advance(&mut self, mut finished: impl FnMut(&Operation)) {
        for slot in &mut self.slots {
            if let Some(active) = slot {
                if !active.advance() {
                    finished(&active.op);
                    *slot = None;
                }
            }
        }
    }
}
