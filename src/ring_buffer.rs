// src/ring_buffer.rs

use crate::error::{EngineError, EngineResult};

/// Shortest loop the engine will play, in frames.
pub const MIN_LOOP_LENGTH: usize = 512;

/// Circular store of the most recently recorded audio.
///
/// Storage is allocated once; `loop_length` selects how much of it is in
/// use. Both heads stay below `loop_length`.
#[derive(Debug)]
pub struct RingBuffer {
    data: Vec<f32>,
    loop_length: usize,
    record_head: usize,
    play_head: usize,

    /// Latched once the record head first wraps
    full: bool,
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> EngineResult<Self> {
        if capacity < MIN_LOOP_LENGTH {
            return Err(EngineError::CapacityTooSmall {
                capacity,
                minimum: MIN_LOOP_LENGTH,
            });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| EngineError::AllocationFailure {
                what: "ring buffer",
                requested: capacity,
            })?;
        data.resize(capacity, 0.0);

        Ok(Self {
            data,
            loop_length: capacity,
            record_head: 0,
            play_head: 0,
            full: false,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn loop_length(&self) -> usize {
        self.loop_length
    }

    #[inline]
    pub fn record_head(&self) -> usize {
        self.record_head
    }

    #[inline]
    pub fn play_head(&self) -> usize {
        self.play_head
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Silence the buffer and rewind both heads.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.record_head = 0;
        self.play_head = 0;
        self.full = false;
    }

    /// Set the loop length, clamped to `[MIN_LOOP_LENGTH, capacity]`.
    ///
    /// A head left past the new end goes back to 0. A record head wrapped
    /// this way latches `full`, since the shorter loop has been recorded.
    /// Returns `true` when the play head wrapped.
    pub fn set_loop_length(&mut self, frames: usize) -> bool {
        self.loop_length = frames.clamp(MIN_LOOP_LENGTH, self.capacity());

        if self.record_head >= self.loop_length {
            self.record_head = 0;
            self.full = true;
        }

        if self.play_head >= self.loop_length {
            self.play_head = 0;
            return true;
        }
        false
    }

    /// Store `sample` at the record head and advance it.
    ///
    /// Returns `true` when the record head wrapped.
    #[inline]
    pub fn write(&mut self, sample: f32) -> bool {
        self.data[self.record_head] = sample;
        self.record_head += 1;

        if self.record_head >= self.loop_length {
            self.record_head = 0;
            self.full = true;
            return true;
        }
        false
    }

    /// Sample at `offset`, wrapped into the loop. Negative offsets count
    /// back from the loop end.
    #[inline]
    pub fn read_at(&self, offset: i64) -> f32 {
        let index = offset.rem_euclid(self.loop_length as i64) as usize;
        self.data[index]
    }

    /// Advance the play head.
    ///
    /// Returns `true` on wraparound, which starts a new clock epoch.
    #[inline]
    pub fn advance_play_head(&mut self) -> bool {
        self.play_head += 1;

        if self.play_head >= self.loop_length {
            self.play_head = 0;
            return true;
        }
        false
    }
}
