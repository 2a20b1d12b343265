//! Queue policy on top of the playback engine.

use aurora_core::{Direction, Error, Queue, RepeatMode, Result, Track};
use tracing::debug;

use crate::engine::PlaybackEngine;

/// Owns the queue and decides what the engine plays next.
#[derive(Debug, Default)]
pub struct QueueController {
    queue: Queue,
}

impl QueueController {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Replace the queue and start playing `tracks[start_index]`.
    ///
    /// An out-of-range index leaves everything untouched. An empty list
    /// clears the queue and stops playback.
    pub fn set_queue(
        &mut self,
        engine: &mut PlaybackEngine,
        tracks: Vec<Track>,
        start_index: usize,
    ) -> Result<()> {
        self.queue.set(tracks, start_index)?;
        debug!("Queue set: {} tracks, starting at {start_index}", self.queue.len());

        match self.queue.current().cloned() {
            Some(track) => start(engine, track),
            None => engine.stop(),
        }
        Ok(())
    }

    /// Append a track; start it when nothing is playing.
    pub fn add_to_queue(&mut self, engine: &mut PlaybackEngine, track: Track) {
        let index = self.queue.push(track.clone());
        debug!("Queued {} at {index}", track.title);

        if !engine.is_engaged() {
            self.queue.jump_to(index);
            start(engine, track);
        }
    }

    /// Step the cursor and play the new track. Returns whether it moved.
    pub fn advance(&mut self, engine: &mut PlaybackEngine, direction: Direction) -> bool {
        match self.queue.advance(direction).cloned() {
            Some(track) => {
                start(engine, track);
                true
            }
            None => {
                debug!("No track {direction:?} of the cursor");
                false
            }
        }
    }

    /// Move the cursor to `index` and play it.
    pub fn jump_to(&mut self, engine: &mut PlaybackEngine, index: usize) -> Result<()> {
        let track = self.queue.jump_to(index).cloned().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "index {index} out of bounds for queue of {}",
                self.queue.len()
            ))
        })?;
        start(engine, track);
        Ok(())
    }

    /// Play a specific track, following it in the queue when it is there.
    pub fn play(&mut self, engine: &mut PlaybackEngine, track: Track) -> Result<()> {
        match self.queue.position_of(&track.id) {
            Some(index) => {
                self.queue.jump_to(index);
            }
            None => self.queue.release_cursor(),
        }
        engine.play(track)
    }

    pub fn toggle_shuffle(&mut self, engine: &mut PlaybackEngine) -> bool {
        let shuffle = self.queue.toggle_shuffle();
        engine.set_modes(self.queue.repeat_mode(), shuffle);
        shuffle
    }

    /// Cycle off, all, one.
    pub fn toggle_repeat(&mut self, engine: &mut PlaybackEngine) -> RepeatMode {
        let repeat = self.queue.cycle_repeat();
        engine.set_modes(repeat, self.queue.is_shuffle());
        repeat
    }

    /// React to the engine playing a track to its end.
    pub fn handle_track_end(&mut self, engine: &mut PlaybackEngine) {
        if self.queue.repeat_mode() == RepeatMode::One {
            engine.replay();
            return;
        }

        // A track played from outside the queue ends on its own.
        if self.queue.current_index().is_none() || !self.advance(engine, Direction::Next) {
            debug!("End of queue");
            engine.finish();
        }
    }
}

fn start(engine: &mut PlaybackEngine, track: Track) {
    // Failures are on the engine state and reach observers from there.
    if let Err(e) = engine.play(track) {
        debug!("Track did not start: {e}");
    }
}
