//! Queue management types.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::Track;
use crate::{Error, Result};

/// Direction of a queue step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

/// The playback queue.
///
/// The cursor is either absent or a valid index into `items`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Queue {
    /// All tracks in play order.
    items: Vec<Track>,
    /// Current playback index.
    cursor: Option<usize>,
    /// Repeat mode.
    repeat_mode: RepeatMode,
    /// Shuffle enabled.
    shuffle: bool,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all tracks in the queue.
    pub fn items(&self) -> &[Track] {
        &self.items
    }

    /// Get the current track.
    pub fn current(&self) -> Option<&Track> {
        self.cursor.and_then(|i| self.items.get(i))
    }

    /// Get the cursor.
    pub const fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    /// Get the number of tracks in the queue.
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty.
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a track and return its index. The cursor is left alone.
    pub fn push(&mut self, track: Track) -> usize {
        self.items.push(track);
        self.items.len() - 1
    }

    /// Clear the entire queue.
    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = None;
    }

    /// Replace the queue contents and place the cursor at `start_index`.
    ///
    /// An empty list clears the queue. On error the queue is unchanged.
    pub fn set(&mut self, items: Vec<Track>, start_index: usize) -> Result<()> {
        if !items.is_empty() && start_index >= items.len() {
            return Err(Error::InvalidArgument(format!(
                "start index {start_index} out of bounds for queue of {}",
                items.len()
            )));
        }

        self.cursor = if items.is_empty() {
            None
        } else {
            Some(start_index)
        };
        self.items = items;
        Ok(())
    }

    /// Index the cursor would move to for a step in `direction`.
    pub fn peek(&self, direction: Direction) -> Option<usize> {
        step(self.items.len(), self.cursor, self.repeat_mode, direction)
    }

    /// Move the cursor one step. Returns the new current track, or `None`
    /// (cursor unchanged) when there is nowhere to go.
    pub fn advance(&mut self, direction: Direction) -> Option<&Track> {
        let index = self.peek(direction)?;
        self.cursor = Some(index);
        self.items.get(index)
    }

    /// Jump to a specific index.
    pub fn jump_to(&mut self, index: usize) -> Option<&Track> {
        if index < self.items.len() {
            self.cursor = Some(index);
            self.items.get(index)
        } else {
            None
        }
    }

    /// Detach the cursor without touching the items, e.g. while a track
    /// from outside the queue plays.
    pub fn release_cursor(&mut self) {
        self.cursor = None;
    }

    /// Index of the first track with the given ID.
    pub fn position_of(&self, track_id: &str) -> Option<usize> {
        self.items.iter().position(|t| t.id == track_id)
    }

    /// The next `count` tracks after the cursor, following wrap rules.
    ///
    /// The current track is never included, even when repeat-all wraps.
    pub fn upcoming(&self, count: usize) -> Vec<&Track> {
        let mut out = Vec::with_capacity(count.min(self.items.len()));
        let mut at = self.cursor;
        let mut first = None;
        while out.len() < count {
            match step(self.items.len(), at, self.repeat_mode, Direction::Next) {
                Some(index) if Some(index) != self.cursor && Some(index) != first => {
                    first.get_or_insert(index);
                    out.push(&self.items[index]);
                    at = Some(index);
                }
                _ => break,
            }
        }
        out
    }

    /// Get repeat mode.
    pub const fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Set repeat mode.
    pub const fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    /// Cycle through repeat modes: off, all, one.
    pub const fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat_mode = self.repeat_mode.cycle();
        self.repeat_mode
    }

    /// Check if shuffle is enabled.
    pub const fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    /// Toggle shuffle mode, returning the new flag.
    ///
    /// Turning shuffle on permutes the queue and moves the current track to
    /// the front with the cursor on it. Turning it off keeps the shuffled order.
    pub fn toggle_shuffle(&mut self) -> bool {
        self.toggle_shuffle_with(&mut SmallRng::from_rng(&mut rand::rng()))
    }

    /// [`Queue::toggle_shuffle`] with a fixed seed.
    pub fn toggle_shuffle_seeded(&mut self, seed: u64) -> bool {
        self.toggle_shuffle_with(&mut SmallRng::seed_from_u64(seed))
    }

    fn toggle_shuffle_with(&mut self, rng: &mut SmallRng) -> bool {
        self.shuffle = !self.shuffle;
        if self.shuffle {
            self.shuffle_items(rng);
        }
        self.shuffle
    }

    fn shuffle_items(&mut self, rng: &mut SmallRng) {
        match self.cursor {
            Some(index) => {
                let pinned = self.items.remove(index);
                self.items.shuffle(rng);
                self.items.insert(0, pinned);
                self.cursor = Some(0);
            }
            None => self.items.shuffle(rng),
        }
    }
}

/// Cursor movement rules shared by [`Queue::peek`] and [`Queue::upcoming`].
///
/// Wrapping only happens under [`RepeatMode::All`]. Repeat-one does not pin
/// explicit steps; it only affects natural end of track. A detached cursor
/// sits past both ends, so it only re-enters the queue by wrapping.
fn step(
    len: usize,
    cursor: Option<usize>,
    repeat: RepeatMode,
    direction: Direction,
) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let last = len - 1;
    let wraps = repeat == RepeatMode::All;

    match (direction, cursor) {
        (Direction::Next, None) => wraps.then_some(0),
        (Direction::Previous, None) => wraps.then_some(last),
        (Direction::Next, Some(current)) if current < last => Some(current + 1),
        (Direction::Next, Some(_)) => wraps.then_some(0),
        (Direction::Previous, Some(current)) if current > 0 => Some(current - 1),
        (Direction::Previous, Some(_)) => wraps.then_some(last),
    }
}

/// Repeat mode for playback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// No repeat.
    #[default]
    Off,
    /// Repeat the entire queue.
    All,
    /// Repeat the current track.
    One,
}

impl RepeatMode {
    /// The mode that follows this one in the off, all, one cycle.
    pub const fn cycle(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}
