//! Number Caller
//!
//! Draws the shared call sequence for one session. The full 1–75 pool is
//! shuffled once at construction and consumed by index, so no number can be
//! returned twice and the drawn prefix *is* the call history.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::card::COLUMN_SPAN;

/// Size of the number pool.
pub const POOL_SIZE: usize = 75;

/// Column letter a called number belongs to. Presentation only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Letter {
    /// 1–15
    B,
    /// 16–30
    I,
    /// 31–45
    N,
    /// 46–60
    G,
    /// 61–75
    O,
}

impl Letter {
    /// Letter for a number in 1..=75.
    pub fn for_number(n: u8) -> Option<Letter> {
        if n == 0 || n as usize > POOL_SIZE {
            return None;
        }
        match (n - 1) / COLUMN_SPAN {
            0 => Some(Letter::B),
            1 => Some(Letter::I),
            2 => Some(Letter::N),
            3 => Some(Letter::G),
            _ => Some(Letter::O),
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Letter::B => "B",
            Letter::I => "I",
            Letter::N => "N",
            Letter::G => "G",
            Letter::O => "O",
        };
        f.write_str(s)
    }
}

/// A single drawn number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// The number, 1..=75.
    pub number: u8,
    /// Display letter.
    pub letter: Letter,
    /// 1-based position in the call sequence.
    pub sequence: u8,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.letter, self.number)
    }
}

/// Outcome of asking the caller for a number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Draw {
    /// A fresh number was drawn.
    Called(Call),
    /// All 75 numbers have been drawn. A normal end of game, not a fault.
    Exhausted,
}

/// Shuffled pool of 75 numbers for one session.
#[derive(Clone, Debug)]
pub struct NumberCaller {
    pool: [u8; POOL_SIZE],
    cursor: usize,
}

impl NumberCaller {
    /// Shuffle a fresh pool.
    pub fn new(rng: &mut DeterministicRng) -> Self {
        let mut pool: [u8; POOL_SIZE] = std::array::from_fn(|i| i as u8 + 1);
        rng.shuffle(&mut pool);
        Self { pool, cursor: 0 }
    }

    /// Numbers drawn so far, in call order.
    pub fn history(&self) -> &[u8] {
        &self.pool[..self.cursor]
    }

    /// Most recent call, if any.
    pub fn current(&self) -> Option<u8> {
        self.history().last().copied()
    }

    /// Numbers not yet drawn.
    pub fn remaining(&self) -> usize {
        POOL_SIZE - self.cursor
    }

    /// Draw the next number.
    pub fn draw(&mut self) -> Draw {
        match self.next() {
            Some(call) => Draw::Called(call),
            None => Draw::Exhausted,
        }
    }

    /// Whether all 75 numbers have been drawn.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= POOL_SIZE
    }
}

impl Iterator for NumberCaller {
    type Item = Call;

    /// Draw the next number; `None` once the pool is exhausted.
    fn next(&mut self) -> Option<Call> {
        let number = *self.pool.get(self.cursor)?;
        self.cursor += 1;
        Some(Call {
            number,
            // Pool only holds 1..=75
            letter: Letter::for_number(number)?,
            sequence: self.cursor as u8,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_letters() {
        assert_eq!(Letter::for_number(1), Some(Letter::B));
        assert_eq!(Letter::for_number(15), Some(Letter::B));
        assert_eq!(Letter::for_number(16), Some(Letter::I));
        assert_eq!(Letter::for_number(45), Some(Letter::N));
        assert_eq!(Letter::for_number(46), Some(Letter::G));
        assert_eq!(Letter::for_number(75), Some(Letter::O));
        assert_eq!(Letter::for_number(0), None);
        assert_eq!(Letter::for_number(76), None);
    }

    #[test]
    fn test_call_display() {
        let call = Call { number: 42, letter: Letter::N, sequence: 1 };
        assert_eq!(call.to_string(), "N-42");
    }

    #[test]
    fn test_exhausts_after_75() {
        let mut rng = DeterministicRng::new(3);
        let mut caller = NumberCaller::new(&mut rng);

        for expected in 1..=POOL_SIZE {
            let call = caller.next().unwrap();
            assert_eq!(call.sequence as usize, expected);
            assert_eq!(caller.current(), Some(call.number));
        }
        assert!(caller.is_exhausted());
        assert_eq!(caller.next(), None);
        assert_eq!(caller.draw(), Draw::Exhausted);
        assert_eq!(caller.history().len(), POOL_SIZE);
    }

    #[test]
    fn test_history_tracks_draws() {
        let mut rng = DeterministicRng::new(4);
        let mut caller = NumberCaller::new(&mut rng);
        assert!(caller.history().is_empty());
        assert_eq!(caller.current(), None);

        let drawn: Vec<u8> = caller.by_ref().take(10).map(|c| c.number).collect();
        assert_eq!(caller.history(), drawn.as_slice());
        assert_eq!(caller.remaining(), 65);
    }

    proptest! {
        #[test]
        fn prop_never_repeats(seed in any::<u64>()) {
            let mut rng = DeterministicRng::new(seed);
            let caller = NumberCaller::new(&mut rng);
            let seen: BTreeSet<u8> = caller.map(|c| c.number).collect();
            prop_assert_eq!(seen.len(), POOL_SIZE);
            prop_assert_eq!(seen.iter().next().copied(), Some(1));
            prop_assert_eq!(seen.iter().last().copied(), Some(75));
        }
    }
}
