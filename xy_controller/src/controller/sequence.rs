use std::fmt;

/// Levels for the four coil channels, in `a, aa, b, bb` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoilPattern(pub [bool; 4]);

impl CoilPattern {
    pub const OFF: CoilPattern = CoilPattern([false; 4]);
    pub const ALL_ON: CoilPattern = CoilPattern([true; 4]);

    const fn from_bits(bits: [u8; 4]) -> Self {
        CoilPattern([bits[0] != 0, bits[1] != 0, bits[2] != 0, bits[3] != 0])
    }

    pub fn levels(&self) -> [bool; 4] {
        self.0
    }

    pub fn is_off(&self) -> bool {
        *self == Self::OFF
    }
}

impl fmt::Display for CoilPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, aa, b, bb] = self.0.map(u8::from);
        write!(f, "[{}, {}, {}, {}]", a, aa, b, bb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn of(steps: i32) -> Self {
        if steps < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }

    pub fn toward(from: i32, to: i32) -> Self {
        if to < from {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }

    pub fn delta(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Half-step table for a two-phase stepper.
pub struct StepSequence {
    patterns: [CoilPattern; 8],
}

pub const STEP_SEQUENCE: StepSequence = StepSequence {
    patterns: [
        CoilPattern::from_bits([1, 0, 1, 0]),
        CoilPattern::from_bits([1, 0, 0, 0]),
        CoilPattern::from_bits([1, 0, 0, 1]),
        CoilPattern::from_bits([0, 0, 0, 1]),
        CoilPattern::from_bits([0, 1, 0, 1]),
        CoilPattern::from_bits([0, 1, 0, 0]),
        CoilPattern::from_bits([0, 1, 1, 0]),
        CoilPattern::from_bits([0, 0, 1, 0]),
    ],
};

impl StepSequence {
    pub const LEN: usize = 8;

    pub fn pattern(&self, index: usize) -> CoilPattern {
        self.patterns[index % Self::LEN]
    }

    pub fn advance(index: usize, direction: Direction) -> usize {
        match direction {
            Direction::Forward => (index + 1) % Self::LEN,
            Direction::Backward => (index + Self::LEN - 1) % Self::LEN,
        }
    }
}
