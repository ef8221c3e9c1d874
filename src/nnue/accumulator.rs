//! Feature accumulator: per-colour sums of input-weight columns over the
//! pieces currently on the board.
//!
//! Updates are pure integer additions, so the incremental path is exact and
//! associative; applying a move's deltas and rebuilding from scratch produce
//! identical vectors.

/// Two `hidden_size`-length vectors of summed feature weights, one per
/// colour.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Accumulator {
    pub white: Vec<i32>,
    pub black: Vec<i32>,
}

impl Accumulator {
    pub fn new(hidden_size: usize) -> Accumulator {
        Accumulator {
            white: vec![0; hidden_size],
            black: vec![0; hidden_size],
        }
    }

    /// Zeroes both perspectives, resizing to `hidden_size` if needed.
    pub fn reset(&mut self, hidden_size: usize) {
        self.white.clear();
        self.white.resize(hidden_size, 0);
        self.black.clear();
        self.black.resize(hidden_size, 0);
    }

    /// Copies `base` into `self`, reusing the existing allocations.
    pub fn copy_from(&mut self, base: &Accumulator) {
        self.white.clone_from(&base.white);
        self.black.clone_from(&base.black);
    }
}
