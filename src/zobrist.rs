//! Zobrist hashing keys.
//!
//! Keys are generated from a fixed xorshift seed so that hashes are stable
//! across runs; repetition detection and transposition-table reuse between
//! self-play games both depend on that stability.

use lazy_static::lazy_static;

use crate::defs::{Color, PieceType, BOARD_SIZE, N_COLORS, N_PIECES};

pub struct ZobristKeys {
    pieces: [[[u64; BOARD_SIZE]; N_PIECES]; N_COLORS],
    castling: [u64; 16],
    en_passant: [u64; 8],
    side: u64,
}

lazy_static! {
    pub static ref ZOBRIST: ZobristKeys = ZobristKeys::generate();
}

impl ZobristKeys {
    fn generate() -> ZobristKeys {
        let mut seed = 0x4F53_5052_4559_2121u64;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let mut keys = ZobristKeys {
            pieces: [[[0; BOARD_SIZE]; N_PIECES]; N_COLORS],
            castling: [0; 16],
            en_passant: [0; 8],
            side: 0,
        };

        for color in 0..N_COLORS {
            for piece in 0..N_PIECES {
                for sq in 0..BOARD_SIZE {
                    keys.pieces[color][piece][sq] = next();
                }
            }
        }
        for rights in 0..16 {
            keys.castling[rights] = next();
        }
        for file in 0..8 {
            keys.en_passant[file] = next();
        }
        keys.side = next();

        keys
    }

    #[inline]
    pub fn piece(&self, color: Color, piece: PieceType, sq: u8) -> u64 {
        self.pieces[color.index()][piece.index()][sq as usize]
    }

    #[inline]
    pub fn castling(&self, rights: u8) -> u64 {
        self.castling[(rights & 0x0F) as usize]
    }

    #[inline]
    pub fn en_passant(&self, file: u8) -> u64 {
        self.en_passant[(file & 7) as usize]
    }

    #[inline]
    pub fn side(&self) -> u64 {
        self.side
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_distinct() {
        let a = ZobristKeys::generate();
        let b = ZobristKeys::generate();
        assert_eq!(
            a.piece(Color::White, PieceType::Pawn, 8),
            b.piece(Color::White, PieceType::Pawn, 8)
        );
        assert_eq!(a.side(), b.side());

        // No two piece keys collide; a collision here would poison every
        // downstream hash.
        let mut seen = std::collections::HashSet::new();
        for color in [Color::White, Color::Black] {
            for piece in 0..N_PIECES {
                for sq in 0..64u8 {
                    assert!(seen.insert(a.piece(color, PieceType::from_index(piece), sq)));
                }
            }
        }
    }
}
