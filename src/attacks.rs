//! Attack generation.
//!
//! Pawn, knight and king attacks are precomputed per square; bishop and rook
//! attacks are ray casts over the current occupancy, stopping at (and
//! including) the first blocker. All functions here are side-effect free:
//! leaper attacks depend only on the square (and side for pawns), slider
//! attacks are pure functions of `(square, occupancy)`.

use lazy_static::lazy_static;

use crate::defs::{
    north, north_east, north_west, south, south_east, south_west, east, west, square_bb, Bitboard,
    Color, BOARD_SIZE, EMPTY, N_COLORS,
};

struct LeaperTables {
    pawn: [[Bitboard; BOARD_SIZE]; N_COLORS],
    knight: [Bitboard; BOARD_SIZE],
    king: [Bitboard; BOARD_SIZE],
}

lazy_static! {
    static ref TABLES: LeaperTables = LeaperTables::build();
}

impl LeaperTables {
    fn build() -> LeaperTables {
        let mut tables = LeaperTables {
            pawn: [[EMPTY; BOARD_SIZE]; N_COLORS],
            knight: [EMPTY; BOARD_SIZE],
            king: [EMPTY; BOARD_SIZE],
        };

        for sq in 0..BOARD_SIZE as u8 {
            let bb = square_bb(sq);
            tables.pawn[Color::White.index()][sq as usize] = north_east(bb) | north_west(bb);
            tables.pawn[Color::Black.index()][sq as usize] = south_east(bb) | south_west(bb);
            tables.knight[sq as usize] = mask_knight(sq);
            tables.king[sq as usize] = north(bb)
                | south(bb)
                | east(bb)
                | west(bb)
                | north_east(bb)
                | north_west(bb)
                | south_east(bb)
                | south_west(bb);
        }
        tables
    }
}

fn mask_knight(sq: u8) -> Bitboard {
    let rank = (sq >> 3) as i8;
    let file = (sq & 7) as i8;
    let mut attacks = EMPTY;
    for (dr, df) in [
        (2, 1),
        (2, -1),
        (-2, 1),
        (-2, -1),
        (1, 2),
        (1, -2),
        (-1, 2),
        (-1, -2),
    ] {
        let r = rank + dr;
        let f = file + df;
        if (0..8).contains(&r) && (0..8).contains(&f) {
            attacks |= square_bb((r * 8 + f) as u8);
        }
    }
    attacks
}

#[inline]
pub fn pawn_attacks(color: Color, sq: u8) -> Bitboard {
    TABLES.pawn[color.index()][sq as usize]
}

#[inline]
pub fn knight_attacks(sq: u8) -> Bitboard {
    TABLES.knight[sq as usize]
}

#[inline]
pub fn king_attacks(sq: u8) -> Bitboard {
    TABLES.king[sq as usize]
}

fn ray_attacks(sq: u8, occupied: Bitboard, directions: &[(i8, i8)]) -> Bitboard {
    let rank = (sq >> 3) as i8;
    let file = (sq & 7) as i8;
    let mut attacks = EMPTY;
    for &(dr, df) in directions {
        let mut r = rank + dr;
        let mut f = file + df;
        while (0..8).contains(&r) && (0..8).contains(&f) {
            let bb = square_bb((r * 8 + f) as u8);
            attacks |= bb;
            if occupied & bb != 0 {
                break;
            }
            r += dr;
            f += df;
        }
    }
    attacks
}

pub fn bishop_attacks(sq: u8, occupied: Bitboard) -> Bitboard {
    ray_attacks(sq, occupied, &[(1, 1), (1, -1), (-1, 1), (-1, -1)])
}

pub fn rook_attacks(sq: u8, occupied: Bitboard) -> Bitboard {
    ray_attacks(sq, occupied, &[(1, 0), (-1, 0), (0, 1), (0, -1)])
}

#[inline]
pub fn queen_attacks(sq: u8, occupied: Bitboard) -> Bitboard {
    bishop_attacks(sq, occupied) | rook_attacks(sq, occupied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{parse_square, A1, E1, H1};

    #[test]
    fn knight_attack_counts() {
        assert_eq!(knight_attacks(A1).count_ones(), 2);
        assert_eq!(knight_attacks(parse_square("d4").unwrap()).count_ones(), 8);
        assert_eq!(knight_attacks(H1).count_ones(), 2);
    }

    #[test]
    fn king_attack_counts() {
        assert_eq!(king_attacks(A1).count_ones(), 3);
        assert_eq!(king_attacks(E1).count_ones(), 5);
        assert_eq!(king_attacks(parse_square("d4").unwrap()).count_ones(), 8);
    }

    #[test]
    fn pawn_attacks_depend_on_side() {
        let e4 = parse_square("e4").unwrap();
        let white = pawn_attacks(Color::White, e4);
        let black = pawn_attacks(Color::Black, e4);
        assert_eq!(white, square_bb(parse_square("d5").unwrap()) | square_bb(parse_square("f5").unwrap()));
        assert_eq!(black, square_bb(parse_square("d3").unwrap()) | square_bb(parse_square("f3").unwrap()));
    }

    #[test]
    fn rook_rays_stop_at_blockers() {
        let d4 = parse_square("d4").unwrap();
        let blocker = square_bb(parse_square("d6").unwrap());
        let attacks = rook_attacks(d4, blocker);
        assert_ne!(attacks & blocker, 0);
        assert_eq!(attacks & square_bb(parse_square("d7").unwrap()), 0);
        // Open board: 14 squares on the two lines through d4.
        assert_eq!(rook_attacks(d4, EMPTY).count_ones(), 14);
    }

    #[test]
    fn bishop_rays_stop_at_blockers() {
        let c1 = parse_square("c1").unwrap();
        let blocker = square_bb(parse_square("e3").unwrap());
        let attacks = bishop_attacks(c1, blocker);
        assert_ne!(attacks & blocker, 0);
        assert_eq!(attacks & square_bb(parse_square("f4").unwrap()), 0);
    }

    #[test]
    fn queen_is_union_of_sliders() {
        let d4 = parse_square("d4").unwrap();
        let occ = square_bb(parse_square("d6").unwrap()) | square_bb(parse_square("f6").unwrap());
        assert_eq!(
            queen_attacks(d4, occ),
            rook_attacks(d4, occ) | bishop_attacks(d4, occ)
        );
    }
}
