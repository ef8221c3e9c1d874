//! Board state: piece-set bitboards, a mailbox mirror, castling rights,
//! en-passant, the move clocks and the incrementally maintained Zobrist key.
//!
//! `make_move` and `undo_move` are exact inverses; `UndoState` snapshots the
//! irreversible parts of the position so that unmake restores the board
//! bitwise, hash included.

use std::fmt;

use crate::attacks;
use crate::defs::{
    file_of, square_bb, Bitboard, Color, PieceType, A1, A8, BLACK_KING_SIDE, BLACK_QUEEN_SIDE,
    BOARD_SIZE, D1, D8, EMPTY, F1, F8, H1, H8, N_COLORS, N_PIECES, WHITE_KING_SIDE,
    WHITE_QUEEN_SIDE,
};
use crate::errors::EngineError;
use crate::mv::Move;
use crate::zobrist::ZOBRIST;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const EMPTY_SQUARE: u8 = (N_PIECES * N_COLORS) as u8;

#[inline]
fn encode_piece(color: Color, piece: PieceType) -> u8 {
    (color.index() * N_PIECES + piece.index()) as u8
}

/// Snapshot of the irreversible state consumed by `undo_move`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UndoState {
    pub castling_rights: u8,
    pub ep_square: Option<u8>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
    pub hash: u64,
    pub captured: Option<PieceType>,
}

#[derive(Clone, Debug)]
pub struct Board {
    pieces: [[Bitboard; N_PIECES]; N_COLORS],
    occupancy: [Bitboard; N_COLORS],
    occupancy_all: Bitboard,
    mailbox: [u8; BOARD_SIZE],
    side_to_move: Color,
    castling_rights: u8,
    ep_square: Option<u8>,
    halfmove_clock: u32,
    fullmove_number: u32,
    hash: u64,
}

impl Default for Board {
    fn default() -> Board {
        Board::start_position()
    }
}

impl Board {
    /// The standard starting position.
    pub fn start_position() -> Board {
        // START_FEN is well-formed, so this cannot fail.
        Board::from_fen(START_FEN).unwrap_or_else(|_| Board::empty())
    }

    pub fn from_fen(fen: &str) -> Result<Board, EngineError> {
        let mut board = Board::empty();
        board.set_from_fen(fen)?;
        Ok(board)
    }

    fn empty() -> Board {
        Board {
            pieces: [[EMPTY; N_PIECES]; N_COLORS],
            occupancy: [EMPTY; N_COLORS],
            occupancy_all: EMPTY,
            mailbox: [EMPTY_SQUARE; BOARD_SIZE],
            side_to_move: Color::White,
            castling_rights: 0,
            ep_square: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            hash: 0,
        }
    }

    fn clear(&mut self) {
        *self = Board::empty();
    }

    // --- Accessors ---

    #[inline]
    pub fn pieces(&self, color: Color, piece: PieceType) -> Bitboard {
        self.pieces[color.index()][piece.index()]
    }

    #[inline]
    pub fn occupancy(&self, color: Color) -> Bitboard {
        self.occupancy[color.index()]
    }

    #[inline]
    pub fn occupancy_all(&self) -> Bitboard {
        self.occupancy_all
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline]
    pub fn castling_rights(&self) -> u8 {
        self.castling_rights
    }

    #[inline]
    pub fn ep_square(&self) -> Option<u8> {
        self.ep_square
    }

    #[inline]
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    #[inline]
    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub fn piece_type_at(&self, sq: u8) -> Option<PieceType> {
        let code = self.mailbox[sq as usize];
        if code == EMPTY_SQUARE {
            None
        } else {
            Some(PieceType::from_index(code as usize % N_PIECES))
        }
    }

    #[inline]
    pub fn color_at(&self, sq: u8) -> Option<Color> {
        let code = self.mailbox[sq as usize];
        if code == EMPTY_SQUARE {
            None
        } else {
            Some(Color::from_index(code as usize / N_PIECES))
        }
    }

    #[inline]
    pub fn piece_at(&self, sq: u8) -> Option<(Color, PieceType)> {
        let code = self.mailbox[sq as usize];
        if code == EMPTY_SQUARE {
            None
        } else {
            Some((
                Color::from_index(code as usize / N_PIECES),
                PieceType::from_index(code as usize % N_PIECES),
            ))
        }
    }

    pub fn king_square(&self, color: Color) -> Option<u8> {
        let bb = self.pieces(color, PieceType::King);
        if bb == EMPTY {
            None
        } else {
            Some(bb.trailing_zeros() as u8)
        }
    }

    // --- Piece placement ---

    fn place_piece(&mut self, color: Color, piece: PieceType, sq: u8) {
        let bb = square_bb(sq);
        self.pieces[color.index()][piece.index()] |= bb;
        self.occupancy[color.index()] |= bb;
        self.occupancy_all |= bb;
        self.mailbox[sq as usize] = encode_piece(color, piece);
        self.hash ^= ZOBRIST.piece(color, piece, sq);
    }

    fn remove_piece(&mut self, color: Color, piece: PieceType, sq: u8) {
        let bb = square_bb(sq);
        self.pieces[color.index()][piece.index()] &= !bb;
        self.occupancy[color.index()] &= !bb;
        self.occupancy_all &= !bb;
        self.mailbox[sq as usize] = EMPTY_SQUARE;
        self.hash ^= ZOBRIST.piece(color, piece, sq);
    }

    // --- Attack queries ---

    pub fn is_square_attacked(&self, sq: u8, by: Color) -> bool {
        if attacks::pawn_attacks(by.opposite(), sq) & self.pieces(by, PieceType::Pawn) != 0 {
            return true;
        }
        if attacks::knight_attacks(sq) & self.pieces(by, PieceType::Knight) != 0 {
            return true;
        }
        if attacks::king_attacks(sq) & self.pieces(by, PieceType::King) != 0 {
            return true;
        }
        let diagonal = self.pieces(by, PieceType::Bishop) | self.pieces(by, PieceType::Queen);
        if attacks::bishop_attacks(sq, self.occupancy_all) & diagonal != 0 {
            return true;
        }
        let straight = self.pieces(by, PieceType::Rook) | self.pieces(by, PieceType::Queen);
        if attacks::rook_attacks(sq, self.occupancy_all) & straight != 0 {
            return true;
        }
        false
    }

    pub fn in_check(&self, color: Color) -> bool {
        match self.king_square(color) {
            Some(sq) => self.is_square_attacked(sq, color.opposite()),
            None => false,
        }
    }

    // --- Make / unmake ---

    /// Applies `mv` and returns the snapshot needed to undo it.
    ///
    /// A move with no piece on its source square, or a non-en-passant
    /// capture over an empty target, is a contract violation: the board is
    /// left untouched and `IllegalMove` is returned. Legal moves produced by
    /// the generator never trip these checks.
    pub fn make_move(&mut self, mv: Move) -> Result<UndoState, EngineError> {
        let us = self.side_to_move;
        let them = us.opposite();

        let moving_piece = match self.piece_type_at(mv.from) {
            Some(piece) => piece,
            None => {
                debug_assert!(false, "no piece on {}", mv.from);
                return Err(EngineError::IllegalMove(format!(
                    "no piece on source square of {}",
                    mv.to_uci()
                )));
            }
        };
        if mv.is_capture() && !mv.is_en_passant() && self.piece_type_at(mv.to).is_none() {
            debug_assert!(false, "capture over empty square {}", mv.to);
            return Err(EngineError::IllegalMove(format!(
                "capture over empty square in {}",
                mv.to_uci()
            )));
        }

        let mut undo = UndoState {
            castling_rights: self.castling_rights,
            ep_square: self.ep_square,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
            hash: self.hash,
            captured: None,
        };

        if let Some(ep) = self.ep_square {
            self.hash ^= ZOBRIST.en_passant(file_of(ep));
        }
        self.ep_square = None;
        self.hash ^= ZOBRIST.castling(self.castling_rights);

        self.remove_piece(us, moving_piece, mv.from);

        let mut captured = None;
        if mv.is_en_passant() {
            let cap_sq = if us == Color::White {
                mv.to - 8
            } else {
                mv.to + 8
            };
            self.remove_piece(them, PieceType::Pawn, cap_sq);
            captured = Some(PieceType::Pawn);
        } else if mv.is_capture() {
            // Presence was validated above.
            if let Some(piece) = self.piece_type_at(mv.to) {
                self.remove_piece(them, piece, mv.to);
                captured = Some(piece);
            }
        }

        let placed = if mv.is_promotion() {
            mv.promotion.unwrap_or(moving_piece)
        } else {
            moving_piece
        };
        self.place_piece(us, placed, mv.to);

        if mv.is_castle() {
            let (rook_from, rook_to) = if mv.is_king_castle() {
                if us == Color::White {
                    (H1, F1)
                } else {
                    (H8, F8)
                }
            } else if us == Color::White {
                (A1, D1)
            } else {
                (A8, D8)
            };
            self.remove_piece(us, PieceType::Rook, rook_from);
            self.place_piece(us, PieceType::Rook, rook_to);
        }

        match moving_piece {
            PieceType::King => {
                self.castling_rights &= if us == Color::White {
                    !(WHITE_KING_SIDE | WHITE_QUEEN_SIDE)
                } else {
                    !(BLACK_KING_SIDE | BLACK_QUEEN_SIDE)
                };
            }
            PieceType::Rook => {
                match (us, mv.from) {
                    (Color::White, A1) => self.castling_rights &= !WHITE_QUEEN_SIDE,
                    (Color::White, H1) => self.castling_rights &= !WHITE_KING_SIDE,
                    (Color::Black, A8) => self.castling_rights &= !BLACK_QUEEN_SIDE,
                    (Color::Black, H8) => self.castling_rights &= !BLACK_KING_SIDE,
                    _ => {}
                }
            }
            _ => {}
        }

        if captured.is_some() {
            undo.captured = captured;
            if !mv.is_en_passant() {
                match mv.to {
                    A1 => self.castling_rights &= !WHITE_QUEEN_SIDE,
                    H1 => self.castling_rights &= !WHITE_KING_SIDE,
                    A8 => self.castling_rights &= !BLACK_QUEEN_SIDE,
                    H8 => self.castling_rights &= !BLACK_KING_SIDE,
                    _ => {}
                }
            }
        }

        if moving_piece == PieceType::Pawn {
            self.halfmove_clock = 0;
            if mv.is_double_push() {
                self.ep_square = Some((mv.from + mv.to) / 2);
            }
        } else if captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }

        if let Some(ep) = self.ep_square {
            self.hash ^= ZOBRIST.en_passant(file_of(ep));
        }
        self.hash ^= ZOBRIST.castling(self.castling_rights);

        self.side_to_move = them;
        self.hash ^= ZOBRIST.side();

        if us == Color::Black {
            self.fullmove_number += 1;
        }

        Ok(undo)
    }

    /// Reverses `make_move`. `mv` and `undo` must be the pair that produced
    /// the current position.
    pub fn undo_move(&mut self, mv: Move, undo: &UndoState) {
        let them = self.side_to_move;
        let us = them.opposite();
        self.side_to_move = us;

        // The hash is restored wholesale from the snapshot below; the piece
        // toggles in place/remove cancel against it.
        let moved_piece = self.piece_type_at(mv.to).unwrap_or(PieceType::Pawn);
        self.remove_piece(us, moved_piece, mv.to);

        let original = if mv.is_promotion() {
            PieceType::Pawn
        } else {
            moved_piece
        };
        self.place_piece(us, original, mv.from);

        if mv.is_castle() {
            let (rook_from, rook_to) = if mv.is_king_castle() {
                if us == Color::White {
                    (F1, H1)
                } else {
                    (F8, H8)
                }
            } else if us == Color::White {
                (D1, A1)
            } else {
                (D8, A8)
            };
            self.remove_piece(us, PieceType::Rook, rook_from);
            self.place_piece(us, PieceType::Rook, rook_to);
        }

        if let Some(captured) = undo.captured {
            if mv.is_en_passant() {
                let cap_sq = if us == Color::White {
                    mv.to - 8
                } else {
                    mv.to + 8
                };
                self.place_piece(them, PieceType::Pawn, cap_sq);
            } else {
                self.place_piece(them, captured, mv.to);
            }
        }

        self.castling_rights = undo.castling_rights;
        self.ep_square = undo.ep_square;
        self.halfmove_clock = undo.halfmove_clock;
        self.fullmove_number = undo.fullmove_number;
        self.hash = undo.hash;
    }

    /// Passes the turn: flips the side to move and clears the en-passant
    /// square. Used by null-move pruning.
    pub fn make_null_move(&mut self) -> UndoState {
        let undo = UndoState {
            castling_rights: self.castling_rights,
            ep_square: self.ep_square,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
            hash: self.hash,
            captured: None,
        };

        if let Some(ep) = self.ep_square {
            self.hash ^= ZOBRIST.en_passant(file_of(ep));
        }
        self.ep_square = None;

        let us = self.side_to_move;
        self.side_to_move = us.opposite();
        self.hash ^= ZOBRIST.side();

        if us == Color::Black {
            self.fullmove_number += 1;
        }
        self.halfmove_clock += 1;

        undo
    }

    pub fn undo_null_move(&mut self, undo: &UndoState) {
        self.side_to_move = self.side_to_move.opposite();
        self.castling_rights = undo.castling_rights;
        self.ep_square = undo.ep_square;
        self.halfmove_clock = undo.halfmove_clock;
        self.fullmove_number = undo.fullmove_number;
        self.hash = undo.hash;
    }

    // --- FEN codec ---

    pub fn set_start_position(&mut self) {
        // START_FEN is well-formed, so this cannot fail.
        let _ = self.set_from_fen(START_FEN);
    }

    pub fn set_from_fen(&mut self, fen: &str) -> Result<(), EngineError> {
        let mut fields = fen.split_whitespace();
        let placement = fields
            .next()
            .ok_or_else(|| EngineError::Parse("FEN missing placement field".into()))?;
        let active = fields
            .next()
            .ok_or_else(|| EngineError::Parse("FEN missing active color".into()))?;
        let castling = fields
            .next()
            .ok_or_else(|| EngineError::Parse("FEN missing castling field".into()))?;
        let en_passant = fields
            .next()
            .ok_or_else(|| EngineError::Parse("FEN missing en passant field".into()))?;
        let halfmove = fields.next().unwrap_or("0");
        let fullmove = fields.next().unwrap_or("1");

        self.clear();

        // Placement enumerates ranks 8 down to 1, files a to h.
        let mut sq: i32 = 56;
        for c in placement.chars() {
            match c {
                '/' => sq -= 16,
                '1'..='8' => sq += c as i32 - '0' as i32,
                _ => {
                    let piece = PieceType::from_char(c).ok_or_else(|| {
                        EngineError::Parse(format!("invalid piece character '{}' in FEN", c))
                    })?;
                    if !(0..64).contains(&sq) {
                        return Err(EngineError::Parse("FEN placement overruns board".into()));
                    }
                    let color = if c.is_ascii_uppercase() {
                        Color::White
                    } else {
                        Color::Black
                    };
                    self.place_piece(color, piece, sq as u8);
                    sq += 1;
                }
            }
        }

        self.side_to_move = match active {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(EngineError::Parse(format!("invalid active color '{}'", active))),
        };
        if self.side_to_move == Color::Black {
            self.hash ^= ZOBRIST.side();
        }

        let mut rights = 0u8;
        if castling.contains('K') {
            rights |= WHITE_KING_SIDE;
        }
        if castling.contains('Q') {
            rights |= WHITE_QUEEN_SIDE;
        }
        if castling.contains('k') {
            rights |= BLACK_KING_SIDE;
        }
        if castling.contains('q') {
            rights |= BLACK_QUEEN_SIDE;
        }
        self.castling_rights = rights;
        self.hash ^= ZOBRIST.castling(rights);

        if en_passant != "-" {
            let ep = crate::defs::parse_square(en_passant).ok_or_else(|| {
                EngineError::Parse(format!("invalid en passant square '{}'", en_passant))
            })?;
            self.ep_square = Some(ep);
            self.hash ^= ZOBRIST.en_passant(file_of(ep));
        }

        self.halfmove_clock = halfmove
            .parse()
            .map_err(|_| EngineError::Parse(format!("invalid halfmove clock '{}'", halfmove)))?;
        self.fullmove_number = fullmove
            .parse()
            .map_err(|_| EngineError::Parse(format!("invalid fullmove number '{}'", fullmove)))?;

        Ok(())
    }

    pub fn fen(&self) -> String {
        let mut out = String::new();
        for rank in (0..8).rev() {
            let mut empty_run = 0;
            for file in 0..8 {
                let sq = (rank * 8 + file) as u8;
                match self.piece_at(sq) {
                    None => empty_run += 1,
                    Some((color, piece)) => {
                        if empty_run > 0 {
                            out.push((b'0' + empty_run) as char);
                            empty_run = 0;
                        }
                        let c = match piece {
                            PieceType::Pawn => 'p',
                            PieceType::Knight => 'n',
                            PieceType::Bishop => 'b',
                            PieceType::Rook => 'r',
                            PieceType::Queen => 'q',
                            PieceType::King => 'k',
                        };
                        out.push(if color == Color::White {
                            c.to_ascii_uppercase()
                        } else {
                            c
                        });
                    }
                }
            }
            if empty_run > 0 {
                out.push((b'0' + empty_run) as char);
            }
            if rank > 0 {
                out.push('/');
            }
        }

        out.push(' ');
        out.push(if self.side_to_move == Color::White { 'w' } else { 'b' });
        out.push(' ');

        if self.castling_rights == 0 {
            out.push('-');
        } else {
            if self.castling_rights & WHITE_KING_SIDE != 0 {
                out.push('K');
            }
            if self.castling_rights & WHITE_QUEEN_SIDE != 0 {
                out.push('Q');
            }
            if self.castling_rights & BLACK_KING_SIDE != 0 {
                out.push('k');
            }
            if self.castling_rights & BLACK_QUEEN_SIDE != 0 {
                out.push('q');
            }
        }
        out.push(' ');

        match self.ep_square {
            Some(ep) => out.push_str(&crate::defs::square_name(ep)),
            None => out.push('-'),
        }

        out.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove_number));
        out
    }

    /// Recomputes the Zobrist key from scratch. The incrementally maintained
    /// `hash()` must always agree with this.
    pub fn compute_hash(&self) -> u64 {
        let mut h = 0u64;
        for color_idx in 0..N_COLORS {
            let color = Color::from_index(color_idx);
            for piece_idx in 0..N_PIECES {
                let piece = PieceType::from_index(piece_idx);
                let mut bb = self.pieces(color, piece);
                while bb != 0 {
                    let sq = crate::defs::pop_lsb(&mut bb);
                    h ^= ZOBRIST.piece(color, piece, sq);
                }
            }
        }
        h ^= ZOBRIST.castling(self.castling_rights);
        if let Some(ep) = self.ep_square {
            h ^= ZOBRIST.en_passant(file_of(ep));
        }
        if self.side_to_move == Color::Black {
            h ^= ZOBRIST.side();
        }
        h
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8 {
                let sq = (rank * 8 + file) as u8;
                let c = match self.piece_at(sq) {
                    None => '.',
                    Some((color, piece)) => {
                        let c = match piece {
                            PieceType::Pawn => 'p',
                            PieceType::Knight => 'n',
                            PieceType::Bishop => 'b',
                            PieceType::Rook => 'r',
                            PieceType::Queen => 'q',
                            PieceType::King => 'k',
                        };
                        if color == Color::White {
                            c.to_ascii_uppercase()
                        } else {
                            c
                        }
                    }
                };
                write!(f, "{} ", c)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  a b c d e f g h")?;
        write!(f, "{}", self.fen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::parse_square;
    use crate::mv::flag;

    #[test]
    fn start_position_hash_matches_rebuild() {
        let board = Board::start_position();
        assert_eq!(board.hash(), board.compute_hash());
        assert_eq!(board.fen(), START_FEN);
    }

    #[test]
    fn make_undo_restores_everything() {
        let mut board = Board::start_position();
        let before_fen = board.fen();
        let before_hash = board.hash();

        let mv = Move::new(
            parse_square("e2").unwrap(),
            parse_square("e4").unwrap(),
            flag::DOUBLE_PUSH,
        );
        let undo = board.make_move(mv).unwrap();
        assert_eq!(board.ep_square(), parse_square("e3"));
        assert_eq!(board.hash(), board.compute_hash());

        board.undo_move(mv, &undo);
        assert_eq!(board.fen(), before_fen);
        assert_eq!(board.hash(), before_hash);
    }

    #[test]
    fn illegal_make_leaves_board_untouched() {
        let mut board = Board::start_position();
        let fen = board.fen();
        let mv = Move::new(
            parse_square("e5").unwrap(),
            parse_square("e6").unwrap(),
            flag::QUIET,
        );
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            board.make_move(mv)
        }));
        // Release builds return the error; debug builds assert. In either
        // case the board must not have been mutated.
        if let Ok(res) = result {
            assert!(res.is_err());
        }
        assert_eq!(board.fen(), fen);
    }

    #[test]
    fn null_move_round_trip() {
        let mut board =
            Board::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
                .unwrap();
        let fen = board.fen();
        let hash = board.hash();
        let undo = board.make_null_move();
        assert_eq!(board.ep_square(), None);
        assert_eq!(board.side_to_move(), Color::White);
        board.undo_null_move(&undo);
        assert_eq!(board.fen(), fen);
        assert_eq!(board.hash(), hash);
    }
}
