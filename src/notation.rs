//! Standard Algebraic Notation encoding and decoding.

use crate::board::Board;
use crate::defs::{file_of, rank_of, square_name, PieceType};
use crate::errors::EngineError;
use crate::movegen::MoveGen;
use crate::mv::Move;

fn piece_letter(piece: PieceType) -> Option<char> {
    match piece {
        PieceType::Knight => Some('N'),
        PieceType::Bishop => Some('B'),
        PieceType::Rook => Some('R'),
        PieceType::Queen => Some('Q'),
        PieceType::King => Some('K'),
        PieceType::Pawn => None,
    }
}

/// Strips decorations that do not change which move is meant.
fn canonicalize(san: &str) -> String {
    san.chars()
        .filter(|c| !matches!(c, '+' | '#' | '!' | '?'))
        .collect()
}

/// Encodes a legal move in SAN, with file/rank disambiguation computed
/// against the other legal moves of the same piece type.
pub fn move_to_san(board: &mut Board, mv: Move) -> String {
    if mv.is_castle() {
        let base = if mv.is_king_castle() { "O-O" } else { "O-O-O" };
        return format!("{}{}", base, check_suffix(board, mv));
    }

    let moving_piece = board.piece_type_at(mv.from).unwrap_or(PieceType::Pawn);
    let mut san = String::new();

    if let Some(letter) = piece_letter(moving_piece) {
        san.push(letter);

        let legal = MoveGen::generate_legal(board);
        let mut needs_file = false;
        let mut needs_rank = false;
        let mut conflict = false;
        for candidate in &legal {
            if candidate.to == mv.to
                && candidate.from != mv.from
                && board.piece_type_at(candidate.from) == Some(moving_piece)
            {
                conflict = true;
                if file_of(candidate.from) == file_of(mv.from) {
                    needs_file = true;
                }
                if rank_of(candidate.from) == rank_of(mv.from) {
                    needs_rank = true;
                }
            }
        }
        if conflict {
            if !needs_file {
                san.push((b'a' + file_of(mv.from)) as char);
            } else if !needs_rank {
                san.push((b'1' + rank_of(mv.from)) as char);
            } else {
                san.push((b'a' + file_of(mv.from)) as char);
                san.push((b'1' + rank_of(mv.from)) as char);
            }
        }
    } else if mv.is_capture() {
        san.push((b'a' + file_of(mv.from)) as char);
    }

    if mv.is_capture() {
        san.push('x');
    }
    san.push_str(&square_name(mv.to));

    if mv.is_promotion() {
        san.push('=');
        if let Some(letter) = mv.promotion.and_then(piece_letter) {
            san.push(letter);
        }
    }

    san.push_str(&check_suffix(board, mv));
    san
}

fn check_suffix(board: &mut Board, mv: Move) -> String {
    let Ok(undo) = board.make_move(mv) else {
        return String::new();
    };
    let opponent_in_check = board.in_check(board.side_to_move());
    let opponent_has_moves = !MoveGen::generate_legal(board).is_empty();
    board.undo_move(mv, &undo);

    if opponent_in_check {
        if opponent_has_moves {
            "+".into()
        } else {
            "#".into()
        }
    } else {
        String::new()
    }
}

/// Finds the legal move whose SAN rendering matches `san`.
pub fn san_to_move(board: &mut Board, san: &str) -> Result<Move, EngineError> {
    let wanted = canonicalize(san);
    let moves = MoveGen::generate_legal(board);
    for mv in moves {
        if canonicalize(&move_to_san(board, mv)) == wanted {
            return Ok(mv);
        }
    }
    Err(EngineError::Parse(format!("no legal move matches SAN '{}'", san)))
}
