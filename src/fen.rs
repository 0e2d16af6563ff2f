use cozy_chess::Board;

use crate::error::ServeError;

/// Canonicalize a raw FEN string into a stable cache key.
///
/// Runs of spaces collapse to one, then exactly one leading and one
/// trailing space are stripped. Idempotent, so a key normalizes to
/// itself.
pub fn normalize(raw: &str) -> Result<String, ServeError> {
    let mut state = raw.to_string();
    while state.contains("  ") {
        state = state.replace("  ", " ");
    }
    if let Some(rest) = state.strip_prefix(' ') {
        state = rest.to_string();
    }
    if let Some(rest) = state.strip_suffix(' ') {
        state = rest.to_string();
    }
    if state.is_empty() {
        return Err(ServeError::InvalidRequest("empty fen".to_string()));
    }
    Ok(state)
}

/// Parse a normalized FEN, rejecting anything the board cannot represent.
pub fn parse(fen: &str) -> Result<Board, ServeError> {
    Board::from_fen(fen, false)
        .map_err(|e| ServeError::InvalidRequest(format!("wrong fen format: {e:?}")))
}
