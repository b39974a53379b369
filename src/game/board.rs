//! Pure board logic: snapshot construction, move resolution, win detection.
//! Everything here operates on in-memory ship data; persistence happens in
//! the service after resolution.

use super::models::{Coord, GameBoard, ShipModel, BOARD_SIZE};

/// What a single shot did to the targeted fleet. Indices refer to the slice
/// passed to [`apply_move`], so the caller can persist the mutated ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveImpact {
    Miss,
    Hit(usize),
    Sunk(usize),
}

/// Resolve a shot against the opposing fleet, marking the struck cell and
/// the owning ship's sunk flag in place.
pub fn apply_move(ships: &mut [ShipModel], x: i32, y: i32) -> MoveImpact {
    for (index, ship) in ships.iter_mut().enumerate() {
        if let Some(cell) = ship.cells.iter_mut().find(|c| c.x == x && c.y == y) {
            cell.hit = true;
            if ship.all_cells_hit() {
                ship.sunk = true;
                return MoveImpact::Sunk(index);
            }
            return MoveImpact::Hit(index);
        }
    }
    MoveImpact::Miss
}

/// True once every cell of every ship in the fleet has been hit
pub fn fleet_destroyed(ships: &[ShipModel]) -> bool {
    !ships.is_empty() && ships.iter().all(|s| s.all_cells_hit())
}

/// "My board" view: every one of the player's own segments, carrying its
/// hit flag.
pub fn own_board(ships: &[ShipModel]) -> GameBoard {
    board_from(ships, |_| true)
}

/// "Hit board" view: only the opponent segments already hit. Unhit
/// segments are never written, so they stay empty water.
pub fn hit_board(opponent_ships: &[ShipModel]) -> GameBoard {
    board_from(opponent_ships, |segment| segment.hit)
}

fn board_from(ships: &[ShipModel], include: impl Fn(&Coord) -> bool) -> GameBoard {
    let mut board = GameBoard::empty(BOARD_SIZE);
    for ship in ships {
        for segment in &ship.cells {
            if segment.in_bounds() && include(segment) {
                board.coords[segment.x as usize][segment.y as usize] = *segment;
            }
        }
    }
    board
}
