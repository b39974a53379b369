use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{Coord, GameId, GameModel, GameStatus, PlayerId, Ship, ShipModel};
use crate::shared::AppError;

/// Persistence collaborator for game sessions and fleets.
///
/// All mutating operations are durable; `claim_first_turn` is the atomic
/// guard that keeps the placement transition from firing twice.
#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn create_game(&self, player1: PlayerId, player2: PlayerId) -> Result<GameId, AppError>;

    async fn get_game(&self, game_id: GameId) -> Result<Option<GameModel>, AppError>;

    /// Latest Started game this player belongs to
    async fn latest_game_for_player(
        &self,
        player: PlayerId,
    ) -> Result<Option<GameModel>, AppError>;

    /// Persist a submitted fleet for one player
    async fn record_placement(
        &self,
        game_id: GameId,
        player: PlayerId,
        ships: &[Ship],
    ) -> Result<(), AppError>;

    /// Whether both session players have at least one persisted ship
    async fn both_placed(&self, game_id: GameId) -> Result<bool, AppError>;

    /// Atomically assign the first turn; returns true only for the call that
    /// actually claimed it. Subsequent calls are no-ops returning false.
    async fn claim_first_turn(&self, game_id: GameId, player: PlayerId)
        -> Result<bool, AppError>;

    /// Atomically hand the turn from `from` to `to`; returns true only when
    /// `from` actually held the turn in a started game. Of two racing moves
    /// by the same turn holder, exactly one can swap.
    async fn swap_turn(
        &self,
        game_id: GameId,
        from: PlayerId,
        to: PlayerId,
    ) -> Result<bool, AppError>;

    async fn ships_for_player(
        &self,
        game_id: GameId,
        player: PlayerId,
    ) -> Result<Vec<ShipModel>, AppError>;

    /// Persist updated hit flags and sunk state for one ship
    async fn update_ship(&self, ship: &ShipModel) -> Result<(), AppError>;

    async fn complete_game(&self, game_id: GameId, winner: PlayerId) -> Result<(), AppError>;

    /// Resolve a player slot (0 or 1) to its player id
    async fn player_for_slot(&self, game_id: GameId, slot: u8) -> Result<PlayerId, AppError>;
}

/// In-memory implementation for development and testing
pub struct InMemoryGameRepository {
    store: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    games: HashMap<GameId, GameModel>,
    ships: HashMap<i64, ShipModel>,
    next_game_id: GameId,
    next_ship_id: i64,
}

impl Default for InMemoryGameRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGameRepository {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
        }
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    #[instrument(skip(self))]
    async fn create_game(&self, player1: PlayerId, player2: PlayerId) -> Result<GameId, AppError> {
        let mut store = self.store.lock().unwrap();
        store.next_game_id += 1;
        let id = store.next_game_id;
        store.games.insert(
            id,
            GameModel {
                id,
                player1,
                player2,
                status: GameStatus::Started,
                winner: None,
                current_turn: None,
            },
        );
        debug!(game_id = id, player1, player2, "Game created in memory");
        Ok(id)
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<GameModel>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store.games.get(&game_id).cloned())
    }

    async fn latest_game_for_player(
        &self,
        player: PlayerId,
    ) -> Result<Option<GameModel>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .games
            .values()
            .filter(|g| g.status == GameStatus::Started && g.has_player(player))
            .max_by_key(|g| g.id)
            .cloned())
    }

    #[instrument(skip(self, ships))]
    async fn record_placement(
        &self,
        game_id: GameId,
        player: PlayerId,
        ships: &[Ship],
    ) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        if !store.games.contains_key(&game_id) {
            return Err(AppError::NotFound("Game not found".to_string()));
        }
        for ship in ships {
            store.next_ship_id += 1;
            let id = store.next_ship_id;
            store.ships.insert(
                id,
                ShipModel {
                    id,
                    game_id,
                    player_id: player,
                    size: ship.size,
                    cells: ship.location.clone(),
                    sunk: ship.sunk,
                },
            );
        }
        debug!(game_id, player, ships = ships.len(), "Fleet recorded in memory");
        Ok(())
    }

    async fn both_placed(&self, game_id: GameId) -> Result<bool, AppError> {
        let store = self.store.lock().unwrap();
        let game = store
            .games
            .get(&game_id)
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        let placed = |player: PlayerId| {
            store
                .ships
                .values()
                .any(|s| s.game_id == game_id && s.player_id == player)
        };
        Ok(placed(game.player1) && placed(game.player2))
    }

    #[instrument(skip(self))]
    async fn claim_first_turn(
        &self,
        game_id: GameId,
        player: PlayerId,
    ) -> Result<bool, AppError> {
        let mut store = self.store.lock().unwrap();
        let game = store
            .games
            .get_mut(&game_id)
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        if game.status != GameStatus::Started || game.current_turn.is_some() {
            return Ok(false);
        }
        game.current_turn = Some(player);
        debug!(game_id, player, "First turn claimed");
        Ok(true)
    }

    async fn swap_turn(
        &self,
        game_id: GameId,
        from: PlayerId,
        to: PlayerId,
    ) -> Result<bool, AppError> {
        let mut store = self.store.lock().unwrap();
        let game = store
            .games
            .get_mut(&game_id)
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        if game.status != GameStatus::Started || game.current_turn != Some(from) {
            return Ok(false);
        }
        game.current_turn = Some(to);
        Ok(true)
    }

    async fn ships_for_player(
        &self,
        game_id: GameId,
        player: PlayerId,
    ) -> Result<Vec<ShipModel>, AppError> {
        let store = self.store.lock().unwrap();
        let mut ships: Vec<ShipModel> = store
            .ships
            .values()
            .filter(|s| s.game_id == game_id && s.player_id == player)
            .cloned()
            .collect();
        ships.sort_by_key(|s| s.id);
        Ok(ships)
    }

    async fn update_ship(&self, ship: &ShipModel) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        if !store.ships.contains_key(&ship.id) {
            return Err(AppError::NotFound("Ship not found".to_string()));
        }
        store.ships.insert(ship.id, ship.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn complete_game(&self, game_id: GameId, winner: PlayerId) -> Result<(), AppError> {
        let mut store = self.store.lock().unwrap();
        let game = store
            .games
            .get_mut(&game_id)
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        game.status = GameStatus::Completed;
        game.winner = Some(winner);
        debug!(game_id, winner, "Game completed");
        Ok(())
    }

    async fn player_for_slot(&self, game_id: GameId, slot: u8) -> Result<PlayerId, AppError> {
        let store = self.store.lock().unwrap();
        let game = store
            .games
            .get(&game_id)
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        Ok(if slot == 0 { game.player1 } else { game.player2 })
    }
}

/// PostgreSQL implementation of the game repository
pub struct PostgresGameRepository {
    pool: PgPool,
}

impl PostgresGameRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn game_from_row(row: &sqlx::postgres::PgRow) -> Result<GameModel, AppError> {
        let status: String = row.get("status");
        Ok(GameModel {
            id: row.get("id"),
            player1: row.get("player1"),
            player2: row.get("player2"),
            status: GameStatus::from_str(&status)
                .map_err(|_| AppError::DatabaseError(format!("bad game status {}", status)))?,
            winner: row.get("winner"),
            current_turn: row.get("current_turn"),
        })
    }

    fn ship_from_row(row: &sqlx::postgres::PgRow) -> Result<ShipModel, AppError> {
        let cells: String = row.get("cells");
        let cells: Vec<Coord> = serde_json::from_str(&cells)
            .map_err(|e| AppError::DatabaseError(format!("bad ship cells: {}", e)))?;
        Ok(ShipModel {
            id: row.get("id"),
            game_id: row.get("game_id"),
            player_id: row.get("player_id"),
            size: row.get::<i32, _>("size") as u8,
            cells,
            sunk: row.get("sunk"),
        })
    }
}

#[async_trait]
impl GameRepository for PostgresGameRepository {
    #[instrument(skip(self))]
    async fn create_game(&self, player1: PlayerId, player2: PlayerId) -> Result<GameId, AppError> {
        let row = sqlx::query("INSERT INTO games (player1, player2) VALUES ($1, $2) RETURNING id")
            .bind(player1)
            .bind(player2)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to create game");
                AppError::DatabaseError(e.to_string())
            })?;
        Ok(row.get("id"))
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<GameModel>, AppError> {
        let row = sqlx::query(
            "SELECT id, player1, player2, status, winner, current_turn FROM games WHERE id = $1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.as_ref().map(Self::game_from_row).transpose()
    }

    async fn latest_game_for_player(
        &self,
        player: PlayerId,
    ) -> Result<Option<GameModel>, AppError> {
        let row = sqlx::query(
            "SELECT id, player1, player2, status, winner, current_turn FROM games \
             WHERE (player1 = $1 OR player2 = $1) AND status = 'Started' \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(player)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.as_ref().map(Self::game_from_row).transpose()
    }

    /// The whole fleet goes in as one transaction so a failed insert never
    /// leaves a partial placement behind.
    #[instrument(skip(self, ships))]
    async fn record_placement(
        &self,
        game_id: GameId,
        player: PlayerId,
        ships: &[Ship],
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        for ship in ships {
            let cells = serde_json::to_string(&ship.location)
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            sqlx::query(
                "INSERT INTO ships (game_id, player_id, size, cells, sunk) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(game_id)
            .bind(player)
            .bind(ship.size as i32)
            .bind(cells)
            .bind(ship.sunk)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                warn!(error = %e, game_id, player, "Failed to persist ship");
                AppError::DatabaseError(e.to_string())
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        debug!(game_id, player, ships = ships.len(), "Fleet recorded");
        Ok(())
    }

    async fn both_placed(&self, game_id: GameId) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT s.player_id) AS placed FROM ships s \
             JOIN games g ON g.id = s.game_id \
             WHERE s.game_id = $1 AND s.player_id IN (g.player1, g.player2)",
        )
        .bind(game_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let placed: i64 = row.get("placed");
        Ok(placed == 2)
    }

    #[instrument(skip(self))]
    async fn claim_first_turn(
        &self,
        game_id: GameId,
        player: PlayerId,
    ) -> Result<bool, AppError> {
        // The NULL guard makes the claim a single compare-and-set, so two
        // racing placement submissions can never both assign the first turn.
        let result = sqlx::query(
            "UPDATE games SET current_turn = $2 \
             WHERE id = $1 AND current_turn IS NULL AND status = 'Started'",
        )
        .bind(game_id)
        .bind(player)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn swap_turn(
        &self,
        game_id: GameId,
        from: PlayerId,
        to: PlayerId,
    ) -> Result<bool, AppError> {
        // Same compare-and-set shape as claim_first_turn: the WHERE guard on
        // the current holder lets only one of two racing moves swap.
        let result = sqlx::query(
            "UPDATE games SET current_turn = $3 \
             WHERE id = $1 AND current_turn = $2 AND status = 'Started'",
        )
        .bind(game_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn ships_for_player(
        &self,
        game_id: GameId,
        player: PlayerId,
    ) -> Result<Vec<ShipModel>, AppError> {
        let rows = sqlx::query(
            "SELECT id, game_id, player_id, size, cells, sunk FROM ships \
             WHERE game_id = $1 AND player_id = $2 ORDER BY id",
        )
        .bind(game_id)
        .bind(player)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::ship_from_row).collect()
    }

    async fn update_ship(&self, ship: &ShipModel) -> Result<(), AppError> {
        let cells = serde_json::to_string(&ship.cells)
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        let result = sqlx::query("UPDATE ships SET cells = $2, sunk = $3 WHERE id = $1")
            .bind(ship.id)
            .bind(cells)
            .bind(ship.sunk)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Ship not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn complete_game(&self, game_id: GameId, winner: PlayerId) -> Result<(), AppError> {
        sqlx::query("UPDATE games SET status = 'Completed', winner = $2 WHERE id = $1")
            .bind(game_id)
            .bind(winner)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn player_for_slot(&self, game_id: GameId, slot: u8) -> Result<PlayerId, AppError> {
        let column = if slot == 0 { "player1" } else { "player2" };
        let row = sqlx::query(&format!(
            "SELECT {} AS player FROM games WHERE id = $1",
            column
        ))
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
        Ok(row.get("player"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> Vec<Ship> {
        vec![Ship {
            size: 3,
            location: vec![Coord::new(0, 1), Coord::new(0, 2), Coord::new(0, 3)],
            sunk: false,
        }]
    }

    #[tokio::test]
    async fn test_create_and_fetch_game() {
        let repo = InMemoryGameRepository::new();
        let id = repo.create_game(10, 20).await.unwrap();

        let game = repo.get_game(id).await.unwrap().unwrap();
        assert_eq!(game.player1, 10);
        assert_eq!(game.player2, 20);
        assert_eq!(game.status, GameStatus::Started);
        assert_eq!(game.winner, None);
        assert_eq!(game.current_turn, None);
    }

    #[tokio::test]
    async fn test_latest_game_for_player_skips_completed() {
        let repo = InMemoryGameRepository::new();
        let first = repo.create_game(10, 20).await.unwrap();
        repo.complete_game(first, 10).await.unwrap();
        let second = repo.create_game(10, 30).await.unwrap();

        let latest = repo.latest_game_for_player(10).await.unwrap().unwrap();
        assert_eq!(latest.id, second);

        assert!(repo.latest_game_for_player(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_both_placed_needs_both_players() {
        let repo = InMemoryGameRepository::new();
        let game = repo.create_game(10, 20).await.unwrap();

        assert!(!repo.both_placed(game).await.unwrap());
        repo.record_placement(game, 10, &fleet()).await.unwrap();
        assert!(!repo.both_placed(game).await.unwrap());
        repo.record_placement(game, 20, &fleet()).await.unwrap();
        assert!(repo.both_placed(game).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_first_turn_succeeds_exactly_once() {
        let repo = InMemoryGameRepository::new();
        let game = repo.create_game(10, 20).await.unwrap();

        assert!(repo.claim_first_turn(game, 10).await.unwrap());
        assert!(!repo.claim_first_turn(game, 10).await.unwrap());
        assert!(!repo.claim_first_turn(game, 20).await.unwrap());

        let model = repo.get_game(game).await.unwrap().unwrap();
        assert_eq!(model.current_turn, Some(10));
    }

    #[tokio::test]
    async fn test_swap_turn_only_from_current_holder() {
        let repo = InMemoryGameRepository::new();
        let game = repo.create_game(10, 20).await.unwrap();
        repo.claim_first_turn(game, 10).await.unwrap();

        assert!(repo.swap_turn(game, 10, 20).await.unwrap());
        // The turn now belongs to 20; a second swap from 10 must lose.
        assert!(!repo.swap_turn(game, 10, 20).await.unwrap());
        assert!(repo.swap_turn(game, 20, 10).await.unwrap());

        repo.complete_game(game, 10).await.unwrap();
        assert!(!repo.swap_turn(game, 10, 20).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_ship_persists_hits() {
        let repo = InMemoryGameRepository::new();
        let game = repo.create_game(10, 20).await.unwrap();
        repo.record_placement(game, 10, &fleet()).await.unwrap();

        let mut ships = repo.ships_for_player(game, 10).await.unwrap();
        ships[0].cells[0].hit = true;
        repo.update_ship(&ships[0]).await.unwrap();

        let reloaded = repo.ships_for_player(game, 10).await.unwrap();
        assert!(reloaded[0].cells[0].hit);
        assert!(!reloaded[0].cells[1].hit);
    }

    #[tokio::test]
    async fn test_player_for_slot() {
        let repo = InMemoryGameRepository::new();
        let game = repo.create_game(10, 20).await.unwrap();
        assert_eq!(repo.player_for_slot(game, 0).await.unwrap(), 10);
        assert_eq!(repo.player_for_slot(game, 1).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_complete_game_is_terminal() {
        let repo = InMemoryGameRepository::new();
        let game = repo.create_game(10, 20).await.unwrap();
        repo.complete_game(game, 20).await.unwrap();

        let model = repo.get_game(game).await.unwrap().unwrap();
        assert_eq!(model.status, GameStatus::Completed);
        assert_eq!(model.winner, Some(20));
        // A completed game can no longer claim a first turn
        assert!(!repo.claim_first_turn(game, 10).await.unwrap());
    }
}
