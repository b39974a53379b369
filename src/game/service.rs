use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

use super::board::{apply_move, fleet_destroyed, hit_board, own_board, MoveImpact};
use super::models::{
    Coord, GameModel, GameState, MoveOutcome, PlayerId, Ship, MAX_SHIP_SIZE,
};
use super::repository::GameRepository;
use crate::event::OrderedLog;
use crate::matchmaking::{MatchOutcome, MatchQueue};
use crate::protocol::EventEnvelope;
use crate::shared::AppError;

/// Drives each session through Waiting → Placing → InProgress → Completed.
///
/// All durable state lives behind the repository; the service owns only the
/// seeded RNG used for first-turn selection, injected so tests can pin it.
pub struct GameService {
    games: Arc<dyn GameRepository>,
    queue: Arc<dyn MatchQueue>,
    event_log: Arc<dyn OrderedLog>,
    rng: Mutex<StdRng>,
}

impl GameService {
    pub fn new(
        games: Arc<dyn GameRepository>,
        queue: Arc<dyn MatchQueue>,
        event_log: Arc<dyn OrderedLog>,
    ) -> Self {
        Self {
            games,
            queue,
            event_log,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Same service with a deterministic first-turn RNG
    pub fn with_rng_seed(
        games: Arc<dyn GameRepository>,
        queue: Arc<dyn MatchQueue>,
        event_log: Arc<dyn OrderedLog>,
        seed: u64,
    ) -> Self {
        Self {
            games,
            queue,
            event_log,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Matchmaking entry point. Pairs the caller with the head of the
    /// waiting queue if anyone is there, otherwise leaves the caller
    /// waiting. On a pairing, both players get a GameStarted envelope with
    /// the same session id.
    #[instrument(skip(self))]
    pub async fn join(&self, player: PlayerId) -> Result<(), AppError> {
        match self.queue.try_match(player).await? {
            MatchOutcome::Waiting => {
                info!(player, "No opponent available, waiting");
                Ok(())
            }
            MatchOutcome::Matched(opponent) => {
                let game_id = self.games.create_game(player, opponent).await?;
                info!(player, opponent, game_id, "Players paired, session created");

                self.event_log
                    .publish(&EventEnvelope::game_started(game_id, player))
                    .await?;
                self.event_log
                    .publish(&EventEnvelope::game_started(game_id, opponent))
                    .await?;
                Ok(())
            }
        }
    }

    /// Fleet placement. Once both players have a persisted fleet the session
    /// moves to InProgress: one player is chosen uniformly at random and
    /// gets the only turn notice. The claim in the repository guarantees the
    /// transition fires at most once even when placements race or a player
    /// submits twice.
    #[instrument(skip(self, ships))]
    pub async fn place_ships(&self, player: PlayerId, ships: Vec<Ship>) -> Result<(), AppError> {
        validate_fleet(&ships)?;

        let game = self
            .games
            .latest_game_for_player(player)
            .await?
            .ok_or_else(|| AppError::NotFound("Could not find game".to_string()))?;

        self.games.record_placement(game.id, player, &ships).await?;
        info!(player, game_id = game.id, ships = ships.len(), "Fleet placed");

        if !self.games.both_placed(game.id).await? {
            return Ok(());
        }

        let slot = {
            let mut rng = self.rng.lock().unwrap();
            rng.random_range(0..2u8)
        };
        let first = self.games.player_for_slot(game.id, slot).await?;

        if self.games.claim_first_turn(game.id, first).await? {
            info!(game_id = game.id, first, "Both fleets placed, first turn assigned");
            let opponent = game
                .opponent_of(first)
                .ok_or(AppError::Internal)?;
            let my_ships = self.games.ships_for_player(game.id, first).await?;
            let their_ships = self.games.ships_for_player(game.id, opponent).await?;

            self.event_log
                .publish(&EventEnvelope::game_update(
                    GameState::MyTurn,
                    own_board(&my_ships),
                    hit_board(&their_ships),
                    first,
                ))
                .await?;
        }

        Ok(())
    }

    /// Move resolution. Out-of-turn moves and moves outside an in-progress
    /// session are rejected outright; the legacy behavior of accepting them
    /// silently is gone.
    #[instrument(skip(self))]
    pub async fn make_move(&self, player: PlayerId, target: Coord) -> Result<(), AppError> {
        if !target.in_bounds() {
            return Err(AppError::Validation(format!(
                "target ({}, {}) is off the board",
                target.x, target.y
            )));
        }

        let game = self
            .games
            .latest_game_for_player(player)
            .await?
            .ok_or_else(|| AppError::NotFound("Could not find game".to_string()))?;

        self.check_turn(&game, player)?;

        let opponent = game.opponent_of(player).ok_or(AppError::Internal)?;

        // Hand the turn over before resolving anything. The compare-and-set
        // admits exactly one of two racing moves by the same player; the
        // loser sees a stale turn holder and is rejected like any other
        // out-of-turn move.
        if !self.games.swap_turn(game.id, player, opponent).await? {
            warn!(game_id = game.id, player, "Lost turn race, move rejected");
            return Err(AppError::Validation("It is not your turn".to_string()));
        }

        let mut their_ships = self.games.ships_for_player(game.id, opponent).await?;

        let impact = apply_move(&mut their_ships, target.x, target.y);
        match impact {
            MoveImpact::Hit(index) | MoveImpact::Sunk(index) => {
                self.games.update_ship(&their_ships[index]).await?;
            }
            MoveImpact::Miss => {}
        }

        let my_ships = self.games.ships_for_player(game.id, player).await?;

        if fleet_destroyed(&their_ships) {
            self.games.complete_game(game.id, player).await?;
            info!(game_id = game.id, winner = player, "Game won");

            self.event_log
                .publish(&EventEnvelope::move_result(
                    target,
                    MoveOutcome::Won,
                    own_board(&my_ships),
                    hit_board(&their_ships),
                    player,
                ))
                .await?;
            self.event_log
                .publish(&EventEnvelope::game_update(
                    GameState::Won,
                    own_board(&my_ships),
                    hit_board(&their_ships),
                    player,
                ))
                .await?;
            self.event_log
                .publish(&EventEnvelope::game_update(
                    GameState::Lost,
                    own_board(&their_ships),
                    hit_board(&my_ships),
                    opponent,
                ))
                .await?;
            return Ok(());
        }

        let outcome = match impact {
            MoveImpact::Miss => MoveOutcome::ShipMiss,
            MoveImpact::Hit(_) => MoveOutcome::ShipHit,
            MoveImpact::Sunk(_) => MoveOutcome::ShipSunk,
        };
        info!(game_id = game.id, player, ?outcome, "Move resolved, turn switched");

        self.event_log
            .publish(&EventEnvelope::move_result(
                target,
                outcome,
                own_board(&my_ships),
                hit_board(&their_ships),
                player,
            ))
            .await?;
        self.event_log
            .publish(&EventEnvelope::game_update(
                GameState::MyTurn,
                own_board(&their_ships),
                hit_board(&my_ships),
                opponent,
            ))
            .await?;

        Ok(())
    }

    fn check_turn(&self, game: &GameModel, player: PlayerId) -> Result<(), AppError> {
        match game.current_turn {
            None => Err(AppError::Validation(
                "Both fleets must be placed before moving".to_string(),
            )),
            Some(turn) if turn != player => {
                warn!(game_id = game.id, player, "Out-of-turn move rejected");
                Err(AppError::Validation("It is not your turn".to_string()))
            }
            Some(_) => Ok(()),
        }
    }
}

fn validate_fleet(ships: &[Ship]) -> Result<(), AppError> {
    if ships.is_empty() {
        return Err(AppError::Validation("Fleet must contain at least one ship".to_string()));
    }
    for ship in ships {
        if ship.size == 0 || ship.size as usize > MAX_SHIP_SIZE {
            return Err(AppError::Validation(format!(
                "Ship size {} out of range 1..={}",
                ship.size, MAX_SHIP_SIZE
            )));
        }
        if ship.location.len() != ship.size as usize {
            return Err(AppError::Validation(format!(
                "Ship of size {} has {} cells",
                ship.size,
                ship.location.len()
            )));
        }
        if let Some(cell) = ship.location.iter().find(|c| !c.in_bounds()) {
            return Err(AppError::Validation(format!(
                "Ship cell ({}, {}) is off the board",
                cell.x, cell.y
            )));
        }
    }
    Ok(())
}
