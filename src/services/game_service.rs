use tracing::{debug, info, warn};

use crate::{
    dao::{
        cache::now_millis,
        models::{RoomEntity, RoomStatus, TeamSide},
    },
    dto::identity::Identity,
    error::ServiceError,
    services::{room_events, room_service, turn_timer},
    state::{
        SharedState,
        game::{Departure, Game, Role, TurnStep},
        locks::RoomGuard,
        state_machine::GameState,
    },
};

/// How a game message was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Sender does not take part in the current turn; nothing happens.
    Invalid,
    /// The describer used a banned word; only they are told.
    Taboo {
        /// Banned term that matched.
        word: String,
    },
    /// A clean describer hint, relayed to the room.
    Clue,
    /// A guesser named the word; the team scores and a new word is dealt.
    Correct,
    /// A guesser came close; the room is told which near miss was named.
    Similar {
        /// Near-miss term that matched.
        word: String,
    },
    /// A wrong guess, relayed to the room.
    Incorrect,
}

/// Read the cached game of a room.
pub async fn load_game(state: &SharedState, code: &str) -> Result<Game, ServiceError> {
    state
        .games()
        .fetch::<Game>(code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game of room {code}")))
}

async fn load_playing(state: &SharedState, code: &str) -> Result<Game, ServiceError> {
    let game = load_game(state, code).await?;
    if game.state != GameState::Playing {
        return Err(ServiceError::Conflict(format!(
            "no game in progress in room {code}"
        )));
    }
    Ok(game)
}

/// Put a fresh word in front of the describer, refilling from the lexicon when needed.
async fn deal_word(state: &SharedState, game: &mut Game) -> Result<(), ServiceError> {
    if game.needs_refill() {
        let lexicon = state.lexicon().await;
        let batch = lexicon
            .draw_words(game.exclusions(), state.config().game.word_batch)
            .await?;
        debug!(room = %game.room_code, words = batch.len(), "word pool refilled");
        game.refill(batch);
    }
    let dealt = {
        let mut rng = rand::rng();
        game.draw_word(&mut rng).is_some()
    };
    if !dealt {
        return Err(ServiceError::Internal(format!(
            "lexicon has no unused word left for room {}",
            game.room_code
        )));
    }
    Ok(())
}

/// Start a game in a waiting room. Only the host may do so.
pub async fn create_game(
    state: &SharedState,
    code: &str,
    requester: &Identity,
) -> Result<(RoomEntity, Game), ServiceError> {
    let mut guard = state.locks().lock(code).await;
    let mut room = room_service::get_room(state, code).await?;
    if room.host_id != requester.user_id {
        return Err(ServiceError::Forbidden(format!(
            "only the host can start a game in room {code}"
        )));
    }
    if room.status != RoomStatus::Waiting {
        return Err(ServiceError::Conflict(format!(
            "room {code} is not waiting for a game"
        )));
    }
    let policy = &state.config().game;
    if room.teams.len() < policy.min_players_total
        || room.teams.a.len() < policy.min_players_per_team
        || room.teams.b.len() < policy.min_players_per_team
    {
        return Err(ServiceError::Conflict(format!(
            "room {code} needs {} players with at least {} per team",
            policy.min_players_total, policy.min_players_per_team
        )));
    }

    let starting = if rand::random::<bool>() {
        TeamSide::A
    } else {
        TeamSide::B
    };
    let mut game = Game::new(code, &room.teams, policy, starting);
    deal_word(state, &mut game).await?;
    game.start(now_millis())?;
    state.games().put(code, &game).await?;
    room_service::mark_in_game_locked(state, &guard, &mut room).await?;
    turn_timer::arm(state, &mut guard, &game);
    info!(room = %code, team = %starting, describer = %game.current_describer, "game started");

    room_events::broadcast_game_started(state, &game);
    room_events::send_word_to_describer(state, &game).await;
    Ok((room, game))
}

/// End the current turn. `expected_turn`, when given, must match `turnsPlayed`.
pub async fn advance_turn(
    state: &SharedState,
    code: &str,
    expected_turn: Option<u32>,
) -> Result<Game, ServiceError> {
    let mut guard = state.locks().lock(code).await;
    let game = load_playing(state, code).await?;
    check_turn(&game, expected_turn)?;
    advance_turn_locked(state, &mut guard, game).await
}

/// Let the describer hand over before the timer runs out.
pub async fn pass_turn(
    state: &SharedState,
    code: &str,
    user: &Identity,
    expected_turn: Option<u32>,
) -> Result<Game, ServiceError> {
    let mut guard = state.locks().lock(code).await;
    let game = load_playing(state, code).await?;
    if game.role_of(&user.user_id) != Role::Describer {
        return Err(ServiceError::Forbidden(
            "only the describer can pass the turn".into(),
        ));
    }
    check_turn(&game, expected_turn)?;
    advance_turn_locked(state, &mut guard, game).await
}

fn check_turn(game: &Game, expected_turn: Option<u32>) -> Result<(), ServiceError> {
    match expected_turn {
        Some(turn) if turn != game.turns_played => Err(ServiceError::Conflict(format!(
            "turn {turn} already ended in room {}",
            game.room_code
        ))),
        _ => Ok(()),
    }
}

/// End the current turn under the room lock.
///
/// The pending timer is only replaced once the next turn is stored. When the
/// advance fails the current turn keeps a timer, re-armed if the firing one
/// already consumed it.
pub(crate) async fn advance_turn_locked(
    state: &SharedState,
    guard: &mut RoomGuard,
    game: Game,
) -> Result<Game, ServiceError> {
    let current = game.clone();
    match apply_advance(state, guard, game).await {
        Ok(game) => Ok(game),
        Err(err) => {
            if guard.pending().is_none() && current.state == GameState::Playing {
                warn!(
                    room = %current.room_code,
                    turn = current.turns_played,
                    error = %err,
                    "turn advance failed; current turn re-armed"
                );
                turn_timer::arm(state, guard, &current);
            }
            Err(err)
        }
    }
}

async fn apply_advance(
    state: &SharedState,
    guard: &mut RoomGuard,
    mut game: Game,
) -> Result<Game, ServiceError> {
    let code = game.room_code.clone();

    match game.advance(now_millis())? {
        TurnStep::Continued => {
            deal_word(state, &mut game).await?;
            state.games().put(&code, &game).await?;
            turn_timer::arm(state, guard, &game);
            debug!(
                room = %code,
                turn = game.turns_played,
                team = %game.current_team,
                describer = %game.current_describer,
                "turn advanced"
            );
            room_events::broadcast_turn_updated(state, &game);
            room_events::send_word_to_describer(state, &game).await;
        }
        TurnStep::Finished(result) => {
            state.games().put(&code, &game).await?;
            turn_timer::cancel(guard);
            let room = room_service::update_room_locked(state, guard, &code, result).await?;
            info!(room = %code, a = result.a, b = result.b, "game finished");
            room_events::broadcast_game_finished(state, &code, result, room.global_score);
        }
    }
    Ok(game)
}

/// Classify a game message and apply its effect.
pub async fn check_for_answer(
    state: &SharedState,
    code: &str,
    user: &Identity,
    text: &str,
) -> Result<AnswerOutcome, ServiceError> {
    let _guard = state.locks().lock(code).await;
    let mut game = load_playing(state, code).await?;

    match game.role_of(&user.user_id) {
        Role::Bystander => {
            debug!(room = %code, user = %user.user_id, "message from outside the playing team ignored");
            Ok(AnswerOutcome::Invalid)
        }
        Role::Describer => {
            if let Some(word) = game.taboo_hit(text) {
                debug!(room = %code, user = %user.user_id, "taboo word used");
                if let Some(connection_id) = state.presence().resolve(&user.user_id).await? {
                    room_events::send_taboo_warning(state, &connection_id, text, &word);
                }
                return Ok(AnswerOutcome::Taboo { word });
            }
            room_events::broadcast_chat(state, code, user, text);
            Ok(AnswerOutcome::Clue)
        }
        Role::Guesser => {
            if !game.is_correct(text) {
                if let Some(word) = game.similar_hit(text) {
                    debug!(room = %code, user = %user.user_id, "near miss");
                    room_events::broadcast_similar_word(state, code, user, text, &word);
                    return Ok(AnswerOutcome::Similar { word });
                }
                room_events::broadcast_chat(state, code, user, text);
                return Ok(AnswerOutcome::Incorrect);
            }
            let guessed = game
                .word_to_guess
                .as_ref()
                .map(|word| word.word.clone())
                .unwrap_or_default();
            game.award_current_team();
            deal_word(state, &mut game).await?;
            state.games().put(code, &game).await?;
            info!(room = %code, user = %user.user_id, team = %game.current_team, "word guessed");

            room_events::broadcast_correct_answer(state, &game, user, text, &guessed);
            room_events::send_word_to_describer(state, &game).await;
            Ok(AnswerOutcome::Correct)
        }
    }
}

/// Swap the describer's word without scoring, at most once per cooldown.
pub async fn get_new_word(
    state: &SharedState,
    code: &str,
    user: &Identity,
) -> Result<(), ServiceError> {
    let _guard = state.locks().lock(code).await;
    let mut game = load_playing(state, code).await?;
    if game.role_of(&user.user_id) != Role::Describer {
        return Err(ServiceError::Forbidden(
            "only the describer can skip a word".into(),
        ));
    }
    let now = now_millis();
    let cooldown = state.config().game.skip_cooldown.as_secs();
    if let Some(remaining_secs) = game.skip_cooldown_remaining(now, cooldown) {
        return Err(ServiceError::Cooldown { remaining_secs });
    }

    game.mark_skip(now);
    deal_word(state, &mut game).await?;
    state.games().put(code, &game).await?;
    debug!(room = %code, user = %user.user_id, "word skipped");

    room_events::send_word_to_describer(state, &game).await;
    Ok(())
}

/// Abandon the running game and reopen the room.
pub async fn interrupt_game(state: &SharedState, code: &str, reason: &str) -> Result<(), ServiceError> {
    let mut guard = state.locks().lock(code).await;
    if interrupt_game_locked(state, &mut guard, code, reason).await? {
        room_service::revert_to_waiting_locked(state, &guard, code).await?;
    }
    Ok(())
}

/// Cancel the timer and abandon the game if one is live. Returns whether it was.
pub(crate) async fn interrupt_game_locked(
    state: &SharedState,
    guard: &mut RoomGuard,
    code: &str,
    reason: &str,
) -> Result<bool, ServiceError> {
    turn_timer::cancel(guard);
    let Some(mut game) = state.games().fetch::<Game>(code).await? else {
        return Ok(false);
    };
    if game.state.is_terminal() {
        return Ok(false);
    }
    game.interrupt()?;
    state.games().put(code, &game).await?;
    info!(room = %code, reason, "game interrupted");

    room_events::broadcast_game_interrupted(state, code, reason);
    Ok(true)
}

/// Drop a departing player from the running game.
///
/// Returns the game and the new describer when the leaver was describing.
pub(crate) async fn remove_player_locked(
    state: &SharedState,
    _guard: &RoomGuard,
    code: &str,
    user_id: &str,
) -> Result<Option<(Game, Option<String>)>, ServiceError> {
    let Some(mut game) = state.games().fetch::<Game>(code).await? else {
        return Ok(None);
    };
    if game.state != GameState::Playing {
        return Ok(None);
    }
    match game.remove_player(user_id) {
        Departure::NotPlaying => Ok(None),
        Departure::Removed => {
            state.games().put(code, &game).await?;
            Ok(None)
        }
        Departure::DescriberReplaced { next } => {
            state.games().put(code, &game).await?;
            info!(room = %code, leaver = %user_id, next = ?next, "describer replaced");
            Ok(Some((game, next)))
        }
    }
}

/// Entry point of an expired turn timer.
pub async fn on_timer_fired(state: &SharedState, code: &str, timer_id: u64, turn: u32) {
    let mut guard = state.locks().lock(code).await;
    if !guard.claim_fire(timer_id, turn) {
        debug!(room = %code, timer = timer_id, turn, "stale turn timer ignored");
        return;
    }
    let game = match load_game(state, code).await {
        Ok(game) => game,
        Err(err) => {
            err.log("turn_timer");
            return;
        }
    };
    if game.state != GameState::Playing || game.turns_played != turn {
        debug!(room = %code, turn, "turn already closed");
        return;
    }
    if let Err(err) = advance_turn_locked(state, &mut guard, game).await {
        warn!(room = %code, turn, error = %err, "timed turn advance failed");
    }
}
