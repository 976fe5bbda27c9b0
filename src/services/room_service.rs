//! Room lifecycle: creation, membership, teams, results and closing.
//!
//! Every mutation runs inside the room's critical section. Functions suffixed
//! `_locked` expect the caller to already hold it and take the guard as proof.

use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        cache::now_millis,
        models::{PlayerEntity, RoomEntity, RoomStatus, ScoreEntity, TeamSide, TeamsEntity},
    },
    dto::{identity::Identity, validation::ROOM_CODE_LEN},
    error::ServiceError,
    services::{broadcaster, game_service, room_events, turn_timer},
    state::{SharedState, locks::RoomGuard},
};

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CODE_ATTEMPTS: usize = 10;

/// What a leave request changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The player was already gone; nothing changed.
    AlreadyInactive,
    /// The player left and the room lives on.
    Left,
    /// The last active player left and the room was closed.
    RoomClosed,
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

async fn unused_code(state: &SharedState) -> Result<String, ServiceError> {
    let store = state.require_room_store().await?;
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code();
        if state.rooms().fetch::<RoomEntity>(&code).await?.is_some() {
            continue;
        }
        if store.find_room(code.clone()).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ServiceError::Internal(
        "could not allocate a unique room code".into(),
    ))
}

/// Open a room with `host` alone on team A.
pub async fn create_room(state: &SharedState, host: &Identity) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let code = unused_code(state).await?;
    let _guard = state.locks().lock(&code).await;

    let now = now_millis();
    let room = RoomEntity {
        id: Uuid::new_v4(),
        code: code.clone(),
        host_id: host.user_id.clone(),
        players: vec![PlayerEntity {
            id: host.user_id.clone(),
            active: true,
        }],
        teams: TeamsEntity {
            a: vec![host.user_id.clone()],
            b: Vec::new(),
        },
        global_score: ScoreEntity::default(),
        games: Vec::new(),
        status: RoomStatus::Waiting,
        created_at: now,
        updated_at: now,
    };

    store.save_room(room.clone()).await?;
    state.rooms().put(&code, &room).await?;
    info!(room = %code, host = %host.user_id, "room created");

    broadcaster::subscribe_user(state, &host.user_id, &code).await;
    room_events::broadcast_player_joined(state, &code, host);
    room_events::broadcast_team_state(state, &room);
    Ok(room)
}

/// Read a live room, rehydrating it from the durable store on a cache miss.
pub async fn get_room(state: &SharedState, code: &str) -> Result<RoomEntity, ServiceError> {
    if let Some(room) = state.rooms().fetch::<RoomEntity>(code).await? {
        return live(room);
    }

    let store = state.require_room_store().await?;
    let Some(room) = store.find_room(code.to_owned()).await? else {
        return Err(ServiceError::NotFound(format!("room {code}")));
    };
    let room = live(room)?;

    let rehydrate_ttl = state.config().cache.rehydrate;
    state.rooms().put_with_ttl(code, &room, rehydrate_ttl).await?;
    debug!(room = %code, "room rehydrated from durable store");

    match state.rooms().fetch::<RoomEntity>(code).await? {
        Some(room) => live(room),
        None => Err(ServiceError::NotFound(format!("room {code}"))),
    }
}

/// Most recently written live room in which `user_id` is an active player.
pub async fn active_room_of(state: &SharedState, user_id: &str) -> Result<Option<String>, ServiceError> {
    for code in state.rooms().recent_ids(None).await? {
        let Some(room) = state.rooms().fetch::<RoomEntity>(&code).await? else {
            continue;
        };
        let member = room
            .players
            .iter()
            .any(|player| player.id == user_id && player.active);
        if member && room.status != RoomStatus::Finished {
            return Ok(Some(code));
        }
    }
    Ok(None)
}

fn live(room: RoomEntity) -> Result<RoomEntity, ServiceError> {
    if room.status == RoomStatus::Finished {
        return Err(ServiceError::RoomInactive(format!("room {}", room.code)));
    }
    Ok(room)
}

/// Add `user` to a room, or bring a returning player back.
pub async fn join_room(
    state: &SharedState,
    code: &str,
    user: &Identity,
) -> Result<RoomEntity, ServiceError> {
    let _guard = state.locks().lock(code).await;
    let mut room = get_room(state, code).await?;
    let policy = &state.config().game;

    let existing = room.players.iter().position(|player| player.id == user.user_id);
    if let Some(index) = existing {
        if room.players[index].active {
            return Err(ServiceError::Conflict(format!(
                "user {} is already in room {code}",
                user.user_id
            )));
        }
    }
    if room.status == RoomStatus::InGame && existing.is_none() {
        return Err(ServiceError::Conflict(format!(
            "room {code} is in a game; only returning players may join"
        )));
    }
    let active = room.players.iter().filter(|player| player.active).count();
    if active >= policy.max_players {
        return Err(ServiceError::Conflict(format!("room {code} is full")));
    }

    match existing {
        Some(index) => room.players[index].active = true,
        None => room.players.push(PlayerEntity {
            id: user.user_id.clone(),
            active: true,
        }),
    }
    if room.teams.side_of(&user.user_id).is_none() {
        let side = smaller_side(&room.teams);
        room.teams.side_mut(side).push(user.user_id.clone());
    }
    room.updated_at = now_millis();
    state.rooms().put(code, &room).await?;
    info!(room = %code, user = %user.user_id, returning = existing.is_some(), "player joined");

    broadcaster::subscribe_user(state, &user.user_id, code).await;
    room_events::broadcast_player_joined(state, code, user);
    room_events::broadcast_team_state(state, &room);
    Ok(room)
}

fn smaller_side(teams: &TeamsEntity) -> TeamSide {
    if teams.b.len() < teams.a.len() {
        TeamSide::B
    } else {
        TeamSide::A
    }
}

/// Move one player from the larger team when the size gap reaches `gap`.
fn rebalance(teams: &mut TeamsEntity, gap: usize) -> Option<(String, TeamSide)> {
    let (bigger, smaller) = if teams.a.len() >= teams.b.len() {
        (TeamSide::A, TeamSide::B)
    } else {
        (TeamSide::B, TeamSide::A)
    };
    let difference = teams.side(bigger).len() - teams.side(smaller).len();
    if gap == 0 || difference < gap {
        return None;
    }
    let moved = teams.side_mut(bigger).pop()?;
    teams.side_mut(smaller).push(moved.clone());
    Some((moved, smaller))
}

fn below_game_minimum(teams: &TeamsEntity, state: &SharedState) -> bool {
    let policy = &state.config().game;
    teams.len() < policy.min_players_total
        || teams.a.len() < policy.min_players_per_team
        || teams.b.len() < policy.min_players_per_team
}

/// Mark `user` inactive, closing the room when nobody is left.
pub async fn leave_room(
    state: &SharedState,
    code: &str,
    user: &Identity,
) -> Result<LeaveOutcome, ServiceError> {
    let mut guard = state.locks().lock(code).await;
    let mut room = match get_room(state, code).await {
        Ok(room) => room,
        Err(ServiceError::RoomInactive(_)) => return Ok(LeaveOutcome::AlreadyInactive),
        Err(err) => return Err(err),
    };

    let Some(player) = room.players.iter_mut().find(|player| player.id == user.user_id) else {
        return Err(ServiceError::NotFound(format!(
            "user {} in room {code}",
            user.user_id
        )));
    };
    if !player.active {
        debug!(room = %code, user = %user.user_id, "leave ignored for inactive player");
        return Ok(LeaveOutcome::AlreadyInactive);
    }
    player.active = false;
    room.teams.a.retain(|id| id != &user.user_id);
    room.teams.b.retain(|id| id != &user.user_id);

    if room.players.iter().all(|player| !player.active) {
        room_events::broadcast_player_left(state, code, user);
        finish_room_locked(state, &mut guard, room, "every player left").await?;
        return Ok(LeaveOutcome::RoomClosed);
    }

    let mut describer_handover = None;
    if room.status == RoomStatus::InGame {
        if below_game_minimum(&room.teams, state) {
            game_service::interrupt_game_locked(state, &mut guard, code, "not enough players to continue")
                .await?;
            room.status = RoomStatus::Waiting;
        } else {
            describer_handover =
                game_service::remove_player_locked(state, &guard, code, &user.user_id).await?;
        }
    }
    if room.status == RoomStatus::Waiting {
        if let Some((moved, side)) = rebalance(&mut room.teams, state.config().game.rebalance_gap) {
            info!(room = %code, user = %moved, team = %side, "teams rebalanced");
        }
    }

    room.updated_at = now_millis();
    state.rooms().put(code, &room).await?;
    info!(room = %code, user = %user.user_id, "player left");

    room_events::broadcast_player_left(state, code, user);
    broadcaster::unsubscribe_user(state, &user.user_id, code).await;
    room_events::broadcast_team_state(state, &room);
    if let Some((game, next)) = describer_handover {
        room_events::broadcast_describer_changed(state, code, next);
        room_events::send_word_to_describer(state, &game).await;
    }
    Ok(LeaveOutcome::Left)
}

/// Move `user` to `team`; refused while a game runs.
pub async fn update_teams(
    state: &SharedState,
    code: &str,
    team: TeamSide,
    user: &Identity,
) -> Result<RoomEntity, ServiceError> {
    let _guard = state.locks().lock(code).await;
    let mut room = get_room(state, code).await?;
    if room.status == RoomStatus::InGame {
        return Err(ServiceError::Conflict(format!(
            "teams of room {code} are locked during a game"
        )));
    }
    let active = room
        .players
        .iter()
        .any(|player| player.id == user.user_id && player.active);
    if !active {
        return Err(ServiceError::NotFound(format!(
            "user {} in room {code}",
            user.user_id
        )));
    }
    if room.teams.side_of(&user.user_id) == Some(team) {
        return Ok(room);
    }

    room.teams.side_mut(team.other()).retain(|id| id != &user.user_id);
    room.teams.side_mut(team).push(user.user_id.clone());
    room.updated_at = now_millis();
    state.rooms().put(code, &room).await?;
    debug!(room = %code, user = %user.user_id, team = %team, "team changed");

    room_events::broadcast_team_state(state, &room);
    Ok(room)
}

/// Most recently touched rooms still waiting for players.
pub async fn get_rooms(state: &SharedState, limit: usize) -> Result<Vec<RoomEntity>, ServiceError> {
    let mut rooms = Vec::new();
    for code in state.rooms().recent_ids(None).await? {
        if rooms.len() >= limit {
            break;
        }
        match state.rooms().fetch::<RoomEntity>(&code).await? {
            Some(room) if room.status == RoomStatus::Waiting => rooms.push(room),
            Some(_) => {}
            None => state.rooms().forget(&code).await?,
        }
    }
    Ok(rooms)
}

/// Record a game result and reopen the room.
pub async fn update_room(
    state: &SharedState,
    code: &str,
    result: ScoreEntity,
) -> Result<RoomEntity, ServiceError> {
    let guard = state.locks().lock(code).await;
    update_room_locked(state, &guard, code, result).await
}

pub(crate) async fn update_room_locked(
    state: &SharedState,
    _guard: &RoomGuard,
    code: &str,
    result: ScoreEntity,
) -> Result<RoomEntity, ServiceError> {
    let mut room = get_room(state, code).await?;
    room.games.push(result);
    if let Some(winner) = result.winner() {
        *room.global_score.side_mut(winner) += 1;
    }
    room.status = RoomStatus::Waiting;
    room.updated_at = now_millis();

    state.rooms().put(code, &room).await?;
    match state.room_store().await {
        Some(store) => {
            if let Err(err) = store.save_room(room.clone()).await {
                warn!(room = %code, error = %err, "failed to persist game result");
            }
        }
        None => warn!(room = %code, "degraded; game result kept in cache only"),
    }
    info!(room = %code, a = result.a, b = result.b, "game result recorded");

    room_events::broadcast_room_updated(state, &room);
    Ok(room)
}

/// Flip a room into `in-game` once its game is dealt.
pub(crate) async fn mark_in_game_locked(
    state: &SharedState,
    _guard: &RoomGuard,
    room: &mut RoomEntity,
) -> Result<(), ServiceError> {
    room.status = RoomStatus::InGame;
    room.updated_at = now_millis();
    state.rooms().put(&room.code, room).await?;
    Ok(())
}

/// Put a room back to `waiting` after its game was abandoned.
pub(crate) async fn revert_to_waiting_locked(
    state: &SharedState,
    _guard: &RoomGuard,
    code: &str,
) -> Result<RoomEntity, ServiceError> {
    let mut room = get_room(state, code).await?;
    room.status = RoomStatus::Waiting;
    rebalance(&mut room.teams, state.config().game.rebalance_gap);
    room.updated_at = now_millis();
    state.rooms().put(code, &room).await?;
    room_events::broadcast_team_state(state, &room);
    Ok(room)
}

/// Close a room for good. Only the host may do so.
pub async fn finish_room(
    state: &SharedState,
    code: &str,
    requester: &Identity,
) -> Result<(), ServiceError> {
    let mut guard = state.locks().lock(code).await;
    let room = get_room(state, code).await?;
    if room.host_id != requester.user_id {
        return Err(ServiceError::Forbidden(format!(
            "only the host can close room {code}"
        )));
    }
    finish_room_locked(state, &mut guard, room, "closed by host").await?;
    Ok(())
}

async fn finish_room_locked(
    state: &SharedState,
    guard: &mut RoomGuard,
    room: RoomEntity,
    reason: &str,
) -> Result<(), ServiceError> {
    let code = room.code.clone();
    if room.status == RoomStatus::InGame {
        game_service::interrupt_game_locked(state, guard, &code, reason).await?;
    }
    turn_timer::cancel(guard);
    state.games().remove(&code).await?;

    match state.room_store().await {
        Some(store) => {
            let updated = store
                .update_status(code.clone(), RoomStatus::Finished)
                .await?;
            if !updated {
                let mut record = room.clone();
                record.status = RoomStatus::Finished;
                store.save_room(record).await?;
            }
        }
        None => warn!(room = %code, "degraded; durable status not updated on close"),
    }
    state.rooms().remove(&code).await?;
    info!(room = %code, reason, "room finished");

    room_events::broadcast_room_closed(state, &code, room.global_score);
    state.broadcaster().dissolve_group(&code);
    Ok(())
}
