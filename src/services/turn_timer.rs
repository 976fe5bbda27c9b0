//! Per-room turn timers; the handle lives in the room's lock slot.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::debug;

use crate::{
    services::game_service,
    state::{SharedState, game::Game, locks::RoomSlot},
};

/// Schedule the end of the game's current turn, replacing any pending timer.
pub fn arm(state: &SharedState, slot: &mut RoomSlot, game: &Game) -> u64 {
    let duration = Duration::from_secs(game.turn_duration_secs);
    let turn = game.turns_played;
    let code = game.room_code.clone();
    let state = state.clone();
    let id = slot.arm(turn, move |id| tokio::spawn(run(state, code, id, turn, duration)));
    debug!(room = %game.room_code, timer = id, turn, secs = duration.as_secs(), "turn timer armed");
    id
}

/// Drop the pending timer of a room. Idempotent.
pub fn cancel(slot: &mut RoomSlot) -> bool {
    slot.cancel()
}

fn run(state: SharedState, code: String, id: u64, turn: u32, duration: Duration) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        sleep(duration).await;
        game_service::on_timer_fired(&state, &code, id, turn).await;
    })
}
