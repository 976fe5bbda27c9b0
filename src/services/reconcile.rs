//! Startup repair: no connection survives a restart, so every cached room is
//! closed for good before the listener binds.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::{
    dao::models::{RoomEntity, RoomStatus},
    error::ServiceError,
    state::SharedState,
};

/// What a reconciliation pass cleaned up.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rooms marked finished in the durable store.
    pub rooms_finished: usize,
    /// Room records dropped from the cache.
    pub rooms_evicted: usize,
    /// Game records dropped from the cache.
    pub games_evicted: usize,
    /// Presence entries dropped.
    pub sessions_cleared: usize,
}

/// Close every cached room and wipe ephemeral session state.
pub async fn reconcile(state: &SharedState) -> Result<ReconcileReport, ServiceError> {
    let mut report = ReconcileReport::default();
    let store = state.room_store().await;
    if store.is_none() {
        warn!("degraded at startup; cached rooms are evicted without durable update");
    }

    let mut codes: BTreeSet<String> = state.rooms().recent_ids(None).await?.into_iter().collect();
    codes.extend(state.rooms().scan_ids().await?);

    for code in codes {
        let room = match state.rooms().fetch::<RoomEntity>(&code).await {
            Ok(room) => room,
            Err(err) => {
                warn!(room = %code, error = %err, "unreadable cached room; evicting");
                None
            }
        };
        if let (Some(room), Some(store)) = (room, store.as_ref()) {
            if room.status != RoomStatus::Finished {
                let updated = store
                    .update_status(code.clone(), RoomStatus::Finished)
                    .await?;
                if !updated {
                    let mut record = room;
                    record.status = RoomStatus::Finished;
                    store.save_room(record).await?;
                }
                report.rooms_finished += 1;
            }
        }
        if state.rooms().remove(&code).await? {
            report.rooms_evicted += 1;
        }
        if state.games().remove(&code).await? {
            report.games_evicted += 1;
        }
    }

    let mut orphans: BTreeSet<String> = state.games().recent_ids(None).await?.into_iter().collect();
    orphans.extend(state.games().scan_ids().await?);
    for code in orphans {
        if state.games().remove(&code).await? {
            report.games_evicted += 1;
        }
    }

    report.sessions_cleared = state.presence().clear_all().await?;
    info!(
        rooms_finished = report.rooms_finished,
        rooms_evicted = report.rooms_evicted,
        games_evicted = report.games_evicted,
        sessions_cleared = report.sessions_cleared,
        "startup reconciliation complete"
    );
    Ok(report)
}
