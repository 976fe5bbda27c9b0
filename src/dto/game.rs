use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::TeamSide,
    state::{
        game::{Game, GameTeam},
        state_machine::GameState,
    },
};

/// Public view of one side of a running game.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameTeamView {
    /// Members in rotation order.
    pub players: Vec<String>,
    /// Member who describes when this side is up next.
    pub describer: Option<String>,
    /// Words guessed so far.
    pub score: u32,
}

impl From<&GameTeam> for GameTeamView {
    fn from(team: &GameTeam) -> Self {
        Self {
            players: team.players.clone(),
            describer: team.players.get(team.describer_index).cloned(),
            score: team.score,
        }
    }
}

/// Both sides of a running game.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameTeamsView {
    /// Side A.
    #[serde(rename = "A")]
    pub a: GameTeamView,
    /// Side B.
    #[serde(rename = "B")]
    pub b: GameTeamView,
}

/// Game state safe to broadcast: the secret word is never included.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    /// Owning room.
    pub room_code: String,
    /// Lifecycle state.
    pub state: GameState,
    /// Side currently playing.
    pub current_team: TeamSide,
    /// Player currently describing.
    pub current_describer: String,
    /// Rosters and scores.
    pub teams: GameTeamsView,
    /// Completed turns.
    pub turns_played: u32,
    /// Turns in this game.
    pub max_turns: u32,
    /// Turn length in seconds.
    pub turn_duration_secs: u64,
    /// Unix milliseconds at which the running turn times out.
    pub turn_ends_at: i64,
    /// Words dealt so far.
    pub words_dealt: usize,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            room_code: game.room_code.clone(),
            state: game.state,
            current_team: game.current_team,
            current_describer: game.current_describer.clone(),
            teams: GameTeamsView {
                a: game.teams.side(TeamSide::A).into(),
                b: game.teams.side(TeamSide::B).into(),
            },
            turns_played: game.turns_played,
            max_turns: game.max_turns,
            turn_duration_secs: game.turn_duration_secs,
            turn_ends_at: game.turn_ends_at(),
            words_dealt: game.words.used.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GamePolicy,
        dao::models::{TeamsEntity, WordEntity},
    };

    #[test]
    fn view_hides_the_secret_word() {
        let teams = TeamsEntity {
            a: vec!["h".into(), "p1".into()],
            b: vec!["p2".into(), "p3".into()],
        };
        let mut game = Game::new("ABCDE", &teams, &GamePolicy::default(), TeamSide::A);
        game.refill(vec![WordEntity {
            id: "w1".into(),
            word: "lighthouse".into(),
            taboo_words: vec!["sea".into()],
            similar_words: vec!["beacon".into()],
        }]);
        game.draw_word(&mut rand::rng());
        game.start(10_000).unwrap();

        let view = GameView::from(&game);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("lighthouse"));
        assert_eq!(view.teams.a.describer.as_deref(), Some("h"));
        assert_eq!(view.turn_ends_at, 70_000);
        assert_eq!(view.words_dealt, 1);
    }
}
