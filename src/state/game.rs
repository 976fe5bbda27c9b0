//! Pure game model: teams, describer rotation, word pool and scoring.
//!
//! Everything here is synchronous and storage-agnostic; the game service loads a
//! [`Game`] from the ephemeral store, mutates it under the room lock and writes it back.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::GamePolicy,
    dao::models::{ScoreEntity, TeamSide, TeamsEntity, WordEntity},
    state::{
        state_machine::{GameEvent, GameState, InvalidTransition, compute_transition},
        text,
    },
};

/// One side of a running game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameTeam {
    /// Members, in rotation order.
    pub players: Vec<String>,
    /// Index of the member describing when this team is up.
    pub describer_index: usize,
    /// Words guessed during this game.
    pub score: u32,
}

impl GameTeam {
    fn new(players: Vec<String>) -> Self {
        Self {
            players,
            describer_index: 0,
            score: 0,
        }
    }

    fn describer(&self) -> Option<&String> {
        self.players.get(self.describer_index)
    }

    fn rotate(&mut self) {
        if self.players.is_empty() {
            self.describer_index = 0;
        } else {
            self.describer_index = (self.describer_index + 1) % self.players.len();
        }
    }
}

/// Both sides of a running game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTeams {
    #[serde(rename = "A")]
    a: GameTeam,
    #[serde(rename = "B")]
    b: GameTeam,
}

impl GameTeams {
    /// Side `side` of the game.
    pub fn side(&self, side: TeamSide) -> &GameTeam {
        match side {
            TeamSide::A => &self.a,
            TeamSide::B => &self.b,
        }
    }

    fn side_mut(&mut self, side: TeamSide) -> &mut GameTeam {
        match side {
            TeamSide::A => &mut self.a,
            TeamSide::B => &mut self.b,
        }
    }
}

/// Consumable word pool; `used` only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordPool {
    /// Words already dealt in this game, in order.
    pub used: Vec<WordEntity>,
    /// Words available for the next draw.
    pub unused: Vec<WordEntity>,
}

/// How a participant relates to the turn in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Describes the secret word.
    Describer,
    /// Member of the playing team guessing the word.
    Guesser,
    /// Anybody else.
    Bystander,
}

/// Result of ending a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStep {
    /// Next team is up and needs a fresh word.
    Continued,
    /// The last turn was played; carries the final scores.
    Finished(ScoreEntity),
}

/// Result of removing a player from a running game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The player was not part of the game.
    NotPlaying,
    /// Removed; the current describer is unchanged.
    Removed,
    /// Removed while describing; `next` now describes, `None` when the team emptied.
    DescriberReplaced {
        /// Newly designated describer.
        next: Option<String>,
    },
}

/// Game state persisted alongside its room while live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Owning room.
    pub room_code: String,
    /// Rosters, rotation and scores.
    pub teams: GameTeams,
    /// Side playing the current turn.
    pub current_team: TeamSide,
    /// Player describing in the current turn.
    pub current_describer: String,
    /// Word being described.
    pub word_to_guess: Option<WordEntity>,
    /// Dealt and undealt words.
    pub words: WordPool,
    /// Completed turns.
    pub turns_played: u32,
    /// Turns after which the game finishes.
    pub max_turns: u32,
    /// Length of each turn.
    pub turn_duration_secs: u64,
    /// Start of the current turn in unix milliseconds.
    pub turn_started_at: i64,
    /// Last accepted skip in unix milliseconds.
    pub last_skip_at: Option<i64>,
    /// Lifecycle state.
    pub state: GameState,
}

impl Game {
    /// Set up a game for the room's current teams with `starting` up first.
    pub fn new(room_code: &str, teams: &TeamsEntity, policy: &GamePolicy, starting: TeamSide) -> Self {
        let teams = GameTeams {
            a: GameTeam::new(teams.a.clone()),
            b: GameTeam::new(teams.b.clone()),
        };
        let current_describer = teams.side(starting).describer().cloned().unwrap_or_default();
        Self {
            room_code: room_code.to_owned(),
            teams,
            current_team: starting,
            current_describer,
            word_to_guess: None,
            words: WordPool::default(),
            turns_played: 0,
            max_turns: policy.max_turns,
            turn_duration_secs: policy.turn_duration.as_secs(),
            turn_started_at: 0,
            last_skip_at: None,
            state: GameState::Waiting,
        }
    }

    /// Whether the next draw needs a lexicon refill first.
    pub fn needs_refill(&self) -> bool {
        self.words.unused.is_empty()
    }

    /// Texts of every dealt word, to exclude from a refill.
    pub fn exclusions(&self) -> Vec<String> {
        self.words.used.iter().map(|word| word.word.clone()).collect()
    }

    /// Replace the undealt pool, dropping anything already dealt.
    pub fn refill(&mut self, batch: Vec<WordEntity>) {
        let used = &self.words.used;
        self.words.unused = batch
            .into_iter()
            .filter(|candidate| {
                !used
                    .iter()
                    .any(|dealt| dealt.id == candidate.id || dealt.word == candidate.word)
            })
            .collect();
    }

    /// Deal a uniformly random undealt word, returning it, or `None` on an empty pool.
    pub fn draw_word<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<&WordEntity> {
        if self.words.unused.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.words.unused.len());
        let word = self.words.unused.swap_remove(index);
        self.words.used.push(word.clone());
        self.word_to_guess = Some(word);
        self.word_to_guess.as_ref()
    }

    /// Enter play once the first word is dealt.
    pub fn start(&mut self, now_ms: i64) -> Result<(), InvalidTransition> {
        self.state = compute_transition(self.state, GameEvent::Started)?;
        self.turn_started_at = now_ms;
        Ok(())
    }

    /// Close the current turn: either hand over to the other team or finish.
    ///
    /// On [`TurnStep::Continued`] the caller deals the next word.
    pub fn advance(&mut self, now_ms: i64) -> Result<TurnStep, InvalidTransition> {
        let event = if self.turns_played + 1 >= self.max_turns {
            GameEvent::TurnsExhausted
        } else {
            GameEvent::TurnPassed
        };
        self.state = compute_transition(self.state, event)?;
        self.turns_played += 1;

        if self.state == GameState::Finished {
            return Ok(TurnStep::Finished(self.scores()));
        }

        self.current_team = self.current_team.other();
        let team = self.teams.side_mut(self.current_team);
        team.rotate();
        self.current_describer = team.describer().cloned().unwrap_or_default();
        self.turn_started_at = now_ms;
        Ok(TurnStep::Continued)
    }

    /// Abandon the game.
    pub fn interrupt(&mut self) -> Result<(), InvalidTransition> {
        self.state = compute_transition(self.state, GameEvent::Interrupted)?;
        Ok(())
    }

    /// Relationship of `user_id` to the current turn.
    pub fn role_of(&self, user_id: &str) -> Role {
        if self.current_describer == user_id {
            Role::Describer
        } else if self
            .teams
            .side(self.current_team)
            .players
            .iter()
            .any(|id| id == user_id)
        {
            Role::Guesser
        } else {
            Role::Bystander
        }
    }

    /// Banned term used in `utterance`, including the secret word itself.
    pub fn taboo_hit(&self, utterance: &str) -> Option<String> {
        let word = self.word_to_guess.as_ref()?;
        std::iter::once(&word.word)
            .chain(word.taboo_words.iter())
            .find(|term| text::contains_term(utterance, term))
            .cloned()
    }

    /// Whether `guess` names the secret word.
    pub fn is_correct(&self, guess: &str) -> bool {
        match &self.word_to_guess {
            Some(word) => {
                let guess = text::clean(guess);
                !guess.is_empty() && guess == text::clean(&word.word)
            }
            None => false,
        }
    }

    /// Near-miss term named in `guess`.
    pub fn similar_hit(&self, guess: &str) -> Option<String> {
        self.word_to_guess
            .as_ref()?
            .similar_words
            .iter()
            .find(|term| text::contains_term(guess, term))
            .cloned()
    }

    /// Credit a guessed word to the playing team.
    pub fn award_current_team(&mut self) {
        self.teams.side_mut(self.current_team).score += 1;
    }

    /// Seconds left before another skip is allowed, `None` when allowed now.
    pub fn skip_cooldown_remaining(&self, now_ms: i64, cooldown_secs: u64) -> Option<u64> {
        let last = self.last_skip_at?;
        let cooldown_ms = (cooldown_secs * 1_000) as i64;
        let elapsed = now_ms.saturating_sub(last);
        if elapsed >= cooldown_ms {
            return None;
        }
        let left_ms = (cooldown_ms - elapsed) as u64;
        Some(left_ms.div_ceil(1_000))
    }

    /// Record an accepted skip.
    pub fn mark_skip(&mut self, now_ms: i64) {
        self.last_skip_at = Some(now_ms);
    }

    /// Drop a departing player from the rotation.
    pub fn remove_player(&mut self, user_id: &str) -> Departure {
        let Some(side) = [TeamSide::A, TeamSide::B]
            .into_iter()
            .find(|side| self.teams.side(*side).players.iter().any(|id| id == user_id))
        else {
            return Departure::NotPlaying;
        };

        let team = self.teams.side_mut(side);
        let Some(position) = team.players.iter().position(|id| id == user_id) else {
            return Departure::NotPlaying;
        };
        team.players.remove(position);
        if position < team.describer_index {
            team.describer_index -= 1;
        }
        if team.describer_index >= team.players.len() {
            team.describer_index = 0;
        }

        if side == self.current_team && self.current_describer == user_id {
            let next = team.describer().cloned();
            self.current_describer = next.clone().unwrap_or_default();
            return Departure::DescriberReplaced { next };
        }
        Departure::Removed
    }

    /// Per-team scores so far.
    pub fn scores(&self) -> ScoreEntity {
        ScoreEntity {
            a: self.teams.a.score,
            b: self.teams.b.score,
        }
    }

    /// Unix milliseconds at which the current turn times out.
    pub fn turn_ends_at(&self) -> i64 {
        self.turn_started_at + (self.turn_duration_secs * 1_000) as i64
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn word(id: &str, text: &str, taboo: &[&str]) -> WordEntity {
        WordEntity {
            id: id.into(),
            word: text.into(),
            taboo_words: taboo.iter().map(|t| (*t).to_owned()).collect(),
            similar_words: Vec::new(),
        }
    }

    fn teams(a: &[&str], b: &[&str]) -> TeamsEntity {
        TeamsEntity {
            a: a.iter().map(|id| (*id).to_owned()).collect(),
            b: b.iter().map(|id| (*id).to_owned()).collect(),
        }
    }

    fn started_game(starting: TeamSide) -> Game {
        let policy = GamePolicy::default();
        let mut game = Game::new("ABCDE", &teams(&["h", "p1"], &["p2", "p3"]), &policy, starting);
        game.refill(vec![
            word("1", "guitar", &["strings", "music"]),
            word("2", "volcano", &["lava"]),
            word("3", "penguin", &["bird"]),
        ]);
        let mut rng = StdRng::seed_from_u64(7);
        game.draw_word(&mut rng);
        game.start(1_000).unwrap();
        game
    }

    #[test]
    fn first_describer_is_head_of_starting_team() {
        let game = started_game(TeamSide::B);
        assert_eq!(game.current_describer, "p2");
        assert_eq!(game.state, GameState::Playing);
        assert!(game.word_to_guess.is_some());
    }

    #[test]
    fn advance_flips_team_and_rotates_describer() {
        let mut game = started_game(TeamSide::A);
        let step = game.advance(2_000).unwrap();
        assert_eq!(step, TurnStep::Continued);
        assert_eq!(game.turns_played, 1);
        assert_eq!(game.current_team, TeamSide::B);
        assert_eq!(game.current_describer, "p3");
        assert_eq!(game.turn_started_at, 2_000);

        let step = game.advance(3_000).unwrap();
        assert_eq!(step, TurnStep::Finished(ScoreEntity { a: 0, b: 0 }));
        assert_eq!(game.turns_played, 2);
        assert_eq!(game.state, GameState::Finished);
        assert!(game.advance(4_000).is_err());
        assert_eq!(game.turns_played, 2);
    }

    #[test]
    fn drawn_words_are_never_redealt() {
        let mut game = started_game(TeamSide::A);
        let mut rng = StdRng::seed_from_u64(11);
        while game.draw_word(&mut rng).is_some() {}
        assert!(game.needs_refill());

        let exclusions = game.exclusions();
        assert_eq!(exclusions.len(), 3);
        game.refill(vec![word("1", "guitar", &[]), word("4", "honey", &["bee"])]);
        assert_eq!(game.words.unused.len(), 1);
        game.draw_word(&mut rng);

        let ids: HashSet<_> = game.words.used.iter().map(|w| w.id.clone()).collect();
        assert_eq!(ids.len(), game.words.used.len());
        assert_eq!(game.word_to_guess.as_ref().unwrap().word, "honey");
    }

    #[test]
    fn roles_follow_the_current_turn() {
        let game = started_game(TeamSide::A);
        assert_eq!(game.role_of("h"), Role::Describer);
        assert_eq!(game.role_of("p1"), Role::Guesser);
        assert_eq!(game.role_of("p2"), Role::Bystander);
        assert_eq!(game.role_of("stranger"), Role::Bystander);
    }

    #[test]
    fn taboo_and_answers_use_normalized_text() {
        let mut game = started_game(TeamSide::A);
        game.word_to_guess = Some(word("1", "guitar", &["strings", "music"]));
        assert_eq!(game.taboo_hit("it has six STRING"), Some("strings".into()));
        assert_eq!(game.taboo_hit("you play a Guitars"), Some("guitar".into()));
        assert_eq!(game.taboo_hit("wooden and loud"), None);
        assert!(game.is_correct("  Guitars "));
        assert!(!game.is_correct("bass guitar"));
        assert!(!game.is_correct("   "));
    }

    #[test]
    fn near_misses_are_recognised_after_folding() {
        let mut game = started_game(TeamSide::A);
        let mut secret = word("1", "guitar", &["strings"]);
        secret.similar_words = vec!["ukulele".into(), "bass guitar".into()];
        game.word_to_guess = Some(secret);
        assert_eq!(game.similar_hit("is it a UKULELÉ"), Some("ukulele".into()));
        assert_eq!(game.similar_hit("maybe a bass guitar"), Some("bass guitar".into()));
        assert_eq!(game.similar_hit("a violin"), None);
        assert!(!game.is_correct("ukulele"));
    }

    #[test]
    fn skip_cooldown_counts_down_in_whole_seconds() {
        let mut game = started_game(TeamSide::A);
        assert_eq!(game.skip_cooldown_remaining(5_000, 10), None);
        game.mark_skip(5_000);
        assert_eq!(game.skip_cooldown_remaining(5_000, 10), Some(10));
        assert_eq!(game.skip_cooldown_remaining(10_500, 10), Some(5));
        assert_eq!(game.skip_cooldown_remaining(15_000, 10), None);
    }

    #[test]
    fn removing_the_describer_hands_over_to_next_teammate() {
        let mut game = started_game(TeamSide::A);
        let departure = game.remove_player("h");
        assert_eq!(
            departure,
            Departure::DescriberReplaced {
                next: Some("p1".into())
            }
        );
        assert_eq!(game.current_describer, "p1");
        assert_eq!(game.remove_player("p3"), Departure::Removed);
        assert_eq!(game.remove_player("ghost"), Departure::NotPlaying);
    }

    #[test]
    fn removing_earlier_member_keeps_describer_stable() {
        let policy = GamePolicy::default();
        let mut game = Game::new("ABCDE", &teams(&["a1", "a2", "a3"], &["b1", "b2"]), &policy, TeamSide::A);
        game.teams.side_mut(TeamSide::A).describer_index = 2;
        game.current_describer = "a3".into();
        assert_eq!(game.remove_player("a1"), Departure::Removed);
        assert_eq!(game.teams.side(TeamSide::A).describer_index, 1);
        assert_eq!(game.current_describer, "a3");
    }

    #[test]
    fn interrupt_abandons_without_scores_changing() {
        let mut game = started_game(TeamSide::A);
        game.award_current_team();
        game.interrupt().unwrap();
        assert_eq!(game.state, GameState::Abandoned);
        assert_eq!(game.scores(), ScoreEntity { a: 1, b: 0 });
    }
}
