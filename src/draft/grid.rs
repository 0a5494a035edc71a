use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::{
    cards::UniqueCard,
    error::{err, DraftError, Res},
};

use super::packs::{Booster, RarityTargets};

pub const GRID_SIZE: usize = 3;
pub const DEFAULT_GRID_BOOSTERS: usize = 18;

/// Booster content for a 3x3 grid.
pub const GRID_TARGETS: RarityTargets = RarityTargets {
    rare: 1,
    uncommon: 3,
    common: 5,
};

/// A grid draft for two players. Each booster is laid out as a 3x3 grid and
/// each player in turn takes a row or a column. Choices 0 to 2 are rows, 3 to
/// 5 are columns.
pub struct GridDraft {
    players: Vec<Uuid>,
    pools: HashMap<Uuid, Vec<UniqueCard>>,
    queued: VecDeque<Booster>,
    grid: Vec<Option<UniqueCard>>,
    round: usize,
    picks_this_round: usize,
}

impl GridDraft {
    pub fn new(players: Vec<Uuid>, boosters: Vec<Booster>) -> Res<Self> {
        if players.len() != 2 {
            return Err(DraftError::Config("Grid draft needs exactly two players.".to_string()));
        }

        let mut draft = Self {
            pools: players.iter().map(|p| (*p, Vec::new())).collect(),
            players,
            queued: boosters.into(),
            grid: Vec::new(),
            round: 0,
            picks_this_round: 0,
        };
        draft.open_next();
        Ok(draft)
    }

    /// The first pick of each grid alternates between players.
    pub fn current_player(&self) -> Option<Uuid> {
        if self.is_complete() {
            return None;
        }
        self.players
            .get((self.round + self.picks_this_round) % 2)
            .copied()
    }

    pub fn grid(&self) -> &[Option<UniqueCard>] {
        &self.grid
    }

    /// Grid number (starting at 0) and number of picks made from it.
    pub fn progress(&self) -> (usize, usize) {
        (self.round, self.picks_this_round)
    }

    pub fn pools(&self) -> &HashMap<Uuid, Vec<UniqueCard>> {
        &self.pools
    }

    pub fn is_complete(&self) -> bool {
        self.grid.iter().all(Option::is_none) && self.queued.is_empty()
    }

    /// Take every remaining card of a row or column. After the second pick
    /// the leftovers are discarded and the next grid is revealed.
    pub fn pick(&mut self, player: Uuid, choice: usize) -> Res<Vec<UniqueCard>> {
        match self.current_player() {
            Some(current) if current == player => {}
            Some(_) => return err("Not your turn."),
            None => return err("Draft is over."),
        }
        let Some(cells) = line(choice) else {
            return err(format!("Invalid choice {choice}."));
        };

        let picked: Vec<UniqueCard> = cells
            .iter()
            .filter_map(|i| self.grid.get_mut(*i).and_then(Option::take))
            .collect();
        if picked.is_empty() {
            return err("No card left in this line.");
        }

        self.pools.entry(player).or_default().extend(picked.iter().cloned());
        self.picks_this_round += 1;
        if self.picks_this_round == 2 || self.grid.iter().all(Option::is_none) {
            self.round += 1;
            self.open_next();
        }
        Ok(picked)
    }

    /// Lay out the next non-empty booster.
    fn open_next(&mut self) {
        self.picks_this_round = 0;
        self.grid.clear();
        while let Some(booster) = self.queued.pop_front() {
            if booster.is_empty() {
                self.round += 1;
                continue;
            }
            let mut cards = booster.into_iter();
            self.grid = (0..GRID_SIZE * GRID_SIZE).map(|_| cards.next()).collect();
            return;
        }
    }
}

/// Cell indices of a row (0 to 2) or column (3 to 5).
fn line(choice: usize) -> Option<[usize; GRID_SIZE]> {
    match choice {
        0..=2 => {
            let row = choice * GRID_SIZE;
            Some([row, row + 1, row + 2])
        }
        3..=5 => {
            let col = choice - GRID_SIZE;
            Some([col, col + GRID_SIZE, col + 2 * GRID_SIZE])
        }
        _ => None,
    }
}
