use std::collections::HashMap;

use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

use crate::{
    cards::UniqueCard,
    error::{err, DraftError, Res},
};

use super::packs::Booster;

pub const DEFAULT_PILE_COUNT: usize = 3;

/// What happened after a skip.
#[derive(Debug)]
pub enum SkipOutcome {
    /// The same player now inspects the next pile.
    NextPile,

    /// The last pile was skipped: the player received a card from the draw
    /// pool (if any was left) and the turn passed.
    RandomCard(Option<UniqueCard>),
}

/// A Winston draft: players take turns inspecting face down piles, taking a
/// pile or adding a card to it and moving on.
pub struct WinstonDraft {
    players: Vec<Uuid>,
    pools: HashMap<Uuid, Vec<UniqueCard>>,
    turn: usize,
    current_pile: usize,

    /// Shuffled draw pool. Cards are drawn from the back.
    card_pool: Vec<UniqueCard>,
    piles: Vec<Vec<UniqueCard>>,
}

impl WinstonDraft {
    pub fn new<R: Rng + ?Sized>(
        players: Vec<Uuid>,
        boosters: Vec<Booster>,
        pile_count: usize,
        rng: &mut R,
    ) -> Res<Self> {
        if players.is_empty() {
            return Err(DraftError::Config("Winston draft needs players.".to_string()));
        }
        if pile_count == 0 {
            return Err(DraftError::Config("Winston draft needs at least one pile.".to_string()));
        }

        let mut card_pool: Vec<UniqueCard> = boosters.into_iter().flatten().collect();
        card_pool.shuffle(rng);
        let piles = (0..pile_count)
            .map(|_| card_pool.pop().into_iter().collect())
            .collect();

        let mut draft = Self {
            pools: players.iter().map(|p| (*p, Vec::new())).collect(),
            players,
            turn: 0,
            current_pile: 0,
            card_pool,
            piles,
        };
        draft.current_pile = draft.first_pile();
        Ok(draft)
    }

    /// Player whose turn it is, None once the draft is complete.
    pub fn current_player(&self) -> Option<Uuid> {
        if self.is_complete() {
            None
        } else {
            Some(self.players[self.turn % self.players.len()])
        }
    }

    pub fn current_pile(&self) -> usize {
        self.current_pile
    }

    pub fn piles(&self) -> &[Vec<UniqueCard>] {
        &self.piles
    }

    /// Number of cards left in the draw pool.
    pub fn remaining_cards(&self) -> usize {
        self.card_pool.len()
    }

    pub fn pools(&self) -> &HashMap<Uuid, Vec<UniqueCard>> {
        &self.pools
    }

    pub fn is_complete(&self) -> bool {
        self.card_pool.is_empty() && self.piles.iter().all(Vec::is_empty)
    }

    /// Take the inspected pile. It is refilled with one card from the draw
    /// pool and the turn passes.
    pub fn take_pile(&mut self, player: Uuid) -> Res<Vec<UniqueCard>> {
        self.check_turn(player)?;

        let index = self.current_pile;
        let taken = std::mem::take(&mut self.piles[index]);
        if taken.is_empty() {
            return Err(DraftError::Internal("Inspected pile is empty.".to_string()));
        }
        if let Some(card) = self.card_pool.pop() {
            self.piles[index].push(card);
        }
        self.pools.entry(player).or_default().extend(taken.iter().cloned());
        self.next_turn();
        Ok(taken)
    }

    /// Add a card from the draw pool to the inspected pile and move on to the
    /// next pile. Refused when the player has no other choice than taking
    /// this pile.
    pub fn skip_pile(&mut self, player: Uuid) -> Res<SkipOutcome> {
        self.check_turn(player)?;

        let index = self.current_pile;
        let next = self.next_pile(index);
        if self.card_pool.is_empty() && next.is_none() {
            return err("This is your only choice!");
        }

        if let Some(card) = self.card_pool.pop() {
            self.piles[index].push(card);
        }

        match next {
            Some(next) => {
                self.current_pile = next;
                Ok(SkipOutcome::NextPile)
            }
            None => {
                let card = self.card_pool.pop();
                if let Some(card) = &card {
                    self.pools.entry(player).or_default().push(card.clone());
                }
                self.next_turn();
                Ok(SkipOutcome::RandomCard(card))
            }
        }
    }

    fn check_turn(&self, player: Uuid) -> Res<()> {
        match self.current_player() {
            Some(current) if current == player => Ok(()),
            Some(_) => err("Not your turn."),
            None => err("Draft is over."),
        }
    }

    fn first_pile(&self) -> usize {
        self.piles.iter().position(|p| !p.is_empty()).unwrap_or(0)
    }

    fn next_pile(&self, index: usize) -> Option<usize> {
        (index + 1..self.piles.len()).find(|i| !self.piles[*i].is_empty())
    }

    fn next_turn(&mut self) {
        self.turn += 1;
        self.current_pile = self.first_pile();
    }
}
