use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::{
    cards::UniqueCard,
    error::{err, DraftError, Res},
};

use super::packs::Booster;

/// A Rochester draft: one booster is opened at a time and every player picks
/// from it in turn. Pick `k` of booster `b` belongs to seat `(b + k) mod n`.
pub struct RochesterDraft {
    players: Vec<Uuid>,
    pools: HashMap<Uuid, Vec<UniqueCard>>,
    queued: VecDeque<Booster>,
    current: Booster,
    booster_number: usize,
    pick_number: usize,
}

impl RochesterDraft {
    pub fn new(players: Vec<Uuid>, boosters: Vec<Booster>) -> Res<Self> {
        if players.is_empty() {
            return Err(DraftError::Config("Rochester draft needs players.".to_string()));
        }

        let mut draft = Self {
            pools: players.iter().map(|p| (*p, Vec::new())).collect(),
            players,
            queued: boosters.into(),
            current: Vec::new(),
            booster_number: 0,
            pick_number: 0,
        };
        draft.open_next();
        Ok(draft)
    }

    pub fn current_player(&self) -> Option<Uuid> {
        if self.is_complete() {
            return None;
        }
        let seat = (self.booster_number + self.pick_number) % self.players.len();
        self.players.get(seat).copied()
    }

    /// The open booster, None once the draft is complete.
    pub fn current_booster(&self) -> Option<&Booster> {
        (!self.is_complete()).then_some(&self.current)
    }

    /// Booster number and pick number within it, both starting at 0.
    pub fn progress(&self) -> (usize, usize) {
        (self.booster_number, self.pick_number)
    }

    pub fn pools(&self) -> &HashMap<Uuid, Vec<UniqueCard>> {
        &self.pools
    }

    pub fn is_complete(&self) -> bool {
        self.current.is_empty() && self.queued.is_empty()
    }

    /// Pick a card from the open booster. Opens the next booster once this
    /// one is empty.
    pub fn pick(&mut self, player: Uuid, index: usize) -> Res<UniqueCard> {
        match self.current_player() {
            Some(current) if current == player => {}
            Some(_) => return err("Not your turn."),
            None => return err("Draft is over."),
        }
        if index >= self.current.len() {
            return err("Invalid pick index.");
        }

        let card = self.current.remove(index);
        self.pools.entry(player).or_default().push(card.clone());
        self.pick_number += 1;
        if self.current.is_empty() {
            self.booster_number += 1;
            self.open_next();
        }
        Ok(card)
    }

    /// Open the next non-empty booster.
    fn open_next(&mut self) {
        self.pick_number = 0;
        while let Some(booster) = self.queued.pop_front() {
            if !booster.is_empty() {
                self.current = booster;
                return;
            }
            self.booster_number += 1;
        }
    }
}
