use std::collections::{HashMap, HashSet, VecDeque};

use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

use crate::{
    cards::UniqueCard,
    error::{err, DraftError, Res},
};

use super::packs::Booster;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PassDirection {
    Left,
    Right,
}

impl PassDirection {
    fn reverse(self) -> Self {
        match self {
            PassDirection::Left => PassDirection::Right,
            PassDirection::Right => PassDirection::Left,
        }
    }
}

/// How the generated boosters are dealt to seats for each booster round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DistributionMode {
    /// Booster `r * players + p` is opened by seat `p` in round `r`.
    #[default]
    Regular,
    /// Each seat opens its own boosters in a random order.
    ShufflePlayerBoosters,
    /// All boosters are shuffled before being dealt.
    ShuffleBoosterPool,
}

/// Pick and burn counts for each pick of one booster round.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BoosterSettings {
    pub picks: Vec<usize>,
    #[serde(default)]
    pub burns: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickSettings {
    pub picks_per_round: usize,
    pub burns_per_round: usize,

    /// Overrides the constant counts, per booster round then pick number.
    /// Booster rounds cycle through the list; the last entry of a list
    /// applies to later picks.
    pub booster_settings: Vec<BoosterSettings>,
}

impl Default for PickSettings {
    fn default() -> Self {
        Self {
            picks_per_round: 1,
            burns_per_round: 0,
            booster_settings: Vec::new(),
        }
    }
}

pub type NewPacks = Vec<(Uuid, Booster)>;

/// Result of a successful pick.
#[derive(Debug)]
pub struct PickOutcome {
    pub picked: Vec<UniqueCard>,
    pub burned: Vec<UniqueCard>,

    /// Boosters to show to each player if this pick completed the pick round.
    pub new_packs: NewPacks,
}

/// Deal generated boosters into booster rounds, one booster per seat.
fn distribute<R: Rng + ?Sized>(
    mut boosters: Vec<Booster>,
    players: usize,
    mode: DistributionMode,
    rng: &mut R,
) -> VecDeque<Vec<Booster>> {
    let rounds = boosters.len() / players;
    match mode {
        DistributionMode::Regular => {}
        DistributionMode::ShuffleBoosterPool => boosters.shuffle(rng),
        DistributionMode::ShufflePlayerBoosters => {
            let mut seats: Vec<Vec<Booster>> = vec![Vec::new(); players];
            for (index, booster) in boosters.drain(..).enumerate() {
                seats[index % players].push(booster);
            }
            for seat in &mut seats {
                seat.shuffle(rng);
            }
            for round in 0..rounds {
                for seat in &mut seats {
                    if let Some(booster) = seat.get_mut(round) {
                        boosters.push(std::mem::take(booster));
                    }
                }
            }
        }
    }

    let mut dealt = VecDeque::with_capacity(rounds);
    let mut boosters = boosters.into_iter();
    for _ in 0..rounds {
        dealt.push_back(boosters.by_ref().take(players).collect());
    }
    dealt
}

/// Choose the picks (rarest first) and burns (most common last) for a seat
/// that picks automatically.
pub fn bot_pick(booster: &Booster, picks: usize, burns: usize) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..booster.len()).collect();
    order.sort_by_key(|i| booster[*i].rarity());
    let picks = picks.min(order.len());
    let burns = burns.min(order.len() - picks);
    (
        order[..picks].to_vec(),
        order[order.len() - burns..].to_vec(),
    )
}

/// A standard draft: every seat opens a booster, picks from it and passes it
/// on. Boosters move once every seat has picked.
pub struct Draft {
    players: Vec<Uuid>,
    pools: HashMap<Uuid, Vec<UniqueCard>>,
    direction: PassDirection,
    settings: PickSettings,
    current_round: usize,
    pick_number: usize,
    queued_rounds: VecDeque<Vec<Booster>>,

    /// Booster held by each seat during this pick round.
    held: Vec<Booster>,

    /// Whether each seat has made its pick this pick round.
    picked: Vec<bool>,
}

impl Draft {
    pub fn new<R: Rng + ?Sized>(
        players: Vec<Uuid>,
        boosters: Vec<Booster>,
        mode: DistributionMode,
        settings: PickSettings,
        rng: &mut R,
    ) -> Res<Self> {
        if players.is_empty() || boosters.len() % players.len() != 0 {
            return Err(DraftError::Config(format!(
                "Cannot deal {} boosters to {} players.",
                boosters.len(),
                players.len()
            )));
        }

        let queued_rounds = distribute(boosters, players.len(), mode, rng);
        Ok(Self {
            pools: players.iter().map(|p| (*p, Vec::new())).collect(),
            held: vec![Vec::new(); players.len()],
            picked: vec![true; players.len()],
            players,

            // Reversed to left at beginning of first round.
            direction: PassDirection::Right,
            settings,
            current_round: 0,
            pick_number: 0,
            queued_rounds,
        })
    }

    /// Start the draft. Returns the booster each player picks from first.
    pub fn begin(&mut self) -> NewPacks {
        debug_assert!(self.current_round == 0);

        self.start_round()
    }

    /// Pick the cards at `picks` from the player's current booster and burn
    /// those at `burns`. Rejected without any change unless the indices are
    /// distinct, in range and of the expected counts.
    pub fn handle_pick(&mut self, player: Uuid, picks: &[usize], burns: &[usize]) -> Res<PickOutcome> {
        let Some(seat) = self.seat(player) else {
            return err("Player not in draft.");
        };
        if self.picked[seat] {
            return err("No current pack.");
        }

        let (expected_picks, expected_burns) = self.counts(seat);
        if picks.len() != expected_picks {
            return err(format!("Expected {expected_picks} picked cards, got {}.", picks.len()));
        }
        if burns.len() != expected_burns {
            return err(format!("Expected {expected_burns} burned cards, got {}.", burns.len()));
        }
        let size = self.held[seat].len();
        if picks.iter().chain(burns).any(|i| *i >= size) {
            return err("Invalid pick index.");
        }
        if picks.iter().chain(burns).collect::<HashSet<_>>().len() != picks.len() + burns.len() {
            return err("Duplicate pick index.");
        }

        let mut slots: Vec<Option<UniqueCard>> =
            std::mem::take(&mut self.held[seat]).into_iter().map(Some).collect();
        let picked: Vec<UniqueCard> = picks.iter().filter_map(|i| slots[*i].take()).collect();
        let burned: Vec<UniqueCard> = burns.iter().filter_map(|i| slots[*i].take()).collect();
        self.held[seat] = slots.into_iter().flatten().collect();
        self.picked[seat] = true;
        self.pool_for(player).extend(picked.iter().cloned());

        let new_packs = if self.picked.iter().all(|p| *p) {
            self.end_pick_round()
        } else {
            Vec::new()
        };

        Ok(PickOutcome {
            picked,
            burned,
            new_packs,
        })
    }

    /// Get the pack this player has to pick from, if they have not picked yet
    /// this pick round.
    pub fn current_pack(&self, player: Uuid) -> Option<&Booster> {
        let seat = self.seat(player)?;
        (!self.picked[seat]).then(|| &self.held[seat])
    }

    /// Number of cards this player must pick and burn from their current pack.
    pub fn expected_counts(&self, player: Uuid) -> Option<(usize, usize)> {
        let seat = self.seat(player)?;
        (!self.picked[seat]).then(|| self.counts(seat))
    }

    /// Players who have not picked yet this pick round.
    pub fn waiting_on(&self) -> Vec<Uuid> {
        self.players
            .iter()
            .zip(&self.picked)
            .filter(|(_, picked)| !**picked)
            .map(|(player, _)| *player)
            .collect()
    }

    /// Map from player ID to pool of picked cards.
    pub fn pools(&self) -> &HashMap<Uuid, Vec<UniqueCard>> {
        &self.pools
    }

    /// Booster round (starting at 1) and pick number within it.
    pub fn progress(&self) -> (usize, usize) {
        (self.current_round, self.pick_number)
    }

    /// Check if this draft is completed. This is true when the final card has
    /// been drafted from the final round.
    pub fn draft_complete(&self) -> bool {
        self.queued_rounds.is_empty() && self.round_finished()
    }

    fn seat(&self, player: Uuid) -> Option<usize> {
        self.players.iter().position(|p| *p == player)
    }

    /// Find the seat the given seat is passing to in the current round.
    /// Takes account of the current pass direction.
    fn next_seat(&self, seat: usize) -> usize {
        let n = self.players.len();
        match self.direction {
            PassDirection::Left => (seat + n - 1) % n,
            PassDirection::Right => (seat + 1) % n,
        }
    }

    /// Find the player in the draft that the given player is passing to in the
    /// current round.
    #[cfg(test)]
    fn next_player(&self, player: Uuid) -> Option<Uuid> {
        let seat = self.seat(player)?;
        self.players.get(self.next_seat(seat)).copied()
    }

    fn counts(&self, seat: usize) -> (usize, usize) {
        let schedule = match self.settings.booster_settings.len() {
            0 => None,
            n => self
                .settings
                .booster_settings
                .get(self.current_round.saturating_sub(1) % n),
        };
        let scheduled = |counts: &[usize]| counts.get(self.pick_number).or(counts.last()).copied();
        let picks = schedule
            .and_then(|s| scheduled(&s.picks))
            .unwrap_or(self.settings.picks_per_round);
        let burns = schedule
            .and_then(|s| scheduled(&s.burns))
            .unwrap_or(self.settings.burns_per_round);

        let size = self.held[seat].len();
        let picks = picks.min(size);
        (picks, burns.min(size - picks))
    }

    fn pool_for(&mut self, player: Uuid) -> &mut Vec<UniqueCard> {
        debug_assert!(self.players.contains(&player));

        self.pools.entry(player).or_default()
    }

    fn round_finished(&self) -> bool {
        self.held.iter().all(Vec::is_empty)
    }

    /// Seats holding an empty booster sit this pick round out.
    fn reset_picks(&mut self) -> NewPacks {
        self.picked = self.held.iter().map(Vec::is_empty).collect();
        self.players
            .iter()
            .zip(&self.held)
            .filter(|(_, booster)| !booster.is_empty())
            .map(|(player, booster)| (*player, booster.clone()))
            .collect()
    }

    /// Begin a new booster round. Leftover cards are discarded. Returns the
    /// boosters to pick from, empty if the draft is over.
    fn start_round(&mut self) -> NewPacks {
        while let Some(boosters) = self.queued_rounds.pop_front() {
            self.current_round += 1;
            self.pick_number = 0;
            self.direction = self.direction.reverse();
            self.held = boosters;
            self.held.resize(self.players.len(), Vec::new());
            if !self.round_finished() {
                tracing::debug!("Starting booster round {}.", self.current_round);
                return self.reset_picks();
            }
        }
        self.held.iter_mut().for_each(Vec::clear);
        self.picked.iter_mut().for_each(|p| *p = true);
        Vec::new()
    }

    /// Pass every booster to the next seat once all seats have picked.
    fn end_pick_round(&mut self) -> NewPacks {
        let mut passed = vec![Vec::new(); self.players.len()];
        for seat in 0..self.players.len() {
            passed[self.next_seat(seat)] = std::mem::take(&mut self.held[seat]);
        }
        self.held = passed;
        self.pick_number += 1;

        if self.round_finished() {
            self.start_round()
        } else {
            self.reset_picks()
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use rand::{rngs::StdRng, SeedableRng};
    use uuid::Uuid;

    use crate::{
        cards::{Card, Rarity, UniqueCard},
        draft::packs::sample_boosters,
    };

    use super::*;

    fn packless_draft(players: Vec<Uuid>) -> Draft {
        let rng = &mut StdRng::seed_from_u64(0);
        Draft::new(players, Vec::new(), DistributionMode::Regular, PickSettings::default(), rng).unwrap()
    }

    fn uids(booster: &Booster) -> Vec<u64> {
        booster.iter().map(|c| c.uid).collect()
    }

    #[test]
    fn test_next_player_single() {
        let id = Uuid::new_v4();
        let mut draft = packless_draft(vec![id]);

        assert_eq!(draft.next_player(id), Some(id));
        assert_eq!(draft.next_player(Uuid::new_v4()), None);
        draft.direction = draft.direction.reverse();
        assert_eq!(draft.next_player(id), Some(id));
        assert_eq!(draft.next_player(Uuid::new_v4()), None);
    }

    #[test]
    fn test_next_player() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let p3 = Uuid::new_v4();
        let p4 = Uuid::new_v4();
        let mut draft = packless_draft(vec![p1, p2, p3, p4]);

        draft.direction = PassDirection::Left;
        assert_eq!(draft.next_player(p1), Some(p4));
        assert_eq!(draft.next_player(p2), Some(p1));
        assert_eq!(draft.next_player(p3), Some(p2));
        assert_eq!(draft.next_player(p4), Some(p3));
        assert_eq!(draft.next_player(Uuid::new_v4()), None);
        draft.direction = draft.direction.reverse();
        assert_eq!(draft.next_player(p1), Some(p2));
        assert_eq!(draft.next_player(p2), Some(p3));
        assert_eq!(draft.next_player(p3), Some(p4));
        assert_eq!(draft.next_player(p4), Some(p1));
        assert_eq!(draft.next_player(Uuid::new_v4()), None);
    }

    #[test]
    fn test_mismatched_booster_count() {
        let rng = &mut StdRng::seed_from_u64(0);
        let players = vec![Uuid::new_v4(), Uuid::new_v4()];
        let boosters = sample_boosters(3, 5);
        assert!(Draft::new(players, boosters, DistributionMode::Regular, PickSettings::default(), rng).is_err());
    }

    #[test]
    fn test_simple_draft() {
        let rng = &mut StdRng::seed_from_u64(1);
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let p3 = Uuid::new_v4();
        let p4 = Uuid::new_v4();
        let players = vec![p1, p2, p3, p4];
        let cards_per_pack = 3;
        let rounds = 3;

        let boosters = sample_boosters(players.len() * rounds, cards_per_pack);
        let first_round: Vec<Vec<u64>> = boosters[..4].iter().map(uids).collect();
        let mut draft = Draft::new(
            players.clone(),
            boosters,
            DistributionMode::Regular,
            PickSettings::default(),
            rng,
        )
        .unwrap();

        let player_packs = draft.begin();

        // Check that all players were assigned their pack.
        assert_eq!(player_packs.len(), 4);
        for (seat, player) in players.iter().enumerate() {
            let (_, pack) = player_packs.iter().find(|(p, _)| p == player).unwrap();
            assert_eq!(uids(pack), first_round[seat]);
        }

        // Pick at invalid index should fail.
        assert!(draft.handle_pick(p1, &[cards_per_pack], &[]).is_err());
        // Wrong number of picks should fail.
        assert!(draft.handle_pick(p1, &[0, 1], &[]).is_err());
        // Pick from a player who is not in the draft should fail.
        assert!(draft.handle_pick(Uuid::new_v4(), &[0], &[]).is_err());

        // Nothing moves until every player has picked.
        let outcome = draft.handle_pick(p1, &[0], &[]).unwrap();
        assert_eq!(outcome.picked.len(), 1);
        assert_eq!(outcome.picked[0].uid, first_round[0][0]);
        assert!(outcome.new_packs.is_empty());
        assert!(draft.handle_pick(p1, &[0], &[]).is_err());
        assert_eq!(draft.waiting_on(), vec![p2, p3, p4]);
        assert!(draft.handle_pick(p3, &[2], &[]).unwrap().new_packs.is_empty());
        assert!(draft.handle_pick(p2, &[1], &[]).unwrap().new_packs.is_empty());

        // Last pick passes every pack to the left.
        let updates = draft.handle_pick(p4, &[0], &[]).unwrap().new_packs;
        assert_eq!(updates.len(), 4);
        assert!(updates.iter().all(|(_, pack)| pack.len() == cards_per_pack - 1));
        let (_, p4_pack) = updates.iter().find(|(p, _)| *p == p4).unwrap();
        assert_eq!(p4_pack[0].uid, first_round[0][1]);

        // Finish the first round.
        for &player in &players {
            draft.handle_pick(player, &[0], &[]).unwrap();
        }
        let mut updates = Vec::new();
        for &player in &players {
            updates = draft.handle_pick(player, &[0], &[]).unwrap().new_packs;
        }
        assert_eq!(updates.len(), 4);
        assert_eq!(draft.progress(), (2, 0));

        // Passing should be in the opposite direction now.
        let (_, p1_pack) = updates.iter().find(|(p, _)| *p == p1).unwrap();
        let p1_first = p1_pack[0].uid;
        for &player in &players {
            draft.handle_pick(player, &[1], &[]).unwrap();
        }
        assert_eq!(draft.current_pack(p2).unwrap()[0].uid, p1_first);

        // Complete pack 2 and pack 3.
        for _ in 0..(cards_per_pack * 2 - 1) {
            for &player in &players {
                assert!(draft.handle_pick(player, &[0], &[]).is_ok());
            }
        }

        // Validate that the draft is completed with all players having
        // drafted the appropriate number of cards.
        assert!(draft.draft_complete());
        assert!(draft.handle_pick(p1, &[0], &[]).is_err());
        assert!(players
            .iter()
            .all(|&player| draft.pools()[&player].len() == rounds * cards_per_pack));
    }

    #[test]
    fn test_picks_and_burns() {
        let rng = &mut StdRng::seed_from_u64(2);
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let settings = PickSettings {
            picks_per_round: 2,
            burns_per_round: 1,
            ..Default::default()
        };
        let mut draft = Draft::new(
            vec![p1, p2],
            sample_boosters(2, 7),
            DistributionMode::Regular,
            settings,
            rng,
        )
        .unwrap();
        draft.begin();

        assert_eq!(draft.expected_counts(p1), Some((2, 1)));
        assert!(draft.handle_pick(p1, &[0, 1], &[]).is_err());
        assert!(draft.handle_pick(p1, &[0, 1], &[1]).is_err());

        let outcome = draft.handle_pick(p1, &[0, 1], &[6]).unwrap();
        assert_eq!(outcome.picked.len(), 2);
        assert_eq!(outcome.burned.len(), 1);
        let updates = draft.handle_pick(p2, &[3, 4], &[5]).unwrap().new_packs;
        assert!(updates.iter().all(|(_, pack)| pack.len() == 4));

        for player in [p1, p2] {
            draft.handle_pick(player, &[0, 1], &[2]).unwrap();
        }

        // One card left: pick it, nothing to burn.
        assert_eq!(draft.expected_counts(p1), Some((1, 0)));
        draft.handle_pick(p1, &[0], &[]).unwrap();
        let outcome = draft.handle_pick(p2, &[0], &[]).unwrap();
        assert!(outcome.new_packs.is_empty());
        assert!(draft.draft_complete());
        assert_eq!(draft.pools()[&p1].len(), 5);
        assert_eq!(draft.pools()[&p2].len(), 5);
    }

    #[test]
    fn test_booster_settings_schedule() {
        let rng = &mut StdRng::seed_from_u64(3);
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let settings = PickSettings {
            booster_settings: vec![
                BoosterSettings {
                    picks: vec![2, 1],
                    burns: vec![0],
                },
                BoosterSettings {
                    picks: vec![1],
                    burns: vec![1],
                },
            ],
            ..Default::default()
        };
        let mut draft = Draft::new(
            vec![p1, p2],
            sample_boosters(4, 4),
            DistributionMode::Regular,
            settings,
            rng,
        )
        .unwrap();
        draft.begin();

        assert_eq!(draft.expected_counts(p1), Some((2, 0)));
        draft.handle_pick(p1, &[0, 1], &[]).unwrap();
        draft.handle_pick(p2, &[0, 1], &[]).unwrap();
        assert_eq!(draft.expected_counts(p1), Some((1, 0)));
        draft.handle_pick(p1, &[0], &[]).unwrap();
        draft.handle_pick(p2, &[0], &[]).unwrap();
        assert_eq!(draft.expected_counts(p2), Some((1, 0)));
        draft.handle_pick(p1, &[0], &[]).unwrap();
        draft.handle_pick(p2, &[0], &[]).unwrap();

        // Second booster round.
        assert_eq!(draft.progress(), (2, 0));
        assert_eq!(draft.expected_counts(p1), Some((1, 1)));
    }

    #[test]
    fn test_distribution_modes() {
        let rng = &mut StdRng::seed_from_u64(4);
        let players: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let boosters = sample_boosters(6, 2);
        let all: HashSet<u64> = boosters.iter().flat_map(uids).collect();

        let regular = distribute(boosters.clone(), 3, DistributionMode::Regular, rng);
        assert_eq!(regular.len(), 2);
        assert_eq!(uids(&regular[1][0]), uids(&boosters[3]));

        let shuffled = distribute(boosters.clone(), 3, DistributionMode::ShufflePlayerBoosters, rng);
        for seat in 0..3 {
            let mine: HashSet<Vec<u64>> = [uids(&boosters[seat]), uids(&boosters[seat + 3])].into();
            assert!(shuffled.iter().all(|round| mine.contains(&uids(&round[seat]))));
        }

        let pooled = distribute(boosters, 3, DistributionMode::ShuffleBoosterPool, rng);
        let dealt: HashSet<u64> = pooled.iter().flatten().flat_map(uids).collect();
        assert_eq!(dealt, all);
        assert_eq!(players.len(), pooled[0].len());
    }

    #[test]
    fn test_bot_pick() {
        let booster: Booster = [Rarity::Common, Rarity::Rare, Rarity::Uncommon, Rarity::Mythic]
            .into_iter()
            .map(|r| UniqueCard::new(Arc::new(Card::sample(r))))
            .collect();
        assert_eq!(bot_pick(&booster, 1, 0), (vec![3], vec![]));
        assert_eq!(bot_pick(&booster, 2, 1), (vec![3, 1], vec![0]));
        assert_eq!(bot_pick(&booster, 5, 5), (vec![3, 1, 2, 0], vec![]));
    }
}
