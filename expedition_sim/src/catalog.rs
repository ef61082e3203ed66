//! Mission catalog generation.
//!
//! Every generation replaces a station's offered missions wholesale. The
//! catalog always holds exactly `mission_limit` entries, sorted from the
//! mildest to the harshest tier.

use std::collections::BTreeMap;

use expedition_runtime::{MissionParams, MissionType};
use rand::{seq::SliceRandom, Rng};

use crate::{
    components::ExpeditionData,
    expedition_config::{DifficultyTier, ExpeditionConfig},
};

/// Picks `limit` tiers: a shuffled prefix of the configured tiers, topped up
/// by resampling when there are fewer tiers than slots, then stable-sorted by
/// tier value so equal tiers keep their shuffled order.
pub fn choose_difficulties<'a, R>(
    tiers: &'a [DifficultyTier],
    limit: usize,
    rng: &mut R,
) -> Vec<&'a DifficultyTier>
where
    R: Rng + ?Sized,
{
    if tiers.is_empty() {
        return Vec::new();
    }

    let mut chosen: Vec<&DifficultyTier> = tiers.iter().collect();
    chosen.shuffle(rng);
    chosen.truncate(limit);
    while chosen.len() < limit {
        chosen.push(&tiers[rng.gen_range(0..tiers.len())]);
    }
    chosen.sort_by_key(|tier| tier.value);
    chosen
}

/// Replaces `data.missions` with a fresh catalog of `limit` missions.
///
/// `active_mission` is left untouched; callers regenerating during a run
/// reset it themselves.
pub fn generate_missions<R>(
    data: &mut ExpeditionData,
    tiers: &[DifficultyTier],
    limit: usize,
    rng: &mut R,
) where
    R: Rng + ?Sized,
{
    let fallback = [DifficultyTier::fallback()];
    let tiers = if tiers.is_empty() { &fallback[..] } else { tiers };

    let mut missions = BTreeMap::new();
    for tier in choose_difficulties(tiers, limit, rng) {
        let index = data.next_index;
        data.next_index += 1;
        missions.insert(
            index,
            MissionParams {
                index,
                mission_type: MissionType::ALL[rng.gen_range(0..MissionType::ALL.len())],
                seed: rng.gen(),
                difficulty: tier.id.clone(),
            },
        );
    }
    data.missions = missions;
}

pub fn generate_catalog<R>(data: &mut ExpeditionData, config: &ExpeditionConfig, rng: &mut R)
where
    R: Rng + ?Sized,
{
    generate_missions(
        data,
        config.difficulty_tiers(),
        config.mission_limit(),
        rng,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use expedition_runtime::DEFAULT_DIFFICULTY;
    use rand::{rngs::SmallRng, SeedableRng};

    fn tiers(pairs: &[(&str, i32)]) -> Vec<DifficultyTier> {
        pairs
            .iter()
            .map(|(id, value)| DifficultyTier::new(*id, *value))
            .collect()
    }

    fn tier_value(all: &[DifficultyTier], mission: &MissionParams) -> i32 {
        all.iter()
            .find(|tier| tier.id == mission.difficulty)
            .map(|tier| tier.value)
            .expect("mission tier comes from the configured set")
    }

    #[test]
    fn catalog_always_holds_mission_limit_entries() {
        let mut rng = SmallRng::seed_from_u64(11);
        let cases = [
            tiers(&[]),
            tiers(&[("Only", 0)]),
            tiers(&[("A", 0), ("B", 1), ("C", 2)]),
            tiers(&[
                ("A", 0),
                ("B", 1),
                ("C", 2),
                ("D", 3),
                ("E", 4),
                ("F", 5),
                ("G", 6),
                ("H", 7),
            ]),
        ];

        for case in cases {
            let mut data = ExpeditionData::default();
            generate_missions(&mut data, &case, 6, &mut rng);
            assert_eq!(data.missions.len(), 6, "tiers: {case:?}");
        }
    }

    #[test]
    fn empty_tier_list_falls_back_to_default_tier() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut data = ExpeditionData::default();
        generate_missions(&mut data, &[], 6, &mut rng);
        assert!(data
            .missions
            .values()
            .all(|mission| mission.difficulty.as_str() == DEFAULT_DIFFICULTY));
    }

    #[test]
    fn indices_increase_across_generations() {
        let mut rng = SmallRng::seed_from_u64(5);
        let all = tiers(&[("A", 0), ("B", 1)]);
        let mut data = ExpeditionData::default();

        let mut seen = Vec::new();
        for _ in 0..4 {
            generate_missions(&mut data, &all, 6, &mut rng);
            seen.extend(data.missions.keys().copied());
        }

        assert_eq!(seen.len(), 24);
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(seen.first(), Some(&1));
        assert_eq!(data.next_index, 25);
    }

    #[test]
    fn missions_are_sorted_by_tier_value() {
        let all = tiers(&[("A", 0), ("B", 1), ("C", 2)]);
        for seed in 0..32 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut data = ExpeditionData::default();
            generate_missions(&mut data, &all, 6, &mut rng);

            let values: Vec<i32> = data
                .missions
                .values()
                .map(|mission| tier_value(&all, mission))
                .collect();
            assert!(
                values.windows(2).all(|pair| pair[0] <= pair[1]),
                "seed {seed}: {values:?}"
            );
        }
    }

    #[test]
    fn every_tier_appears_when_fewer_tiers_than_slots() {
        let all = tiers(&[("A", 0), ("B", 1), ("C", 2)]);
        let mut rng = SmallRng::seed_from_u64(42);
        let chosen = choose_difficulties(&all, 6, &mut rng);

        assert_eq!(chosen.len(), 6);
        for tier in &all {
            assert!(chosen.iter().any(|picked| picked.id == tier.id));
        }
    }

    #[test]
    fn equal_tiers_keep_shuffle_order() {
        let all = tiers(&[("P", 0), ("Q", 0), ("R", 0), ("S", 0), ("T", 0)]);

        let mut expected: Vec<&DifficultyTier> = all.iter().collect();
        expected.shuffle(&mut SmallRng::seed_from_u64(9));

        let chosen = choose_difficulties(&all, all.len(), &mut SmallRng::seed_from_u64(9));
        let chosen_ids: Vec<&str> = chosen.iter().map(|tier| tier.id.as_str()).collect();
        let expected_ids: Vec<&str> = expected.iter().map(|tier| tier.id.as_str()).collect();
        assert_eq!(chosen_ids, expected_ids);
    }

    #[test]
    fn more_tiers_than_slots_picks_distinct_tiers() {
        let all = tiers(&[
            ("A", 0),
            ("B", 1),
            ("C", 2),
            ("D", 3),
            ("E", 4),
            ("F", 5),
            ("G", 6),
        ]);
        let mut rng = SmallRng::seed_from_u64(17);
        let chosen = choose_difficulties(&all, 6, &mut rng);

        let mut ids: Vec<&str> = chosen.iter().map(|tier| tier.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn regeneration_leaves_active_mission_alone() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut data = ExpeditionData {
            active_mission: 3,
            ..ExpeditionData::default()
        };
        generate_catalog(&mut data, &ExpeditionConfig::default(), &mut rng);
        assert_eq!(data.active_mission, 3);
        assert!(!data.missions.contains_key(&0));
    }
}
