use color_eyre::eyre::{
    Result,
    eyre,
};
use draw_sync::{
    state::{
        AppState,
        Timestamp,
        Winner,
    },
    transaction::apply_draw,
};
use rand::Rng;
use std::collections::HashSet;

/// Winners for the named participants, checked against `state` before
/// anything is sent.
pub fn named_batch(
    state: &AppState,
    prize_id: &str,
    participant_ids: &[String],
    timestamp: Timestamp,
) -> Result<Vec<Winner>> {
    let ids = fresh_ids(state, participant_ids.len());
    let batch: Vec<Winner> = ids
        .into_iter()
        .zip(participant_ids)
        .map(|(id, participant_id)| {
            Winner::new(id, participant_id.as_str(), prize_id, timestamp)
        })
        .collect();
    apply_draw(state, &batch).map_err(|e| eyre!("draw rejected: {e}"))?;
    Ok(batch)
}

/// `count` winners picked uniformly from the available pool.
pub fn random_batch<R: Rng + ?Sized>(
    state: &AppState,
    prize_id: &str,
    count: usize,
    timestamp: Timestamp,
    rng: &mut R,
) -> Result<Vec<Winner>> {
    let pool: Vec<&str> = state.available_pool().map(|p| p.id.as_str()).collect();
    if count > pool.len() {
        return Err(eyre!(
            "cannot draw {count} winners from a pool of {}",
            pool.len()
        ));
    }
    let picked: Vec<String> = rand::seq::index::sample(rng, pool.len(), count)
        .into_iter()
        .map(|index| pool[index].to_string())
        .collect();
    named_batch(state, prize_id, &picked, timestamp)
}

fn fresh_ids(state: &AppState, count: usize) -> Vec<String> {
    let mut issued = HashSet::new();
    while issued.len() < count {
        issued.insert(state.fresh_id());
    }
    issued.into_iter().collect()
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use draw_sync::state::{
        Participant,
        Prize,
    };
    use proptest::prelude::*;
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    fn state(participants: usize) -> AppState {
        AppState {
            participants: (1..=participants)
                .map(|i| Participant::new(format!("p{i}"), format!("Guest {i}"), "", ""))
                .collect(),
            prizes: vec![Prize::new("2", "First Prize", 3)],
            ..AppState::default()
        }
    }

    #[test]
    fn named_batch__unknown_participant__is_rejected_locally() {
        // given
        let state = state(2);

        // when
        let result = named_batch(&state, "2", &["p9".to_string()], 1_000);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn named_batch__uses_unused_winner_ids() {
        // given
        let state = state(3);
        let ids = vec!["p1".to_string(), "p3".to_string()];

        // when
        let batch = named_batch(&state, "2", &ids, 1_000).unwrap();

        // then
        let participants: Vec<_> = batch.iter().map(|w| w.participant_id.as_str()).collect();
        assert_eq!(participants, vec!["p1", "p3"]);
        assert_ne!(batch[0].id, batch[1].id);
        assert!(batch.iter().all(|w| !state.ids().contains(w.id.as_str())));
    }

    #[test]
    fn random_batch__more_than_pool__is_rejected() {
        // given
        let state = state(2);
        let mut rng = StdRng::seed_from_u64(7);

        // when
        let result = random_batch(&state, "2", 3, 1_000, &mut rng);

        // then
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn random_batch__picks_distinct_pool_members(
            participants in 4usize..12,
            count in 1usize..=3,
            seed in any::<u64>(),
        ) {
            let mut state = state(participants);
            state.participants[0].is_winner = true;
            let mut rng = StdRng::seed_from_u64(seed);

            let batch = random_batch(&state, "2", count, 1_000, &mut rng).unwrap();

            let picked: HashSet<_> = batch.iter().map(|w| w.participant_id.clone()).collect();
            prop_assert_eq!(picked.len(), count);
            prop_assert!(!picked.contains("p1"));
        }
    }
}
