use crate::state::{
    AppState,
    Participant,
    Prize,
    SiteConfig,
    Winner,
};
use proptest::prelude::*;

pub fn participants(n: usize) -> Vec<Participant> {
    (1..=n)
        .map(|i| {
            Participant::new(
                format!("p{i}"),
                format!("Participant {i}"),
                format!("E{i:03}"),
                if i % 2 == 0 { "Ops" } else { "R&D" },
            )
        })
        .collect()
}

/// Seed prizes, four participants, `p1` already holding prize `2`.
pub fn drawn_state() -> AppState {
    let mut state = AppState::seed();
    state.participants = participants(4);
    state.participants[0].is_winner = true;
    if let Some(prize) = state.prizes.iter_mut().find(|p| p.id == "2") {
        prize.drawn_count = 1;
    }
    state.winners = vec![Winner::new("w1", "p1", "2", 1_000)];
    state
}

/// A consistent document plus a valid, duplicate-free batch for one prize.
pub fn arb_draw_scenario() -> impl Strategy<Value = (AppState, Vec<Winner>)> {
    (2usize..20, prop::collection::vec(1u32..6, 1..4))
        .prop_flat_map(|(n, counts)| {
            let k = counts.len();
            (Just(n), Just(counts), 0..k, 0..k, 0usize..n, 1usize..6)
        })
        .prop_map(
            |(n, counts, prior_prize, draw_prize, prior_wanted, batch_wanted)| {
                let mut prizes: Vec<Prize> = counts
                    .iter()
                    .enumerate()
                    .map(|(i, count)| Prize::new(format!("prize-{i}"), format!("Prize {i}"), *count))
                    .collect();
                let prior = prior_wanted
                    .min(counts[prior_prize] as usize - 1)
                    .min(n - 1);
                prizes[prior_prize].drawn_count = prior as u32;

                let mut participants = participants(n);
                let prior_prize_id = prizes[prior_prize].id.clone();
                let winners: Vec<Winner> = participants[..prior]
                    .iter()
                    .enumerate()
                    .map(|(i, p)| Winner::new(format!("w{i}"), &p.id, &prior_prize_id, i as i64))
                    .collect();
                for participant in &mut participants[..prior] {
                    participant.is_winner = true;
                }

                let remaining = prizes[draw_prize].remaining() as usize;
                let size = batch_wanted.min(remaining).min(n - prior).max(1);
                let draw_prize_id = prizes[draw_prize].id.clone();
                let batch = participants[prior..prior + size]
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        Winner::new(format!("w-new-{i}"), &p.id, &draw_prize_id, 10_000 + i as i64)
                    })
                    .collect();

                let state = AppState {
                    participants,
                    prizes,
                    winners,
                    site_config: SiteConfig::default(),
                };
                (state, batch)
            },
        )
}

fn arb_text() -> impl Strategy<Value = String> {
    ".{0,12}"
}

fn arb_participant() -> impl Strategy<Value = Participant> {
    (arb_text(), arb_text(), arb_text(), arb_text(), any::<bool>()).prop_map(
        |(id, name, code, department, is_winner)| Participant {
            id,
            name,
            code,
            department,
            is_winner,
        },
    )
}

fn arb_prize() -> impl Strategy<Value = Prize> {
    (
        arb_text(),
        arb_text(),
        any::<u32>(),
        any::<u32>(),
        arb_text(),
        arb_text(),
    )
        .prop_map(|(id, name, count, drawn_count, description, image)| Prize {
            id,
            name,
            count,
            drawn_count,
            description,
            image,
        })
}

fn arb_winner() -> impl Strategy<Value = Winner> {
    (arb_text(), arb_text(), arb_text(), any::<i64>()).prop_map(
        |(id, participant_id, prize_id, timestamp)| Winner {
            id,
            participant_id,
            prize_id,
            timestamp,
        },
    )
}

/// Any document, consistent or not.
pub fn arb_app_state() -> impl Strategy<Value = AppState> {
    (
        prop::collection::vec(arb_participant(), 0..8),
        prop::collection::vec(arb_prize(), 0..5),
        prop::collection::vec(arb_winner(), 0..8),
        (arb_text(), arb_text(), arb_text()),
    )
        .prop_map(
            |(participants, prizes, winners, (brand_name, event_name, logo_url))| AppState {
                participants,
                prizes,
                winners,
                site_config: SiteConfig {
                    brand_name,
                    event_name,
                    logo_url,
                },
            },
        )
}
