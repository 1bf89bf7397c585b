//! Property-based tests for the reducer
//!
//! These tests verify key invariants hold across arbitrary update sequences.

use super::*;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn fresh_conversation() -> Conversation {
    let created_at = Utc
        .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    Conversation::new("prop-conv", created_at)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_stage() -> impl Strategy<Value = Stage> {
    prop_oneof![Just(Stage::One), Just(Stage::Two), Just(Stage::Three)]
}

fn arb_stage1() -> impl Strategy<Value = Vec<Stage1Response>> {
    proptest::collection::vec(
        ("[a-z]{3,8}/[a-z0-9-]{3,10}", "[a-zA-Z ]{0,30}")
            .prop_map(|(model, response)| Stage1Response { model, response }),
        0..4,
    )
}

fn arb_stage2() -> impl Strategy<Value = Vec<Stage2Ranking>> {
    proptest::collection::vec(
        ("[a-z]{3,8}/[a-z0-9-]{3,10}", prop::sample::subsequence(vec!["A", "B", "C"], 0..=3))
            .prop_map(|(model, order)| {
                let lines: Vec<String> = order
                    .iter()
                    .enumerate()
                    .map(|(i, label)| format!("{}. Response {label}", i + 1))
                    .collect();
                Stage2Ranking {
                    model,
                    ranking: format!("FINAL RANKING:\n{}", lines.join("\n")),
                    parsed_ranking: None,
                }
            }),
        0..4,
    )
}

fn arb_stage3() -> impl Strategy<Value = Stage3Result> {
    ("[a-z]{3,8}/[a-z0-9-]{3,10}", "[a-zA-Z ]{0,30}")
        .prop_map(|(model, response)| Stage3Result { model, response })
}

fn arb_stage_update() -> impl Strategy<Value = Update> {
    prop_oneof![
        arb_stage().prop_map(Update::StageStarted),
        arb_stage1().prop_map(Update::Stage1Completed),
        arb_stage2().prop_map(|rankings| Update::Stage2Completed {
            rankings,
            metadata: None
        }),
        arb_stage3().prop_map(Update::Stage3Completed),
        "[A-Za-z ]{1,20}".prop_map(Update::SetTitle),
        Just(Update::FinishTurn),
    ]
}

fn arb_update() -> impl Strategy<Value = Update> {
    prop_oneof![
        4 => arb_stage_update(),
        1 => "[a-z ]{1,20}".prop_map(|content| Update::AppendTurn { content }),
    ]
}

/// Updates in the order a well-behaved backend emits them
fn arb_well_formed_turn() -> impl Strategy<Value = Vec<Update>> {
    (arb_stage1(), arb_stage2(), arb_stage3(), proptest::option::of("[A-Za-z ]{1,20}"))
        .prop_map(|(stage1, stage2, stage3, title)| {
            let mut updates = vec![
                Update::StageStarted(Stage::One),
                Update::Stage1Completed(stage1),
                Update::StageStarted(Stage::Two),
                Update::Stage2Completed {
                    rankings: stage2,
                    metadata: None,
                },
                Update::StageStarted(Stage::Three),
                Update::Stage3Completed(stage3),
            ];
            if let Some(title) = title {
                updates.push(Update::SetTitle(title));
            }
            updates.push(Update::FinishTurn);
            updates
        })
}

fn run(updates: &[Update]) -> Conversation {
    let start = reduce(
        &fresh_conversation(),
        &Update::AppendTurn {
            content: "question".to_string(),
        },
    );
    updates.iter().fold(start, |conv, update| reduce(&conv, update))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: stage updates never touch anything but the last message
    #[test]
    fn prop_stage_updates_preserve_prefix(
        history in proptest::collection::vec(arb_update(), 0..10),
        update in arb_stage_update()
    ) {
        let before = run(&history);
        let after = reduce(&before, &update);
        let keep = before.messages.len().saturating_sub(1);

        prop_assert_eq!(after.messages.len(), before.messages.len());
        prop_assert_eq!(&after.messages[..keep], &before.messages[..keep]);
    }

    // Invariant 2: replaying the same sequence yields identical state
    #[test]
    fn prop_replay_is_deterministic(updates in proptest::collection::vec(arb_update(), 0..20)) {
        prop_assert_eq!(run(&updates), run(&updates));
    }

    // Invariant 3: a well-formed turn ends with every stage filled and nothing loading
    #[test]
    fn prop_well_formed_turn_finishes_clean(updates in arb_well_formed_turn()) {
        let conv = run(&updates);
        let open = conv.open_assistant().expect("placeholder is last");

        prop_assert!(!open.loading.any(), "still loading: {:?}", open.loading);
        for stage in Stage::ALL {
            prop_assert!(open.is_filled(stage), "{} not filled", stage.as_str());
        }
        let parsed_all = open
            .stage2
            .as_ref()
            .is_some_and(|rankings| rankings.iter().all(|r| r.parsed_ranking.is_some()));
        prop_assert!(parsed_all);
    }

    // Invariant 4: a filled slot is never overwritten
    #[test]
    fn prop_first_completion_wins(
        first in arb_stage3(),
        later in proptest::collection::vec(arb_stage_update(), 0..10)
    ) {
        let conv = run(&[Update::Stage3Completed(first.clone())]);
        let conv = later.iter().fold(conv, |c, u| reduce(&c, u));
        prop_assert_eq!(conv.open_assistant().and_then(|m| m.stage3.clone()), Some(first));
    }

    // Invariant 5: at most one assistant placeholder follows each user message
    #[test]
    fn prop_messages_alternate(updates in proptest::collection::vec(arb_update(), 0..20)) {
        let conv = run(&updates);
        for pair in conv.messages.chunks(2) {
            prop_assert!(!pair[0].is_assistant());
            prop_assert!(pair.get(1).is_some_and(Message::is_assistant));
        }
    }
}
