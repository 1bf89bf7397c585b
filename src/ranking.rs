//! Peer-ranking helpers
//!
//! Council members rank anonymized answers (`Response A`, `Response B`, ...)
//! and end their evaluation with a `FINAL RANKING:` section. The backend
//! usually ships the parsed ranking and the aggregate; these helpers fill the
//! gaps when it does not, and map labels back to model names for display.

use crate::state::{AggregateRank, Stage2Ranking};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Everything after the `FINAL RANKING:` marker
static RANKING_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)final ranking:(.*)$").expect("Invalid ranking section regex"));

/// `1. Response C`
static NUMBERED_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\.\s*response ([a-z])\b").expect("Invalid numbered entry regex")
});

/// Bare `Response C`
static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)response ([a-z])\b").expect("Invalid label regex"));

/// Extract the ordered labels from a ranking text.
///
/// Numbered entries are preferred; otherwise every label after the marker is
/// taken in order. Without a marker the result is empty. Labels are
/// normalized to `Response X`.
pub fn parse_final_ranking(text: &str) -> Vec<String> {
    let Some(section) = RANKING_SECTION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return Vec::new();
    };

    let numbered = collect_labels(&NUMBERED_ENTRY, section);
    if numbered.is_empty() {
        collect_labels(&LABEL, section)
    } else {
        numbered
    }
}

fn collect_labels(pattern: &Regex, section: &str) -> Vec<String> {
    pattern
        .captures_iter(section)
        .filter_map(|caps| caps.get(1))
        .map(|letter| format!("Response {}", letter.as_str().to_ascii_uppercase()))
        .collect()
}

/// Fill in `parsed_ranking` for entries the backend left unparsed
pub fn with_parsed_rankings(rankings: &[Stage2Ranking]) -> Vec<Stage2Ranking> {
    rankings
        .iter()
        .map(|entry| {
            let mut entry = entry.clone();
            if entry.parsed_ranking.is_none() {
                entry.parsed_ranking = Some(parse_final_ranking(&entry.ranking));
            }
            entry
        })
        .collect()
}

/// Average position of each model across all rankings, best first.
///
/// Labels missing from `label_to_model` are skipped. Averages are rounded to
/// two decimals; ties keep the order in which models were first ranked.
pub fn aggregate_rankings(
    rankings: &[Stage2Ranking],
    label_to_model: &BTreeMap<String, String>,
) -> Vec<AggregateRank> {
    let mut positions: Vec<(String, Vec<usize>)> = Vec::new();

    for entry in rankings {
        let parsed = entry
            .parsed_ranking
            .clone()
            .unwrap_or_else(|| parse_final_ranking(&entry.ranking));

        for (index, label) in parsed.iter().enumerate() {
            let Some(model) = label_to_model.get(label) else {
                continue;
            };
            match positions.iter_mut().find(|(name, _)| name == model) {
                Some((_, seen)) => seen.push(index + 1),
                None => positions.push((model.clone(), vec![index + 1])),
            }
        }
    }

    let mut aggregate: Vec<AggregateRank> = positions
        .into_iter()
        .map(|(model, seen)| {
            #[allow(clippy::cast_precision_loss)]
            let average = seen.iter().sum::<usize>() as f64 / seen.len() as f64;
            AggregateRank {
                model,
                average_rank: (average * 100.0).round() / 100.0,
                rankings_count: seen.len(),
            }
        })
        .collect();

    aggregate.sort_by(|a, b| a.average_rank.total_cmp(&b.average_rank));
    aggregate
}

/// `openai/gpt-4o` -> `gpt-4o`
pub fn short_model_name(model: &str) -> &str {
    model
        .split_once('/')
        .map_or(model, |(_, name)| if name.is_empty() { model } else { name })
}

/// Replace anonymous labels with bold short model names
pub fn deanonymize(text: &str, label_to_model: &BTreeMap<String, String>) -> String {
    label_to_model
        .iter()
        .fold(text.to_string(), |acc, (label, model)| {
            acc.replace(label.as_str(), &format!("**{}**", short_model_name(model)))
        })
}
