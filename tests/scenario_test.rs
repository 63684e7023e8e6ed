//! Scenario import and evaluation against a bootstrapped store

mod common;

use common::{fixture, memory_store};
use komet_core::{
    chronology::VersionData,
    scenario::{QueryOutcome, Scenario},
    stamp::Status,
};
use test_log::test;

fn text(outcome: &QueryOutcome) -> Option<&str> {
    match outcome.latest.as_ref().map(|v| &v.data) {
        Some(VersionData::Description { text, .. }) => Some(text.as_str()),
        _ => None,
    }
}

fn outcomes() -> Vec<QueryOutcome> {
    let store = memory_store();
    let scenario = Scenario::load(fixture("branching.toml")).unwrap();
    let report = scenario.apply(&store).unwrap();
    assert_eq!(report.paths, 3);
    assert_eq!(report.components.len(), 2);
    assert_eq!(report.stamps.len(), 5);
    let outcomes = scenario.evaluate(&store).unwrap();
    assert_eq!(outcomes.len(), scenario.queries.len());
    outcomes
}

#[test]
fn branches_see_their_own_history() {
    let outcomes = outcomes();
    assert_eq!(text(&outcomes[0]), Some("Myocardial infarction"));
    assert_eq!(text(&outcomes[1]), Some("Heart attack"));
    assert_eq!(text(&outcomes[2]), Some("Myocardial infarction (disorder)"));
}

#[test]
fn precedence_decides_merged_paths() {
    let outcomes = outcomes();
    // Hotfix work sits closer to the integration path than master does.
    assert_eq!(text(&outcomes[3]), Some("Myocardial infarction (disorder)"));
    assert!(!outcomes[3].is_contradicted());
    assert_eq!(text(&outcomes[4]), Some("Myocardial infarction"));
}

#[test]
fn status_filters_apply_after_resolution() {
    let outcomes = outcomes();
    assert!(!outcomes[5].is_present());
    let concept = outcomes[6].latest.as_ref().unwrap();
    assert_eq!(concept.stamp.status, Status::Active);
    assert_eq!(concept.stamp.time, 50);
}

#[test]
fn outcomes_render_for_the_cli() {
    let outcomes = outcomes();
    let rendered = outcomes[5].to_string();
    assert!(rendered.starts_with("active concept on release"));
    assert!(rendered.ends_with("absent"));
    assert!(outcomes[0].to_string().contains("Myocardial infarction"));
}
