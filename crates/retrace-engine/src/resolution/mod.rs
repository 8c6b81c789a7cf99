//! Selector resolution: turns recorded selector candidates into ranked locator strings.
//!
//! Resolution is pure. The same candidate list always yields the same ordering, so
//! every ranking rule here can be tested without a browser.
//!
//! Scoring tiers (higher is tried first):
//! - element `id` attribute: 100
//! - explicit `selector` field: 95
//! - `data-testid` style attributes: 90
//! - `role` + accessible name: 85
//! - `name` attribute: 80
//! - visible `text`: 75
//! - `css`: 60
//! - class list: 50
//! - `xpath`: 40
//! - raw string candidate: 10
//!
//! Locators that depend on sibling position (`:nth-child(...)`) lose 30 points.

pub mod result;
pub mod sanitize;

pub use result::{LocatorSource, ResolvedLocators, ScoredLocator};

use retrace_common::trace::{SelectorCandidate, SelectorSpec};
use sanitize::{
    HIGHLIGHT_CLASS, escape_attr, is_css_identifier, is_positional, normalize_text,
    sanitize_locator,
};
use std::collections::HashSet;

pub const SCORE_ID: i32 = 100;
pub const SCORE_SELECTOR: i32 = 95;
pub const SCORE_TEST_ID: i32 = 90;
pub const SCORE_ROLE: i32 = 85;
pub const SCORE_NAME_ATTR: i32 = 80;
pub const SCORE_TEXT: i32 = 75;
pub const SCORE_CSS: i32 = 60;
pub const SCORE_CLASS: i32 = 50;
pub const SCORE_XPATH: i32 = 40;
pub const SCORE_RAW: i32 = 10;
pub const POSITIONAL_PENALTY: i32 = 30;

/// Marker attribute the recorder stamps on every captured element.
pub const STEP_MARKER_ATTR: &str = "data-workflow-step-id";

const TEST_ID_ATTRS: [&str; 5] = ["data-testid", "data-test-id", "data-test", "data-cy", "data-qa"];

/// Locator keyed to the recorder's marker attribute for `step_id`.
pub fn synthetic_locator(step_id: &str) -> String {
    format!("[{}=\"{}\"]", STEP_MARKER_ATTR, escape_attr(step_id))
}

/// Rank the locators derivable from `selectors`.
///
/// `None` and empty lists, as well as lists where no candidate yields a usable
/// locator, resolve to the synthetic step-id locator so that every step has a target.
pub fn resolve_locators(step_id: &str, selectors: Option<&[SelectorCandidate]>) -> ResolvedLocators {
    let mut ranked: Vec<ScoredLocator> = selectors
        .unwrap_or_default()
        .iter()
        .flat_map(generate_locators)
        .collect();

    // Stable sort keeps generation order among exact ties.
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });

    let mut seen = HashSet::new();
    ranked.retain(|s| seen.insert(s.locator.clone()));

    if ranked.is_empty() {
        let locator = synthetic_locator(step_id);
        return ResolvedLocators {
            primary: locator.clone(),
            fallbacks: Vec::new(),
            ranked: vec![ScoredLocator {
                locator,
                score: 0,
                source: LocatorSource::Synthetic,
                confidence: 0.0,
            }],
            synthetic: true,
        };
    }

    let mut locators = ranked.iter().map(|s| s.locator.clone());
    let primary = locators.next().unwrap_or_else(|| synthetic_locator(step_id));
    let fallbacks = locators.collect();

    ResolvedLocators {
        primary,
        fallbacks,
        ranked,
        synthetic: false,
    }
}

/// All scored locators one candidate can produce, in generation order.
pub fn generate_locators(candidate: &SelectorCandidate) -> Vec<ScoredLocator> {
    match candidate {
        SelectorCandidate::Raw(raw) => scored(raw, SCORE_RAW, LocatorSource::Raw, 0.0)
            .into_iter()
            .collect(),
        SelectorCandidate::Structured(spec) => generate_structured(spec),
    }
}

fn generate_structured(spec: &SelectorSpec) -> Vec<ScoredLocator> {
    let confidence = spec.confidence.unwrap_or(0.0);
    let mut out = Vec::new();
    let mut push = |locator: Option<String>, score: i32, source: LocatorSource| {
        if let Some(s) = locator.and_then(|l| scored(&l, score, source, confidence)) {
            out.push(s);
        }
    };

    push(spec.attribute("id").map(id_locator), SCORE_ID, LocatorSource::Id);

    for attr in TEST_ID_ATTRS {
        push(
            spec.attribute(attr)
                .map(|v| format!("[{}=\"{}\"]", attr, escape_attr(v))),
            SCORE_TEST_ID,
            LocatorSource::TestId,
        );
    }

    push(spec.selector.clone(), SCORE_SELECTOR, LocatorSource::Selector);

    if let Some(role) = spec.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        let name = spec
            .name
            .as_deref()
            .or(spec.text.as_deref())
            .and_then(normalize_text);
        push(
            name.map(|n| format!("role={}[name=\"{}\"]", role, escape_attr(&n))),
            SCORE_ROLE,
            LocatorSource::Role,
        );
    }

    push(
        spec.attribute("name")
            .map(|v| format!("[name=\"{}\"]", escape_attr(v))),
        SCORE_NAME_ATTR,
        LocatorSource::NameAttribute,
    );

    push(
        spec.text
            .as_deref()
            .and_then(normalize_text)
            .map(|t| format!("text={}", t)),
        SCORE_TEXT,
        LocatorSource::Text,
    );

    push(spec.css.clone(), SCORE_CSS, LocatorSource::Css);

    push(
        spec.attribute("class").and_then(class_locator),
        SCORE_CLASS,
        LocatorSource::Class,
    );

    push(
        spec.xpath.as_deref().map(|x| {
            if x.starts_with("xpath=") {
                x.to_string()
            } else {
                format!("xpath={}", x)
            }
        }),
        SCORE_XPATH,
        LocatorSource::Xpath,
    );

    out
}

fn scored(raw: &str, base: i32, source: LocatorSource, confidence: f64) -> Option<ScoredLocator> {
    let locator = sanitize_locator(raw)?;
    let penalty = if is_positional(&locator) {
        POSITIONAL_PENALTY
    } else {
        0
    };
    Some(ScoredLocator {
        locator,
        score: base - penalty,
        source,
        confidence,
    })
}

fn id_locator(id: &str) -> String {
    if is_css_identifier(id) {
        format!("#{}", id)
    } else {
        format!("[id=\"{}\"]", escape_attr(id))
    }
}

fn class_locator(classes: &str) -> Option<String> {
    let tokens: Vec<&str> = classes
        .split_whitespace()
        .filter(|c| *c != HIGHLIGHT_CLASS && is_css_identifier(c))
        .collect();
    if tokens.is_empty() {
        return None;
    }
    Some(tokens.iter().map(|c| format!(".{}", c)).collect())
}

/// Hint text for heuristic lookups: the first candidate's text, accessible name or label.
pub fn candidate_hint(selectors: Option<&[SelectorCandidate]>) -> Option<String> {
    let SelectorCandidate::Structured(spec) = selectors?.first()? else {
        return None;
    };
    spec.text
        .as_deref()
        .or(spec.name.as_deref())
        .or(spec.attribute("aria-label"))
        .or(spec.attribute("value"))
        .and_then(normalize_text)
}
