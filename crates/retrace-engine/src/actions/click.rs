//! Click executor: an ordered chain of strategies tried until one clicks something.
//!
//! 1. primary locator in the main document (full timeout; a disabled match gets Enter)
//! 2. primary locator in each embedded frame
//! 3. every fallback locator, main document then frames
//! 4. heuristics built from the recorded text: role button, text match, submit shapes

use super::{ActionContext, ActionOutcome, SETTLE_DELAY, StepError};
use crate::backend::{BackendError, ElementTarget};
use crate::resolution::sanitize::escape_attr;
use crate::resolution::{ResolvedLocators, candidate_hint};
use retrace_common::execution::LogLevel;
use retrace_common::trace::TraceStep;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

pub const FRAME_TIMEOUT: Duration = Duration::from_millis(3000);
pub const FALLBACK_TIMEOUT: Duration = Duration::from_millis(5000);
pub const HEURISTIC_TIMEOUT: Duration = Duration::from_millis(2000);

/// Generic submit-button shapes tried last.
pub const SUBMIT_SHAPES: [&str; 6] = [
    "button[type=\"submit\"]",
    "input[type=\"submit\"]",
    "form button:not([disabled])",
    "[data-testid*=\"submit\"]",
    "[data-test*=\"submit\"]",
    "[data-cy*=\"submit\"]",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicKind {
    RoleButton,
    Text,
    SubmitShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickStrategy {
    Primary(String),
    PrimaryInFrames(String),
    Fallback { rank: usize, locator: String },
    Heuristic { kind: HeuristicKind, locator: String },
}

impl ClickStrategy {
    pub fn locator(&self) -> &str {
        match self {
            ClickStrategy::Primary(l) | ClickStrategy::PrimaryInFrames(l) => l,
            ClickStrategy::Fallback { locator, .. } | ClickStrategy::Heuristic { locator, .. } => {
                locator
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            ClickStrategy::Primary(_) => "primary".into(),
            ClickStrategy::PrimaryInFrames(_) => "primary-frames".into(),
            ClickStrategy::Fallback { rank, .. } => format!("fallback-{}", rank),
            ClickStrategy::Heuristic { kind, .. } => match kind {
                HeuristicKind::RoleButton => "heuristic-role-button".into(),
                HeuristicKind::Text => "heuristic-text".into(),
                HeuristicKind::SubmitShape => "heuristic-submit".into(),
            },
        }
    }
}

/// Build the ordered strategy chain for a click step. Pure.
pub fn plan(locators: &ResolvedLocators, step: &TraceStep) -> Vec<ClickStrategy> {
    let mut heuristics = Vec::new();
    if let Some(hint) = candidate_hint(step.selectors.as_deref()) {
        heuristics.push((
            HeuristicKind::RoleButton,
            format!("role=button[name=\"{}\"]", escape_attr(&hint)),
        ));
        heuristics.push((HeuristicKind::Text, format!("text={}", hint)));
    }
    heuristics.extend(
        SUBMIT_SHAPES
            .iter()
            .map(|s| (HeuristicKind::SubmitShape, s.to_string())),
    );

    let mut chain = vec![
        ClickStrategy::Primary(locators.primary.clone()),
        ClickStrategy::PrimaryInFrames(locators.primary.clone()),
    ];
    for (i, locator) in locators.fallbacks.iter().enumerate() {
        chain.push(ClickStrategy::Fallback {
            rank: i + 1,
            locator: locator.clone(),
        });
    }

    let mut seen: HashSet<&str> = locators.all().collect();
    for (kind, locator) in &heuristics {
        if seen.insert(locator.as_str()) {
            chain.push(ClickStrategy::Heuristic {
                kind: *kind,
                locator: locator.clone(),
            });
        }
    }
    chain
}

/// How a strategy ended up activating the element.
struct Clicked {
    target: ElementTarget,
    keyboard: bool,
}

pub async fn execute(
    ctx: &mut ActionContext<'_>,
    locators: &ResolvedLocators,
) -> Result<ActionOutcome, StepError> {
    let strategies = plan(locators, ctx.step);

    for strategy in &strategies {
        let Some(clicked) = try_strategy(ctx, strategy).await else {
            continue;
        };

        let level = match strategy {
            ClickStrategy::Primary(_) => LogLevel::Info,
            _ => LogLevel::Warn,
        };
        let how = if clicked.keyboard {
            "activated disabled element with Enter"
        } else {
            "clicked"
        };
        ctx.log(
            level,
            format!("{} {} via {} strategy", how, clicked.target, strategy.label()),
        );
        tokio::time::sleep(SETTLE_DELAY).await;

        let mut outcome = ActionOutcome::new();
        outcome.insert("strategy".into(), json!(strategy.label()));
        outcome.insert("locator".into(), json!(clicked.target.locator));
        outcome.insert("frame".into(), json!(frame_index(&clicked.target)));
        outcome.insert("keyboardSubmit".into(), json!(clicked.keyboard));
        return Ok(outcome);
    }

    Err(StepError::ElementNotFound {
        locator: locators.primary.clone(),
        attempted: strategies.len(),
    })
}

async fn try_strategy(ctx: &mut ActionContext<'_>, strategy: &ClickStrategy) -> Option<Clicked> {
    let timeout = ctx.timeout();
    let result = match strategy {
        ClickStrategy::Primary(locator) => try_main(ctx, locator, timeout, true).await,
        ClickStrategy::PrimaryInFrames(locator) => try_frames(ctx, locator).await,
        ClickStrategy::Fallback { locator, .. } => {
            match try_main(ctx, locator, FALLBACK_TIMEOUT, false).await {
                Ok(clicked) => Ok(clicked),
                Err(_) => try_frames(ctx, locator).await,
            }
        }
        ClickStrategy::Heuristic { locator, .. } => {
            try_main(ctx, locator, HEURISTIC_TIMEOUT, false).await
        }
    };

    match result {
        Ok(clicked) => Some(clicked),
        Err(e) => {
            ctx.log(
                LogLevel::Debug,
                format!("{} strategy failed for {}: {}", strategy.label(), strategy.locator(), e),
            );
            None
        }
    }
}

async fn try_main(
    ctx: &mut ActionContext<'_>,
    locator: &str,
    timeout: Duration,
    activate_disabled: bool,
) -> Result<Clicked, BackendError> {
    let target = ElementTarget::main(locator);
    ctx.backend.wait_visible(&target, timeout).await?;

    if activate_disabled && ctx.backend.is_disabled(&target).await.unwrap_or(false) {
        // A disabled submit usually unlocks on Enter from the focused form.
        if let Err(e) = ctx.backend.focus(&target).await {
            ctx.log(LogLevel::Debug, format!("focus before Enter failed: {}", e));
        }
        ctx.backend.press_key("Enter", &[]).await?;
        return Ok(Clicked {
            target,
            keyboard: true,
        });
    }

    ctx.backend.click(&target).await?;
    Ok(Clicked {
        target,
        keyboard: false,
    })
}

async fn try_frames(ctx: &mut ActionContext<'_>, locator: &str) -> Result<Clicked, BackendError> {
    let frames = ctx.backend.frame_count().await.unwrap_or(0);
    for index in 0..frames {
        let target = ElementTarget::in_frame(locator, index);
        if ctx.backend.wait_visible(&target, FRAME_TIMEOUT).await.is_err() {
            continue;
        }
        if ctx.backend.click(&target).await.is_ok() {
            return Ok(Clicked {
                target,
                keyboard: false,
            });
        }
    }
    Err(BackendError::ElementNotFound {
        locator: format!("{} (in {} frames)", locator, frames),
    })
}

fn frame_index(target: &ElementTarget) -> Option<usize> {
    match target.frame {
        crate::backend::FrameScope::Main => None,
        crate::backend::FrameScope::Frame(i) => Some(i),
    }
}
