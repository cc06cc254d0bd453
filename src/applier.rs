//! Patch applier - runs an ordered rule list against one block of text.
//!
//! For each rule, in order, against the content as left by earlier rules:
//! 1. marker present: `AlreadyApplied`
//! 2. anchor absent: `NotApplicable`
//! 3. first candidate whose search text is found verbatim: substitute, `Applied`
//! 4. otherwise look for drift: `NearMiss` with a diagnostic, or `NotApplicable`
//!
//! Applying never touches the filesystem, environment, or clock; identical
//! inputs always yield identical outputs.

use crate::catalog::{Candidate, Rule};
use std::fmt;

/// Number of leading characters of a search text used to detect drift.
pub const DRIFT_PREFIX_CHARS: usize = 60;

/// Extra content lines scanned past the search length when looking for the
/// line closest to a divergent one.
const DRIFT_WINDOW_SLACK: usize = 8;

/// What happened when one rule met one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The marker (or post-condition) is already present
    AlreadyApplied,
    /// Candidate `variant` matched and was substituted `replaced` times.
    /// `left_over` counts further occurrences a first-occurrence rule left alone.
    Applied {
        variant: usize,
        replaced: usize,
        left_over: usize,
    },
    /// Anchor present but the search text has drifted
    NearMiss(String),
    /// This unit is not a candidate for the rule
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    AlreadyApplied,
    Applied,
    NearMiss,
    NotApplicable,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::AlreadyApplied => OutcomeKind::AlreadyApplied,
            Outcome::Applied { .. } => OutcomeKind::Applied,
            Outcome::NearMiss(_) => OutcomeKind::NearMiss,
            Outcome::NotApplicable => OutcomeKind::NotApplicable,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::AlreadyApplied => write!(f, "already applied"),
            Outcome::Applied {
                variant, replaced, ..
            } => {
                if *variant == 0 {
                    write!(f, "applied ({replaced} substitution(s))")
                } else {
                    write!(f, "applied via variant {variant} ({replaced} substitution(s))")
                }
            }
            Outcome::NearMiss(message) => write!(f, "near miss: {message}"),
            Outcome::NotApplicable => write!(f, "not applicable"),
        }
    }
}

/// Outcome of one rule, tagged with the rule and its phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub phase: String,
    pub outcome: Outcome,
}

/// Result of running a rule list over one block of text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Application carries the patched content"]
pub struct Application {
    pub content: String,
    pub outcomes: Vec<RuleOutcome>,
}

impl Application {
    /// Whether any rule substituted text.
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(|o| o.outcome.is_applied())
    }
}

/// Apply `rules` to `content` in order.
pub fn apply<'a, I>(content: &str, rules: I) -> Application
where
    I: IntoIterator<Item = &'a Rule>,
{
    let mut current = content.to_string();
    let mut squashed = SquashedContent::default();
    let outcomes = rules
        .into_iter()
        .map(|rule| RuleOutcome {
            rule_id: rule.id().to_string(),
            phase: rule.phase().to_string(),
            outcome: evaluate(&mut current, rule, &mut squashed),
        })
        .collect();

    Application {
        content: current,
        outcomes,
    }
}

/// Apply a single rule in place.
pub fn apply_rule(content: &mut String, rule: &Rule) -> Outcome {
    evaluate(content, rule, &mut SquashedContent::default())
}

fn evaluate(content: &mut String, rule: &Rule, squashed: &mut SquashedContent) -> Outcome {
    if is_satisfied(content, rule) {
        return Outcome::AlreadyApplied;
    }

    if !content.contains(rule.anchor()) {
        return Outcome::NotApplicable;
    }

    for (variant, candidate) in rule.candidates().iter().enumerate() {
        match substitute(content, candidate, rule.applies_once()) {
            Substitution::Absent => continue,
            Substitution::Done {
                replaced,
                left_over,
            } => {
                squashed.invalidate();
                return Outcome::Applied {
                    variant,
                    replaced,
                    left_over,
                };
            }
            Substitution::Unsettled { passes } => {
                return Outcome::NearMiss(format!(
                    "rule '{}': search text kept reappearing after {passes} substitutions; content left unchanged",
                    rule.id()
                ));
            }
        }
    }

    match detect_drift(content, rule, squashed) {
        Some(message) => Outcome::NearMiss(message),
        None => Outcome::NotApplicable,
    }
}

/// The single idempotence check shared by every rule.
///
/// A repeating rule is only satisfied once no search text remains, so a unit
/// with some call sites already rewritten still converges.
pub fn is_satisfied(content: &str, rule: &Rule) -> bool {
    if !content.contains(rule.idempotence_marker()) {
        return false;
    }
    rule.applies_once()
        || !rule
            .candidates()
            .iter()
            .any(|candidate| content.contains(candidate.search()))
}

enum Substitution {
    Absent,
    Done { replaced: usize, left_over: usize },
    /// A repeating rule kept forming new matches; nothing was written.
    Unsettled { passes: usize },
}

fn substitute(content: &mut String, candidate: &Candidate, once: bool) -> Substitution {
    let search = candidate.search();
    let initial = content.matches(search).count();
    let Some(first) = content.find(search) else {
        return Substitution::Absent;
    };

    if once {
        content.replace_range(first..first + search.len(), candidate.replacement());
        return Substitution::Done {
            replaced: 1,
            left_over: initial - 1,
        };
    }

    // Validated rules settle after `initial` passes. A replacement that forms a
    // new match with its neighbours keeps going, up to the budget.
    let budget = initial + content.len() / search.len().max(1) + 1;
    let mut work = content.clone();
    let mut replaced = 0;
    while let Some(start) = work.find(search) {
        if replaced == budget {
            return Substitution::Unsettled { passes: replaced };
        }
        work.replace_range(start..start + search.len(), candidate.replacement());
        replaced += 1;
    }

    *content = work;
    Substitution::Done {
        replaced,
        left_over: 0,
    }
}

/// Whitespace-collapsed copy of the content, built on first use and dropped
/// whenever a rule rewrites the content.
#[derive(Default)]
struct SquashedContent(Option<String>);

impl SquashedContent {
    fn get(&mut self, content: &str) -> &str {
        self.0.get_or_insert_with(|| squash_whitespace(content))
    }

    fn invalidate(&mut self) {
        self.0 = None;
    }
}

#[derive(Debug, Clone, Copy)]
enum DriftSignal {
    Prefix { at: usize },
    Whitespace,
}

fn detect_drift(content: &str, rule: &Rule, squashed: &mut SquashedContent) -> Option<String> {
    for candidate in rule.candidates() {
        let search = candidate.search();
        let prefix = char_prefix(search, DRIFT_PREFIX_CHARS);
        if prefix.len() < search.len() {
            if let Some(at) = content.find(prefix) {
                return Some(describe_drift(content, rule, search, DriftSignal::Prefix { at }));
            }
        }
    }

    for candidate in rule.candidates() {
        let search = candidate.search();
        let squashed_search = squash_whitespace(search);
        if squashed_search.is_empty() {
            continue;
        }
        if squashed.get(content).contains(&squashed_search) {
            return Some(describe_drift(content, rule, search, DriftSignal::Whitespace));
        }
    }

    None
}

fn describe_drift(content: &str, rule: &Rule, search: &str, signal: DriftSignal) -> String {
    let mut message = match signal {
        DriftSignal::Prefix { .. } => format!(
            "rule '{}': first {} characters of the search text found but not the full text",
            rule.id(),
            DRIFT_PREFIX_CHARS
        ),
        DriftSignal::Whitespace => format!(
            "rule '{}': search text found only with different whitespace",
            rule.id()
        ),
    };

    let Some((line_no, expected)) = search
        .lines()
        .enumerate()
        .find(|(_, line)| !content.contains(line))
    else {
        message.push_str("; every search line exists but not in this arrangement");
        return message;
    };

    message.push_str(&format!(
        "; search line {} not found: {:?}",
        line_no + 1,
        expected.trim()
    ));

    let search_lines = search.lines().count();
    let start = match signal {
        DriftSignal::Prefix { at } => at,
        DriftSignal::Whitespace => content
            .find(rule.anchor())
            .map_or(0, |at| lines_back(content, at, search_lines)),
    };
    let window = 2 * search_lines + DRIFT_WINDOW_SLACK;
    if let Some((score, closest)) = closest_line(&content[start..], expected, window) {
        message.push_str(&format!(
            "; closest line {:?} (similarity {:.2})",
            closest.trim(),
            score
        ));
    }

    message
}

/// Most similar line among the first `window` lines of `haystack`.
fn closest_line<'a>(haystack: &'a str, expected: &str, window: usize) -> Option<(f64, &'a str)> {
    let expected = expected.trim();
    haystack
        .lines()
        .take(window)
        .filter(|line| !line.trim().is_empty())
        .map(|line| (strsim::normalized_levenshtein(line.trim(), expected), line))
        .fold(None, |best: Option<(f64, &str)>, (score, line)| match best {
            Some((best_score, _)) if best_score >= score => best,
            _ => Some((score, line)),
        })
}

/// Byte offset of the start of the line `n` lines above the one holding `pos`.
fn lines_back(content: &str, pos: usize, n: usize) -> usize {
    content[..pos]
        .rmatch_indices('\n')
        .nth(n)
        .map_or(0, |(idx, _)| idx + 1)
}

/// The first `n` characters of `text`, cut on a char boundary.
fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
