use crate::catalog::gate::parse_requirement;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// An ordered, immutable table of rules grouped into phases.
///
/// Rules are evaluated in declaration order. Rules belonging to one phase are
/// contiguous and phases appear in the order they are declared, so a later
/// phase may rely on text produced by an earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    meta: Metadata,
    phases: Vec<Phase>,
    rules: Vec<Rule>,
}

impl Catalog {
    /// Build a catalog, rejecting it if any rule or phase is malformed.
    pub fn new(
        meta: Metadata,
        phases: Vec<Phase>,
        rules: Vec<Rule>,
    ) -> Result<Self, ValidationError> {
        let catalog = Self {
            meta,
            phases,
            rules,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.id == id)
    }

    /// Rules of one phase, in declaration order.
    pub fn rules_in<'a>(&'a self, phase: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |rule| rule.phase == phase)
    }

    /// Copy of this catalog without the named phases or their rules.
    ///
    /// Dropping whole phases keeps every ordering guarantee intact, so the
    /// result is not re-validated (it may legitimately end up empty).
    pub(crate) fn without_phases(&self, dropped: &HashSet<&str>) -> Catalog {
        Catalog {
            meta: self.meta.clone(),
            phases: self
                .phases
                .iter()
                .filter(|phase| !dropped.contains(phase.id.as_str()))
                .cloned()
                .collect(),
            rules: self
                .rules
                .iter()
                .filter(|rule| !dropped.contains(rule.phase.as_str()))
                .cloned()
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyCatalog);
        }

        let mut phase_index: HashMap<&str, usize> = HashMap::new();
        for (idx, phase) in self.phases.iter().enumerate() {
            if phase.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: None,
                    field: "phases.id",
                });
                continue;
            }
            if phase_index.insert(phase.id.as_str(), idx).is_some() {
                issues.push(ValidationIssue::DuplicateId {
                    kind: "phase",
                    id: phase.id.clone(),
                });
            }
            if let Some(range) = &phase.version_range {
                if let Err(err) = parse_requirement(range) {
                    issues.push(ValidationIssue::InvalidCombo {
                        rule_id: None,
                        message: format!("phase '{}': {err}", phase.id),
                    });
                }
            }
        }

        let mut seen_rules = HashSet::new();
        let mut used_phases = HashSet::new();
        let mut last_phase = 0usize;

        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: None,
                    field: "id",
                });
            } else if !seen_rules.insert(rule.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    kind: "rule",
                    id: rule.id.clone(),
                });
            }

            match phase_index.get(rule.phase.as_str()) {
                Some(&idx) => {
                    if idx < last_phase {
                        issues.push(ValidationIssue::PhaseOrder {
                            rule_id: rule.id.clone(),
                            phase: rule.phase.clone(),
                        });
                    }
                    last_phase = last_phase.max(idx);
                    used_phases.insert(rule.phase.as_str());
                }
                None => issues.push(ValidationIssue::UnknownPhase {
                    rule_id: rule.id.clone(),
                    phase: rule.phase.clone(),
                }),
            }

            rule.check(&mut issues);
        }

        for phase in &self.phases {
            if !phase.id.trim().is_empty() && !used_phases.contains(phase.id.as_str()) {
                issues.push(ValidationIssue::EmptyPhase {
                    phase: phase.id.clone(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A named group of rules implementing one independent feature addition.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Phase {
    id: String,
    #[serde(default)]
    title: String,
    /// Semver requirement the host version must satisfy for this phase to run.
    #[serde(default)]
    version_range: Option<String>,
}

impl Phase {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            version_range: None,
        }
    }

    pub fn with_version_range(mut self, range: impl Into<String>) -> Self {
        self.version_range = Some(range.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable title, falling back to the id.
    pub fn title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.id
        } else {
            &self.title
        }
    }

    pub fn version_range(&self) -> Option<&str> {
        self.version_range.as_deref()
    }
}

/// One exact-text search and the text that replaces it.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Candidate {
    search: String,
    replacement: String,
}

impl Candidate {
    pub fn new(search: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replacement: replacement.into(),
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

/// A declarative find/replace transformation with its preconditions and
/// idempotence check.
///
/// The first candidate is the primary `search`/`replacement` pair; any further
/// candidates are variants of the same edit point (typically at another
/// indentation depth) tried in order.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "RuleDef")]
pub struct Rule {
    id: String,
    phase: String,
    description: Option<String>,
    anchor: String,
    candidates: Vec<Candidate>,
    applies_once: bool,
    marker: String,
}

impl Rule {
    /// A first-occurrence rule with a single candidate and no marker yet.
    pub fn new(
        id: impl Into<String>,
        phase: impl Into<String>,
        anchor: impl Into<String>,
        search: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            phase: phase.into(),
            description: None,
            anchor: anchor.into(),
            candidates: vec![Candidate::new(search, replacement)],
            applies_once: true,
            marker: String::new(),
        }
    }

    /// Add a fallback search with its own replacement.
    pub fn variant(mut self, search: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.candidates.push(Candidate::new(search, replacement));
        self
    }

    /// Text whose presence proves the rule already fired.
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Rewrite every occurrence instead of only the first.
    pub fn repeating(mut self) -> Self {
        self.applies_once = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    pub fn search(&self) -> &str {
        &self.candidates[0].search
    }

    pub fn replacement(&self) -> &str {
        &self.candidates[0].replacement
    }

    pub fn search_variants(&self) -> &[Candidate] {
        &self.candidates[1..]
    }

    /// Primary candidate followed by every variant.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn applies_once(&self) -> bool {
        self.applies_once
    }

    pub fn idempotence_marker(&self) -> &str {
        &self.marker
    }

    fn check(&self, issues: &mut Vec<ValidationIssue>) {
        let rule_id = Some(self.id.clone());

        if self.anchor.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                rule_id: rule_id.clone(),
                field: "anchor",
            });
        }
        let marker_missing = self.marker.trim().is_empty();
        if marker_missing {
            issues.push(ValidationIssue::MissingField {
                rule_id: rule_id.clone(),
                field: "marker",
            });
        }

        for (idx, candidate) in self.candidates.iter().enumerate() {
            let label = if idx == 0 {
                "search".to_string()
            } else {
                format!("variant {idx}")
            };

            if candidate.search.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: rule_id.clone(),
                    field: if idx == 0 { "search" } else { "variants.search" },
                });
                continue;
            }
            if candidate.search == candidate.replacement {
                issues.push(ValidationIssue::InvalidCombo {
                    rule_id: rule_id.clone(),
                    message: format!("{label}: replacement is identical to search"),
                });
            }
            if !self.applies_once && candidate.replacement.contains(&candidate.search) {
                issues.push(ValidationIssue::InvalidCombo {
                    rule_id: rule_id.clone(),
                    message: format!(
                        "{label}: repeating rule's replacement reintroduces its search text"
                    ),
                });
            } else if !self.applies_once && straddles(&candidate.search, &candidate.replacement) {
                issues.push(ValidationIssue::InvalidCombo {
                    rule_id: rule_id.clone(),
                    message: format!(
                        "{label}: repeating rule's replacement can combine with surrounding text to form its search text"
                    ),
                });
            }
            if !marker_missing {
                if !candidate.replacement.contains(&self.marker) {
                    issues.push(ValidationIssue::InvalidCombo {
                        rule_id: rule_id.clone(),
                        message: format!("{label}: replacement does not contain the marker"),
                    });
                }
                if candidate.search.contains(&self.marker) {
                    issues.push(ValidationIssue::InvalidCombo {
                        rule_id: rule_id.clone(),
                        message: format!("{label}: search already contains the marker"),
                    });
                }
            }
        }
    }
}

/// Whether `search` can match across an edge of `replacement`, partly inside
/// it and partly in the text around it.
fn straddles(search: &str, replacement: &str) -> bool {
    let (s, r) = (search.as_bytes(), replacement.as_bytes());
    let (s_len, r_len) = (s.len() as isize, r.len() as isize);
    // `offset` is where the search starts relative to the replacement.
    (1 - s_len..r_len)
        .filter(|&offset| offset < 0 || offset + s_len > r_len)
        .any(|offset| {
            let lo = offset.max(0);
            let hi = (offset + s_len).min(r_len);
            (lo..hi).all(|i| r[i as usize] == s[(i - offset) as usize])
        })
}

fn default_applies_once() -> bool {
    true
}

/// On-disk shape of a rule: the primary pair is flattened, variants are a list.
#[derive(Debug, Deserialize)]
struct RuleDef {
    id: String,
    phase: String,
    #[serde(default)]
    description: Option<String>,
    anchor: String,
    search: String,
    replacement: String,
    #[serde(default)]
    variants: Vec<Candidate>,
    #[serde(default = "default_applies_once")]
    applies_once: bool,
    #[serde(default)]
    marker: String,
}

impl From<RuleDef> for Rule {
    fn from(def: RuleDef) -> Self {
        let mut candidates = Vec::with_capacity(1 + def.variants.len());
        candidates.push(Candidate::new(def.search, def.replacement));
        candidates.extend(def.variants);
        Self {
            id: def.id,
            phase: def.phase,
            description: def.description,
            anchor: def.anchor,
            candidates,
            applies_once: def.applies_once,
            marker: def.marker,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyCatalog,
    MissingField {
        rule_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        kind: &'static str,
        id: String,
    },
    UnknownPhase {
        rule_id: String,
        phase: String,
    },
    /// Rule separated from the rest of its phase, or placed before a phase
    /// declared earlier.
    PhaseOrder {
        rule_id: String,
        phase: String,
    },
    EmptyPhase {
        phase: String,
    },
    InvalidCombo {
        rule_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyCatalog => write!(f, "rule catalog contains no rules"),
            ValidationIssue::MissingField { rule_id, field } => match rule_id {
                Some(id) => write!(f, "rule '{id}' missing required field '{field}'"),
                None => write!(f, "catalog entry missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} id '{id}'")
            }
            ValidationIssue::UnknownPhase { rule_id, phase } => {
                write!(f, "rule '{rule_id}' names undeclared phase '{phase}'")
            }
            ValidationIssue::PhaseOrder { rule_id, phase } => write!(
                f,
                "rule '{rule_id}' is out of order: rules of phase '{phase}' must be contiguous and follow phase declaration order"
            ),
            ValidationIssue::EmptyPhase { phase } => {
                write!(f, "phase '{phase}' has no rules")
            }
            ValidationIssue::InvalidCombo { rule_id, message } => match rule_id {
                Some(id) => write!(f, "rule '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid catalog configuration: {message}"),
            },
        }
    }
}
