use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// --- Syllabus Types ---

/// Where a syllabus came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Served from a stored syllabus.
    Cached,
    /// Synthesized by a model from live web sources.
    WebSourced,
    /// Academic source syllabi, enhanced by a model.
    AiEnhanced,
}

/// How far a step goes beyond the essentials. Ordered: `Core < Recommended < Deep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDepth {
    #[default]
    Core,
    Recommended,
    Deep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllabusStep {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_minutes: u32,
    #[serde(default)]
    pub depth: StepDepth,
    /// Academic sources backing the step, used by the extraction tier.
    #[serde(default)]
    pub source_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllabusModule {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<SyllabusStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Syllabus {
    pub discipline: String,
    pub provenance: Provenance,
    #[serde(default)]
    pub modules: Vec<SyllabusModule>,
}

impl Syllabus {
    pub fn total_minutes(&self) -> u32 {
        self.steps().map(|s| s.estimated_minutes).sum()
    }

    pub fn step_count(&self) -> usize {
        self.steps().count()
    }

    pub fn steps(&self) -> impl Iterator<Item = &SyllabusStep> {
        self.modules.iter().flat_map(|m| m.steps.iter())
    }
}

// --- Pruning ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneOptions {
    /// Deepest level kept.
    #[serde(default = "default_depth")]
    pub depth: StepDepth,
    #[serde(default)]
    pub time_budget_minutes: Option<u32>,
}

fn default_depth() -> StepDepth {
    StepDepth::Deep
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self {
            depth: StepDepth::Deep,
            time_budget_minutes: None,
        }
    }
}

/// Filter a syllabus by depth and time budget.
///
/// Steps deeper than `options.depth` are dropped. With a budget, shallower
/// steps claim time first (all core steps before any recommended ones), and
/// within a level earlier steps win; a step that doesn't fit is skipped while
/// later, shorter ones may still be kept. Output keeps the original order and
/// omits modules left without steps.
pub fn prune_syllabus(syllabus: &Syllabus, options: &PruneOptions) -> Syllabus {
    let mut eligible: Vec<(usize, usize, StepDepth, u32)> = syllabus
        .modules
        .iter()
        .enumerate()
        .flat_map(|(mi, module)| {
            module
                .steps
                .iter()
                .enumerate()
                .map(move |(si, step)| (mi, si, step.depth, step.estimated_minutes))
        })
        .filter(|(_, _, depth, _)| *depth <= options.depth)
        .collect();

    let kept: HashSet<(usize, usize)> = match options.time_budget_minutes {
        None => eligible.iter().map(|(mi, si, _, _)| (*mi, *si)).collect(),
        Some(budget) => {
            // Stable sort keeps document order within a depth level.
            eligible.sort_by_key(|(_, _, depth, _)| *depth);
            let mut used = 0u32;
            let mut kept = HashSet::new();
            for (mi, si, _, minutes) in eligible {
                if used.saturating_add(minutes) <= budget {
                    used += minutes;
                    kept.insert((mi, si));
                }
            }
            kept
        }
    };

    let modules = syllabus
        .modules
        .iter()
        .enumerate()
        .filter_map(|(mi, module)| {
            let steps: Vec<SyllabusStep> = module
                .steps
                .iter()
                .enumerate()
                .filter(|(si, _)| kept.contains(&(mi, *si)))
                .map(|(_, step)| step.clone())
                .collect();
            (!steps.is_empty()).then(|| SyllabusModule {
                title: module.title.clone(),
                steps,
            })
        })
        .collect();

    Syllabus {
        discipline: syllabus.discipline.clone(),
        provenance: syllabus.provenance,
        modules,
    }
}
