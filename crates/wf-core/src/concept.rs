use serde::{Deserialize, Serialize};
use wf_api_types::{Concept, ContentKind, ContentStatus};

// ---------------------------------------------------------------------------
// ConceptStatusSet
// ---------------------------------------------------------------------------

/// Per-concept generation status of the three content pieces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptStatusSet {
    pub tutorial: ContentStatus,
    pub resources: ContentStatus,
    pub quiz: ContentStatus,
}

/// Derived state of a concept as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptAggregate {
    Pending,
    Loading,
    Completed,
    Failed,
    PartiallyFailed,
}

impl ConceptStatusSet {
    pub fn from_concept(concept: &Concept) -> Self {
        Self {
            tutorial: concept.content_status,
            resources: concept.resources_status,
            quiz: concept.quiz_status,
        }
    }

    pub fn get(&self, kind: ContentKind) -> ContentStatus {
        match kind {
            ContentKind::Tutorial => self.tutorial,
            ContentKind::Resources => self.resources,
            ContentKind::Quiz => self.quiz,
        }
    }

    pub fn set(&mut self, kind: ContentKind, status: ContentStatus) {
        match kind {
            ContentKind::Tutorial => self.tutorial = status,
            ContentKind::Resources => self.resources = status,
            ContentKind::Quiz => self.quiz = status,
        }
    }

    pub fn apply(&mut self, patch: &ConceptStatusPatch) {
        if let Some(s) = patch.tutorial {
            self.tutorial = s;
        }
        if let Some(s) = patch.resources {
            self.resources = s;
        }
        if let Some(s) = patch.quiz {
            self.quiz = s;
        }
    }

    fn all(&self) -> [ContentStatus; 3] {
        [self.tutorial, self.resources, self.quiz]
    }

    /// Derive the aggregate state.
    ///
    /// `Loading` wins whenever any piece is generating; otherwise all-failed
    /// is `Failed` and a mix of failed and completed is `PartiallyFailed`.
    pub fn aggregate(&self) -> ConceptAggregate {
        let all = self.all();
        if all.contains(&ContentStatus::Generating) {
            return ConceptAggregate::Loading;
        }
        let failed = all.iter().filter(|s| **s == ContentStatus::Failed).count();
        let completed = all.iter().filter(|s| **s == ContentStatus::Completed).count();
        if failed == all.len() {
            ConceptAggregate::Failed
        } else if failed > 0 && completed > 0 {
            ConceptAggregate::PartiallyFailed
        } else if completed == all.len() {
            ConceptAggregate::Completed
        } else {
            ConceptAggregate::Pending
        }
    }

    pub fn has_failure(&self) -> bool {
        self.all().contains(&ContentStatus::Failed)
    }
}

/// Keyed partial update of a concept's sub-statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConceptStatusPatch {
    pub tutorial: Option<ContentStatus>,
    pub resources: Option<ContentStatus>,
    pub quiz: Option<ContentStatus>,
}

impl ConceptStatusPatch {
    pub fn single(kind: ContentKind, status: ContentStatus) -> Self {
        let mut patch = Self::default();
        match kind {
            ContentKind::Tutorial => patch.tutorial = Some(status),
            ContentKind::Resources => patch.resources = Some(status),
            ContentKind::Quiz => patch.quiz = Some(status),
        }
        patch
    }
}
