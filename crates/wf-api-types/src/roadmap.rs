use serde::{Deserialize, Serialize};

/// The three independently generated pieces of a concept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    #[serde(alias = "content")]
    Tutorial,
    Resources,
    Quiz,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ContentKind::Tutorial => "tutorial",
            ContentKind::Resources => "resources",
            ContentKind::Quiz => "quiz",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_hours: f32,
    #[serde(default)]
    pub content_status: ContentStatus,
    #[serde(default)]
    pub resources_status: ContentStatus,
    #[serde(default)]
    pub quiz_status: ContentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub module_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub concepts: Vec<Concept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub stage_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<Module>,
}

/// Nested stage / module / concept tree of a generated roadmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapFramework {
    pub roadmap_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl RoadmapFramework {
    /// Every concept of the tree, in stage / module order.
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.stages
            .iter()
            .flat_map(|s| s.modules.iter())
            .flat_map(|m| m.concepts.iter())
    }

    pub fn concept(&self, concept_id: &str) -> Option<&Concept> {
        self.concepts().find(|c| c.concept_id == concept_id)
    }
}
