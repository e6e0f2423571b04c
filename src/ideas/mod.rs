//! Idea submission, peer review and training workflow.
//!
//! An idea moves from submitted, through zero or more reviews (one per
//! reviewer), to trained. Every accepted review earns the reviewer a flat
//! point award.

pub mod roles;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::store::Collection;
use crate::time::{date_part, iso8601};

pub use roles::{AccessError, Action, Role, RoleTable};

pub const POINTS_PER_REVIEW: u64 = 5;

pub const PREDEFINED_TAGS: &[&str] = &[
    "UX",
    "backend",
    "frontend",
    "mobile",
    "AI/ML",
    "infrastructure",
    "security",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub reviewer: String,
    pub accurate: bool,
    pub reviewed_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
    pub tag: String,
    pub submitter: String,
    pub submitted_at: String,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub trained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<String>,
}

impl Idea {
    pub fn has_reviewed(&self, reviewer: &str) -> bool {
        self.reviews.iter().any(|review| review.reviewer == reviewer)
    }

    pub fn tally(&self) -> ReviewTally {
        ReviewTally {
            total: self.reviews.len(),
            accurate: self.reviews.iter().filter(|review| review.accurate).count(),
        }
    }

    pub fn submitted_on(&self) -> &str {
        date_part(&self.submitted_at)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewTally {
    pub total: usize,
    pub accurate: usize,
}

/// Raw submission form input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdeaDraft {
    pub text: String,
    pub link: String,
    pub tag: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Please enter an idea text.")]
    BlankText,
    #[error("Please select or enter a tag.")]
    BlankTag,
    #[error("idea {0} not found")]
    IdeaNotFound(u64),
    #[error("`{reviewer}` already reviewed idea {id}")]
    AlreadyReviewed { id: u64, reviewer: String },
}

/// Canonical spelling for predefined tags, trimmed text for custom ones.
pub fn resolve_tag(raw: &str) -> Option<String> {
    let tag = raw.trim();
    if tag.is_empty() {
        return None;
    }
    let canonical = PREDEFINED_TAGS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(tag))
        .copied()
        .unwrap_or(tag);
    Some(canonical.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdeaBook {
    ideas: Vec<Idea>,
}

impl Collection for IdeaBook {
    const FILE_NAME: &'static str = "ideas.json";
}

impl IdeaBook {
    pub fn ideas(&self) -> &[Idea] {
        &self.ideas
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Idea> {
        self.ideas.iter().find(|idea| idea.id == id)
    }

    pub fn has_reviewed(&self, id: u64, reviewer: &str) -> bool {
        self.get(id).is_some_and(|idea| idea.has_reviewed(reviewer))
    }

    pub fn review_tally(&self, id: u64) -> Result<ReviewTally, WorkflowError> {
        self.get(id)
            .map(Idea::tally)
            .ok_or(WorkflowError::IdeaNotFound(id))
    }

    pub fn next_id(&self) -> u64 {
        self.ideas.iter().map(|idea| idea.id).max().unwrap_or(0) + 1
    }

    pub fn submit(
        &mut self,
        draft: &IdeaDraft,
        submitter: &str,
        now: DateTime<Utc>,
    ) -> Result<&Idea, WorkflowError> {
        let text = draft.text.trim();
        if text.is_empty() {
            return Err(WorkflowError::BlankText);
        }
        let tag = resolve_tag(&draft.tag).ok_or(WorkflowError::BlankTag)?;
        let link = Some(draft.link.trim())
            .filter(|link| !link.is_empty())
            .map(ToOwned::to_owned);

        let id = self.next_id();
        self.ideas.push(Idea {
            id,
            text: text.to_string(),
            link,
            tag,
            submitter: submitter.to_string(),
            submitted_at: iso8601(now),
            reviews: Vec::new(),
            trained: false,
            trained_by: None,
            trained_at: None,
        });
        info!(id, submitter, "idea submitted");
        Ok(&self.ideas[self.ideas.len() - 1])
    }

    /// Appends `reviewer`'s verdict and awards the review points. A second
    /// review by the same reviewer is refused and awards nothing.
    pub fn review(
        &mut self,
        id: u64,
        reviewer: &str,
        accurate: bool,
        ledger: &mut PointLedger,
        now: DateTime<Utc>,
    ) -> Result<&Idea, WorkflowError> {
        let idea = self.find_mut(id)?;
        if idea.has_reviewed(reviewer) {
            return Err(WorkflowError::AlreadyReviewed {
                id,
                reviewer: reviewer.to_string(),
            });
        }
        idea.reviews.push(Review {
            reviewer: reviewer.to_string(),
            accurate,
            reviewed_at: iso8601(now),
        });
        let total = ledger.award(reviewer, POINTS_PER_REVIEW);
        info!(id, reviewer, accurate, points = total, "idea reviewed");
        Ok(&*idea)
    }

    pub fn mark_trained(
        &mut self,
        id: u64,
        trainer: &str,
        now: DateTime<Utc>,
    ) -> Result<&Idea, WorkflowError> {
        let idea = self.find_mut(id)?;
        idea.trained = true;
        idea.trained_by = Some(trainer.to_string());
        idea.trained_at = Some(iso8601(now));
        info!(id, trainer, "idea marked trained");
        Ok(&*idea)
    }

    /// Case-insensitive substring match over idea text and tag. A blank
    /// term matches everything.
    pub fn search(&self, term: &str) -> Vec<&Idea> {
        let needle = term.trim().to_lowercase();
        self.ideas
            .iter()
            .filter(|idea| {
                needle.is_empty()
                    || idea.text.to_lowercase().contains(&needle)
                    || idea.tag.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn pending_training(&self) -> Vec<&Idea> {
        self.ideas.iter().filter(|idea| !idea.trained).collect()
    }

    fn find_mut(&mut self, id: u64) -> Result<&mut Idea, WorkflowError> {
        self.ideas
            .iter_mut()
            .find(|idea| idea.id == id)
            .ok_or(WorkflowError::IdeaNotFound(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointLedger {
    points: BTreeMap<String, u64>,
}

impl Collection for PointLedger {
    const FILE_NAME: &'static str = "points.json";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub identity: String,
    pub points: u64,
}

impl PointLedger {
    pub fn points(&self, identity: &str) -> u64 {
        self.points.get(identity).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Adds `amount` to `identity`'s total and returns the new total.
    pub fn award(&mut self, identity: &str, amount: u64) -> u64 {
        let total = self.points.entry(identity.to_string()).or_insert(0);
        *total = total.saturating_add(amount);
        *total
    }

    /// Highest total first; ties keep alphabetical order.
    pub fn leaderboard(&self) -> Vec<Standing> {
        let mut rows = self.points.iter().collect::<Vec<_>>();
        rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        rows.into_iter()
            .enumerate()
            .map(|(idx, (identity, points))| Standing {
                rank: idx + 1,
                identity: identity.clone(),
                points: *points,
            })
            .collect()
    }
}
