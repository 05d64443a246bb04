//! Experience buffer: bounded ring of action outcomes.
//!
//! Append-only with oldest-first eviction. Durable persistence, when
//! wanted, is an external collaborator reading `batch`.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::domain::models::experience::{Experience, ExperienceDraft};

/// Query for `batch`.
#[derive(Debug, Clone, Default)]
pub struct BatchQuery {
    /// Restrict to one agent when set.
    pub agent_id: Option<String>,
    /// Maximum entries returned (newest first).
    pub n: usize,
}

/// Mean-reward summary over an agent's recent experiences.
#[derive(Debug, Clone, Default)]
pub struct ExperienceSummary {
    pub count: usize,
    pub mean_reward: f64,
    pub successes: usize,
    pub entries: Vec<Experience>,
}

struct Ring {
    entries: VecDeque<Experience>,
    next_id: u64,
}

/// Fixed-capacity in-memory experience store.
pub struct ExperienceBuffer {
    capacity: usize,
    inner: Mutex<Ring>,
}

impl ExperienceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Ring {
                entries: VecDeque::new(),
                next_id: 0,
            }),
        }
    }

    /// Append an experience; evicts the oldest entry when full. Returns
    /// the assigned id.
    pub async fn log(&self, draft: ExperienceDraft) -> u64 {
        let mut ring = self.inner.lock().await;
        let id = ring.next_id;
        ring.next_id += 1;
        if ring.entries.len() == self.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(draft.into_experience(id));
        id
    }

    /// Last `n` experiences for one agent, oldest first.
    pub async fn recent(&self, agent_id: &str, n: usize) -> Vec<Experience> {
        let ring = self.inner.lock().await;
        ring.entries
            .iter()
            .rev()
            .filter(|e| e.agent_id == agent_id)
            .take(n)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Newest-first slice, optionally filtered by agent.
    pub async fn batch(&self, query: &BatchQuery) -> Vec<Experience> {
        let ring = self.inner.lock().await;
        ring.entries
            .iter()
            .rev()
            .filter(|e| {
                query
                    .agent_id
                    .as_ref()
                    .is_none_or(|agent| &e.agent_id == agent)
            })
            .take(query.n)
            .cloned()
            .collect()
    }

    /// Mean reward over the agent's last `n` entries plus the tail slice.
    pub async fn summarize(&self, agent_id: &str, n: usize) -> ExperienceSummary {
        let entries = self.recent(agent_id, n).await;
        if entries.is_empty() {
            return ExperienceSummary::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let mean_reward = entries.iter().map(|e| e.reward).sum::<f64>() / entries.len() as f64;
        ExperienceSummary {
            count: entries.len(),
            mean_reward,
            successes: entries.iter().filter(|e| e.success).count(),
            entries,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }
}
