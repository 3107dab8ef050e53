//! Wire types for the maintenance ticket backend.
//!
//! All structs mirror the backend's camelCase JSON. Patch bodies use
//! `skip_serializing_if` so partial updates only carry the fields being
//! written; the subcategory field is double-optional because clearing it
//! requires an explicit `null` on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Tickets
// =============================================================================

/// Lifecycle states of a maintenance ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    New,
    Open,
    Done,
    Cancelled,
}

impl TicketStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Open => "OPEN",
            Self::Done => "DONE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// DONE and CANCELLED expose no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        };
        f.write_str(s)
    }
}

/// Subcategory reference carried on a ticket and in patch bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subcategory {
    pub name: String,
    pub display_name: String,
}

/// Location reference attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Attachment reference (append/remove only; storage is out of scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A maintenance ticket as returned by the backend.
///
/// The client never mutates this locally; after a successful patch the
/// orchestrator re-fetches the ticket so server-computed fields stay
/// authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<Subcategory>,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub locations: Vec<LocationRef>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Ticket {
    /// A ticket with no category or no priority can never leave NEW via
    /// assignment.
    #[must_use]
    pub fn is_assignable(&self) -> bool {
        self.category.as_deref().is_some_and(|c| !c.is_empty()) && self.priority.is_some()
    }
}

// =============================================================================
// People
// =============================================================================

/// Directory entry for an assignable person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Person {
    /// "First Last" display form used for name-based resolution.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// =============================================================================
// Categories
// =============================================================================

/// Normalized category with its active subcategories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

/// Raw category item as the backend sends it, before normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCategory {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub subcategories: Vec<RawSubcategory>,
}

/// Raw subcategory item before normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubcategory {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn is_active(flag: Option<bool>) -> bool {
    // Only an explicit `false` hides an entry.
    flag != Some(false)
}

/// Normalize raw category items: drop inactive entries at both levels and
/// derive stable names. The raw `id` field, when present, is authoritative
/// over the raw `name` field.
#[must_use]
pub fn normalize_categories(raw: Vec<RawCategory>) -> Vec<Category> {
    raw.into_iter()
        .filter(|c| is_active(c.is_active))
        .filter_map(|c| {
            let name = c.id.or(c.name)?;
            let display_name = c.display_name.unwrap_or_else(|| name.clone());
            let subcategories = c
                .subcategories
                .into_iter()
                .filter(|s| is_active(s.is_active))
                .filter_map(|s| {
                    let name = s.id.or(s.name)?;
                    let display_name = s.display_name.unwrap_or_else(|| name.clone());
                    Some(Subcategory { name, display_name })
                })
                .collect();
            Some(Category {
                name,
                display_name,
                subcategories,
            })
        })
        .collect()
}

// =============================================================================
// Requests
// =============================================================================

/// Query parameters for `GET /api/v1/tickets`.
#[derive(Debug, Clone, Default)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub assignee_id: Option<String>,
    pub subcategory_display_name: Option<String>,
    pub priority: Option<Priority>,
}

impl TicketListQuery {
    /// Render the non-empty filters as query pairs.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sortBy", sort_by.clone()));
        }
        if let Some(sort_dir) = &self.sort_dir {
            pairs.push(("sortDir", sort_dir.clone()));
        }
        if let Some(from) = self.created_from {
            pairs.push(("createdFrom", from.to_rfc3339()));
        }
        if let Some(to) = self.created_to {
            pairs.push(("createdTo", to.to_rfc3339()));
        }
        if let Some(assignee) = &self.assignee_id {
            pairs.push(("assigneeId", assignee.clone()));
        }
        if let Some(sub) = &self.subcategory_display_name {
            pairs.push(("subcategoryDisplayName", sub.clone()));
        }
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.to_string()));
        }
        pairs
    }
}

/// Partial update body for `PATCH /api/v1/tickets/{id}`.
///
/// `subcategory` is double-optional: `Some(None)` serializes as an explicit
/// `null` to clear the field, `None` omits it entirely.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<Option<Subcategory>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations_ids: Option<Vec<String>>,
}

/// Body for `PATCH /api/v1/tickets/{id}/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPatch {
    pub status: TicketStatus,
}

/// Body for `POST /api/v1/tickets/{id}/cancel`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by_name: Option<String>,
}
