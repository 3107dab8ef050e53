//! Ticket mutation orchestration.
//!
//! [`TicketWorkflow`] wraps a single ticket and enforces the legal state
//! transitions before any network mutation is issued:
//!
//! | From      | Event            | Guard                        | To        |
//! |-----------|------------------|------------------------------|-----------|
//! | NEW       | assign           | category and priority set    | OPEN      |
//! | OPEN      | assign/reassign  | category and priority set    | OPEN      |
//! | NEW, OPEN | mark_done        | none                         | DONE      |
//! | DONE      | reopen           | none                         | OPEN      |
//! | NEW, OPEN | cancel(reason)   | reason non-empty after trim  | CANCELLED |
//!
//! DONE and CANCELLED are terminal. Each workflow carries a single busy tag
//! gating all of its mutations: a second trigger while busy is silently
//! ignored, never queued. After every successful mutation the ticket is
//! reloaded from the backend so server-computed fields stay authoritative.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ReferenceDataCache;
use crate::client::{decode_data, decode_items, ApiClient};
use crate::error::Error;
use crate::models::{
    CancelRequest, Person, Priority, StatusPatch, Ticket, TicketListQuery, TicketPatch,
    TicketStatus,
};

// =============================================================================
// Queries
// =============================================================================

/// Fetch a filtered ticket list.
///
/// # Errors
///
/// Returns an error if the request or response decoding fails.
pub async fn list_tickets(
    client: &ApiClient,
    query: &TicketListQuery,
) -> Result<Vec<Ticket>, Error> {
    let value = client.get_json("/api/v1/tickets", &query.to_pairs()).await?;
    decode_items(value)
}

/// Fetch a single ticket by id.
///
/// # Errors
///
/// Returns an error if the request or response decoding fails.
pub async fn fetch_ticket(client: &ApiClient, id: &str) -> Result<Ticket, Error> {
    let value = client
        .get_json(&format!("/api/v1/tickets/{id}"), &[])
        .await?;
    decode_data(value)
}

/// Scoped directory search used for name resolution and the people picker.
///
/// # Errors
///
/// Returns an error if the request or response decoding fails.
pub async fn search_persons(
    client: &ApiClient,
    q: &str,
    limit: u32,
) -> Result<Vec<Person>, Error> {
    let value = client
        .get_json(
            "/api/v1/persons",
            &[("q", q.to_string()), ("limit", limit.to_string())],
        )
        .await?;
    decode_items(value)
}

// =============================================================================
// Workflow types
// =============================================================================

/// The mutation currently in flight for a ticket, if any. Gates all of the
/// ticket's mutation controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyKind {
    Assign,
    Priority,
    Category,
    Location,
    Done,
    Open,
    Cancel,
}

impl BusyKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Priority => "priority",
            Self::Category => "category",
            Self::Location => "location",
            Self::Done => "done",
            Self::Open => "open",
            Self::Cancel => "cancel",
        }
    }
}

/// Result of a mutation attempt: applied, or ignored because the ticket was
/// busy (not an error, not queued).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored,
}

/// Which confirmation copy to present. Both variants perform the identical
/// mutation; the distinction is presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentKind {
    Assign,
    Reassign,
}

/// Resolved assignment awaiting explicit confirmation.
///
/// Produced by [`TicketWorkflow::plan_assignment`]; the mutation only runs
/// when the plan is passed back to [`TicketWorkflow::apply_assignment`], so
/// callers must surface the assign/reassign variant first.
#[derive(Debug, Clone)]
pub struct AssignmentPlan {
    pub kind: AssignmentKind,
    pub assignee_ids: Vec<String>,
    /// Names that resolved, in request order.
    pub resolved: Vec<String>,
    /// Names that could not be resolved and were skipped.
    pub skipped: Vec<String>,
}

// =============================================================================
// Workflow
// =============================================================================

/// Mutation orchestrator for one ticket.
pub struct TicketWorkflow {
    client: ApiClient,
    cache: Arc<ReferenceDataCache>,
    ticket: Ticket,
    busy: Option<BusyKind>,
}

/// Busy-gate a mutation: bail out with `Outcome::Ignored` while another
/// mutation is in flight, otherwise tag the workflow, run the body, and
/// clear the tag on success and failure alike.
macro_rules! gated {
    ($self:ident, $kind:expr, $body:expr) => {{
        if let Some(current) = $self.busy {
            debug!(
                ticket_id = %$self.ticket.id,
                busy = current.as_str(),
                requested = $kind.as_str(),
                "Mutation ignored, ticket is busy"
            );
            return Ok(Outcome::Ignored);
        }
        $self.busy = Some($kind);
        let result = $body;
        $self.busy = None;
        result.map(|()| Outcome::Applied)
    }};
}

impl TicketWorkflow {
    #[must_use]
    pub const fn new(client: ApiClient, cache: Arc<ReferenceDataCache>, ticket: Ticket) -> Self {
        Self {
            client,
            cache,
            ticket,
            busy: None,
        }
    }

    /// Fetch the ticket and wrap it in a workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticket cannot be fetched.
    pub async fn open(
        client: ApiClient,
        cache: Arc<ReferenceDataCache>,
        id: &str,
    ) -> Result<Self, Error> {
        let ticket = fetch_ticket(&client, id).await?;
        Ok(Self::new(client, cache, ticket))
    }

    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    #[must_use]
    pub const fn busy(&self) -> Option<BusyKind> {
        self.busy
    }

    /// Which confirmation variant applies right now: "reassign" when the
    /// ticket is already OPEN with at least one assignee, otherwise "assign".
    #[must_use]
    pub fn assignment_kind(&self) -> AssignmentKind {
        if self.ticket.status == TicketStatus::Open && !self.ticket.assignee_ids.is_empty() {
            AssignmentKind::Reassign
        } else {
            AssignmentKind::Assign
        }
    }

    /// Whether the cancel confirmation control should be enabled.
    #[must_use]
    pub fn can_cancel(reason: &str) -> bool {
        !reason.trim().is_empty()
    }

    // -------------------------------------------------------------------------
    // Assignment
    // -------------------------------------------------------------------------

    /// Resolve assignee names and build a plan for confirmation.
    ///
    /// Resolution checks the reference cache first (exact case-insensitive
    /// "First Last" match), then falls back to a live directory search scoped
    /// to the name; an inexact first candidate is accepted best-effort. Names
    /// resolving to nothing are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Rejects before any network call when the ticket is terminal or is
    /// missing category/priority, and after resolution when no name resolved.
    pub async fn plan_assignment(&self, names: &[String]) -> Result<AssignmentPlan, Error> {
        self.ensure_assignable()?;

        let mut assignee_ids = Vec::new();
        let mut resolved = Vec::new();
        let mut skipped = Vec::new();

        for name in names {
            match self.resolve_person_id(name).await? {
                Some(id) => {
                    assignee_ids.push(id);
                    resolved.push(name.clone());
                }
                None => {
                    warn!(
                        ticket_id = %self.ticket.id,
                        name = %name,
                        "Assignee name did not resolve, skipping"
                    );
                    skipped.push(name.clone());
                }
            }
        }

        if assignee_ids.is_empty() {
            return Err(Error::Precondition(
                "none of the requested assignees could be resolved".to_string(),
            ));
        }

        Ok(AssignmentPlan {
            kind: self.assignment_kind(),
            assignee_ids,
            resolved,
            skipped,
        })
    }

    /// Apply a confirmed assignment plan: patch `assigneeIds`, force status
    /// to OPEN, then reload the ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if guards fail or any request fails.
    pub async fn apply_assignment(&mut self, plan: &AssignmentPlan) -> Result<Outcome, Error> {
        gated!(self, BusyKind::Assign, self.do_apply_assignment(plan).await)
    }

    async fn do_apply_assignment(&mut self, plan: &AssignmentPlan) -> Result<(), Error> {
        self.ensure_assignable()?;
        self.patch(&TicketPatch {
            assignee_ids: Some(plan.assignee_ids.clone()),
            ..TicketPatch::default()
        })
        .await?;
        self.patch_status(TicketStatus::Open).await?;
        self.reload().await
    }

    /// Plan and apply in one step for callers that confirm out of band.
    ///
    /// # Errors
    ///
    /// See [`Self::plan_assignment`] and [`Self::apply_assignment`].
    pub async fn assign_by_names(&mut self, names: &[String]) -> Result<Outcome, Error> {
        let plan = self.plan_assignment(names).await?;
        self.apply_assignment(&plan).await
    }

    async fn resolve_person_id(&self, full_name: &str) -> Result<Option<String>, Error> {
        if let Some(id) = self.cache.person_id_by_name(full_name).await {
            return Ok(Some(id));
        }

        let candidates = search_persons(&self.client, full_name, 10).await?;
        if let Some(exact) = candidates
            .iter()
            .find(|p| p.full_name().eq_ignore_ascii_case(full_name))
        {
            return Ok(Some(exact.id.clone()));
        }

        // Best-effort: accept the first scoped search result.
        match candidates.first() {
            Some(candidate) => {
                warn!(
                    name = %full_name,
                    candidate = %candidate.full_name(),
                    "No exact directory match, accepting first search result"
                );
                Ok(Some(candidate.id.clone()))
            }
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Field mutations
    // -------------------------------------------------------------------------

    /// Patch the ticket's priority.
    ///
    /// # Errors
    ///
    /// Rejects terminal tickets; surfaces request failures.
    pub async fn set_priority(&mut self, priority: Priority) -> Result<Outcome, Error> {
        gated!(self, BusyKind::Priority, self.do_set_priority(priority).await)
    }

    async fn do_set_priority(&mut self, priority: Priority) -> Result<(), Error> {
        self.ensure_active("priority change")?;
        self.patch(&TicketPatch {
            priority: Some(priority),
            ..TicketPatch::default()
        })
        .await?;
        self.reload().await
    }

    /// Select a bare category: writes the category and clears any previously
    /// set subcategory in the same patch.
    ///
    /// # Errors
    ///
    /// Requires a prior successful reference-data load and a known category
    /// name; surfaces request failures.
    pub async fn select_category(&mut self, name: &str) -> Result<Outcome, Error> {
        gated!(self, BusyKind::Category, self.do_select_category(name).await)
    }

    async fn do_select_category(&mut self, name: &str) -> Result<(), Error> {
        self.ensure_active("category change")?;
        let categories = self.loaded_categories().await?;
        let category = categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Precondition(format!("unknown category: {name}")))?;

        self.patch(&TicketPatch {
            category: Some(category.name.clone()),
            subcategory: Some(None),
            ..TicketPatch::default()
        })
        .await?;
        self.reload().await
    }

    /// Select a subcategory: resolves its owning category from the cache and
    /// writes both fields in one patch. The two fields are never written
    /// independently through this selector.
    ///
    /// # Errors
    ///
    /// Requires a prior successful reference-data load and a known
    /// subcategory name; surfaces request failures.
    pub async fn select_subcategory(&mut self, name: &str) -> Result<Outcome, Error> {
        gated!(
            self,
            BusyKind::Category,
            self.do_select_subcategory(name).await
        )
    }

    async fn do_select_subcategory(&mut self, name: &str) -> Result<(), Error> {
        self.ensure_active("category change")?;
        let categories = self.loaded_categories().await?;
        let owner_and_sub = categories.iter().find_map(|c| {
            c.subcategories
                .iter()
                .find(|s| {
                    s.name.eq_ignore_ascii_case(name) || s.display_name.eq_ignore_ascii_case(name)
                })
                .map(|s| (c.name.clone(), s.clone()))
        });
        let (category, subcategory) = owner_and_sub
            .ok_or_else(|| Error::Precondition(format!("unknown subcategory: {name}")))?;

        self.patch(&TicketPatch {
            category: Some(category),
            subcategory: Some(Some(subcategory)),
            ..TicketPatch::default()
        })
        .await?;
        self.reload().await
    }

    /// Replace the ticket's location set.
    ///
    /// # Errors
    ///
    /// Rejects terminal tickets; surfaces request failures.
    pub async fn set_locations(&mut self, location_ids: Vec<String>) -> Result<Outcome, Error> {
        gated!(
            self,
            BusyKind::Location,
            self.do_set_locations(location_ids).await
        )
    }

    async fn do_set_locations(&mut self, location_ids: Vec<String>) -> Result<(), Error> {
        self.ensure_active("location change")?;
        self.patch(&TicketPatch {
            locations_ids: Some(location_ids),
            ..TicketPatch::default()
        })
        .await?;
        self.reload().await
    }

    // -------------------------------------------------------------------------
    // Status transitions
    // -------------------------------------------------------------------------

    /// NEW/OPEN → DONE.
    ///
    /// # Errors
    ///
    /// Rejects terminal tickets; surfaces request failures.
    pub async fn mark_done(&mut self) -> Result<Outcome, Error> {
        gated!(self, BusyKind::Done, self.do_mark_done().await)
    }

    async fn do_mark_done(&mut self) -> Result<(), Error> {
        self.ensure_active("completion")?;
        self.patch_status(TicketStatus::Done).await?;
        self.reload().await
    }

    /// DONE → OPEN.
    ///
    /// # Errors
    ///
    /// Rejects tickets that are not DONE; surfaces request failures.
    pub async fn reopen(&mut self) -> Result<Outcome, Error> {
        gated!(self, BusyKind::Open, self.do_reopen().await)
    }

    async fn do_reopen(&mut self) -> Result<(), Error> {
        if self.ticket.status != TicketStatus::Done {
            return Err(Error::Precondition(format!(
                "ticket {} is {}, only DONE tickets can be reopened",
                self.ticket.id, self.ticket.status
            )));
        }
        self.patch_status(TicketStatus::Open).await?;
        self.reload().await
    }

    /// NEW/OPEN → CANCELLED with a mandatory reason.
    ///
    /// Uses the dedicated cancel endpoint; when the deployed backend does not
    /// support it (404/405) the client degrades to a status patch.
    ///
    /// # Errors
    ///
    /// Rejects terminal tickets and empty (after trimming) reasons before any
    /// network call; surfaces request failures.
    pub async fn cancel(
        &mut self,
        reason: &str,
        cancelled_by: Option<(String, String)>,
    ) -> Result<Outcome, Error> {
        gated!(
            self,
            BusyKind::Cancel,
            self.do_cancel(reason, cancelled_by).await
        )
    }

    async fn do_cancel(
        &mut self,
        reason: &str,
        cancelled_by: Option<(String, String)>,
    ) -> Result<(), Error> {
        self.ensure_active("cancellation")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Precondition(
                "a cancellation reason is required".to_string(),
            ));
        }

        let (cancelled_by, cancelled_by_name) = match cancelled_by {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };
        let body = serde_json::to_value(CancelRequest {
            reason: Some(reason.to_string()),
            cancelled_by,
            cancelled_by_name,
        })?;

        let cancel_path = format!("/api/v1/tickets/{}/cancel", self.ticket.id);
        match self.client.post_json(&cancel_path, &body).await {
            Ok(_) => {}
            Err(e) if e.is_unsupported_endpoint() => {
                info!(
                    ticket_id = %self.ticket.id,
                    "Cancel endpoint unsupported, degrading to status patch"
                );
                self.patch_status(TicketStatus::Cancelled).await?;
            }
            Err(e) => return Err(e),
        }
        self.reload().await
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn ensure_active(&self, operation: &str) -> Result<(), Error> {
        if self.ticket.status.is_terminal() {
            return Err(Error::Precondition(format!(
                "ticket {} is {} and exposes no further transitions ({operation} rejected)",
                self.ticket.id, self.ticket.status
            )));
        }
        Ok(())
    }

    fn ensure_assignable(&self) -> Result<(), Error> {
        self.ensure_active("assignment")?;
        if !self.ticket.is_assignable() {
            return Err(Error::Precondition(
                "category and priority must be set before assignment".to_string(),
            ));
        }
        Ok(())
    }

    async fn loaded_categories(&self) -> Result<Vec<crate::models::Category>, Error> {
        let categories = self.cache.categories().await;
        if categories.is_empty() {
            return Err(Error::Precondition("reference data not loaded".to_string()));
        }
        Ok(categories)
    }

    async fn patch(&self, patch: &TicketPatch) -> Result<(), Error> {
        let body = serde_json::to_value(patch)?;
        self.client
            .patch_json(&format!("/api/v1/tickets/{}", self.ticket.id), &body)
            .await?;
        Ok(())
    }

    async fn patch_status(&self, status: TicketStatus) -> Result<(), Error> {
        let body = serde_json::to_value(StatusPatch { status })?;
        self.client
            .patch_json(&format!("/api/v1/tickets/{}/status", self.ticket.id), &body)
            .await?;
        Ok(())
    }

    /// Re-fetch the ticket after a successful mutation; the server copy is
    /// authoritative (server-computed timestamps, status side effects).
    async fn reload(&mut self) -> Result<(), Error> {
        self.ticket = fetch_ticket(&self.client, &self.ticket.id).await?;
        info!(
            ticket_id = %self.ticket.id,
            status = %self.ticket.status,
            "Ticket reloaded after mutation"
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_busy(&mut self, kind: BusyKind) {
        self.busy = Some(kind);
    }
}
