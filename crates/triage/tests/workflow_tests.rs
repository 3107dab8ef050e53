//! End-to-end workflow tests against a mocked backend.
//!
//! Each scenario drives [`triage::TicketWorkflow`] through the mocked REST
//! surface and asserts the exact request sequence: guards fire before any
//! network call, assignments patch then force OPEN then reload, and the
//! cancel path degrades to a status patch on backends without the endpoint.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use triage::{
    ApiClient, AssignmentKind, Outcome, Priority, ReferenceDataCache, StaticTokenProvider,
    TicketStatus, TicketWorkflow, FALLBACK_ASSIGNEES,
};

fn ticket_body(status: &str, assignees: &[&str]) -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "id": "t-1",
            "status": status,
            "category": "hvac",
            "priority": "HIGH",
            "assigneeIds": assignees,
        }
    })
}

fn persons_result(items: serde_json::Value) -> serde_json::Value {
    json!({"success": true, "data": {"items": items}})
}

fn ok_envelope() -> serde_json::Value {
    json!({"success": true, "data": {}})
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        server.uri(),
        Arc::new(StaticTokenProvider::new(Some("token".into()))),
    )
    .unwrap()
}

fn workflow_for(server: &MockServer, status: TicketStatus, assignees: &[&str]) -> TicketWorkflow {
    let ticket =
        serde_json::from_value(ticket_body(status.as_str(), assignees)["data"].clone()).unwrap();
    TicketWorkflow::new(client(server), Arc::new(ReferenceDataCache::new()), ticket)
}

// -----------------------------------------------------------------------------
// Assignment
// -----------------------------------------------------------------------------

#[tokio::test]
async fn first_assignment_patches_assignees_then_opens_then_reloads() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .and(query_param("q", "Jane Doe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(persons_result(
            json!([{"id": "p-1", "firstName": "Jane", "lastName": "Doe"}]),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1"))
        .and(body_partial_json(json!({"assigneeIds": ["p-1"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1/status"))
        .and(body_json(json!({"status": "OPEN"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("OPEN", &["p-1"])))
        .expect(1)
        .mount(&server)
        .await;

    let mut workflow = workflow_for(&server, TicketStatus::New, &[]);

    let plan = workflow
        .plan_assignment(&["Jane Doe".to_string()])
        .await
        .unwrap();
    assert_eq!(plan.kind, AssignmentKind::Assign);
    assert_eq!(plan.resolved, vec!["Jane Doe".to_string()]);
    assert!(plan.skipped.is_empty());

    assert_eq!(
        workflow.apply_assignment(&plan).await.unwrap(),
        Outcome::Applied
    );
    assert_eq!(workflow.ticket().status, TicketStatus::Open);
    assert!(workflow.busy().is_none());
}

#[tokio::test]
async fn reassignment_reports_its_kind_and_skips_unresolved_names() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .and(query_param("q", "Jane Doe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(persons_result(
            json!([{"id": "p-1", "firstName": "Jane", "lastName": "Doe"}]),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .and(query_param("q", "Ghost Person"))
        .respond_with(ResponseTemplate::new(200).set_body_json(persons_result(json!([]))))
        .mount(&server)
        .await;

    let workflow = workflow_for(&server, TicketStatus::Open, &["p-9"]);

    let plan = workflow
        .plan_assignment(&["Jane Doe".to_string(), "Ghost Person".to_string()])
        .await
        .unwrap();
    assert_eq!(plan.kind, AssignmentKind::Reassign);
    assert_eq!(plan.assignee_ids, vec!["p-1".to_string()]);
    assert_eq!(plan.skipped, vec!["Ghost Person".to_string()]);
}

#[tokio::test]
async fn cached_names_resolve_without_a_live_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .respond_with(ResponseTemplate::new(200).set_body_json(persons_result(
            json!([{"id": "p-1", "firstName": "Jane", "lastName": "Doe"}]),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;

    let client = client(&server);
    let cache = Arc::new(ReferenceDataCache::new());
    cache.load(&client).await.unwrap();

    let ticket =
        serde_json::from_value(ticket_body("NEW", &[])["data"].clone()).unwrap();
    let workflow = TicketWorkflow::new(client, cache, ticket);

    // Case-insensitive cache hit; the persons endpoint saw only the bulk load.
    let plan = workflow
        .plan_assignment(&["jane doe".to_string()])
        .await
        .unwrap();
    assert_eq!(plan.assignee_ids, vec!["p-1".to_string()]);

    let persons_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/v1/persons")
        .count();
    assert_eq!(persons_requests, 1);
}

#[tokio::test]
async fn fallback_names_resolve_through_live_search_at_submit_time() {
    let server = MockServer::start().await;

    // Bulk directory load fails; the cache degrades to the fallback list.
    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .and(query_param("limit", "200"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;
    // The scoped search still works when the fallback name is submitted.
    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .and(query_param("q", "Anna Brandt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(persons_result(
            json!([{"id": "p-7", "firstName": "Anna", "lastName": "Brandt"}]),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let cache = Arc::new(ReferenceDataCache::new());
    cache.load(&client).await.unwrap();
    assert_eq!(cache.people_names().await[0], FALLBACK_ASSIGNEES[0]);

    let ticket =
        serde_json::from_value(ticket_body("NEW", &[])["data"].clone()).unwrap();
    let workflow = TicketWorkflow::new(client, cache, ticket);

    let plan = workflow
        .plan_assignment(&["Anna Brandt".to_string()])
        .await
        .unwrap();
    assert_eq!(plan.assignee_ids, vec!["p-7".to_string()]);
}

#[tokio::test]
async fn guard_rejections_issue_no_network_requests() {
    let server = MockServer::start().await;
    let mut workflow = workflow_for(&server, TicketStatus::Cancelled, &[]);

    assert!(workflow.set_priority(Priority::High).await.is_err());
    assert!(workflow.mark_done().await.is_err());
    assert!(workflow.cancel("reason", None).await.is_err());
    assert!(workflow.plan_assignment(&["Jane Doe".to_string()]).await.is_err());

    assert!(server.received_requests().await.unwrap().is_empty());
}

// -----------------------------------------------------------------------------
// Status transitions
// -----------------------------------------------------------------------------

#[tokio::test]
async fn done_then_reopen_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1/status"))
        .and(body_json(json!({"status": "DONE"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1/status"))
        .and(body_json(json!({"status": "OPEN"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    // First reload sees DONE, second sees OPEN.
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("DONE", &["p-1"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("OPEN", &["p-1"])))
        .mount(&server)
        .await;

    let mut workflow = workflow_for(&server, TicketStatus::Open, &["p-1"]);

    assert_eq!(workflow.mark_done().await.unwrap(), Outcome::Applied);
    assert_eq!(workflow.ticket().status, TicketStatus::Done);

    assert_eq!(workflow.reopen().await.unwrap(), Outcome::Applied);
    assert_eq!(workflow.ticket().status, TicketStatus::Open);
}

// -----------------------------------------------------------------------------
// Cancellation
// -----------------------------------------------------------------------------

#[tokio::test]
async fn cancel_uses_the_dedicated_endpoint_when_available() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/tickets/t-1/cancel"))
        .and(body_partial_json(json!({"reason": "duplicate request"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("CANCELLED", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let mut workflow = workflow_for(&server, TicketStatus::Open, &[]);
    assert_eq!(
        workflow
            .cancel("  duplicate request  ", None)
            .await
            .unwrap(),
        Outcome::Applied
    );
    assert_eq!(workflow.ticket().status, TicketStatus::Cancelled);
}

#[tokio::test]
async fn cancel_degrades_to_status_patch_when_endpoint_missing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/tickets/t-1/cancel"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1/status"))
        .and(body_json(json!({"status": "CANCELLED"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("CANCELLED", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let mut workflow = workflow_for(&server, TicketStatus::New, &[]);
    assert_eq!(
        workflow.cancel("tenant resolved it", None).await.unwrap(),
        Outcome::Applied
    );
    assert_eq!(workflow.ticket().status, TicketStatus::Cancelled);
}

#[tokio::test]
async fn cancel_failure_other_than_missing_endpoint_surfaces() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/tickets/t-1/cancel"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "conflict"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut workflow = workflow_for(&server, TicketStatus::Open, &[]);
    let err = workflow.cancel("reason", None).await.unwrap_err();
    assert!(matches!(err, triage::Error::Http { status: 409, .. }));
    // The busy tag is released on failure too.
    assert!(workflow.busy().is_none());
}

// -----------------------------------------------------------------------------
// Field mutations
// -----------------------------------------------------------------------------

#[tokio::test]
async fn subcategory_selection_writes_owner_category_in_the_same_patch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"items": [{
                "id": "hvac",
                "displayName": "HVAC",
                "subcategories": [{"name": "heating", "displayName": "Heating"}]
            }]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1"))
        .and(body_json(json!({
            "category": "hvac",
            "subcategory": {"name": "heating", "displayName": "Heating"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("NEW", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let cache = Arc::new(ReferenceDataCache::new());
    cache.load(&client).await.unwrap();

    let ticket =
        serde_json::from_value(ticket_body("NEW", &[])["data"].clone()).unwrap();
    let mut workflow = TicketWorkflow::new(client, cache, ticket);

    assert_eq!(
        workflow.select_subcategory("Heating").await.unwrap(),
        Outcome::Applied
    );
}

#[tokio::test]
async fn location_update_patches_the_locations_ids_field() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1"))
        .and(body_json(json!({"locationsIds": ["loc-1", "loc-2"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("OPEN", &["p-1"])))
        .expect(1)
        .mount(&server)
        .await;

    let mut workflow = workflow_for(&server, TicketStatus::Open, &["p-1"]);
    assert_eq!(
        workflow
            .set_locations(vec!["loc-1".into(), "loc-2".into()])
            .await
            .unwrap(),
        Outcome::Applied
    );
    assert!(workflow.busy().is_none());
}

#[tokio::test]
async fn bare_category_selection_clears_the_subcategory() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/persons"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"items": [{"id": "plumbing", "displayName": "Plumbing"}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"items": []}})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/tickets/t-1"))
        .and(body_json(json!({"category": "plumbing", "subcategory": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tickets/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_body("NEW", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let cache = Arc::new(ReferenceDataCache::new());
    cache.load(&client).await.unwrap();

    let ticket =
        serde_json::from_value(ticket_body("NEW", &[])["data"].clone()).unwrap();
    let mut workflow = TicketWorkflow::new(client, cache, ticket);

    assert_eq!(
        workflow.select_category("plumbing").await.unwrap(),
        Outcome::Applied
    );
}
