//! Integration tests for the support ticket repository using in-memory
//! SurrealDB.

use leadpilot_core::error::LeadpilotError;
use leadpilot_core::models::ticket::{CreateTicket, TicketPriority, TicketResponse, TicketStatus};
use leadpilot_core::repository::TicketRepository;
use leadpilot_db::repository::SurrealTicketRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    leadpilot_db::run_migrations(&db).await.unwrap();
    db
}

fn ticket(org: Uuid, subject: &str) -> CreateTicket {
    CreateTicket {
        organization_id: org,
        created_by: Uuid::new_v4(),
        subject: subject.into(),
        description: "Import is stuck".into(),
        priority: TicketPriority::High,
    }
}

#[tokio::test]
async fn create_and_list_tickets() {
    let repo = SurrealTicketRepository::new(setup().await);
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    let created = repo.create(ticket(org_a, "CSV import")).await.unwrap();
    assert_eq!(created.status, TicketStatus::Open);
    assert_eq!(created.priority, TicketPriority::High);
    repo.create(ticket(org_b, "Billing")).await.unwrap();

    assert_eq!(repo.list_all().await.unwrap().len(), 2);
    let for_a = repo.list_for_organization(org_a).await.unwrap();
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_a[0].id, created.id);
}

#[tokio::test]
async fn respond_updates_status_and_appends_message() {
    let repo = SurrealTicketRepository::new(setup().await);
    let created = repo.create(ticket(Uuid::new_v4(), "CSV import")).await.unwrap();
    let staff = Uuid::new_v4();

    let (updated, message) = repo
        .respond(TicketResponse {
            ticket_id: created.id,
            author_id: staff,
            status: TicketStatus::InProgress,
            body: "Looking into it".into(),
        })
        .await
        .unwrap();

    assert_eq!(updated.status, TicketStatus::InProgress);
    assert_eq!(message.author_id, staff);
    assert!(message.is_staff_reply);

    let messages = repo.messages(created.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "Looking into it");
}

#[tokio::test]
async fn respond_to_unknown_ticket_is_not_found() {
    let repo = SurrealTicketRepository::new(setup().await);
    let err = repo
        .respond(TicketResponse {
            ticket_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            status: TicketStatus::Resolved,
            body: "Done".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LeadpilotError::NotFound { .. }));
}
