//! SurrealDB implementation of [`TicketRepository`].

use chrono::{DateTime, Utc};
use leadpilot_core::error::LeadpilotResult;
use leadpilot_core::models::ticket::{
    CreateTicket, SupportTicket, TicketMessage, TicketPriority, TicketResponse, TicketStatus,
};
use leadpilot_core::repository::TicketRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid, query_failed};

#[derive(Debug, SurrealValue)]
struct TicketRowWithId {
    record_id: String,
    organization_id: String,
    created_by: String,
    subject: String,
    description: String,
    status: String,
    priority: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct MessageRowWithId {
    record_id: String,
    ticket_id: String,
    author_id: String,
    body: String,
    is_staff_reply: bool,
    created_at: DateTime<Utc>,
}

impl TicketRowWithId {
    fn try_into_ticket(self) -> Result<SupportTicket, DbError> {
        let status = TicketStatus::parse(&self.status)
            .ok_or_else(|| DbError::Decode(format!("unknown ticket status: {}", self.status)))?;
        let priority = TicketPriority::parse(&self.priority).ok_or_else(|| {
            DbError::Decode(format!("unknown ticket priority: {}", self.priority))
        })?;
        Ok(SupportTicket {
            id: parse_uuid(&self.record_id, "ticket")?,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            created_by: parse_uuid(&self.created_by, "principal")?,
            subject: self.subject,
            description: self.description,
            status,
            priority,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl MessageRowWithId {
    fn try_into_message(self) -> Result<TicketMessage, DbError> {
        Ok(TicketMessage {
            id: parse_uuid(&self.record_id, "ticket message")?,
            ticket_id: parse_uuid(&self.ticket_id, "ticket")?,
            author_id: parse_uuid(&self.author_id, "principal")?,
            body: self.body,
            is_staff_reply: self.is_staff_reply,
            created_at: self.created_at,
        })
    }
}

const TICKET_PROJECTION: &str = "SELECT meta::id(id) AS record_id, * FROM support_ticket";

/// SurrealDB implementation of the support ticket repository.
#[derive(Clone)]
pub struct SurrealTicketRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTicketRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_tickets(
        &self,
        filter: &str,
        binds: Vec<(&'static str, String)>,
    ) -> Result<Vec<SupportTicket>, DbError> {
        let query = format!("{TICKET_PROJECTION} {filter} ORDER BY created_at DESC");
        let mut builder = self.db.query(&query);
        for bind in binds {
            builder = builder.bind(bind);
        }
        let mut result = builder.await?;
        let rows: Vec<TicketRowWithId> = result.take(0)?;
        rows.into_iter().map(TicketRowWithId::try_into_ticket).collect()
    }
}

impl<C: Connection> TicketRepository for SurrealTicketRepository<C> {
    async fn create(&self, input: CreateTicket) -> LeadpilotResult<SupportTicket> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "CREATE type::record('support_ticket', $id) SET \
                 organization_id = $organization_id, created_by = $created_by, \
                 subject = $subject, description = $description, \
                 status = 'open', priority = $priority",
            )
            .bind(("id", id.to_string()))
            .bind(("organization_id", input.organization_id.to_string()))
            .bind(("created_by", input.created_by.to_string()))
            .bind(("subject", input.subject))
            .bind(("description", input.description))
            .bind(("priority", input.priority.as_str().to_string()))
            .await
            .map_err(DbError::from)?;
        result
            .check()
            .map_err(|e| query_failed("support_ticket", e))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> LeadpilotResult<SupportTicket> {
        let tickets = self
            .select_tickets("WHERE meta::id(id) = $id", vec![("id", id.to_string())])
            .await?;
        tickets.into_iter().next().ok_or_else(|| {
            DbError::NotFound {
                entity: "support_ticket".into(),
                id: id.to_string(),
            }
            .into()
        })
    }

    async fn list_all(&self) -> LeadpilotResult<Vec<SupportTicket>> {
        Ok(self.select_tickets("", Vec::new()).await?)
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> LeadpilotResult<Vec<SupportTicket>> {
        Ok(self
            .select_tickets(
                "WHERE organization_id = $organization_id",
                vec![("organization_id", organization_id.to_string())],
            )
            .await?)
    }

    async fn respond(&self, input: TicketResponse) -> LeadpilotResult<(SupportTicket, TicketMessage)> {
        // Surface NotFound before opening the transaction.
        self.get_by_id(input.ticket_id).await?;

        let message_id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 UPDATE type::record('support_ticket', $ticket_id) SET \
                 status = $status, updated_at = time::now(); \
                 CREATE type::record('ticket_message', $message_id) SET \
                 ticket_id = $ticket_id, author_id = $author_id, \
                 body = $body, is_staff_reply = true; \
                 COMMIT TRANSACTION;",
            )
            .bind(("ticket_id", input.ticket_id.to_string()))
            .bind(("message_id", message_id.to_string()))
            .bind(("status", input.status.as_str().to_string()))
            .bind(("author_id", input.author_id.to_string()))
            .bind(("body", input.body))
            .await
            .map_err(DbError::from)?;
        result
            .check()
            .map_err(|e| query_failed("support_ticket", e))?;

        let ticket = self.get_by_id(input.ticket_id).await?;
        let message = self
            .messages(input.ticket_id)
            .await?
            .into_iter()
            .find(|m| m.id == message_id)
            .ok_or_else(|| DbError::NotFound {
                entity: "ticket_message".into(),
                id: message_id.to_string(),
            })?;

        Ok((ticket, message))
    }

    async fn messages(&self, ticket_id: Uuid) -> LeadpilotResult<Vec<TicketMessage>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM ticket_message \
                 WHERE ticket_id = $ticket_id ORDER BY created_at ASC",
            )
            .bind(("ticket_id", ticket_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MessageRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(MessageRowWithId::try_into_message)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}
