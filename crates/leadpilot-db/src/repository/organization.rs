//! SurrealDB implementation of [`OrganizationRepository`].

use chrono::{DateTime, Utc};
use leadpilot_core::error::LeadpilotResult;
use leadpilot_core::models::membership::OrganizationMembership;
use leadpilot_core::models::organization::{
    CreateOrganization, Organization, SubscriptionPlan, UpdateOrganization,
};
use leadpilot_core::repository::{MembershipRepository, OrganizationRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::membership::SurrealMembershipRepository;
use crate::error::{DbError, parse_uuid, query_failed};

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OrganizationRow {
    name: String,
    slug: String,
    domain: Option<String>,
    settings: serde_json::Value,
    subscription_plan: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
pub(crate) struct OrganizationRowWithId {
    pub(crate) record_id: String,
    name: String,
    slug: String,
    domain: Option<String>,
    settings: serde_json::Value,
    subscription_plan: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(crate) fn parse_plan(s: &str) -> Result<SubscriptionPlan, DbError> {
    SubscriptionPlan::parse(s)
        .ok_or_else(|| DbError::Decode(format!("unknown subscription plan: {s}")))
}

impl OrganizationRow {
    fn into_organization(self, id: Uuid) -> Result<Organization, DbError> {
        Ok(Organization {
            id,
            name: self.name,
            slug: self.slug,
            domain: self.domain,
            settings: self.settings,
            subscription_plan: parse_plan(&self.subscription_plan)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl OrganizationRowWithId {
    pub(crate) fn try_into_organization(self) -> Result<Organization, DbError> {
        let id = parse_uuid(&self.record_id, "organization")?;
        Ok(Organization {
            id,
            name: self.name,
            slug: self.slug,
            domain: self.domain,
            settings: self.settings,
            subscription_plan: parse_plan(&self.subscription_plan)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fetch several organizations in one round trip.
pub(crate) async fn fetch_organizations<C: Connection>(
    db: &Surreal<C>,
    ids: Vec<String>,
) -> Result<Vec<Organization>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut result = db
        .query(
            "SELECT meta::id(id) AS record_id, * FROM organization \
             WHERE meta::id(id) IN $ids",
        )
        .bind(("ids", ids))
        .await?;

    let rows: Vec<OrganizationRowWithId> = result.take(0)?;
    rows.into_iter()
        .map(OrganizationRowWithId::try_into_organization)
        .collect()
}

/// SurrealDB implementation of the Organization repository.
#[derive(Clone)]
pub struct SurrealOrganizationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOrganizationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn slug_taken(&self, slug: &str) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query("SELECT VALUE meta::id(id) FROM organization WHERE slug = $slug")
            .bind(("slug", slug.to_string()))
            .await?;
        let ids: Vec<String> = result.take(0)?;
        Ok(!ids.is_empty())
    }
}

impl<C: Connection> OrganizationRepository for SurrealOrganizationRepository<C> {
    async fn create_with_owner(
        &self,
        input: CreateOrganization,
        owner_id: Uuid,
    ) -> LeadpilotResult<OrganizationMembership> {
        if self.slug_taken(&input.slug).await? {
            return Err(DbError::Conflict {
                entity: "organization".into(),
            }
            .into());
        }

        let org_id = Uuid::new_v4();
        let org_id_str = org_id.to_string();
        let membership_id = Uuid::new_v4();

        let settings = input
            .settings
            .unwrap_or(serde_json::Value::Object(Default::default()));

        // Both rows commit together; a failure in the membership insert
        // leaves no orphaned organization behind.
        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 CREATE type::record('organization', $org_id) SET \
                 name = $name, slug = $slug, domain = $domain, \
                 settings = $settings, subscription_plan = $plan, \
                 is_active = true; \
                 CREATE type::record('user_organization', $membership_id) SET \
                 user_id = $owner_id, organization_id = $org_id, \
                 role = 'owner', is_active = true, \
                 approval_status = 'approved'; \
                 COMMIT TRANSACTION;",
            )
            .bind(("org_id", org_id_str.clone()))
            .bind(("membership_id", membership_id.to_string()))
            .bind(("owner_id", owner_id.to_string()))
            .bind(("name", input.name))
            .bind(("slug", input.slug))
            .bind(("domain", input.domain))
            .bind(("settings", settings))
            .bind(("plan", input.subscription_plan.as_str().to_string()))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| query_failed("organization", e))?;

        let organization = self.get_by_id(org_id).await?;
        let membership = SurrealMembershipRepository::new(self.db.clone())
            .get(owner_id, org_id)
            .await?;

        Ok(OrganizationMembership {
            organization,
            membership,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> LeadpilotResult<Organization> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('organization', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "organization".into(),
            id: id_str,
        })?;

        Ok(row.into_organization(id)?)
    }

    async fn get_by_slug(&self, slug: &str) -> LeadpilotResult<Organization> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM organization WHERE slug = $slug",
            )
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "organization".into(),
            id: format!("slug={slug}"),
        })?;

        Ok(row.try_into_organization()?)
    }

    async fn update(&self, id: Uuid, input: UpdateOrganization) -> LeadpilotResult<Organization> {
        let id_str = id.to_string();

        if let Some(slug) = input.slug.as_deref() {
            let current = self.get_by_id(id).await?;
            if current.slug != slug && self.slug_taken(slug).await? {
                return Err(DbError::Conflict {
                    entity: "organization".into(),
                }
                .into());
            }
        }

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.slug.is_some() {
            sets.push("slug = $slug");
        }
        if input.domain.is_some() {
            sets.push("domain = $domain");
        }
        if input.settings.is_some() {
            sets.push("settings = $settings");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('organization', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(slug) = input.slug {
            builder = builder.bind(("slug", slug));
        }
        if let Some(domain) = input.domain {
            // Some(None) clears the domain.
            builder = builder.bind(("domain", domain));
        }
        if let Some(settings) = input.settings {
            builder = builder.bind(("settings", settings));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| query_failed("organization", e))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "organization".into(),
            id: id_str,
        })?;

        Ok(row.into_organization(id)?)
    }

    async fn deactivate(&self, id: Uuid) -> LeadpilotResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('organization', $id) SET \
                 is_active = false, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| query_failed("organization", e))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "organization".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }
}
