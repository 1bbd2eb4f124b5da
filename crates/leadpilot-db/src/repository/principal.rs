//! SurrealDB implementation of [`PrincipalRepository`].
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1). Salt is randomly
//! generated per hash. An optional pepper (server-side secret) can be
//! provided at construction time.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use leadpilot_core::error::LeadpilotResult;
use leadpilot_core::models::principal::{CreatePrincipal, Principal};
use leadpilot_core::repository::PrincipalRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid, query_failed};

#[derive(Debug, SurrealValue)]
struct PrincipalRow {
    email: String,
    display_name: Option<String>,
    password_hash: String,
    metadata: serde_json::Value,
    email_confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row projection that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
pub(crate) struct PrincipalRowWithId {
    pub(crate) record_id: String,
    pub(crate) email: String,
    pub(crate) display_name: Option<String>,
    password_hash: String,
    metadata: serde_json::Value,
    pub(crate) email_confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PrincipalRow {
    fn into_principal(self, id: Uuid) -> Principal {
        Principal {
            id,
            email: self.email,
            display_name: self.display_name,
            password_hash: self.password_hash,
            metadata: self.metadata,
            email_confirmed_at: self.email_confirmed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl PrincipalRowWithId {
    fn try_into_principal(self) -> Result<Principal, DbError> {
        let id = parse_uuid(&self.record_id, "principal")?;
        Ok(Principal {
            id,
            email: self.email,
            display_name: self.display_name,
            password_hash: self.password_hash,
            metadata: self.metadata,
            email_confirmed_at: self.email_confirmed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Hash a password with Argon2id using OWASP-recommended parameters.
///
/// If a pepper is provided, it is prepended to the password before
/// hashing.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Query(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| DbError::Query(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// SurrealDB implementation of the Principal repository.
#[derive(Clone)]
pub struct SurrealPrincipalRepository<C: Connection> {
    db: Surreal<C>,
    pepper: Option<String>,
}

impl<C: Connection> SurrealPrincipalRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db, pepper: None }
    }

    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self {
            db,
            pepper: Some(pepper),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM principal \
                 WHERE email = $email",
            )
            .bind(("email", email.to_string()))
            .await?;

        let rows: Vec<PrincipalRowWithId> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(PrincipalRowWithId::try_into_principal)
            .transpose()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl<C: Connection> PrincipalRepository for SurrealPrincipalRepository<C> {
    async fn create(&self, input: CreatePrincipal) -> LeadpilotResult<Principal> {
        let email = normalize_email(&input.email);
        if self.find_by_email(&email).await?.is_some() {
            return Err(DbError::Conflict {
                entity: "principal".into(),
            }
            .into());
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;
        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('principal', $id) SET \
                 email = $email, display_name = $display_name, \
                 password_hash = $password_hash, metadata = $metadata, \
                 email_confirmed_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", email))
            .bind(("display_name", input.display_name))
            .bind(("password_hash", password_hash))
            .bind(("metadata", metadata))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| query_failed("principal", e))?;

        let rows: Vec<PrincipalRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.into_principal(id))
    }

    async fn get_by_id(&self, id: Uuid) -> LeadpilotResult<Principal> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('principal', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PrincipalRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.into_principal(id))
    }

    async fn get_by_email(&self, email: &str) -> LeadpilotResult<Principal> {
        let email = normalize_email(email);
        self.find_by_email(&email).await?.ok_or_else(|| {
            DbError::NotFound {
                entity: "principal".into(),
                id: format!("email={email}"),
            }
            .into()
        })
    }

    async fn confirm_email(&self, id: Uuid) -> LeadpilotResult<Principal> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('principal', $id) SET \
                 email_confirmed_at = email_confirmed_at ?? time::now(), \
                 updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| query_failed("principal", e))?;

        let rows: Vec<PrincipalRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "principal".into(),
            id: id_str,
        })?;

        Ok(row.into_principal(id))
    }
}
