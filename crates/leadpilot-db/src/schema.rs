//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as strings,
//! enums as lowercase strings guarded by ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "rpc_functions",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1: tables
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Principals
-- =======================================================================
DEFINE TABLE principal SCHEMAFULL;
DEFINE FIELD email ON TABLE principal TYPE string;
DEFINE FIELD display_name ON TABLE principal TYPE option<string>;
DEFINE FIELD password_hash ON TABLE principal TYPE string;
DEFINE FIELD metadata ON TABLE principal TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD email_confirmed_at ON TABLE principal TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE principal TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE principal TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_principal_email ON TABLE principal COLUMNS email UNIQUE;

-- =======================================================================
-- Sessions
-- =======================================================================
DEFINE TABLE session SCHEMAFULL;
DEFINE FIELD principal_id ON TABLE session TYPE string;
DEFINE FIELD token_hash ON TABLE session TYPE string;
DEFINE FIELD expires_at ON TABLE session TYPE datetime;
DEFINE FIELD created_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_session_token ON TABLE session COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_session_principal ON TABLE session COLUMNS principal_id;

-- =======================================================================
-- Email verifications (single-use one-time codes)
-- =======================================================================
DEFINE TABLE email_verification SCHEMAFULL;
DEFINE FIELD principal_id ON TABLE email_verification TYPE string;
DEFINE FIELD kind ON TABLE email_verification TYPE string \
    ASSERT $value IN ['signup', 'invite', 'magiclink', 'recovery', \
    'email_change'];
DEFINE FIELD token_hash ON TABLE email_verification TYPE string;
DEFINE FIELD expires_at ON TABLE email_verification TYPE datetime;
DEFINE FIELD created_at ON TABLE email_verification TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_verification_token ON TABLE email_verification \
    COLUMNS token_hash UNIQUE;

-- =======================================================================
-- Organizations
-- =======================================================================
DEFINE TABLE organization SCHEMAFULL;
DEFINE FIELD name ON TABLE organization TYPE string;
DEFINE FIELD slug ON TABLE organization TYPE string;
DEFINE FIELD domain ON TABLE organization TYPE option<string>;
DEFINE FIELD settings ON TABLE organization TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD subscription_plan ON TABLE organization TYPE string \
    ASSERT $value IN ['starter', 'professional', 'enterprise', 'developer'] \
    DEFAULT 'starter';
DEFINE FIELD is_active ON TABLE organization TYPE bool DEFAULT true;
DEFINE FIELD membership_revision ON TABLE organization TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_organization_slug ON TABLE organization \
    COLUMNS slug UNIQUE;

-- =======================================================================
-- Memberships (principal x organization)
-- =======================================================================
DEFINE TABLE user_organization SCHEMAFULL;
DEFINE FIELD user_id ON TABLE user_organization TYPE string;
DEFINE FIELD organization_id ON TABLE user_organization TYPE string;
DEFINE FIELD role ON TABLE user_organization TYPE string \
    ASSERT $value IN ['owner', 'admin', 'member'];
DEFINE FIELD is_active ON TABLE user_organization TYPE bool DEFAULT true;
DEFINE FIELD blocked ON TABLE user_organization TYPE bool DEFAULT false;
DEFINE FIELD approval_status ON TABLE user_organization TYPE string \
    ASSERT $value IN ['pending', 'approved', 'rejected'] \
    DEFAULT 'pending';
DEFINE FIELD joined_at ON TABLE user_organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user_organization TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_organization_pair ON TABLE user_organization \
    COLUMNS user_id, organization_id UNIQUE;
DEFINE INDEX idx_user_organization_org ON TABLE user_organization \
    COLUMNS organization_id;

-- =======================================================================
-- Invitations
-- =======================================================================
DEFINE TABLE invitation SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE invitation TYPE string;
DEFINE FIELD email ON TABLE invitation TYPE string;
DEFINE FIELD role ON TABLE invitation TYPE string \
    ASSERT $value IN ['admin', 'member'];
DEFINE FIELD invited_by ON TABLE invitation TYPE string;
DEFINE FIELD delivery ON TABLE invitation TYPE string \
    ASSERT $value IN ['pending_integration', 'delivered'] \
    DEFAULT 'pending_integration';
DEFINE FIELD created_at ON TABLE invitation TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_invitation_org_email ON TABLE invitation \
    COLUMNS organization_id, email UNIQUE;

-- =======================================================================
-- Support tickets
-- =======================================================================
DEFINE TABLE support_ticket SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE support_ticket TYPE string;
DEFINE FIELD created_by ON TABLE support_ticket TYPE string;
DEFINE FIELD subject ON TABLE support_ticket TYPE string;
DEFINE FIELD description ON TABLE support_ticket TYPE string;
DEFINE FIELD status ON TABLE support_ticket TYPE string \
    ASSERT $value IN ['open', 'in_progress', 'resolved', 'closed'] \
    DEFAULT 'open';
DEFINE FIELD priority ON TABLE support_ticket TYPE string \
    ASSERT $value IN ['low', 'medium', 'high', 'urgent'];
DEFINE FIELD created_at ON TABLE support_ticket TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE support_ticket TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_ticket_org ON TABLE support_ticket \
    COLUMNS organization_id;

DEFINE TABLE ticket_message SCHEMAFULL;
DEFINE FIELD ticket_id ON TABLE ticket_message TYPE string;
DEFINE FIELD author_id ON TABLE ticket_message TYPE string;
DEFINE FIELD body ON TABLE ticket_message TYPE string;
DEFINE FIELD is_staff_reply ON TABLE ticket_message TYPE bool \
    DEFAULT false;
DEFINE FIELD created_at ON TABLE ticket_message TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_ticket_message_ticket ON TABLE ticket_message \
    COLUMNS ticket_id;
";

// -----------------------------------------------------------------------
// Schema v2: RPC capabilities
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE FUNCTION IF NOT EXISTS fn::is_user_approved_and_active($user_id: string) {
    LET $granted = (SELECT VALUE id FROM user_organization \
        WHERE user_id = $user_id AND is_active = true \
        AND approval_status = 'approved');
    RETURN array::len($granted) > 0;
};

DEFINE FUNCTION IF NOT EXISTS fn::get_user_approval_status_message($user_id: string) {
    LET $all = (SELECT VALUE id FROM user_organization \
        WHERE user_id = $user_id);
    IF array::len($all) = 0 {
        RETURN { status: 'approved', message: 'No memberships yet' };
    };
    LET $granted = (SELECT VALUE id FROM user_organization \
        WHERE user_id = $user_id AND is_active = true \
        AND approval_status = 'approved');
    IF array::len($granted) > 0 {
        RETURN { status: 'approved', message: 'Account approved' };
    };
    LET $pending = (SELECT VALUE id FROM user_organization \
        WHERE user_id = $user_id AND approval_status = 'pending');
    IF array::len($pending) > 0 {
        RETURN { status: 'pending', \
            message: 'Your account is awaiting administrator approval' };
    };
    LET $rejected = (SELECT VALUE id FROM user_organization \
        WHERE user_id = $user_id AND approval_status = 'rejected');
    IF array::len($rejected) > 0 {
        RETURN { status: 'rejected', \
            message: 'Your account request was rejected' };
    };
    RETURN { status: 'pending', \
        message: 'Your account has been deactivated' };
};

DEFINE FUNCTION IF NOT EXISTS fn::get_admin_users() {
    RETURN (SELECT meta::id(id) AS record_id, * FROM user_organization \
        ORDER BY joined_at DESC);
};

DEFINE FUNCTION IF NOT EXISTS fn::approve_user($user_id: string) {
    LET $updated = (UPDATE user_organization SET \
        approval_status = 'approved', is_active = true, \
        updated_at = time::now() \
        WHERE user_id = $user_id AND approval_status = 'pending');
    RETURN array::len($updated);
};

DEFINE FUNCTION IF NOT EXISTS fn::reject_user($user_id: string) {
    LET $updated = (UPDATE user_organization SET \
        approval_status = 'rejected', updated_at = time::now() \
        WHERE user_id = $user_id AND approval_status = 'pending');
    RETURN array::len($updated);
};

DEFINE FUNCTION IF NOT EXISTS fn::set_user_active($user_id: string, $active: bool) {
    LET $all = (SELECT VALUE id FROM user_organization \
        WHERE user_id = $user_id);
    IF $active {
        UPDATE user_organization SET \
            is_active = true, blocked = false, updated_at = time::now() \
            WHERE user_id = $user_id AND blocked = true;
    } ELSE {
        UPDATE user_organization SET \
            is_active = false, blocked = true, updated_at = time::now() \
            WHERE user_id = $user_id AND is_active = true;
    };
    RETURN array::len($all);
};

DEFINE FUNCTION IF NOT EXISTS fn::update_organization_subscription_plan($org_id: string, $plan: string) {
    LET $updated = (UPDATE type::record('organization', $org_id) SET \
        subscription_plan = $plan, updated_at = time::now() \
        WHERE subscription_plan != 'developer');
    RETURN array::len($updated);
};
";

/// Run all pending migrations against the given SurrealDB instance.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Raw table DDL (version 1).
///
/// Applying only this schema yields a backend without any RPC
/// capability, which is how the approval fail-open path is exercised.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

/// Raw RPC function DDL (version 2).
pub fn schema_v2() -> &'static str {
    SCHEMA_V2
}
