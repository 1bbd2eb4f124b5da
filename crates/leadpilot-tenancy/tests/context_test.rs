//! Organization context against an in-memory SurrealDB: selection,
//! organization lifecycle and membership mutations.

use std::sync::Arc;

use leadpilot_core::error::{ErrorCategory, LeadpilotError};
use leadpilot_core::models::invitation::DeliveryStatus;
use leadpilot_core::models::membership::{
    ApprovalStatus, CreateMembership, MembershipRole, RoleChange,
};
use leadpilot_core::repository::{MembershipRepository, OrganizationRepository};
use leadpilot_db::repository::{SurrealMembershipRepository, SurrealOrganizationRepository};
use leadpilot_tenancy::{
    ContextState, FileSelectionStore, MemorySelectionStore, NewOrganization, OrganizationChanges,
    OrganizationContext, PendingAction, RemoveMember, SelectionStore,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

type Context = OrganizationContext<SurrealOrganizationRepository<Db>, SurrealMembershipRepository<Db>>;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    leadpilot_db::run_migrations(&db).await.unwrap();
    db
}

fn context(db: &Surreal<Db>, selection: Arc<dyn SelectionStore>) -> Context {
    OrganizationContext::new(
        SurrealOrganizationRepository::new(db.clone()),
        SurrealMembershipRepository::new(db.clone()),
        selection,
    )
}

fn named(name: &str) -> NewOrganization {
    NewOrganization {
        name: name.into(),
        ..Default::default()
    }
}

/// Add `user_id` to the organization with the given role, approved.
async fn join(db: &Surreal<Db>, user_id: Uuid, organization_id: Uuid, role: MembershipRole) {
    SurrealMembershipRepository::new(db.clone())
        .create(CreateMembership {
            user_id,
            organization_id,
            role,
            approval_status: ApprovalStatus::Approved,
        })
        .await
        .unwrap();
}

// -----------------------------------------------------------------------
// Selection
// -----------------------------------------------------------------------

#[tokio::test]
async fn new_context_is_uninitialized() {
    let db = setup().await;
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    assert!(matches!(ctx.snapshot().state, ContextState::Uninitialized));
    assert!(matches!(
        ctx.create_organization(named("Acme")).await.unwrap_err(),
        LeadpilotError::AuthenticationFailed { .. }
    ));
}

#[tokio::test]
async fn principal_without_approved_memberships_is_empty() {
    let db = setup().await;
    let owner = Uuid::new_v4();
    let owner_ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    owner_ctx.activate(owner).await.unwrap();
    let org = owner_ctx.create_organization(named("Acme")).await.unwrap();

    let applicant = Uuid::new_v4();
    SurrealMembershipRepository::new(db.clone())
        .create(CreateMembership {
            user_id: applicant,
            organization_id: org.organization_id(),
            role: MembershipRole::Member,
            approval_status: ApprovalStatus::Pending,
        })
        .await
        .unwrap();

    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    let snapshot = ctx.activate(applicant).await.unwrap();
    assert!(matches!(snapshot.state, ContextState::Empty));
    assert!(snapshot.current().is_none());
    assert!(snapshot.memberships.is_empty());

    // A pending membership cannot be selected either.
    let err = ctx.switch_organization(org.organization_id()).unwrap_err();
    assert!(matches!(err, LeadpilotError::NotAMember { .. }));
    assert!(matches!(
        ctx.list_members().await.unwrap_err(),
        LeadpilotError::NoCurrentOrganization
    ));
}

#[tokio::test]
async fn created_organization_is_selected_with_owner_role() {
    let db = setup().await;
    let principal = Uuid::new_v4();
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));

    let snapshot = ctx.activate(principal).await.unwrap();
    assert!(matches!(snapshot.state, ContextState::Empty));

    let created = ctx.create_organization(named("Acme Corp!")).await.unwrap();
    assert_eq!(created.organization.slug, "acme-corp");
    assert_eq!(created.role(), MembershipRole::Owner);
    assert_eq!(created.membership.approval_status, ApprovalStatus::Approved);

    let snapshot = ctx.snapshot();
    assert_eq!(snapshot.current_organization_id(), Some(created.organization_id()));
    assert_eq!(snapshot.role(), Some(MembershipRole::Owner));
    assert!(snapshot.generation > 0);
}

#[tokio::test]
async fn blank_name_is_rejected_and_nothing_is_created() {
    let db = setup().await;
    let principal = Uuid::new_v4();
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(principal).await.unwrap();

    let err = ctx.create_organization(named("  ")).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(matches!(ctx.snapshot().state, ContextState::Empty));
}

#[tokio::test]
async fn explicit_slug_is_used_and_duplicates_are_rejected() {
    let db = setup().await;
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(Uuid::new_v4()).await.unwrap();

    let created = ctx
        .create_organization(NewOrganization {
            name: "Acme Corp".into(),
            slug: Some("acme".into()),
            domain: Some("Acme.Example".into()),
            settings: None,
        })
        .await
        .unwrap();
    assert_eq!(created.organization.slug, "acme");
    assert_eq!(created.organization.domain.as_deref(), Some("acme.example"));

    let err = ctx
        .create_organization(NewOrganization {
            name: "Other".into(),
            slug: Some("acme".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LeadpilotError::AlreadyExists { .. }));
    assert_eq!(ctx.snapshot().memberships.len(), 1);
}

#[tokio::test]
async fn switch_persists_and_bumps_generation() {
    let db = setup().await;
    let principal = Uuid::new_v4();
    let store = Arc::new(MemorySelectionStore::new());
    let ctx = context(&db, store.clone());
    ctx.activate(principal).await.unwrap();

    let first = ctx.create_organization(named("First")).await.unwrap();
    let second = ctx.create_organization(named("Second")).await.unwrap();
    assert_eq!(
        ctx.snapshot().current_organization_id(),
        Some(second.organization_id())
    );

    let mut rx = ctx.subscribe();
    let _ = rx.borrow_and_update();
    let before = ctx.snapshot().generation;

    let snapshot = ctx.switch_organization(first.organization_id()).unwrap();
    assert_eq!(snapshot.current_organization_id(), Some(first.organization_id()));
    assert_eq!(snapshot.generation, before + 1);
    assert!(rx.has_changed().unwrap());
    assert_eq!(store.load(principal).unwrap(), Some(first.organization_id()));
}

#[tokio::test]
async fn switch_to_foreign_organization_leaves_state_unchanged() {
    let db = setup().await;
    let stranger_ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    stranger_ctx.activate(Uuid::new_v4()).await.unwrap();
    let foreign = stranger_ctx.create_organization(named("Foreign")).await.unwrap();

    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(Uuid::new_v4()).await.unwrap();
    let own = ctx.create_organization(named("Own")).await.unwrap();
    let before = ctx.snapshot();

    let err = ctx.switch_organization(foreign.organization_id()).unwrap_err();
    assert!(matches!(err, LeadpilotError::NotAMember { .. }));

    let after = ctx.snapshot();
    assert_eq!(after.current_organization_id(), Some(own.organization_id()));
    assert_eq!(after.generation, before.generation);
}

#[tokio::test]
async fn persisted_selection_is_restored_on_next_session() {
    let db = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let principal = Uuid::new_v4();

    let ctx = context(&db, Arc::new(FileSelectionStore::new(dir.path())));
    ctx.activate(principal).await.unwrap();
    let first = ctx.create_organization(named("First")).await.unwrap();
    ctx.create_organization(named("Second")).await.unwrap();
    ctx.switch_organization(first.organization_id()).unwrap();
    ctx.sign_out();
    assert!(matches!(ctx.snapshot().state, ContextState::Uninitialized));

    // A fresh context over the same directory picks the persisted choice,
    // not the most recently joined organization.
    let ctx = context(&db, Arc::new(FileSelectionStore::new(dir.path())));
    let snapshot = ctx.activate(principal).await.unwrap();
    assert_eq!(snapshot.current_organization_id(), Some(first.organization_id()));
}

#[tokio::test]
async fn unusable_persisted_selection_falls_back_to_newest() {
    let db = setup().await;
    let principal = Uuid::new_v4();
    let store = Arc::new(MemorySelectionStore::new());
    store.save(principal, Uuid::new_v4()).unwrap();

    let owner_ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    owner_ctx.activate(Uuid::new_v4()).await.unwrap();
    let older = owner_ctx.create_organization(named("Older")).await.unwrap();
    let newer = owner_ctx.create_organization(named("Newer")).await.unwrap();
    join(&db, principal, older.organization_id(), MembershipRole::Member).await;
    join(&db, principal, newer.organization_id(), MembershipRole::Member).await;

    let ctx = context(&db, store.clone());
    let snapshot = ctx.activate(principal).await.unwrap();
    assert_eq!(snapshot.current_organization_id(), Some(newer.organization_id()));
    assert_eq!(store.load(principal).unwrap(), Some(newer.organization_id()));
}

#[tokio::test]
async fn deactivated_organization_drops_out_on_refresh() {
    let db = setup().await;
    let principal = Uuid::new_v4();
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(principal).await.unwrap();
    let keep = ctx.create_organization(named("Keep")).await.unwrap();
    let gone = ctx.create_organization(named("Gone")).await.unwrap();

    SurrealOrganizationRepository::new(db.clone())
        .deactivate(gone.organization_id())
        .await
        .unwrap();

    let snapshot = ctx.refresh().await.unwrap();
    assert_eq!(snapshot.memberships.len(), 1);
    assert_eq!(snapshot.current_organization_id(), Some(keep.organization_id()));
}

// -----------------------------------------------------------------------
// Organization updates
// -----------------------------------------------------------------------

#[tokio::test]
async fn rename_regenerates_slug_unless_overridden() {
    let db = setup().await;
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(Uuid::new_v4()).await.unwrap();
    ctx.create_organization(named("Acme")).await.unwrap();

    let renamed = ctx
        .update_organization(OrganizationChanges {
            name: Some("Acme Labs, Inc.".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(renamed.slug, "acme-labs-inc");
    assert_eq!(ctx.current().unwrap().organization.name, "Acme Labs, Inc.");

    let overridden = ctx
        .update_organization(OrganizationChanges {
            name: Some("Acme Again".into()),
            slug: Some("acme".into()),
            settings: Some(serde_json::json!({ "timezone": "UTC" })),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(overridden.slug, "acme");
    assert_eq!(overridden.settings["timezone"], "UTC");
}

#[tokio::test]
async fn members_cannot_update_the_organization() {
    let db = setup().await;
    let owner_ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    owner_ctx.activate(Uuid::new_v4()).await.unwrap();
    let org = owner_ctx.create_organization(named("Acme")).await.unwrap();

    let member = Uuid::new_v4();
    join(&db, member, org.organization_id(), MembershipRole::Member).await;
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(member).await.unwrap();

    let err = ctx
        .update_organization(OrganizationChanges {
            name: Some("Hijacked".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
}

// -----------------------------------------------------------------------
// Invitations
// -----------------------------------------------------------------------

#[tokio::test]
async fn invitations_report_pending_integration() {
    let db = setup().await;
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(Uuid::new_v4()).await.unwrap();
    let org = ctx.create_organization(named("Acme")).await.unwrap();

    let outcome = ctx
        .invite_user("new.hire@example.com", MembershipRole::Admin)
        .await
        .unwrap();
    assert_eq!(outcome.delivery, DeliveryStatus::PendingIntegration);
    assert_ne!(outcome.delivery, DeliveryStatus::Delivered);
    assert_eq!(outcome.invitation.organization_id, org.organization_id());
    assert_eq!(outcome.invitation.role, MembershipRole::Admin);
}

#[tokio::test]
async fn nobody_can_be_invited_as_owner() {
    let db = setup().await;
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(Uuid::new_v4()).await.unwrap();
    ctx.create_organization(named("Acme")).await.unwrap();

    let err = ctx
        .invite_user("boss@example.com", MembershipRole::Owner)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);

    let err = ctx
        .invite_user("not-an-email", MembershipRole::Member)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
}

// -----------------------------------------------------------------------
// Last-owner invariant
// -----------------------------------------------------------------------

struct Team {
    db: Surreal<Db>,
    ctx: Context,
    owner: Uuid,
    members: [Uuid; 2],
    org_id: Uuid,
}

/// One owner (the context's principal) and two members.
async fn team() -> Team {
    let db = setup().await;
    let owner = Uuid::new_v4();
    let ctx = context(&db, Arc::new(MemorySelectionStore::new()));
    ctx.activate(owner).await.unwrap();
    let org = ctx.create_organization(named("Acme")).await.unwrap();
    let members = [Uuid::new_v4(), Uuid::new_v4()];
    for member in members {
        join(&db, member, org.organization_id(), MembershipRole::Member).await;
    }
    Team {
        db,
        ctx,
        owner,
        members,
        org_id: org.organization_id(),
    }
}

#[tokio::test]
async fn sole_owner_cannot_be_removed() {
    let t = team().await;

    let failed = t
        .ctx
        .remove_user(PendingAction::new(RemoveMember { user_id: t.owner }).confirm())
        .await
        .unwrap_err();
    assert!(matches!(failed.error, LeadpilotError::LastOwner { .. }));
    // The confirmation is handed back for re-display.
    assert_eq!(failed.pending.action().user_id, t.owner);

    let owner = SurrealMembershipRepository::new(t.db.clone())
        .get(t.owner, t.org_id)
        .await
        .unwrap();
    assert!(owner.is_active);
}

#[tokio::test]
async fn sole_owner_cannot_be_demoted_alone() {
    let t = team().await;

    let err = t
        .ctx
        .update_user_role(t.owner, MembershipRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadpilotError::LastOwner { .. }));
    assert_eq!(t.ctx.snapshot().role(), Some(MembershipRole::Owner));
}

#[tokio::test]
async fn ownership_handover_in_one_call() {
    let t = team().await;
    let successor = t.members[0];

    let updated = t
        .ctx
        .update_user_roles(vec![
            RoleChange {
                user_id: successor,
                role: MembershipRole::Owner,
            },
            RoleChange {
                user_id: t.owner,
                role: MembershipRole::Member,
            },
        ])
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);

    // The reload picked up the caller's new role.
    assert_eq!(t.ctx.snapshot().role(), Some(MembershipRole::Member));

    let members = t.ctx.list_members().await.unwrap();
    let owners: Vec<Uuid> = members
        .iter()
        .filter(|m| m.is_active_owner())
        .map(|m| m.user_id)
        .collect();
    assert_eq!(owners, vec![successor]);
}

#[tokio::test]
async fn removing_a_member_is_soft() {
    let t = team().await;
    let leaving = t.members[1];

    let removed = t
        .ctx
        .remove_user(PendingAction::new(RemoveMember { user_id: leaving }).confirm())
        .await
        .unwrap();
    assert!(!removed.is_active);

    let members = t.ctx.list_members().await.unwrap();
    assert_eq!(members.len(), 3);

    // Removing again is not a valid transition.
    let failed = t
        .ctx
        .remove_user(PendingAction::new(RemoveMember { user_id: leaving }).confirm())
        .await
        .unwrap_err();
    assert!(matches!(failed.error, LeadpilotError::InvalidTransition { .. }));

    // The removed principal no longer resolves to the organization.
    let ctx = context(&t.db, Arc::new(MemorySelectionStore::new()));
    let snapshot = ctx.activate(leaving).await.unwrap();
    assert!(matches!(snapshot.state, ContextState::Empty));
}

#[tokio::test]
async fn admins_cannot_touch_owners() {
    let t = team().await;
    let admin = t.members[0];
    t.ctx
        .update_user_role(admin, MembershipRole::Admin)
        .await
        .unwrap();

    let admin_ctx = context(&t.db, Arc::new(MemorySelectionStore::new()));
    admin_ctx.activate(admin).await.unwrap();
    assert_eq!(admin_ctx.snapshot().role(), Some(MembershipRole::Admin));

    let failed = admin_ctx
        .remove_user(PendingAction::new(RemoveMember { user_id: t.owner }).confirm())
        .await
        .unwrap_err();
    assert_eq!(failed.error.category(), ErrorCategory::Authorization);

    let err = admin_ctx
        .update_user_role(t.members[1], MembershipRole::Owner)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);

    // Admin on member is fine.
    admin_ctx
        .update_user_role(t.members[1], MembershipRole::Admin)
        .await
        .unwrap();
}

#[tokio::test]
async fn second_owner_makes_removal_possible() {
    let t = team().await;
    t.ctx
        .update_user_role(t.members[0], MembershipRole::Owner)
        .await
        .unwrap();

    t.ctx
        .remove_user(PendingAction::new(RemoveMember { user_id: t.owner }).confirm())
        .await
        .unwrap();

    // The caller removed themself; the context falls back to Empty.
    assert!(matches!(t.ctx.snapshot().state, ContextState::Empty));
}

#[tokio::test]
async fn duplicate_and_empty_role_batches_are_invalid() {
    let t = team().await;

    let err = t.ctx.update_user_roles(Vec::new()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);

    let change = RoleChange {
        user_id: t.members[0],
        role: MembershipRole::Admin,
    };
    let err = t
        .ctx
        .update_user_roles(vec![change, change])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
}

/// Two owners changing the same member's role from separate sessions
/// never interleave: either both apply one after the other or the loser
/// is told another roster change is in flight.
#[tokio::test]
async fn concurrent_role_changes_from_two_sessions_serialize() {
    let t = team().await;
    let co_owner = t.members[0];
    let target = t.members[1];
    t.ctx
        .update_user_role(co_owner, MembershipRole::Owner)
        .await
        .unwrap();

    let other = context(&t.db, Arc::new(MemorySelectionStore::new()));
    other.activate(co_owner).await.unwrap();

    let (a, b) = tokio::join!(
        t.ctx.update_user_role(target, MembershipRole::Admin),
        other.update_user_role(target, MembershipRole::Member),
    );
    for result in [&a, &b] {
        if let Err(e) = result {
            assert!(matches!(e, LeadpilotError::OperationInFlight { .. }), "{e}");
        }
    }
    assert!(a.is_ok() || b.is_ok());

    // Sequential writes: the later one is what remains.
    t.ctx
        .update_user_role(target, MembershipRole::Admin)
        .await
        .unwrap();
    other
        .update_user_role(target, MembershipRole::Member)
        .await
        .unwrap();
    let stored = SurrealMembershipRepository::new(t.db.clone())
        .get(target, t.org_id)
        .await
        .unwrap();
    assert_eq!(stored.role, MembershipRole::Member);
}

#[tokio::test]
async fn removal_and_demotion_share_one_in_flight_slot() {
    let t = team().await;
    let co_owner = t.members[0];
    t.ctx
        .update_user_role(co_owner, MembershipRole::Owner)
        .await
        .unwrap();

    let (removed, demoted) = tokio::join!(
        t.ctx
            .remove_user(PendingAction::new(RemoveMember { user_id: co_owner }).confirm()),
        t.ctx.update_user_role(t.owner, MembershipRole::Member),
    );
    assert!(removed.is_err() || demoted.is_err());

    let owners = t
        .ctx
        .list_members()
        .await
        .unwrap()
        .iter()
        .filter(|m| m.is_active_owner())
        .count();
    assert!(owners >= 1);
}

#[tokio::test]
async fn owners_removing_each_other_from_two_sessions_keep_an_owner() {
    let t = team().await;
    let co_owner = t.members[0];
    t.ctx
        .update_user_role(co_owner, MembershipRole::Owner)
        .await
        .unwrap();
    let other = context(&t.db, Arc::new(MemorySelectionStore::new()));
    other.activate(co_owner).await.unwrap();

    let (removed, demoted) = tokio::join!(
        t.ctx
            .remove_user(PendingAction::new(RemoveMember { user_id: co_owner }).confirm()),
        other.update_user_role(t.owner, MembershipRole::Member),
    );
    assert!(removed.is_err() || demoted.is_err());

    let owners = SurrealMembershipRepository::new(t.db.clone())
        .list_for_organization(t.org_id)
        .await
        .unwrap()
        .iter()
        .filter(|m| m.is_active_owner())
        .count();
    assert_eq!(owners, 1);
}

#[tokio::test]
async fn demoted_owner_loses_rights_before_reloading() {
    let t = team().await;
    let co_owner = t.members[0];
    let member = t.members[1];
    t.ctx
        .update_user_role(co_owner, MembershipRole::Owner)
        .await
        .unwrap();

    let other = context(&t.db, Arc::new(MemorySelectionStore::new()));
    other.activate(co_owner).await.unwrap();
    other
        .update_user_role(t.owner, MembershipRole::Member)
        .await
        .unwrap();

    // The first session has not reloaded and still shows owner.
    assert_eq!(t.ctx.snapshot().role(), Some(MembershipRole::Owner));

    let failed = t
        .ctx
        .remove_user(PendingAction::new(RemoveMember { user_id: co_owner }).confirm())
        .await
        .unwrap_err();
    assert_eq!(failed.error.category(), ErrorCategory::Authorization);

    let err = t
        .ctx
        .update_user_role(member, MembershipRole::Admin)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);

    let err = t
        .ctx
        .update_organization(OrganizationChanges {
            name: Some("Taken Over".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);

    let err = t
        .ctx
        .invite_user("friend@example.com", MembershipRole::Admin)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);

    let stored = SurrealMembershipRepository::new(t.db.clone())
        .get(co_owner, t.org_id)
        .await
        .unwrap();
    assert!(stored.is_active_owner());
}
