//! Platform admin gate and cross-tenant console against an in-memory
//! SurrealDB with the RPC functions deployed.

use leadpilot_core::error::{ErrorCategory, LeadpilotError};
use leadpilot_core::models::membership::{
    ApprovalStatus, CreateMembership, MembershipRole, OrganizationMembership, UpdateMembership,
};
use leadpilot_core::models::organization::{CreateOrganization, SubscriptionPlan};
use leadpilot_core::models::principal::CreatePrincipal;
use leadpilot_core::models::ticket::{CreateTicket, TicketPriority, TicketStatus};
use leadpilot_core::repository::{
    MembershipRepository, OrganizationRepository, PrincipalRepository, TicketRepository,
};
use leadpilot_db::repository::{
    SurrealMembershipRepository, SurrealOrganizationRepository, SurrealPrincipalRepository,
    SurrealRpcGateway, SurrealTicketRepository,
};
use leadpilot_tenancy::{
    AdminConsole, ApprovalChecker, BlockUser, MembershipResolver, PendingAction, PlanChange,
    is_platform_admin,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

type Console = AdminConsole<SurrealRpcGateway<Db>, SurrealTicketRepository<Db>>;

struct Platform {
    db: Surreal<Db>,
    /// Owner of the developer-plan organization.
    admin: OrganizationMembership,
    /// Second member of the developer-plan organization.
    fellow_admin: Uuid,
    customer_owner: Uuid,
    applicant: Uuid,
    customer_org: Uuid,
}

async fn principal(db: &Surreal<Db>, email: &str) -> Uuid {
    SurrealPrincipalRepository::new(db.clone())
        .create(CreatePrincipal {
            email: email.into(),
            password: "a-long-enough-password".into(),
            display_name: None,
            metadata: None,
        })
        .await
        .unwrap()
        .id
}

async fn organization(
    db: &Surreal<Db>,
    slug: &str,
    plan: SubscriptionPlan,
    owner: Uuid,
) -> OrganizationMembership {
    SurrealOrganizationRepository::new(db.clone())
        .create_with_owner(
            CreateOrganization {
                name: slug.to_uppercase(),
                slug: slug.into(),
                domain: None,
                settings: None,
                subscription_plan: plan,
            },
            owner,
        )
        .await
        .unwrap()
}

async fn platform() -> Platform {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    leadpilot_db::run_migrations(&db).await.unwrap();

    let admin_id = principal(&db, "admin@leadpilot.test").await;
    let fellow_admin = principal(&db, "fellow@leadpilot.test").await;
    let customer_owner = principal(&db, "owner@customer.test").await;
    let applicant = principal(&db, "applicant@customer.test").await;

    let admin = organization(&db, "platform", SubscriptionPlan::Developer, admin_id).await;
    let customer = organization(&db, "customer", SubscriptionPlan::Starter, customer_owner).await;

    let members = SurrealMembershipRepository::new(db.clone());
    members
        .create(CreateMembership {
            user_id: fellow_admin,
            organization_id: admin.organization_id(),
            role: MembershipRole::Admin,
            approval_status: ApprovalStatus::Approved,
        })
        .await
        .unwrap();
    members
        .create(CreateMembership {
            user_id: applicant,
            organization_id: customer.organization_id(),
            role: MembershipRole::Member,
            approval_status: ApprovalStatus::Pending,
        })
        .await
        .unwrap();

    Platform {
        db,
        admin,
        fellow_admin,
        customer_owner,
        applicant,
        customer_org: customer.organization_id(),
    }
}

fn open(p: &Platform) -> Console {
    AdminConsole::open(
        &p.admin,
        SurrealRpcGateway::new(p.db.clone()),
        SurrealTicketRepository::new(p.db.clone()),
    )
    .unwrap()
}

#[tokio::test]
async fn gate_requires_developer_plan() {
    let p = platform().await;
    assert!(is_platform_admin(&p.admin.organization));

    let customer = SurrealMembershipRepository::new(p.db.clone())
        .list_accessible(p.customer_owner)
        .await
        .unwrap()
        .remove(0);
    assert!(!is_platform_admin(&customer.organization));

    let err = AdminConsole::open(
        &customer,
        SurrealRpcGateway::new(p.db.clone()),
        SurrealTicketRepository::new(p.db.clone()),
    )
    .err()
    .unwrap();
    assert_eq!(err.category(), ErrorCategory::Authorization);
}

#[tokio::test]
async fn refresh_lists_users_across_every_organization() {
    let p = platform().await;
    let console = open(&p);
    assert!(console.users().is_empty());

    let users = console.refresh().await.unwrap();
    assert_eq!(users.len(), 4);
    assert!(users.iter().any(|u| u.organization_id == p.customer_org));
    assert_eq!(console.users(), users);
}

#[tokio::test]
async fn caller_cannot_block_themself() {
    let p = platform().await;
    let console = open(&p);

    let failed = console
        .block(
            PendingAction::new(BlockUser {
                user_id: p.admin.membership.user_id,
            })
            .confirm(),
        )
        .await
        .unwrap_err();
    assert_eq!(failed.error.category(), ErrorCategory::Authorization);
    assert_eq!(failed.pending.action().user_id, p.admin.membership.user_id);
}

#[tokio::test]
async fn developer_plan_members_cannot_be_blocked() {
    let p = platform().await;
    let console = open(&p);
    console.refresh().await.unwrap();
    let before = console.users();

    let failed = console
        .block(
            PendingAction::new(BlockUser {
                user_id: p.fellow_admin,
            })
            .confirm(),
        )
        .await
        .unwrap_err();
    assert_eq!(failed.error.category(), ErrorCategory::Authorization);
    assert_eq!(console.users(), before);
}

#[tokio::test]
async fn block_and_activate_customer() {
    let p = platform().await;
    let console = open(&p);
    let checker = ApprovalChecker::new(SurrealRpcGateway::new(p.db.clone()));

    let users = console
        .block(
            PendingAction::new(BlockUser {
                user_id: p.customer_owner,
            })
            .confirm(),
        )
        .await
        .unwrap();
    let owner_row = users.iter().find(|u| u.user_id == p.customer_owner).unwrap();
    assert!(!owner_row.is_active);

    let check = checker.check(p.customer_owner).await.unwrap();
    assert!(!check.is_approved());
    assert_eq!(
        check.message.as_deref(),
        Some("Your account has been deactivated")
    );

    console.activate(p.customer_owner).await.unwrap();
    assert!(checker.check(p.customer_owner).await.unwrap().is_approved());
}

#[tokio::test]
async fn activation_keeps_removed_memberships_removed() {
    let p = platform().await;
    let console = open(&p);

    let agency = organization(&p.db, "agency", SubscriptionPlan::Starter, p.applicant).await;
    let members = SurrealMembershipRepository::new(p.db.clone());
    members
        .create(CreateMembership {
            user_id: p.customer_owner,
            organization_id: agency.organization_id(),
            role: MembershipRole::Member,
            approval_status: ApprovalStatus::Approved,
        })
        .await
        .unwrap();
    members
        .deactivate(p.customer_owner, agency.organization_id())
        .await
        .unwrap();

    console
        .block(
            PendingAction::new(BlockUser {
                user_id: p.customer_owner,
            })
            .confirm(),
        )
        .await
        .unwrap();
    let users = console.activate(p.customer_owner).await.unwrap();

    let rows: Vec<_> = users
        .iter()
        .filter(|u| u.user_id == p.customer_owner)
        .collect();
    assert_eq!(rows.len(), 2);
    for row in rows {
        let expected = row.organization_id == p.customer_org;
        assert_eq!(row.is_active, expected, "{}", row.organization_name);
    }
}

#[tokio::test]
async fn developer_plan_cannot_be_taken_away() {
    let p = platform().await;
    let console = open(&p);
    let platform_org = p.admin.organization_id();

    let failed = console
        .change_plan(
            PendingAction::new(PlanChange {
                organization_id: platform_org,
                plan: SubscriptionPlan::Starter,
            })
            .confirm(),
        )
        .await
        .unwrap_err();
    assert_eq!(failed.error.category(), ErrorCategory::Authorization);

    let org = SurrealOrganizationRepository::new(p.db.clone())
        .get_by_id(platform_org)
        .await
        .unwrap();
    assert_eq!(org.subscription_plan, SubscriptionPlan::Developer);
}

#[tokio::test]
async fn developer_plan_cannot_be_assigned() {
    let p = platform().await;
    let console = open(&p);

    let failed = console
        .change_plan(
            PendingAction::new(PlanChange {
                organization_id: p.customer_org,
                plan: SubscriptionPlan::Developer,
            })
            .confirm(),
        )
        .await
        .unwrap_err();
    assert_eq!(failed.error.category(), ErrorCategory::Authorization);

    let org = SurrealOrganizationRepository::new(p.db.clone())
        .get_by_id(p.customer_org)
        .await
        .unwrap();
    assert_eq!(org.subscription_plan, SubscriptionPlan::Starter);
}

#[tokio::test]
async fn customer_plans_can_be_assigned() {
    let p = platform().await;
    let console = open(&p);

    for plan in SubscriptionPlan::customer_plans() {
        let users = console
            .change_plan(
                PendingAction::new(PlanChange {
                    organization_id: p.customer_org,
                    plan,
                })
                .confirm(),
            )
            .await
            .unwrap();
        let row = users
            .iter()
            .find(|u| u.organization_id == p.customer_org)
            .unwrap();
        assert_eq!(row.subscription_plan, plan);
    }
}

#[tokio::test]
async fn approval_unlocks_the_organization() {
    let p = platform().await;
    let console = open(&p);
    let resolver = MembershipResolver::new(SurrealMembershipRepository::new(p.db.clone()));

    assert!(resolver.load(p.applicant).await.unwrap().memberships.is_empty());

    let users = console.approve(p.applicant).await.unwrap();
    let row = users.iter().find(|u| u.user_id == p.applicant).unwrap();
    assert_eq!(row.approval_status, ApprovalStatus::Approved);
    assert!(row.is_active);

    let loaded = resolver.load(p.applicant).await.unwrap();
    assert_eq!(loaded.memberships.len(), 1);
    assert_eq!(loaded.memberships[0].organization_id(), p.customer_org);
}

#[tokio::test]
async fn rejection_sticks_until_manual_reset() {
    let p = platform().await;
    let console = open(&p);
    let resolver = MembershipResolver::new(SurrealMembershipRepository::new(p.db.clone()));

    console.reject(p.applicant).await.unwrap();
    let before = console.users();

    // Approving a rejected user is not a valid transition, and the
    // rendered list is left as it was.
    let err = console.approve(p.applicant).await.unwrap_err();
    assert!(matches!(err, LeadpilotError::InvalidTransition { .. }));
    assert_eq!(console.users(), before);
    assert!(resolver.load(p.applicant).await.unwrap().memberships.is_empty());

    // Manual reset outside the console.
    SurrealMembershipRepository::new(p.db.clone())
        .update(
            p.applicant,
            p.customer_org,
            UpdateMembership {
                approval_status: Some(ApprovalStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    console.approve(p.applicant).await.unwrap();
    assert_eq!(resolver.load(p.applicant).await.unwrap().memberships.len(), 1);
}

#[tokio::test]
async fn tickets_from_every_organization_can_be_answered() {
    let p = platform().await;
    let console = open(&p);
    let tickets = SurrealTicketRepository::new(p.db.clone());

    let ticket = tickets
        .create(CreateTicket {
            organization_id: p.customer_org,
            created_by: p.customer_owner,
            subject: "Campaign sync stalled".into(),
            description: "No metrics since Monday".into(),
            priority: TicketPriority::Urgent,
        })
        .await
        .unwrap();

    let listed = console.tickets().await.unwrap();
    assert_eq!(listed.len(), 1);

    let err = console
        .respond_to_ticket(ticket.id, TicketStatus::Resolved, "   ")
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);

    let (updated, message) = console
        .respond_to_ticket(ticket.id, TicketStatus::Resolved, "Fixed on our side")
        .await
        .unwrap();
    assert_eq!(updated.status, TicketStatus::Resolved);
    assert_eq!(message.author_id, p.admin.membership.user_id);

    let thread = console.ticket_messages(ticket.id).await.unwrap();
    assert_eq!(thread.len(), 1);
}
