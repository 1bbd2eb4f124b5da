//! Session store: sign-up, sign-in with approval gating, sign-out and
//! email verification.

use chrono::{Duration, Utc};
use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use leadpilot_core::models::membership::ApprovalCheck;
use leadpilot_core::models::principal::{CreatePrincipal, Principal};
use leadpilot_core::models::session::{CreateEmailVerification, CreateSession, VerificationKind};
use leadpilot_core::repository::{
    ApprovalGateway, PrincipalRepository, SessionRepository, VerificationRepository,
};
use leadpilot_tenancy::ApprovalChecker;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;
use crate::token::{self, VerificationTicket};

/// Input for the sign-up flow.
#[derive(Debug)]
pub struct SignUpInput {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Result of a sign-up. `verification` is `None` when email confirmation
/// is not required and the principal was confirmed on creation.
#[derive(Debug)]
pub struct SignUpOutput {
    pub principal: Principal,
    pub verification: Option<VerificationTicket>,
}

/// A live session.
#[derive(Debug)]
pub struct SignedIn {
    pub principal: Principal,
    /// Raw bearer token (return to client, not stored).
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: chrono::DateTime<Utc>,
    pub approval: ApprovalCheck,
}

#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn(SignedIn),
    /// Credentials were correct but the email address is unconfirmed. The
    /// caller should route to a "verify your email" screen.
    VerificationRequired { principal_id: Uuid, email: String },
    /// Credentials were correct but the principal is pending or rejected.
    /// No session was created.
    AwaitingApproval {
        principal_id: Uuid,
        approval: ApprovalCheck,
    },
}

pub struct SessionStore<P, S, V, A>
where
    P: PrincipalRepository,
    S: SessionRepository,
    V: VerificationRepository,
    A: ApprovalGateway,
{
    principals: P,
    sessions: S,
    verifications: V,
    approval: ApprovalChecker<A>,
    config: AuthConfig,
}

impl<P, S, V, A> SessionStore<P, S, V, A>
where
    P: PrincipalRepository,
    S: SessionRepository,
    V: VerificationRepository,
    A: ApprovalGateway,
{
    pub fn new(
        principals: P,
        sessions: S,
        verifications: V,
        approval: ApprovalChecker<A>,
        config: AuthConfig,
    ) -> Self {
        Self {
            principals,
            sessions,
            verifications,
            approval,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub async fn sign_up(&self, input: SignUpInput) -> LeadpilotResult<SignUpOutput> {
        // 1. Validate input before touching the store.
        if !looks_like_email(&input.email) {
            return Err(AuthError::InvalidEmail.into());
        }
        password::check_policy(&input.password, self.config.min_password_length)?;

        // 2. Create the principal (fails with AlreadyExists on a taken email).
        let display_name = input
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let principal = self
            .principals
            .create(CreatePrincipal {
                email: input.email,
                password: input.password,
                display_name,
                metadata: None,
            })
            .await?;

        info!(principal_id = %principal.id, "Principal signed up");

        // 3. Either issue a signup code or confirm straight away.
        if !self.config.require_email_confirmation {
            let principal = self.principals.confirm_email(principal.id).await?;
            return Ok(SignUpOutput {
                principal,
                verification: None,
            });
        }

        let ticket = self
            .issue_verification(principal.id, VerificationKind::Signup)
            .await?;
        Ok(SignUpOutput {
            principal,
            verification: Some(ticket),
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> LeadpilotResult<SignInOutcome> {
        // 1. Look up the principal. An unknown email and a wrong password
        //    are indistinguishable to the caller.
        let principal = match self.principals.get_by_email(email).await {
            Ok(p) => p,
            Err(LeadpilotError::NotFound { .. }) => {
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        // 2. Verify the password.
        let valid = password::verify_password(
            password,
            &principal.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            debug!(principal_id = %principal.id, "Sign-in rejected: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        // 3. Unconfirmed email is a routed condition, not a failure.
        if self.config.require_email_confirmation && !principal.is_email_confirmed() {
            info!(principal_id = %principal.id, "Sign-in needs email verification");
            return Ok(SignInOutcome::VerificationRequired {
                principal_id: principal.id,
                email: principal.email,
            });
        }

        // 4. Evaluate approval once for this sign-in.
        let approval = self.approval.check(principal.id).await?;
        if !approval.is_approved() {
            info!(
                principal_id = %principal.id,
                status = approval.status.as_str(),
                "Sign-in held for approval"
            );
            return Ok(SignInOutcome::AwaitingApproval {
                principal_id: principal.id,
                approval,
            });
        }

        // 5. Issue the session; only the token digest is persisted.
        let raw_token = token::generate_token();
        let expires_at =
            Utc::now() + Duration::seconds(self.config.session_lifetime_secs as i64);
        let session = self
            .sessions
            .create(CreateSession {
                principal_id: principal.id,
                token_hash: token::hash_token(&raw_token),
                expires_at,
            })
            .await?;

        info!(principal_id = %principal.id, session_id = %session.id, "Principal signed in");

        Ok(SignInOutcome::SignedIn(SignedIn {
            principal,
            token: raw_token,
            session_id: session.id,
            expires_at: session.expires_at,
            approval,
        }))
    }

    /// Invalidate the session behind a raw token. Signing out an unknown
    /// or already invalidated token succeeds.
    pub async fn sign_out(&self, raw_token: &str) -> LeadpilotResult<()> {
        match self
            .sessions
            .get_by_token_hash(&token::hash_token(raw_token))
            .await
        {
            Ok(session) => {
                self.sessions.invalidate(session.id).await?;
                info!(
                    principal_id = %session.principal_id,
                    session_id = %session.id,
                    "Principal signed out"
                );
                Ok(())
            }
            Err(LeadpilotError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Invalidate every session of a principal (sign out everywhere).
    pub async fn sign_out_everywhere(&self, principal_id: Uuid) -> LeadpilotResult<()> {
        self.sessions.invalidate_principal_sessions(principal_id).await?;
        info!(%principal_id, "All sessions invalidated");
        Ok(())
    }

    /// Consume a one-time code by its digest. Kinds that prove address
    /// ownership confirm the principal's email.
    pub async fn verify_otp(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> LeadpilotResult<Principal> {
        // 1. Consume; a second use of the same code finds nothing.
        let record = match self.verifications.consume(token_hash, kind).await {
            Ok(r) => r,
            Err(LeadpilotError::NotFound { .. }) => {
                return Err(AuthError::TokenInvalid(
                    "verification code is invalid or has already been used".into(),
                )
                .into());
            }
            Err(e) => return Err(e),
        };

        // 2. Expired codes are consumed too, so they cannot be retried.
        if record.expires_at < Utc::now() {
            return Err(AuthError::TokenExpired.into());
        }

        // 3. Apply the effect of the code.
        let principal = if kind.confirms_email() {
            self.principals.confirm_email(record.principal_id).await?
        } else {
            self.principals.get_by_id(record.principal_id).await?
        };

        info!(principal_id = %principal.id, kind = kind.as_str(), "Verification code accepted");
        Ok(principal)
    }

    /// Verify a raw signup token as delivered by email.
    pub async fn verify_email(&self, raw_token: &str) -> LeadpilotResult<Principal> {
        self.verify_otp(&token::hash_token(raw_token), VerificationKind::Signup)
            .await
    }

    /// Replace any outstanding signup codes with a fresh one.
    pub async fn resend_verification(&self, email: &str) -> LeadpilotResult<VerificationTicket> {
        let principal = self.principals.get_by_email(email).await?;
        if principal.is_email_confirmed() {
            return Err(AuthError::AlreadyConfirmed.into());
        }

        self.verifications
            .invalidate_for_principal(principal.id, VerificationKind::Signup)
            .await?;
        self.issue_verification(principal.id, VerificationKind::Signup)
            .await
    }

    /// Create a one-time code of any kind for out-of-band delivery.
    pub async fn issue_verification(
        &self,
        principal_id: Uuid,
        kind: VerificationKind,
    ) -> LeadpilotResult<VerificationTicket> {
        let raw_token = token::generate_token();
        let expires_at =
            Utc::now() + Duration::seconds(self.config.verification_lifetime_secs as i64);

        self.verifications
            .create(CreateEmailVerification {
                principal_id,
                kind,
                token_hash: token::hash_token(&raw_token),
                expires_at,
            })
            .await?;

        debug!(%principal_id, kind = kind.as_str(), "Verification code issued");

        Ok(VerificationTicket {
            principal_id,
            kind,
            token: raw_token,
            expires_at,
        })
    }

    /// Resolve a bearer token to its principal. Expired sessions are
    /// removed on sight.
    pub async fn principal_for_token(&self, raw_token: &str) -> LeadpilotResult<Principal> {
        let session = match self
            .sessions
            .get_by_token_hash(&token::hash_token(raw_token))
            .await
        {
            Ok(s) => s,
            Err(LeadpilotError::NotFound { .. }) => {
                return Err(AuthError::TokenInvalid("unknown session".into()).into());
            }
            Err(e) => return Err(e),
        };

        if session.expires_at < Utc::now() {
            self.sessions.invalidate(session.id).await?;
            return Err(AuthError::TokenExpired.into());
        }

        self.principals.get_by_id(session.principal_id).await
    }
}

fn looks_like_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
