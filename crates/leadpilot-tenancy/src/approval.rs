//! Approval evaluation with the fail-open policy for missing capabilities.
//!
//! Order of evaluation:
//! 1. `is_user_approved_and_active` answering `true` settles it.
//! 2. Otherwise `get_user_approval_status_message` supplies the verdict.
//! 3. When both capabilities are absent the principal is treated as
//!    approved and the fallback is logged. An explicit `rejected` answer is
//!    never overridden.

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use leadpilot_core::models::membership::{ApprovalCheck, ApprovalSource, ApprovalStatus};
use leadpilot_core::repository::ApprovalGateway;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::guard::InFlightGuard;

const CHECK_APPROVAL: &str = "check_approval";

pub struct ApprovalChecker<A: ApprovalGateway> {
    gateway: A,
    guard: InFlightGuard,
}

impl<A: ApprovalGateway> ApprovalChecker<A> {
    pub fn new(gateway: A) -> Self {
        Self::with_guard(gateway, InFlightGuard::new())
    }

    /// Share an in-flight guard with other components so the check is
    /// deduplicated across them.
    pub fn with_guard(gateway: A, guard: InFlightGuard) -> Self {
        Self { gateway, guard }
    }

    pub fn gateway(&self) -> &A {
        &self.gateway
    }

    /// Evaluate the principal's approval state. A second call for the same
    /// principal while one is running fails with `OperationInFlight`.
    pub async fn check(&self, user_id: Uuid) -> LeadpilotResult<ApprovalCheck> {
        let _ticket = self.guard.try_acquire(CHECK_APPROVAL, user_id)?;
        let check = self.evaluate(user_id).await?;
        info!(
            %user_id,
            status = check.status.as_str(),
            source = ?check.source,
            "Approval evaluated"
        );
        Ok(check)
    }

    async fn evaluate(&self, user_id: Uuid) -> LeadpilotResult<ApprovalCheck> {
        let quick_check_absent = match self.gateway.is_user_approved_and_active(user_id).await {
            Ok(true) => {
                return Ok(ApprovalCheck {
                    status: ApprovalStatus::Approved,
                    message: None,
                    source: ApprovalSource::Backend,
                });
            }
            Ok(false) => false,
            Err(LeadpilotError::CapabilityUnavailable { capability }) => {
                debug!(%user_id, %capability, "Approval capability absent, trying status message");
                true
            }
            Err(e) => return Err(e),
        };

        match self.gateway.approval_status_message(user_id).await {
            Ok(answer) => Ok(ApprovalCheck {
                status: answer.status,
                message: answer.message,
                source: ApprovalSource::Backend,
            }),
            Err(LeadpilotError::CapabilityUnavailable { capability }) if quick_check_absent => {
                warn!(
                    %user_id,
                    %capability,
                    "Approval capabilities are not deployed; failing open to approved"
                );
                Ok(ApprovalCheck {
                    status: ApprovalStatus::Approved,
                    message: None,
                    source: ApprovalSource::FailOpen,
                })
            }
            Err(LeadpilotError::CapabilityUnavailable { capability }) => {
                // The backend already said "not approved"; only the
                // explanation is missing.
                debug!(%user_id, %capability, "Status message capability absent");
                Ok(ApprovalCheck {
                    status: ApprovalStatus::Pending,
                    message: None,
                    source: ApprovalSource::Backend,
                })
            }
            Err(e) => Err(e),
        }
    }
}
