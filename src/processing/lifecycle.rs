//! CANCEL, PAUSE, RESUME and SUSPEND.

use super::{require_key, BatchOperationProcessor};
use crate::constants::log_events;
use crate::engine::{AuthorizationCheck, AuthorizationRequest, DistributionTarget, ProcessingContext};
use crate::error::Result;
use crate::logging::log_batch_operation;
use crate::models::{BatchOperationCommand, BatchOperationKey, CommandIntent, ResponseValue};
use crate::state_machine::{
    BatchOperationEvent, CancelGuard, GuardResult, PauseGuard, ResumeGuard, StateGuard,
    SuspendGuard,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    Cancel,
    Pause,
    Resume,
    Suspend,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 4] = [Self::Cancel, Self::Pause, Self::Resume, Self::Suspend];

    pub fn intent(&self) -> CommandIntent {
        match self {
            Self::Cancel => CommandIntent::Cancel,
            Self::Pause => CommandIntent::Pause,
            Self::Resume => CommandIntent::Resume,
            Self::Suspend => CommandIntent::Suspend,
        }
    }

    pub fn command(&self) -> BatchOperationCommand {
        match self {
            Self::Cancel => BatchOperationCommand::Cancel,
            Self::Pause => BatchOperationCommand::Pause,
            Self::Resume => BatchOperationCommand::Resume,
            Self::Suspend => BatchOperationCommand::Suspend,
        }
    }

    pub fn event(&self) -> BatchOperationEvent {
        match self {
            Self::Cancel => BatchOperationEvent::Canceled,
            Self::Pause => BatchOperationEvent::Paused,
            Self::Resume => BatchOperationEvent::Resumed,
            Self::Suspend => BatchOperationEvent::Suspended,
        }
    }

    /// Run the guard of this action. Outstanding distributions only matter
    /// on the partition that accepted the command.
    fn check(
        &self,
        ctx: &ProcessingContext<'_>,
        key: BatchOperationKey,
        check_outstanding: bool,
    ) -> GuardResult<()> {
        let operation = ctx.state().get(key);
        match self {
            Self::Cancel => CancelGuard.check(key, operation),
            Self::Pause => PauseGuard.check(key, operation),
            Self::Resume => ResumeGuard.check(key, operation),
            Self::Suspend => SuspendGuard {
                outstanding_distributions: check_outstanding
                    && ctx.has_outstanding_distributions(key),
            }
            .check(key, operation),
        }
    }
}

pub struct LifecycleProcessor {
    action: LifecycleAction,
    authorization: Arc<dyn AuthorizationCheck>,
}

impl LifecycleProcessor {
    pub fn new(action: LifecycleAction, authorization: Arc<dyn AuthorizationCheck>) -> Self {
        Self {
            action,
            authorization,
        }
    }
}

impl BatchOperationProcessor for LifecycleProcessor {
    fn intent(&self) -> CommandIntent {
        self.action.intent()
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        _command: &BatchOperationCommand,
    ) -> Result<()> {
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };

        let request = AuthorizationRequest::for_update(ctx.record().username());
        if let Err(rejection) = self.authorization.is_authorized(&request) {
            ctx.reject(rejection);
            return Ok(());
        }

        if let Err(guard_error) = self.action.check(ctx, key, true) {
            ctx.reject(guard_error.into());
            return Ok(());
        }

        ctx.append_event(key, self.action.event());
        ctx.respond(ResponseValue::Accepted {
            key,
            intent: self.action.intent().to_string(),
        });
        ctx.distribute(key, self.action.command(), DistributionTarget::AllOthers);

        if self.action == LifecycleAction::Cancel {
            log_batch_operation(
                log_events::BATCH_OPERATION_CANCELED,
                key.value(),
                "CANCELED",
                None,
            );
        } else {
            debug!(key = %key, action = ?self.action, "Lifecycle command accepted");
        }
        Ok(())
    }

    fn process_distributed_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        _command: &BatchOperationCommand,
    ) -> Result<()> {
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };

        if !ctx.state().contains(key) {
            // Finished or never seen here; nothing left to change
            ctx.acknowledge();
            return Ok(());
        }

        match self.action.check(ctx, key, false) {
            Ok(()) => ctx.append_event(key, self.action.event()),
            Err(guard_error) => {
                debug!(key = %key, error = %guard_error, "Distributed lifecycle command not applicable");
                ctx.reject(guard_error.into());
            }
        }
        ctx.acknowledge();
        Ok(())
    }
}
