use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::flows::states::{FlowAction, FlowEvent, FlowState, Transition};

use FlowAction::{DispatchExecution, FoldResultIntoReply, PromptForMissingFields, RequestConfirmation};
use FlowEvent::{
    ConfirmationReceived, ExecutionFinished, IntentCleared, ParametersComplete, ParametersIncomplete,
};
use FlowState::{AwaitingConfirmation, AwaitingParameters, Dispatched, Idle};

/// Edges accepted from any state except `Dispatched`. A confirmation may arrive on
/// the same turn that first names a capability, so nothing here requires a prior state.
const OPEN_EDGES: [(FlowEvent, FlowState, Option<FlowAction>); 4] = [
    (IntentCleared, Idle, None),
    (ParametersIncomplete, AwaitingParameters, Some(PromptForMissingFields)),
    (ParametersComplete, AwaitingConfirmation, Some(RequestConfirmation)),
    (ConfirmationReceived, Dispatched, Some(DispatchExecution)),
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot dispatch from {state}: still missing {}", missing_fields.join(", "))]
    MissingRequiredFields { state: FlowState, missing_fields: Vec<String> },
    #[error("`{event}` is not accepted while {state}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

/// `Idle -> AwaitingParameters -> AwaitingConfirmation -> Dispatched -> Idle`.
///
/// `Dispatched` only ever leaves through `ExecutionFinished`, so a capability is
/// started at most once per confirmation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConversationFlow;

impl ConversationFlow {
    pub fn step(
        &self,
        current: FlowState,
        event: FlowEvent,
        missing_fields: &[String],
    ) -> Result<Transition, FlowTransitionError> {
        let (to, action) = match (current, event) {
            (Dispatched, ExecutionFinished) => (Idle, Some(FoldResultIntoReply)),
            (Dispatched, _) | (_, ExecutionFinished) => {
                return Err(FlowTransitionError::InvalidTransition { state: current, event });
            }
            (_, ConfirmationReceived) if !missing_fields.is_empty() => {
                return Err(FlowTransitionError::MissingRequiredFields {
                    state: current,
                    missing_fields: missing_fields.to_vec(),
                });
            }
            _ => OPEN_EDGES
                .iter()
                .find(|(accepted, _, _)| *accepted == event)
                .map(|(_, to, action)| (*to, *action))
                .ok_or(FlowTransitionError::InvalidTransition { state: current, event })?,
        };

        Ok(Transition { from: current, to, event, action })
    }

    /// Same as [`ConversationFlow::step`], recording the outcome on `sink`.
    pub fn step_audited(
        &self,
        current: FlowState,
        event: FlowEvent,
        missing_fields: &[String],
        sink: &(impl AuditSink + ?Sized),
        audit: &AuditContext,
    ) -> Result<Transition, FlowTransitionError> {
        let result = self.step(current, event, missing_fields);
        let record = match &result {
            Ok(transition) => audit
                .record("flow.transition_applied", AuditCategory::Flow, AuditOutcome::Accepted)
                .detail("from", transition.from.to_string())
                .detail("to", transition.to.to_string()),
            Err(error) => audit
                .record("flow.transition_rejected", AuditCategory::Flow, AuditOutcome::Refused)
                .detail("from", current.to_string())
                .detail("reason", error.to_string()),
        };
        sink.emit(record.detail("event", event.to_string()));
        result
    }
}
