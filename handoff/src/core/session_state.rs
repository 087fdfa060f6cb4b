//! Store-enforced state transitions for session records.

use crate::core::types::{MAX_CONTINUE_ATTEMPTS, Session, SessionPatch};
use crate::error::DelegateError;

/// Apply `patch` to `session` if it respects the session lifecycle.
///
/// Rejects (leaving `session` untouched) any write to a terminal session, any
/// illegal status change, a decreasing `continue_count`, or a count above
/// [`MAX_CONTINUE_ATTEMPTS`]. `updated_at` is left to the store.
pub fn apply_patch(session: &mut Session, patch: SessionPatch) -> Result<(), DelegateError> {
    let next_status = patch.status.unwrap_or(session.status);
    if !session.status.can_transition_to(next_status) {
        return Err(DelegateError::IllegalTransition {
            id: session.id.clone(),
            from: session.status,
            to: next_status,
        });
    }

    if let Some(count) = patch.continue_count
        && (count < session.continue_count || count > MAX_CONTINUE_ATTEMPTS)
    {
        return Err(DelegateError::IllegalTransition {
            id: session.id.clone(),
            from: session.status,
            to: next_status,
        });
    }

    session.status = next_status;
    if let Some(output) = patch.output {
        session.output = Some(output);
    }
    if let Some(error) = patch.error {
        session.error = Some(error);
    }
    if let Some(count) = patch.continue_count {
        session.continue_count = count;
    }
    Ok(())
}
