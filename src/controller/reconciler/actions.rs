//! # Action Selection
//!
//! Which single action a reconcile pass takes, decided purely from the
//! persisted resume token and the Ready condition's reason.

use super::annotations::ResumeToken;
use super::types::ReconcilerError;
use crate::arm::DELETE_POLLER_ID;
use crate::conditions::reasons;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileAction {
    BeginCreateOrUpdateResource,
    MonitorResourceCreation,
    StartDeleteOfResource,
    MonitorDelete,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileAction::BeginCreateOrUpdateResource => "BeginCreateOrUpdateResource",
            ReconcileAction::MonitorResourceCreation => "MonitorResourceCreation",
            ReconcileAction::StartDeleteOfResource => "StartDeleteOfResource",
            ReconcileAction::MonitorDelete => "MonitorDelete",
        }
    }
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Errors
/// Returns `CurrentlyDeleting` while the Ready reason is `Deleting`
pub fn determine_create_or_update_action(
    resume: Option<&ResumeToken>,
    ready_reason: Option<&str>,
) -> Result<ReconcileAction, ReconcilerError> {
    if ready_reason == Some(reasons::DELETING) {
        return Err(ReconcilerError::CurrentlyDeleting);
    }
    Ok(match resume {
        Some(_) => ReconcileAction::MonitorResourceCreation,
        None => ReconcileAction::BeginCreateOrUpdateResource,
    })
}

pub fn determine_delete_action(resume: Option<&ResumeToken>) -> ReconcileAction {
    match resume {
        Some(token) if token.poller_id == DELETE_POLLER_ID => ReconcileAction::MonitorDelete,
        _ => ReconcileAction::StartDeleteOfResource,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::CREATE_POLLER_ID;

    fn token(id: &str) -> ResumeToken {
        ResumeToken {
            poller_id: id.to_string(),
            token: "t".to_string(),
        }
    }

    #[test]
    fn test_create_or_update_selection() {
        assert_eq!(
            determine_create_or_update_action(None, None).unwrap(),
            ReconcileAction::BeginCreateOrUpdateResource
        );
        assert_eq!(
            determine_create_or_update_action(None, Some(reasons::SUCCEEDED)).unwrap(),
            ReconcileAction::BeginCreateOrUpdateResource
        );
        assert_eq!(
            determine_create_or_update_action(Some(&token(CREATE_POLLER_ID)), None).unwrap(),
            ReconcileAction::MonitorResourceCreation
        );
    }

    #[test]
    fn test_deleting_blocks_create() {
        for resume in [None, Some(token(CREATE_POLLER_ID))] {
            assert!(matches!(
                determine_create_or_update_action(resume.as_ref(), Some(reasons::DELETING)),
                Err(ReconcilerError::CurrentlyDeleting)
            ));
        }
    }

    #[test]
    fn test_delete_selection() {
        assert_eq!(determine_delete_action(None), ReconcileAction::StartDeleteOfResource);
        assert_eq!(
            determine_delete_action(Some(&token(CREATE_POLLER_ID))),
            ReconcileAction::StartDeleteOfResource
        );
        assert_eq!(
            determine_delete_action(Some(&token(DELETE_POLLER_ID))),
            ReconcileAction::MonitorDelete
        );
    }

    #[test]
    fn test_selection_is_a_pure_function_of_inputs() {
        let ids = [None, Some(CREATE_POLLER_ID), Some(DELETE_POLLER_ID), Some("other")];
        let ready = [None, Some(reasons::RECONCILING), Some(reasons::DELETING)];
        for id in ids {
            for reason in ready {
                let resume = id.map(token);
                let first = determine_create_or_update_action(resume.as_ref(), reason).ok();
                let second = determine_create_or_update_action(resume.as_ref(), reason).ok();
                assert_eq!(first, second);
                assert_eq!(
                    determine_delete_action(resume.as_ref()),
                    determine_delete_action(resume.as_ref())
                );
            }
        }
    }
}
