use executor_core::status::{judge_existence, transfer_status, NativeStatus};
use executor_core::{CanonicalStatus, ExecutorError, StatusDesc};

#[test]
fn test_transfer_shared_table() {
    assert_eq!(transfer_status("error"), CanonicalStatus::Error);
    assert_eq!(transfer_status("created"), CanonicalStatus::Created);
    assert_eq!(transfer_status("unschedulable"), CanonicalStatus::Queued);
    assert_eq!(transfer_status("initial"), CanonicalStatus::Queued);
    assert_eq!(transfer_status("running"), CanonicalStatus::Running);
    assert_eq!(transfer_status("Active"), CanonicalStatus::Running);
    assert_eq!(transfer_status("stopped-ok"), CanonicalStatus::Success);
    assert_eq!(transfer_status("finished"), CanonicalStatus::Success);
    assert_eq!(transfer_status("stopped"), CanonicalStatus::Success);
    assert_eq!(transfer_status("stopped-failed"), CanonicalStatus::Failed);
    assert_eq!(transfer_status("FAILED"), CanonicalStatus::Failed);
    assert_eq!(transfer_status("stopped-by-killed"), CanonicalStatus::StoppedByUser);
    assert_eq!(transfer_status("not-found-in-cluster"), CanonicalStatus::StartError);
}

#[test]
fn test_unmapped_tokens_are_unknown() {
    assert_eq!(transfer_status(""), CanonicalStatus::Unknown);
    assert_eq!(transfer_status("Evicted"), CanonicalStatus::Unknown);
    assert_eq!(transfer_status("unknown"), CanonicalStatus::Unknown);
}

#[test]
fn test_native_tokens_round_through_table() {
    assert_eq!(CanonicalStatus::from(NativeStatus::Unschedulable), CanonicalStatus::Queued);
    assert_eq!(CanonicalStatus::from(NativeStatus::StoppedOnOk), CanonicalStatus::Success);
    assert_eq!(CanonicalStatus::from(NativeStatus::StoppedOnFailed), CanonicalStatus::Failed);
    assert_eq!(CanonicalStatus::from(NativeStatus::StoppedByKilled), CanonicalStatus::StoppedByUser);
    assert_eq!(CanonicalStatus::from(NativeStatus::Unknown), CanonicalStatus::Unknown);
}

#[test]
fn test_judge_existence_is_total() {
    for status in CanonicalStatus::ALL {
        let judged = judge_existence(status);
        match status {
            CanonicalStatus::Error | CanonicalStatus::Unknown => {
                assert!(matches!(judged, Err(ExecutorError::UndeterminedExistence(s)) if s == status));
            }
            CanonicalStatus::Created | CanonicalStatus::StartError => {
                let e = judged.unwrap();
                assert!(e.created && !e.started);
            }
            _ => {
                let e = judged.unwrap();
                assert!(e.created && e.started, "{status} should be started");
            }
        }
    }
}

#[test]
fn test_not_found_desc() {
    let desc = StatusDesc::not_found_in_cluster();
    assert_eq!(desc.status, CanonicalStatus::StartError);
    assert!(desc.missing);
    assert!(!StatusDesc::new(CanonicalStatus::Running, "").missing);
}

#[test]
fn test_terminal_statuses() {
    assert!(CanonicalStatus::Success.is_terminal());
    assert!(CanonicalStatus::Failed.is_terminal());
    assert!(CanonicalStatus::StoppedByUser.is_terminal());
    assert!(!CanonicalStatus::Running.is_terminal());
    assert!(!CanonicalStatus::Queued.is_terminal());
}
