use executor_core::{NativeStatus, StatusDesc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Event, Pod};

pub const ERR_INVALID_IMAGE_NAME: &str = "invalid image name";
pub const ERR_PULL_IMAGE: &str = "failed to pull image";
pub const ERR_OOM_KILLED: &str = "out of memory (OOMKilled)";
pub const ERR_NODE_SELECTOR_MISMATCHING: &str = "no node matches the node selector";
pub const ERR_INSUFFICIENT_FREE_CPU: &str = "insufficient free cpu";
pub const ERR_INSUFFICIENT_FREE_MEMORY: &str = "insufficient free memory";
pub const ERR_IMAGE_NEVER_PULL: &str = "image not present and pull policy is Never";
pub const ERR_NETWORK_NOT_READY: &str = "node network not ready";
pub const ERR_MOUNT_VOLUME: &str = "failed to mount volume";
pub const ERR_ALREADY_MOUNTED_VOLUME: &str = "volume already mounted";
pub const ERR_NODE_REBOOTED: &str = "node rebooted";

/// Composes the native status of a batch Job from the job and its pods.
///
/// A job the controller has not picked up yet is unschedulable. Otherwise any
/// failed pod fails the job, an unfinished job is running only while it has
/// active pods and none pending, and a finished job succeeded when it reached
/// its completions.
pub fn generate_kube_job_status(job: &Job, pods: &[Pod], last_msg: &str) -> StatusDesc {
    let mut last_msg = last_msg.to_string();
    let mut pods_pending = false;
    for pod in pods {
        let Some(status) = &pod.status else {
            continue;
        };
        if status.phase.as_deref() == Some("Pending") {
            pods_pending = true;
        }
        let terminated = status
            .container_statuses
            .iter()
            .flatten()
            .filter_map(|cs| cs.state.as_ref()?.terminated.as_ref())
            .filter(|t| t.exit_code != 0);
        for t in terminated {
            if let Some(reason) = t.reason.as_deref().and_then(parse_failed_reason) {
                last_msg = reason.to_string();
            }
        }
    }

    let status = job.status.clone().unwrap_or_default();
    if status.start_time.is_none() {
        return StatusDesc::from_native(NativeStatus::Unschedulable, "");
    }

    let native = if status.failed.unwrap_or(0) > 0 {
        NativeStatus::StoppedOnFailed
    } else if status.completion_time.is_none() {
        if status.active.unwrap_or(0) > 0 && !pods_pending {
            NativeStatus::Running
        } else {
            NativeStatus::Unschedulable
        }
    } else {
        let completions = job.spec.as_ref().and_then(|s| s.completions).unwrap_or(1);
        if status.succeeded.unwrap_or(0) >= completions {
            NativeStatus::StoppedOnOk
        } else {
            NativeStatus::StoppedOnFailed
        }
    };
    StatusDesc::from_native(native, last_msg)
}

/// Maps a terminated-container reason or pull failure to a stable category.
pub fn parse_failed_reason(message: &str) -> Option<&'static str> {
    if message.contains("InvalidImageName") {
        Some(ERR_INVALID_IMAGE_NAME)
    } else if message.contains("ImagePullBackOff") {
        Some(ERR_PULL_IMAGE)
    } else if message.contains("OOMKilled") {
        Some(ERR_OOM_KILLED)
    } else {
        None
    }
}

/// Reads scheduler messages such as
/// `0/8 nodes are available: 5 Insufficient cpu, 3 node(s) didn't match node selector.`
pub fn parse_failed_scheduling(message: &str) -> Option<&'static str> {
    if !message.contains("nodes are available") {
        return None;
    }
    let total: u32 = message
        .strip_prefix("0/")?
        .split_once(' ')?
        .0
        .parse()
        .ok()?;

    let not_matching: u32 = message
        .split([':', ','])
        .map(str::trim)
        .filter(|segment| segment.contains("node(s) didn't match node selector"))
        .filter_map(|segment| segment.split_once(' ')?.0.parse().ok())
        .last()
        .unwrap_or(0);

    if total > 0 && total == not_matching {
        Some(ERR_NODE_SELECTOR_MISMATCHING)
    } else if message.contains("Insufficient cpu") {
        Some(ERR_INSUFFICIENT_FREE_CPU)
    } else if message.contains("Insufficient memory") {
        Some(ERR_INSUFFICIENT_FREE_MEMORY)
    } else {
        None
    }
}

/// Category of one pod event, if it is one users should see.
pub fn analyze_event(reason: &str, message: &str) -> Option<&'static str> {
    match reason {
        "ErrImageNeverPull" => Some(ERR_IMAGE_NEVER_PULL),
        "NetworkNotReady" => Some(ERR_NETWORK_NOT_READY),
        "FailedAttachVolume" | "FailedMount" | "VolumeResizeFailed" | "FileSystemResizeFailed"
        | "FailedMapVolume" => Some(ERR_MOUNT_VOLUME),
        "AlreadyMountedVolume" => Some(ERR_ALREADY_MOUNTED_VOLUME),
        "Rebooted" => Some(ERR_NODE_REBOOTED),
        "FailedScheduling" => parse_failed_scheduling(message),
        "Failed" => parse_failed_reason(message),
        _ => None,
    }
}

/// Category of the latest interesting event among the job's pods, or empty.
pub fn last_event_message(events: &[Event], job_name: &str) -> String {
    events
        .iter()
        .filter(|e| {
            e.involved_object.kind.as_deref() == Some("Pod")
                && e.involved_object
                    .name
                    .as_deref()
                    .is_some_and(|name| name.starts_with(job_name))
        })
        .filter_map(|e| {
            let comment = analyze_event(
                e.reason.as_deref().unwrap_or_default(),
                e.message.as_deref().unwrap_or_default(),
            )?;
            Some((e.last_timestamp.as_ref().map(|t| t.0), comment))
        })
        .max_by_key(|(timestamp, _)| *timestamp)
        .map(|(_, comment)| comment.to_string())
        .unwrap_or_default()
}
