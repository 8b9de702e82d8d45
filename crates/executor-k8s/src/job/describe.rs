use k8s_openapi::api::core::v1::{Container, ContainerStatus, Event, Pod};
use std::fmt::Write;

/// Plain-text description of a pod, in the spirit of `kubectl describe pod`.
pub fn describe_pod(pod: &Pod, events: &[Event]) -> String {
    let mut out = String::new();
    let meta = &pod.metadata;
    let spec = pod.spec.clone().unwrap_or_default();
    let status = pod.status.clone().unwrap_or_default();

    let _ = writeln!(out, "Name:         {}", meta.name.as_deref().unwrap_or_default());
    let _ = writeln!(out, "Namespace:    {}", meta.namespace.as_deref().unwrap_or_default());
    let _ = writeln!(out, "Node:         {}", spec.node_name.as_deref().unwrap_or("<none>"));
    if let Some(start) = &status.start_time {
        let _ = writeln!(out, "Start Time:   {}", start.0.to_rfc3339());
    }
    let labels = meta
        .labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>();
    let _ = writeln!(
        out,
        "Labels:       {}",
        if labels.is_empty() { "<none>".to_string() } else { labels.join(",") }
    );
    let _ = writeln!(out, "Status:       {}", status.phase.as_deref().unwrap_or("Unknown"));
    if let Some(reason) = &status.reason {
        let _ = writeln!(out, "Reason:       {}", reason);
    }
    if let Some(message) = &status.message {
        let _ = writeln!(out, "Message:      {}", message);
    }
    let _ = writeln!(out, "IP:           {}", status.pod_ip.as_deref().unwrap_or_default());

    let init_statuses = status.init_container_statuses.unwrap_or_default();
    if let Some(init) = spec.init_containers.as_ref().filter(|c| !c.is_empty()) {
        let _ = writeln!(out, "Init Containers:");
        describe_containers(&mut out, init, &init_statuses);
    }
    let _ = writeln!(out, "Containers:");
    describe_containers(
        &mut out,
        &spec.containers,
        &status.container_statuses.unwrap_or_default(),
    );

    let conditions = status.conditions.unwrap_or_default();
    if !conditions.is_empty() {
        let _ = writeln!(out, "Conditions:");
        let _ = writeln!(out, "  Type              Status");
        for condition in &conditions {
            let _ = writeln!(out, "  {:<17} {}", condition.type_, condition.status);
        }
    }

    let pod_name = meta.name.as_deref().unwrap_or_default();
    let mut pod_events: Vec<&Event> = events
        .iter()
        .filter(|e| e.involved_object.name.as_deref() == Some(pod_name))
        .collect();
    pod_events.sort_by_key(|e| e.last_timestamp.as_ref().map(|t| t.0));
    if pod_events.is_empty() {
        let _ = writeln!(out, "Events:       <none>");
    } else {
        let _ = writeln!(out, "Events:");
        let _ = writeln!(out, "  Type     Reason            Message");
        for e in pod_events {
            let _ = writeln!(
                out,
                "  {:<8} {:<17} {}",
                e.type_.as_deref().unwrap_or_default(),
                e.reason.as_deref().unwrap_or_default(),
                e.message.as_deref().unwrap_or_default()
            );
        }
    }
    out
}

fn describe_containers(out: &mut String, containers: &[Container], statuses: &[ContainerStatus]) {
    for container in containers {
        let _ = writeln!(out, "  {}:", container.name);
        let _ = writeln!(out, "    Image:          {}", container.image.as_deref().unwrap_or_default());
        let Some(cs) = statuses.iter().find(|s| s.name == container.name) else {
            continue;
        };
        let _ = writeln!(out, "    State:          {}", container_state(cs));
        let _ = writeln!(out, "    Ready:          {}", cs.ready);
        let _ = writeln!(out, "    Restart Count:  {}", cs.restart_count);
    }
}

fn container_state(cs: &ContainerStatus) -> String {
    let Some(state) = &cs.state else {
        return "Unknown".to_string();
    };
    if let Some(waiting) = &state.waiting {
        return format!("Waiting ({})", waiting.reason.as_deref().unwrap_or_default());
    }
    if let Some(terminated) = &state.terminated {
        return format!(
            "Terminated ({}, exit code {})",
            terminated.reason.as_deref().unwrap_or_default(),
            terminated.exit_code
        );
    }
    if state.running.is_some() {
        return "Running".to_string();
    }
    "Unknown".to_string()
}
