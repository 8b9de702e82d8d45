use crate::client::{is_already_exists, is_not_found, kube_error};
use crate::job::build::namespace_object;
use executor_core::ExecutorError;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource};
use tracing::{debug, info, warn};

/// Creates the namespace when absent.
pub async fn ensure_namespace(client: &Client, namespace: &str) -> Result<(), ExecutorError> {
    let api: Api<Namespace> = Api::all(client.clone());
    if api.get_opt(namespace).await.map_err(kube_error)?.is_some() {
        return Ok(());
    }
    match api.create(&PostParams::default(), &namespace_object(namespace)).await {
        Ok(_) => {
            info!("namespace {} created", namespace);
            Ok(())
        }
        Err(e) if is_already_exists(&e) => Ok(()),
        Err(e) => Err(ExecutorError::Kube(format!(
            "failed to create namespace {}, err: {}",
            namespace, e
        ))),
    }
}

/// Deletes the namespace; a missing one is fine.
pub async fn delete_namespace(client: &Client, namespace: &str) -> Result<(), ExecutorError> {
    let api: Api<Namespace> = Api::all(client.clone());
    match api.delete(namespace, &DeleteParams::default()).await {
        Ok(_) => {
            debug!("namespace {} deleted", namespace);
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            warn!("namespace {} not found", namespace);
            Ok(())
        }
        Err(e) => Err(ExecutorError::Kube(format!(
            "failed to delete namespace {}, err: {}",
            namespace, e
        ))),
    }
}

/// Objects not yet marked for deletion.
pub fn live_count<K: Resource>(objects: &[K]) -> usize {
    objects
        .iter()
        .filter(|o| o.meta().deletion_timestamp.is_none())
        .count()
}

/// Deletes the namespace when `live` is zero. A namespace already gone or
/// already terminating is left alone.
pub async fn clean_up_namespace(
    client: &Client,
    namespace: &str,
    live: usize,
    what: &str,
) -> Result<(), ExecutorError> {
    if live > 0 {
        return Err(ExecutorError::Backend(format!(
            "namespace {} still has {} live {}, skip clean up",
            namespace, live, what
        )));
    }
    let api: Api<Namespace> = Api::all(client.clone());
    let Some(ns) = api.get_opt(namespace).await.map_err(kube_error)? else {
        warn!("namespace {} not found", namespace);
        return Ok(());
    };
    if ns.metadata.deletion_timestamp.is_some() {
        debug!("namespace {} is already terminating", namespace);
        return Ok(());
    }
    delete_namespace(client, namespace).await?;
    info!("namespace {} cleaned up", namespace);
    Ok(())
}
