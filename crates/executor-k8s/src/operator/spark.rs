use super::OperatorFlavor;
use crate::client::{is_already_exists, kube_error};
use crate::env::{cluster_envs, env_var};
use executor_core::kind::K8S_SPARK;
use executor_core::task::{BigDataResource, SparkConf};
use executor_core::{ExecutorError, NativeStatus, Options, StatusDesc, Task};
use k8s_openapi::api::core::v1::{EnvVar, ServiceAccount};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, GroupVersionKind, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, warn};

pub const SPARK_GROUP: &str = "sparkoperator.k8s.io";
pub const SPARK_VERSION: &str = "v1beta2";
pub const SPARK_KIND: &str = "SparkApplication";

pub const SPARK_SERVICE_ACCOUNT: &str = "spark";
pub const SPARK_ROLE: &str = "spark-role";
pub const SPARK_ROLE_BINDING: &str = "spark-role-binding";

const DEFAULT_SPARK_VERSION: &str = "3.1.1";
const DEFAULT_PYTHON_VERSION: &str = "3";

/// Spark applications through the Spark operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spark;

/// Reads a `SparkApplication` status from `applicationState`.
pub fn spark_status(status: &Value) -> StatusDesc {
    let state = status
        .pointer("/applicationState/state")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = status
        .pointer("/applicationState/errorMessage")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let native = match state {
        "" | "NEW" | "SUBMITTED" => NativeStatus::Unschedulable,
        "RUNNING" => NativeStatus::Running,
        "COMPLETED" | "SUCCEEDING" => NativeStatus::StoppedOnOk,
        "FAILING" | "FAILED" | "SUBMISSION_FAILED" | "INVALIDATING" | "PENDING_RERUN" => {
            NativeStatus::StoppedOnFailed
        }
        "UNKNOWN" => NativeStatus::Unknown,
        other => {
            return StatusDesc::from_native(
                NativeStatus::Unknown,
                format!("unknown status, sparkAppState: {}", other),
            )
        }
    };
    StatusDesc::from_native(native, message)
}

/// Whole cores for the operator, at least one.
pub fn spark_cores(cpu: &str) -> i32 {
    match cpu.trim().parse::<f64>() {
        Ok(cores) if cores >= 1.0 => cores as i32,
        Ok(_) => 1,
        Err(e) => {
            warn!("invalid spark cpu {:?}, using 1 core: {}", cpu, e);
            1
        }
    }
}

fn effective_version(conf: &SparkConf) -> &str {
    if conf.version.is_empty() {
        DEFAULT_SPARK_VERSION
    } else {
        &conf.version
    }
}

fn spark_conf(task: &Task) -> Result<&SparkConf, ExecutorError> {
    task.spec
        .bigdata
        .as_ref()
        .and_then(|b| b.spark.as_ref())
        .ok_or_else(|| {
            ExecutorError::InvalidTask(format!(
                "task {} has no spark config, namespace: {}",
                task.uuid, task.namespace
            ))
        })
}

/// Task envs, the per-pod resource envs, then cluster-wide envs.
pub fn spark_envs(task: &Task, resource: &BigDataResource, cluster: &Options) -> Vec<EnvVar> {
    let mut task_envs: Vec<_> = task.spec.env.iter().collect();
    task_envs.sort();
    let mut envs: Vec<EnvVar> = task_envs
        .into_iter()
        .map(|(k, v)| env_var(k.as_str(), v.as_str()))
        .collect();

    let cpu = format!("{:.6}", resource.cpu.trim().parse::<f64>().unwrap_or(1.0).max(1.0));
    for (name, value) in [
        ("DICE_CPU_ORIGIN", resource.cpu.as_str()),
        ("DICE_MEM_ORIGIN", resource.memory.as_str()),
        ("DICE_CPU_REQUEST", cpu.as_str()),
        ("DICE_MEM_REQUEST", resource.memory.as_str()),
        ("DICE_CPU_LIMIT", cpu.as_str()),
        ("DICE_MEM_LIMIT", resource.memory.as_str()),
        ("IS_K8S", "true"),
    ] {
        envs.push(env_var(name, value));
    }
    envs.extend(cluster_envs(cluster).into_iter().map(|(k, v)| env_var(k, v)));
    envs
}

fn pod_spec(
    task: &Task,
    resource: &BigDataResource,
    cluster: &Options,
    labels: &BTreeMap<String, String>,
    mounts: &[Value],
) -> Result<Value, ExecutorError> {
    let cores = spark_cores(&resource.cpu);
    let env = serde_json::to_value(spark_envs(task, resource, cluster))?;
    Ok(json!({
        "cores": cores,
        "coreLimit": cores.to_string(),
        "memory": resource.memory,
        "labels": labels,
        "env": env,
        "volumeMounts": mounts,
    }))
}

/// Host-path binds, mounted in both the driver and the executors.
fn bind_volumes(task: &Task) -> (Vec<Value>, Vec<Value>) {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    for (i, bind) in task.spec.binds.iter().enumerate() {
        if bind.host_path.is_empty() || bind.container_path.is_empty() {
            warn!(
                "skip spark bind with empty path, hostPath: {}, containerPath: {}",
                bind.host_path, bind.container_path
            );
            continue;
        }
        let name = format!("volume{}", i);
        volumes.push(json!({ "name": name, "hostPath": { "path": bind.host_path } }));
        mounts.push(json!({
            "name": name,
            "mountPath": bind.container_path,
            "readOnly": bind.read_only,
        }));
    }
    (volumes, mounts)
}

async fn create_if_absent<K>(api: Api<K>, object: &K, what: &str) -> Result<(), ExecutorError>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), object).await {
        Ok(_) => {
            debug!("created spark {}", what);
            Ok(())
        }
        Err(e) if is_already_exists(&e) => Ok(()),
        Err(e) => Err(kube_error(e)),
    }
}

fn named(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

#[async_trait::async_trait]
impl OperatorFlavor for Spark {
    fn kind(&self) -> &'static str {
        K8S_SPARK
    }

    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(SPARK_GROUP, SPARK_VERSION, SPARK_KIND)
    }

    fn labels(&self, task: &Task) -> BTreeMap<String, String> {
        let version = spark_conf(task)
            .map(effective_version)
            .unwrap_or(DEFAULT_SPARK_VERSION);
        BTreeMap::from([
            ("job-type".to_string(), "k8s-spark".to_string()),
            ("spark-version".to_string(), version.to_string()),
        ])
    }

    fn build_spec(&self, task: &Task, cluster: &Options) -> Result<Value, ExecutorError> {
        task.validate()?;
        let conf = spark_conf(task)?;
        if conf.main_application_file.is_empty() {
            return Err(ExecutorError::InvalidTask(format!(
                "task {} has no spark main application file",
                task.uuid
            )));
        }
        let bigdata = task.spec.bigdata.as_ref();
        let labels = self.labels(task);
        let (volumes, mounts) = bind_volumes(task);

        let mut driver = pod_spec(task, &conf.driver, cluster, &labels, &mounts)?;
        driver["serviceAccount"] = json!(SPARK_SERVICE_ACCOUNT);
        let mut executor = pod_spec(task, &conf.executor, cluster, &labels, &mounts)?;
        executor["instances"] = json!(conf.executor.replica);

        let properties: BTreeMap<_, _> = bigdata
            .map(|b| b.properties.iter().collect())
            .unwrap_or_default();
        let mut spec = json!({
            "type": conf.app_type,
            "sparkVersion": effective_version(conf),
            "mode": conf.mode,
            "image": task.spec.image,
            "imagePullPolicy": "Always",
            "mainApplicationFile": conf.main_application_file,
            "arguments": bigdata.map(|b| b.args.clone()).unwrap_or_default(),
            "sparkConf": properties,
            "restartPolicy": { "type": "Never" },
            "volumes": volumes,
            "driver": driver,
            "executor": executor,
        });
        if let Some(class) = bigdata.map(|b| b.class.as_str()).filter(|c| !c.is_empty()) {
            spec["mainClass"] = json!(class);
        }
        if conf.app_type == "Python" {
            spec["pythonVersion"] = json!(conf
                .python_version
                .as_deref()
                .unwrap_or(DEFAULT_PYTHON_VERSION));
        }
        Ok(spec)
    }

    fn translate(&self, status: &Value) -> StatusDesc {
        spark_status(status)
    }

    /// The driver needs a service account allowed to manage pods and services.
    async fn prepare(&self, client: &Client, namespace: &str) -> Result<(), ExecutorError> {
        let account = ServiceAccount {
            metadata: named(SPARK_SERVICE_ACCOUNT, namespace),
            ..Default::default()
        };
        create_if_absent(Api::namespaced(client.clone(), namespace), &account, "service account")
            .await?;

        let rule = |resource: &str| PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec![resource.to_string()]),
            verbs: vec!["*".to_string()],
            ..Default::default()
        };
        let role = Role {
            metadata: named(SPARK_ROLE, namespace),
            rules: Some(vec![rule("pods"), rule("services")]),
        };
        create_if_absent(Api::namespaced(client.clone(), namespace), &role, "role").await?;

        let binding = RoleBinding {
            metadata: named(SPARK_ROLE_BINDING, namespace),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: SPARK_ROLE.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: SPARK_SERVICE_ACCOUNT.to_string(),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }]),
        };
        create_if_absent(Api::namespaced(client.clone(), namespace), &binding, "role binding")
            .await
    }

    fn deletes_namespace_without_job_id(&self) -> bool {
        true
    }
}
