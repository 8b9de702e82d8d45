use crate::env::{cluster_envs, env_var, field_env, parse_bool, BUILDKIT_ENABLE, BUILDKIT_HIT_RATE};
use crate::hit_rate::HitSampler;
use executor_core::task::NetworkMode;
use executor_core::{ExecutorError, Options, Task};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, HostPathVolumeSource, Namespace,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, ResourceRequirements, SecretVolumeSource, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::error;

pub const INIT_CONTAINER_NAME: &str = "pre-fetech-container";
pub const EMPTY_DIR_VOLUME_NAME: &str = "pre-fetech-volume";
pub const BUILDKIT_SECRET_NAME: &str = "buildkit-client-secret";
pub const BUILDKIT_SECRET_MOUNT_PATH: &str = "/.buildkit";
pub const JOB_LABEL: &str = "dice/job";

const DEFAULT_PARALLELISM: i32 = 1;
const DEFAULT_COMPLETIONS: i32 = 1;
const IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Objects to create for one task, in creation order after the namespace.
#[derive(Debug, Clone)]
pub struct KubeJobPlan {
    pub pvcs: Vec<PersistentVolumeClaim>,
    pub job: Job,
    pub buildkit: bool,
}

pub fn make_job_name(namespace: &str, uuid: &str) -> String {
    format!("{}.{}", namespace, uuid)
}

pub fn make_pvc_name(job_name: &str, index: usize) -> String {
    format!("{}-{}", job_name, index)
}

/// Container names must be DNS labels.
pub fn container_name(uuid: &str) -> String {
    let name: String = uuid
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(63)
        .collect();
    name.trim_matches('-').to_string()
}

pub fn job_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(JOB_LABEL.to_string(), String::new())])
}

pub fn namespace_object(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn millicores(cores: f64) -> Quantity {
    Quantity(format!("{}m", (cores * 1000.0) as i64))
}

fn mebibytes(mib: f64) -> Quantity {
    Quantity(format!("{}Mi", mib as i64))
}

fn resources(cpu_request: &Quantity, cpu_limit: &Quantity, memory: &Quantity) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), cpu_request.clone()),
            ("memory".to_string(), memory.clone()),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), cpu_limit.clone()),
            ("memory".to_string(), memory.clone()),
        ])),
        ..Default::default()
    }
}

/// Task envs, platform envs, then cluster-wide envs.
pub fn container_envs(task: &Task, cluster: &Options) -> Vec<EnvVar> {
    let spec = &task.spec;
    let mut task_envs: Vec<_> = spec.env.iter().collect();
    task_envs.sort();

    let mut envs: Vec<EnvVar> = task_envs
        .into_iter()
        .map(|(name, value)| env_var(name.as_str(), value.as_str()))
        .collect();
    envs.push(env_var("IS_K8S", "true"));
    envs.push(env_var("DICE_NAMESPACE", task.namespace.as_str()));
    envs.push(field_env("HOST_IP", "status.hostIP"));
    envs.push(field_env("POD_IP", "status.podIP"));

    let cpu = format!("{:.6}", spec.cpu);
    let memory = format!("{:.6}", spec.memory);
    for (name, value) in [
        ("DICE_CPU_ORIGIN", &cpu),
        ("DICE_MEM_ORIGIN", &memory),
        ("DICE_CPU_REQUEST", &cpu),
        ("DICE_MEM_REQUEST", &memory),
        ("DICE_CPU_LIMIT", &cpu),
        ("DICE_MEM_LIMIT", &memory),
    ] {
        envs.push(env_var(name, value.as_str()));
    }

    envs.extend(cluster_envs(cluster).into_iter().map(|(k, v)| env_var(k, v)));
    envs
}

/// Whether this run gets the buildkit client. Off unless the cluster enables
/// it; then sampled at `BUILDKIT_HIT_RATE` percent (default 100).
pub fn buildkit_hit(cluster: &Options, sampler: &dyn HitSampler) -> Result<bool, ExecutorError> {
    let enabled = match cluster.get(BUILDKIT_ENABLE).map(String::as_str) {
        None | Some("") => false,
        Some(raw) => parse_bool(raw).ok_or_else(|| {
            ExecutorError::Config(format!("failed to parse buildkit enable: {:?}", raw))
        })?,
    };
    if !enabled {
        return Ok(false);
    }
    let rate = match cluster.get(BUILDKIT_HIT_RATE).map(String::as_str) {
        None | Some("") => 100,
        Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
            ExecutorError::Config(format!("failed to parse buildkit hit rate: {:?}, err: {}", raw, e))
        })?,
    };
    Ok(sampler.hit(rate))
}

pub fn build_pvcs(task: &Task, job_name: &str) -> Vec<PersistentVolumeClaim> {
    task.spec
        .volumes
        .iter()
        .enumerate()
        .map(|(i, volume)| PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(make_pvc_name(job_name, i)),
                namespace: Some(task.namespace.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(volume.size.clone()),
                    )])),
                    ..Default::default()
                }),
                storage_class_name: volume.storage_class.clone(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

/// Translates a task into the batch Job (one pod, one container, no retries
/// unless the task asks for them) plus the claims it mounts.
pub fn build_kube_job(
    task: &Task,
    cluster: &Options,
    sampler: &dyn HitSampler,
) -> Result<KubeJobPlan, ExecutorError> {
    task.validate()?;
    let spec = &task.spec;
    let job_name = make_job_name(&task.namespace, &task.uuid);

    let cpu = millicores(spec.cpu);
    let max_cpu = if spec.max_cpu > spec.cpu {
        millicores(spec.max_cpu)
    } else {
        cpu.clone()
    };
    let memory = mebibytes(spec.memory);

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    let pvcs = build_pvcs(task, &job_name);
    for (i, (volume, pvc)) in spec.volumes.iter().zip(&pvcs).enumerate() {
        let volume_name = format!("pvc-{}", i);
        volumes.push(Volume {
            name: volume_name.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: pvc.metadata.name.clone().unwrap_or_default(),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: volume_name,
            mount_path: volume.container_path.clone(),
            ..Default::default()
        });
    }

    let envs = container_envs(task, cluster);
    let mut container_env = Vec::new();

    let buildkit = buildkit_hit(cluster, sampler)?;
    if buildkit {
        container_env.push(env_var(BUILDKIT_ENABLE, "true"));
        mounts.push(VolumeMount {
            name: BUILDKIT_SECRET_NAME.to_string(),
            mount_path: BUILDKIT_SECRET_MOUNT_PATH.to_string(),
            ..Default::default()
        });
        volumes.push(Volume {
            name: BUILDKIT_SECRET_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(BUILDKIT_SECRET_NAME.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    container_env.extend(envs.iter().cloned());

    for (i, bind) in spec.binds.iter().enumerate() {
        if bind.host_path.is_empty() || bind.container_path.is_empty() {
            error!(
                "failed to generate k8s job (invalid params, hostPath: {}, containerPath: {})",
                bind.host_path, bind.container_path
            );
            continue;
        }
        let volume_name = format!("volume{}", i);
        volumes.push(Volume {
            name: volume_name.clone(),
            host_path: Some(HostPathVolumeSource {
                path: bind.host_path.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: volume_name,
            mount_path: bind.container_path.clone(),
            read_only: Some(bind.read_only),
            ..Default::default()
        });
    }

    let mut init_containers = Vec::new();
    if let Some(pre_fetcher) = &spec.pre_fetcher {
        let mount = VolumeMount {
            name: EMPTY_DIR_VOLUME_NAME.to_string(),
            mount_path: pre_fetcher.container_path.clone(),
            read_only: Some(false),
            ..Default::default()
        };
        init_containers.push(Container {
            name: INIT_CONTAINER_NAME.to_string(),
            image: Some(pre_fetcher.file_from_image.clone()),
            resources: Some(resources(&cpu, &cpu, &memory)),
            image_pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
            env: Some(envs),
            volume_mounts: Some(vec![mount.clone()]),
            ..Default::default()
        });
        mounts.push(mount);
        volumes.push(Volume {
            name: EMPTY_DIR_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    let command = if spec.cmd.is_empty() {
        None
    } else {
        Some(vec!["sh".to_string(), "-c".to_string(), spec.cmd.clone()])
    };

    let main = Container {
        name: container_name(&task.uuid),
        image: Some(spec.image.clone()),
        command,
        resources: Some(resources(&cpu, &max_cpu, &memory)),
        image_pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
        env: Some(container_env),
        volume_mounts: Some(mounts),
        ..Default::default()
    };

    let dns_policy = match spec.network {
        NetworkMode::Host => "ClusterFirstWithHostNet",
        NetworkMode::Container => "ClusterFirst",
    };

    let job = Job {
        metadata: ObjectMeta {
            name: Some(job_name),
            namespace: Some(task.namespace.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            parallelism: Some(DEFAULT_PARALLELISM),
            completions: Some(DEFAULT_COMPLETIONS),
            backoff_limit: Some(spec.backoff_limit),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(job_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![main],
                    init_containers: if init_containers.is_empty() {
                        None
                    } else {
                        Some(init_containers)
                    },
                    restart_policy: Some("Never".to_string()),
                    volumes: Some(volumes),
                    enable_service_links: Some(false),
                    share_process_namespace: Some(false),
                    host_network: Some(spec.network.is_host()),
                    dns_policy: Some(dns_policy.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(KubeJobPlan { pvcs, job, buildkit })
}
