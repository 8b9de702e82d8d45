use executor_core::{connect_timeout, ExecutorError, Kind, Name, Options};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::fmt::Display;
use tracing::debug;

/// Inline kubeconfig YAML.
pub const KUBECONFIG_OPTION: &str = "kubeconfig";
pub const KUBECONFIG_PATH_OPTION: &str = "kubeconfig_path";
/// Kubeconfig context; the current context when unset.
pub const CONTEXT_OPTION: &str = "context";

/// Everything a cluster-kind executor needs about its cluster. One per
/// executor instance; the client is never shared with another instance.
#[derive(Clone)]
pub struct ClusterContext {
    pub cluster_name: String,
    pub client: Client,
    /// The cluster's config map, as handed to the constructor.
    pub options: Options,
}

impl ClusterContext {
    /// Decodes the cluster from `name` and builds its client. Bounded by the
    /// connect timeout carried in `options`.
    pub async fn connect(kind: &Kind, name: &Name, options: Options) -> Result<Self, ExecutorError> {
        let cluster_name = kind.cluster_name_of(name)?;
        let client = build_client(&cluster_name, &options).await?;
        Ok(Self {
            cluster_name,
            client,
            options,
        })
    }
}

pub async fn build_client(cluster_name: &str, options: &Options) -> Result<Client, ExecutorError> {
    let timeout = connect_timeout(options)?;
    let mut config = tokio::time::timeout(timeout, load_config(options))
        .await
        .map_err(|_| {
            ExecutorError::Timeout(
                timeout.as_secs(),
                format!("load kube config of cluster {}", cluster_name),
            )
        })??;
    config.connect_timeout = Some(timeout);
    debug!("kube client for cluster {} targets {}", cluster_name, config.cluster_url);
    Client::try_from(config).map_err(kube_error)
}

async fn load_config(options: &Options) -> Result<Config, ExecutorError> {
    let kubeconfig = match (options.get(KUBECONFIG_OPTION), options.get(KUBECONFIG_PATH_OPTION)) {
        (Some(inline), _) => Some(Kubeconfig::from_yaml(inline).map_err(config_error)?),
        (None, Some(path)) => Some(Kubeconfig::read_from(path).map_err(config_error)?),
        (None, None) => None,
    };
    match kubeconfig {
        Some(kubeconfig) => {
            let kube_options = KubeConfigOptions {
                context: options.get(CONTEXT_OPTION).cloned(),
                ..Default::default()
            };
            Config::from_custom_kubeconfig(kubeconfig, &kube_options)
                .await
                .map_err(config_error)
        }
        None => Config::incluster().map_err(config_error),
    }
}

fn config_error(e: impl Display) -> ExecutorError {
    ExecutorError::Config(format!("invalid kube config: {}", e))
}

pub(crate) fn kube_error(e: kube::Error) -> ExecutorError {
    ExecutorError::Kube(e.to_string())
}

/// HTTP status carried by an API error, if any.
fn api_code(e: &kube::Error) -> Option<u16> {
    match e {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

pub(crate) fn is_not_found(e: &kube::Error) -> bool {
    api_code(e) == Some(404)
}

pub(crate) fn is_already_exists(e: &kube::Error) -> bool {
    api_code(e) == Some(409)
}
