use executor_core::Config;
use std::path::Path;

const SAMPLE_CONFIG: &str = r#"# Pipeline executor configuration

manager:
  pool_size: 10
  connect_timeout_secs: 10

# Static executors, created once at startup.
executors:
  - name: docker-local
    kind: docker
    options:
      runtime: docker
      command_timeout_secs: "120"

  - name: synthetic-smoke
    kind: synthetic
    options:
      duration_ms: "500"

# Clusters get one k8sjob, k8sflink and k8sspark executor each,
# named <kind>-<cluster>, e.g. k8sjob-dev.
clusters:
  - name: dev
    type: k8s
    config:
      kubeconfig_path: /etc/pipeline-executor/dev.kubeconfig
      DICE_CLUSTER_NAME: dev
      BUILDKIT_ENABLE: "false"
"#;

pub async fn run(config_path: Option<&Path>, path: bool, init: bool) -> anyhow::Result<()> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);

    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config already exists at: {}", config_path.display());
            println!("Remove it first if you want to reinitialize.");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, SAMPLE_CONFIG)?;
        println!("Sample config written to: {}", config_path.display());
        return Ok(());
    }

    println!("Config path: {}", config_path.display());
    if config_path.exists() {
        let config = Config::load_from(&config_path)?;
        println!("Pool size:   {}", config.manager.pool_size);
        println!("Executors:   {}", config.executors.len());
        for e in &config.executors {
            println!("  - {} ({})", e.name, e.kind);
        }
        println!("Clusters:    {}", config.clusters.len());
        for c in &config.clusters {
            println!("  - {} ({:?})", c.name, c.cluster_type);
        }
    } else {
        println!("Status:      not found");
        println!("Run `pipeline-executor config --init` to create one.");
    }

    Ok(())
}
