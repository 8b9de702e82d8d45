use executor_core::task::{BigDataResource, BigDataSpec, Bind, ComputeSpec, FlinkConf, SparkConf};
use executor_core::{CanonicalStatus, Options, Task};
use executor_k8s::operator::flink::{flink_status, jvm_memory_to_quantity};
use executor_k8s::operator::spark::{spark_cores, spark_status};
use executor_k8s::{Flink, OperatorFlavor, Spark};
use serde_json::{json, Value};
use std::collections::HashMap;

fn bigdata_task(bigdata: BigDataSpec) -> Task {
    Task {
        pipeline_id: 1,
        id: 2,
        namespace: "pipeline-1".to_string(),
        uuid: "pipeline-task-2".to_string(),
        spec: ComputeSpec {
            image: "registry/spark:3.1.1".to_string(),
            env: HashMap::from([("ACTION".to_string(), "etl".to_string())]),
            bigdata: Some(bigdata),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn spark_task(app_type: &str) -> Task {
    bigdata_task(BigDataSpec {
        class: "org.example.Main".to_string(),
        args: vec!["--date".to_string(), "2024-01-01".to_string()],
        spark: Some(SparkConf {
            app_type: app_type.to_string(),
            mode: "cluster".to_string(),
            main_application_file: "local:///opt/app.jar".to_string(),
            executor: BigDataResource {
                cpu: "2".to_string(),
                memory: "2048m".to_string(),
                replica: 3,
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn flink_task() -> Task {
    bigdata_task(BigDataSpec {
        class: "org.example.Stream".to_string(),
        properties: HashMap::from([("taskmanager.numberOfTaskSlots".to_string(), "2".to_string())]),
        flink: Some(FlinkConf {
            jar: "/opt/flink/job.jar".to_string(),
            parallelism: 4,
            task_manager: BigDataResource {
                cpu: "2".to_string(),
                memory: "2g".to_string(),
                replica: 2,
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn env_value(env: &Value, name: &str) -> Option<String> {
    env.as_array()?
        .iter()
        .find(|e| e["name"] == name)
        .and_then(|e| e["value"].as_str())
        .map(str::to_string)
}

#[test]
fn test_spark_state_table() {
    let cases = [
        ("NEW", CanonicalStatus::Queued),
        ("SUBMITTED", CanonicalStatus::Queued),
        ("RUNNING", CanonicalStatus::Running),
        ("COMPLETED", CanonicalStatus::Success),
        ("SUCCEEDING", CanonicalStatus::Success),
        ("FAILING", CanonicalStatus::Failed),
        ("FAILED", CanonicalStatus::Failed),
        ("SUBMISSION_FAILED", CanonicalStatus::Failed),
        ("INVALIDATING", CanonicalStatus::Failed),
        ("PENDING_RERUN", CanonicalStatus::Failed),
        ("UNKNOWN", CanonicalStatus::Unknown),
        ("SOMETHING_NEW", CanonicalStatus::Unknown),
    ];
    for (state, expected) in cases {
        let status = json!({ "applicationState": { "state": state } });
        assert_eq!(spark_status(&status).status, expected, "state {}", state);
    }
}

#[test]
fn test_spark_status_carries_error_message() {
    let status = json!({
        "applicationState": { "state": "FAILED", "errorMessage": "driver pod failed" }
    });
    let desc = spark_status(&status);
    assert_eq!(desc.status, CanonicalStatus::Failed);
    assert_eq!(desc.desc, "driver pod failed");

    let unknown = spark_status(&json!({ "applicationState": { "state": "WEIRD" } }));
    assert!(unknown.desc.contains("WEIRD"));
}

#[test]
fn test_spark_without_state_is_queued() {
    assert_eq!(spark_status(&Value::Null).status, CanonicalStatus::Queued);
    assert_eq!(spark_status(&json!({})).status, CanonicalStatus::Queued);
}

#[test]
fn test_spark_cores() {
    assert_eq!(spark_cores("2"), 2);
    assert_eq!(spark_cores("0.5"), 1);
    assert_eq!(spark_cores("lots"), 1);
}

#[test]
fn test_spark_spec() {
    let cluster: Options = [("DICE_CLUSTER_NAME".to_string(), "dev".to_string())].into();
    let spec = Spark.build_spec(&spark_task("Scala"), &cluster).unwrap();

    assert_eq!(spec["type"], "Scala");
    assert_eq!(spec["sparkVersion"], "3.1.1");
    assert_eq!(spec["mode"], "cluster");
    assert_eq!(spec["mainClass"], "org.example.Main");
    assert_eq!(spec["mainApplicationFile"], "local:///opt/app.jar");
    assert_eq!(spec["arguments"], json!(["--date", "2024-01-01"]));
    assert_eq!(spec["restartPolicy"]["type"], "Never");
    assert!(spec.get("pythonVersion").is_none());

    assert_eq!(spec["driver"]["serviceAccount"], "spark");
    assert_eq!(spec["driver"]["cores"], 1);
    assert_eq!(spec["executor"]["cores"], 2);
    assert_eq!(spec["executor"]["memory"], "2048m");
    assert_eq!(spec["executor"]["instances"], 3);

    let env = &spec["executor"]["env"];
    assert_eq!(env_value(env, "ACTION").as_deref(), Some("etl"));
    assert_eq!(env_value(env, "DICE_CPU_ORIGIN").as_deref(), Some("2"));
    assert_eq!(env_value(env, "DICE_CPU_REQUEST").as_deref(), Some("2.000000"));
    assert_eq!(env_value(env, "IS_K8S").as_deref(), Some("true"));
    assert_eq!(env_value(env, "DICE_CLUSTER_NAME").as_deref(), Some("dev"));
}

#[test]
fn test_spark_python_defaults_python_version() {
    let spec = Spark.build_spec(&spark_task("Python"), &Options::new()).unwrap();
    assert_eq!(spec["pythonVersion"], "3");

    let mut task = spark_task("Python");
    if let Some(spark) = task.spec.bigdata.as_mut().and_then(|b| b.spark.as_mut()) {
        spark.python_version = Some("2".to_string());
    }
    let spec = Spark.build_spec(&task, &Options::new()).unwrap();
    assert_eq!(spec["pythonVersion"], "2");
}

#[test]
fn test_spark_binds_mount_in_driver_and_executor() {
    let mut task = spark_task("Scala");
    task.spec.binds = vec![Bind {
        host_path: "/data".to_string(),
        container_path: "/mnt/data".to_string(),
        read_only: true,
    }];
    let spec = Spark.build_spec(&task, &Options::new()).unwrap();
    assert_eq!(spec["volumes"][0]["hostPath"]["path"], "/data");
    assert_eq!(spec["driver"]["volumeMounts"][0]["mountPath"], "/mnt/data");
    assert_eq!(spec["executor"]["volumeMounts"][0]["readOnly"], true);
}

#[test]
fn test_spark_labels_carry_version() {
    let mut task = spark_task("Scala");
    if let Some(spark) = task.spec.bigdata.as_mut().and_then(|b| b.spark.as_mut()) {
        spark.version = "3.3.0".to_string();
    }
    let labels = Spark.labels(&task);
    assert_eq!(labels["job-type"], "k8s-spark");
    assert_eq!(labels["spark-version"], "3.3.0");
}

#[test]
fn test_spark_requires_its_config() {
    let task = bigdata_task(BigDataSpec::default());
    assert!(Spark.build_spec(&task, &Options::new()).is_err());

    let mut task = spark_task("Java");
    if let Some(spark) = task.spec.bigdata.as_mut().and_then(|b| b.spark.as_mut()) {
        spark.main_application_file.clear();
    }
    assert!(Spark.build_spec(&task, &Options::new()).is_err());
}

#[test]
fn test_flink_job_state_table() {
    let cases = [
        ("Pending", CanonicalStatus::Queued),
        ("Running", CanonicalStatus::Running),
        ("Updating", CanonicalStatus::Running),
        ("Succeeded", CanonicalStatus::Success),
        ("Failed", CanonicalStatus::Failed),
        ("Cancelled", CanonicalStatus::StoppedByUser),
        ("Unknown", CanonicalStatus::Unknown),
    ];
    for (state, expected) in cases {
        let status = json!({ "state": "Running", "components": { "job": { "state": state } } });
        assert_eq!(flink_status(&status).status, expected, "job state {}", state);
    }
}

#[test]
fn test_flink_cluster_state_without_job() {
    let cases = [
        ("Creating", CanonicalStatus::Queued),
        ("Reconciling", CanonicalStatus::Queued),
        ("Running", CanonicalStatus::Running),
        ("Stopping", CanonicalStatus::Success),
        ("Stopped", CanonicalStatus::Success),
        ("Exploded", CanonicalStatus::Unknown),
    ];
    for (state, expected) in cases {
        let status = json!({ "state": state, "components": {} });
        assert_eq!(flink_status(&status).status, expected, "cluster state {}", state);
    }
    assert_eq!(flink_status(&Value::Null).status, CanonicalStatus::Queued);
}

#[test]
fn test_jvm_memory_to_quantity() {
    assert_eq!(jvm_memory_to_quantity("1024m"), "1024Mi");
    assert_eq!(jvm_memory_to_quantity("2g"), "2Gi");
    assert_eq!(jvm_memory_to_quantity("512K"), "512Ki");
    assert_eq!(jvm_memory_to_quantity("1Gi"), "1Gi");
    assert_eq!(jvm_memory_to_quantity(""), "");
}

#[test]
fn test_flink_spec() {
    let spec = Flink.build_spec(&flink_task(), &Options::new()).unwrap();

    assert_eq!(spec["image"]["name"], "registry/spark:3.1.1");
    assert_eq!(spec["job"]["jarFile"], "/opt/flink/job.jar");
    assert_eq!(spec["job"]["className"], "org.example.Stream");
    assert_eq!(spec["job"]["parallelism"], 4);
    assert_eq!(spec["jobManager"]["replicas"], 1);
    assert_eq!(spec["jobManager"]["resources"]["limits"]["memory"], "1024Mi");
    assert_eq!(spec["taskManager"]["replicas"], 2);
    assert_eq!(spec["taskManager"]["resources"]["requests"]["memory"], "2Gi");
    assert_eq!(spec["flinkProperties"]["taskmanager.numberOfTaskSlots"], "2");
    assert_eq!(env_value(&spec["envVars"], "ACTION").as_deref(), Some("etl"));
    assert_eq!(Flink.labels(&flink_task())["job-type"], "k8s-flink");
}

#[test]
fn test_flink_requires_its_config() {
    let task = bigdata_task(BigDataSpec::default());
    assert!(Flink.build_spec(&task, &Options::new()).is_err());
}

#[test]
fn test_flavor_kinds() {
    assert_eq!(Flink.kind(), "k8sflink");
    assert_eq!(Spark.kind(), "k8sspark");
    assert_eq!(Spark.gvk().group, "sparkoperator.k8s.io");
    assert_eq!(Flink.gvk().kind, "FlinkCluster");
}
