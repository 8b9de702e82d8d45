use crate::dispatch::Session;
use anyhow::Context;
use executor_core::{Config, Name, Task};
use serde_json::{json, Value};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub enum Op {
    Status,
    Inspect,
    Start,
    Cancel,
    Remove,
}

pub fn load_task(path: &Path) -> anyhow::Result<Task> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read task from {}", path.display()))?;
    let task: Task = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse task from {}", path.display()))?;
    Ok(task)
}

pub async fn run(
    config: &Config,
    op: Op,
    executor: &str,
    task_path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let task = load_task(task_path)?;
    let name = Name::new(executor)?;

    let session = Session::start(config).await?;
    let result = execute(&session, op, &name, &task).await;
    session.close().await;
    let output = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match op {
        Op::Status => {
            println!("Task:    {}", task.key());
            println!("Status:  {}", output["status"].as_str().unwrap_or_default());
            if let Some(desc) = output["desc"].as_str().filter(|d| !d.is_empty()) {
                println!("Detail:  {}", desc);
            }
        }
        Op::Inspect => {
            println!("{}", output["desc"].as_str().unwrap_or_default());
        }
        Op::Start | Op::Cancel | Op::Remove => {
            println!("{:?} {}: ok", op, task.key());
            if !output["result"].is_null() {
                println!("Result:  {}", output["result"]);
            }
        }
    }
    Ok(())
}

pub async fn clean_up(config: &Config, executor: &str, namespace: &str) -> anyhow::Result<()> {
    let name = Name::new(executor)?;
    let session = Session::start(config).await?;
    let result = match session.manager.get(&name).await {
        Ok(executor) => executor.clean_up(namespace).await,
        Err(e) => Err(e),
    };
    session.close().await;
    result?;
    println!("Namespace {} cleaned up", namespace);
    Ok(())
}

async fn execute(session: &Session, op: Op, name: &Name, task: &Task) -> anyhow::Result<Value> {
    let executor = session.manager.get(name).await?;
    let output = match op {
        Op::Status => serde_json::to_value(executor.status(task).await?)?,
        Op::Inspect => serde_json::to_value(executor.inspect(task).await?)?,
        Op::Start => json!({ "result": executor.start(task).await? }),
        Op::Cancel => json!({ "result": executor.cancel(task).await? }),
        Op::Remove => json!({ "result": executor.remove(task).await? }),
    };
    Ok(output)
}
