//! Demo command - drive an in-process cluster through the gateway.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use toyfactory_cluster::{ClusterConfig, LocalCluster};
use toyfactory_core::{Entity, OwnerId, Status};
use toyfactory_gateway::{GatewayBridge, GatewayConfig, GatewayResult};

/// Statuses each order walks through after creation.
const WORKFLOW: [Status; 3] = [Status::Sourced, Status::Assembled, Status::Completed];

/// Run the demo command.
pub async fn run(
    customers: u64,
    snapshot_dir: Option<PathBuf>,
    enforce_progress: bool,
) -> Result<()> {
    if customers == 0 {
        anyhow::bail!("--customers must be at least 1");
    }

    let mut builder = ClusterConfig::builder().enforce_status_progress(enforce_progress);
    if let Some(dir) = &snapshot_dir {
        builder = builder.snapshot_dir(dir.clone());
    }
    let config = builder.build().map_err(anyhow::Error::msg)?;

    let (mut cluster, egress) = LocalCluster::start(config)
        .await
        .context("Failed to start cluster")?;
    let recovered = cluster.state_machine().await.store().len();

    let gateway = Arc::new(
        GatewayBridge::connect(GatewayConfig::from_env(), Arc::new(cluster.ingress()), egress)
            .context("Failed to connect gateway")?,
    );

    tracing::info!(customers, recovered, "Starting demo");
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(customers as usize);
    for customer in 1..=customers {
        let gateway = Arc::clone(&gateway);
        tasks.push(tokio::spawn(async move {
            run_order(&gateway, OwnerId::new(customer)).await
        }));
    }

    let mut orders = Vec::with_capacity(tasks.len());
    for task in tasks {
        let entity = task
            .await
            .context("Order task panicked")?
            .context("Order failed")?;
        orders.push(entity);
    }
    orders.sort_by_key(|e| e.id);
    let elapsed = started.elapsed();

    println!("Orders");
    println!("======");
    println!("{:>8}  {:>8}  {:<10}  {:>10}", "ID", "OWNER", "STATUS", "LEAD_MS");
    for entity in &orders {
        println!(
            "{:>8}  {:>8}  {:<10}  {:>10}",
            entity.id.as_u64(),
            entity.owner_id.as_u64(),
            entity.status.as_str(),
            entity.updated_at_ms.saturating_sub(entity.created_at_ms)
        );
    }
    println!();

    let snapshot = cluster
        .trigger_snapshot()
        .await
        .context("Failed to take snapshot")?;
    let health = gateway.health();

    println!("Summary");
    println!("=======");
    println!("Customers:        {}", customers);
    println!("Recovered:        {}", recovered);
    println!("Elapsed:          {:.1?}", elapsed);
    println!("Log position:     {}", snapshot.last_applied);
    println!("Next entity id:   {}", snapshot.next_id);
    println!("Total entities:   {}", snapshot.entities.len());
    println!("Outstanding:      {}", health.outstanding);
    if let Some(dir) = &snapshot_dir {
        println!("Snapshot dir:     {}", dir.display());
    }

    gateway.shutdown().await;
    cluster
        .terminate()
        .await
        .context("Failed to terminate cluster")?;

    Ok(())
}

/// Place one order and walk it through the workflow.
async fn run_order(gateway: &GatewayBridge, owner_id: OwnerId) -> GatewayResult<Entity> {
    let entity = gateway.create_entity(owner_id).await?;

    for status in WORKFLOW {
        gateway.update_status(entity.id, status).await?;
    }

    gateway.get_entity(entity.id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn demo_runs_and_persists_snapshot() {
        let dir = TempDir::new().unwrap();
        run(3, Some(dir.path().to_path_buf()), true).await.unwrap();

        // A second run recovers the first run's orders.
        run(2, Some(dir.path().to_path_buf()), true).await.unwrap();

        let store = toyfactory_cluster::SnapshotStore::open(dir.path(), 3).unwrap();
        let latest = store.load_latest().unwrap().unwrap();
        assert_eq!(latest.entities.len(), 5);
        assert!(latest.entities.iter().all(|e| e.status == Status::Completed));
    }

    #[tokio::test]
    async fn zero_customers_rejected() {
        assert!(run(0, None, false).await.is_err());
    }
}
