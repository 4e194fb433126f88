use std::collections::{HashMap, HashSet};

use models::models::cluster::{ClusterHealth, ContainerLocation};
use models::models::node::{NodeCapacity, NodeRecord};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

// Logical namespaces, each one redis hash.
const NODES: &str = "nodes";
const AUTHENTICATION: &str = "authentication";
const CONTAINERS: &str = "containers";
const NAMESPACE_MAPPING: &str = "namespace_mapping";
const CONTAINER_CLUSTERS: &str = "container_clusters";
const CLUSTER_HEALTH: &str = "cluster_health";
const URL_TO_CLUSTER: &str = "url_to_cluster";
const NODE_CONFIG: &str = "node_config";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Store(#[from] redis::RedisError),
    #[error("registry JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Durable mapping store for nodes, credentials and cluster metadata.
///
/// Every operation touches a single key; missing keys come back as `None`,
/// never as an error.
#[derive(Clone)]
pub struct Registry {
    conn: MultiplexedConnection,
}

impl Registry {
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Registry { conn })
    }

    /// Hand the underlying connection to collaborators (the task backend
    /// shares the same store).
    pub fn backend(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    // ---- nodes -----------------------------------------------------------

    pub async fn put_node(&self, name: &str, record: &NodeRecord) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(NODES, name, serde_json::to_string(record)?)
            .await?;
        Ok(())
    }

    pub async fn get_node(&self, name: &str) -> Result<Option<NodeRecord>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(NODES, name).await?;
        Ok(raw.map(|data| serde_json::from_str(&data)).transpose()?)
    }

    pub async fn list_nodes(&self) -> Result<HashMap<String, NodeRecord>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(NODES).await?;
        let mut nodes = HashMap::with_capacity(raw.len());
        for (name, data) in raw {
            nodes.insert(name, serde_json::from_str(&data)?);
        }
        Ok(nodes)
    }

    /// Instance ids of every node registered under `namespace`.
    pub async fn list_instance_ids_in_namespace(
        &self,
        namespace: &str,
    ) -> Result<HashSet<String>, RegistryError> {
        let nodes = self.list_nodes().await?;
        Ok(nodes
            .into_values()
            .filter(|node| node.namespace == namespace)
            .map(|node| node.instance_id)
            .collect())
    }

    /// Remove every node whose instance id is in `instance_ids`. Idempotent:
    /// absent ids simply match nothing.
    pub async fn delete_nodes_by_instance_ids(
        &self,
        instance_ids: &HashSet<String>,
    ) -> Result<bool, RegistryError> {
        let nodes = self.list_nodes().await?;
        let mut conn = self.conn.clone();
        let mut removed = false;
        for (name, record) in nodes {
            if instance_ids.contains(&record.instance_id) {
                conn.hdel::<_, _, ()>(NODES, &name).await?;
                removed = true;
            }
        }
        Ok(removed)
    }

    // ---- credentials -----------------------------------------------------

    pub async fn put_user_hash(&self, user: &str, hash: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(AUTHENTICATION, user, hash).await?;
        Ok(())
    }

    pub async fn get_user_hash(&self, user: &str) -> Result<Option<String>, RegistryError> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(AUTHENTICATION, user).await?)
    }

    // ---- containers ------------------------------------------------------

    pub async fn put_container(
        &self,
        name: &str,
        location: &ContainerLocation,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(CONTAINERS, name, serde_json::to_string(location)?)
            .await?;
        Ok(())
    }

    pub async fn get_container(
        &self,
        name: &str,
    ) -> Result<Option<ContainerLocation>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(CONTAINERS, name).await?;
        Ok(raw.map(|data| serde_json::from_str(&data)).transpose()?)
    }

    pub async fn list_containers(
        &self,
    ) -> Result<HashMap<String, ContainerLocation>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(CONTAINERS).await?;
        let mut containers = HashMap::with_capacity(raw.len());
        for (name, data) in raw {
            containers.insert(name, serde_json::from_str(&data)?);
        }
        Ok(containers)
    }

    // ---- namespace and cluster bindings ----------------------------------

    pub async fn put_namespace_mapping(
        &self,
        namespace: &str,
        node: &str,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(NAMESPACE_MAPPING, namespace, node)
            .await?;
        Ok(())
    }

    pub async fn list_namespace_mappings(
        &self,
    ) -> Result<HashMap<String, String>, RegistryError> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(NAMESPACE_MAPPING).await?)
    }

    pub async fn put_container_cluster(
        &self,
        container_id: &str,
        cluster: &str,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(CONTAINER_CLUSTERS, container_id, cluster)
            .await?;
        Ok(())
    }

    pub async fn list_container_clusters(
        &self,
    ) -> Result<HashMap<String, String>, RegistryError> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(CONTAINER_CLUSTERS).await?)
    }

    pub async fn put_cluster_health(
        &self,
        cluster: &str,
        health: &ClusterHealth,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(CLUSTER_HEALTH, cluster, serde_json::to_string(health)?)
            .await?;
        Ok(())
    }

    pub async fn get_cluster_health(
        &self,
        cluster: &str,
    ) -> Result<Option<ClusterHealth>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(CLUSTER_HEALTH, cluster).await?;
        Ok(raw.map(|data| serde_json::from_str(&data)).transpose()?)
    }

    pub async fn put_url_cluster(&self, url: &str, cluster: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(URL_TO_CLUSTER, url, cluster).await?;
        Ok(())
    }

    /// All URLs currently routed to `cluster`.
    pub async fn urls_for_cluster(&self, cluster: &str) -> Result<Vec<String>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(URL_TO_CLUSTER).await?;
        let mut urls: Vec<String> = raw
            .into_iter()
            .filter(|(_, bound)| bound == cluster)
            .map(|(url, _)| url)
            .collect();
        urls.sort();
        Ok(urls)
    }

    // ---- node capacities -------------------------------------------------

    pub async fn put_node_capacity(
        &self,
        name: &str,
        capacity: &NodeCapacity,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(NODE_CONFIG, name, serde_json::to_string(capacity)?)
            .await?;
        Ok(())
    }

    /// Capacities sorted by node name so downstream planning is
    /// deterministic.
    pub async fn list_node_capacities(
        &self,
    ) -> Result<Vec<(String, NodeCapacity)>, RegistryError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(NODE_CONFIG).await?;
        let mut capacities = Vec::with_capacity(raw.len());
        for (name, data) in raw {
            capacities.push((name, serde_json::from_str(&data)?));
        }
        capacities.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(capacities)
    }
}
