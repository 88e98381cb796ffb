#[cfg(feature = "chart")]
pub mod chart;
pub mod metrics;
pub mod qty;

use chrono::prelude::*;
use clap::{Parser, ValueEnum};
use itertools::Itertools;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams, ObjectList};
#[cfg(feature = "prettytable")]
use prettytable::{Cell, Row, Table, format, row};
use qty::Qty;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, instrument, warn};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to run '{cmd}'")]
    CmdError {
        cmd: String,
        output: Option<std::process::Output>,
        source: Option<std::io::Error>,
    },

    #[error("Failed to read Qty of location {location:?} {kind}={input}")]
    ResourceQtyParseError {
        location: Location,
        kind: String,
        input: String,
        source: qty::Error,
    },

    #[error("Failed to {context}")]
    KubeError {
        context: String,
        source: kube::Error,
    },

    #[error("Failed to {context}")]
    KubeConfigError {
        context: String,
        source: kube::config::KubeconfigError,
    },

    #[error("Failed to {context}")]
    KubeInferConfigError {
        context: String,
        source: kube::config::InferConfigError,
    },

    #[cfg(feature = "chart")]
    #[error("Failed to {context}")]
    ChartError {
        context: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Location {
    pub node_name: Option<String>,
    pub namespace: Option<String>,
    pub pod_name: Option<String>,
}

/// cpu & memory read from a node's status.capacity
#[derive(Debug, Clone, Default)]
pub struct NodeCapacity {
    pub cpu: Option<Qty>,
    pub memory: Option<Qty>,
}

#[derive(Debug, Clone)]
pub struct NodeUsage {
    pub node_name: String,
    pub cpu_capacity: Option<Qty>,
    pub cpu_usage: Qty,
    pub memory_capacity: Option<Qty>,
    pub memory_usage: Qty,
    pub pod_count: usize,
}

impl NodeUsage {
    pub fn cpu_percentage(&self) -> f32 {
        self.cpu_capacity
            .as_ref()
            .map(|capacity| self.cpu_usage.calc_percentage(capacity))
            .unwrap_or(f32::NAN)
    }

    pub fn memory_percentage(&self) -> f32 {
        self.memory_capacity
            .as_ref()
            .map(|capacity| self.memory_usage.calc_percentage(capacity))
            .unwrap_or(f32::NAN)
    }
}

/// One row per container of a pod, percentages relative to the capacity of
/// the node hosting the pod (not to pod or container limits).
#[derive(Debug, Clone)]
pub struct ContainerUsage {
    pub node_name: Option<String>,
    pub pod_name: String,
    pub container_name: String,
    pub cpu_usage: Qty,
    pub cpu_percentage: f32,
    pub memory_usage: Qty,
    pub memory_percentage: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterUsage {
    pub cpu_capacity: Qty,
    pub cpu_usage: Qty,
    pub memory_capacity: Qty,
    pub memory_usage: Qty,
    pub pod_count: usize,
}

impl ClusterUsage {
    pub fn cpu_percentage(&self) -> f32 {
        self.cpu_usage.calc_percentage(&self.cpu_capacity)
    }

    pub fn memory_percentage(&self) -> f32 {
        self.memory_usage.calc_percentage(&self.memory_capacity)
    }
}

pub fn sum_node_usage(rows: &[NodeUsage]) -> ClusterUsage {
    rows.iter().fold(ClusterUsage::default(), |mut acc, row| {
        if let Some(capacity) = &row.cpu_capacity {
            acc.cpu_capacity = capacity + &acc.cpu_capacity;
        }
        acc.cpu_usage = &row.cpu_usage + &acc.cpu_usage;
        if let Some(capacity) = &row.memory_capacity {
            acc.memory_capacity = capacity + &acc.memory_capacity;
        }
        acc.memory_usage = &row.memory_usage + &acc.memory_usage;
        acc.pod_count += row.pod_count;
        acc
    })
}

fn parse_quantity(
    value: Option<&k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
    location: &Location,
    kind: &str,
) -> Result<Option<Qty>, Error> {
    match value {
        None => Ok(None),
        Some(value) => Qty::from_str(&value.0).map(Some).map_err(|source| {
            Error::ResourceQtyParseError {
                location: location.clone(),
                kind: kind.to_string(),
                input: value.0.clone(),
                source,
            }
        }),
    }
}

pub fn extract_capacities(
    node_list: &ObjectList<Node>,
) -> Result<HashMap<String, NodeCapacity>, Error> {
    let mut capacities = HashMap::new();
    for node in &node_list.items {
        if let Some(node_name) = node.metadata.name.clone() {
            let location = Location {
                node_name: Some(node_name.clone()),
                ..Location::default()
            };
            let capacity = match node.status.as_ref().and_then(|v| v.capacity.as_ref()) {
                Some(resource_list) => NodeCapacity {
                    cpu: parse_quantity(resource_list.get("cpu"), &location, "cpu")?,
                    memory: parse_quantity(resource_list.get("memory"), &location, "memory")?,
                },
                None => NodeCapacity::default(),
            };
            capacities.insert(node_name, capacity);
        }
    }
    Ok(capacities)
}

pub fn extract_node_names(pod_list: &ObjectList<Pod>) -> HashMap<(String, String), String> {
    pod_list
        .items
        .iter()
        .filter_map(|pod| {
            let metadata = &pod.metadata;
            let node_name = pod.spec.as_ref().and_then(|spec| spec.node_name.clone());
            metadata
                .name
                .as_ref()
                .zip(node_name)
                .map(|(name, node_name)| {
                    (
                        (
                            metadata.namespace.clone().unwrap_or_default(),
                            name.to_owned(),
                        ),
                        node_name,
                    )
                })
        })
        .collect()
}

pub fn extract_usage_from_node_metrics(
    node_metrics: ObjectList<metrics::NodeMetrics>,
    capacities: &HashMap<String, NodeCapacity>,
    pod_counts: &HashMap<String, usize>,
) -> Result<Vec<NodeUsage>, Error> {
    let mut rows = Vec::with_capacity(node_metrics.items.len());
    for node_metric in node_metrics.items {
        let node_name = node_metric.metadata.name.clone().unwrap_or_default();
        let location = Location {
            node_name: Some(node_name.clone()),
            ..Location::default()
        };
        let capacity = capacities.get(&node_name);
        if capacity.is_none() {
            warn!(
                node = node_name.as_str(),
                "node absent from the node list, no capacity"
            );
        }
        let cpu_usage = Qty::from_str(&node_metric.usage.cpu).map_err(|source| {
            Error::ResourceQtyParseError {
                location: location.clone(),
                kind: "cpu".to_string(),
                input: node_metric.usage.cpu.clone(),
                source,
            }
        })?;
        let memory_usage = Qty::from_str(&node_metric.usage.memory).map_err(|source| {
            Error::ResourceQtyParseError {
                location: location.clone(),
                kind: "memory".to_string(),
                input: node_metric.usage.memory.clone(),
                source,
            }
        })?;
        rows.push(NodeUsage {
            cpu_capacity: capacity.and_then(|c| c.cpu.clone()),
            memory_capacity: capacity.and_then(|c| c.memory.clone()),
            pod_count: pod_counts.get(&node_name).copied().unwrap_or(0),
            node_name,
            cpu_usage,
            memory_usage,
        });
    }
    Ok(rows)
}

pub fn extract_usage_from_pod_metrics(
    pod_metrics: ObjectList<metrics::PodMetrics>,
    node_names: &HashMap<(String, String), String>,
    capacities: &HashMap<String, NodeCapacity>,
) -> Result<Vec<ContainerUsage>, Error> {
    let mut rows = vec![];
    for pod_metric in pod_metrics.items {
        let metadata = &pod_metric.metadata;
        let key = (
            metadata.namespace.clone().unwrap_or_default(),
            metadata.name.clone().unwrap_or_default(),
        );
        let node_name = node_names.get(&key).cloned();
        if node_name.is_none() {
            warn!(
                pod = key.1.as_str(),
                "pod absent from the pod list, no node resolved"
            );
        }
        let capacity = node_name.as_ref().and_then(|name| capacities.get(name));
        let location = Location {
            node_name: node_name.clone(),
            namespace: metadata.namespace.clone(),
            pod_name: metadata.name.clone(),
        };
        for container in pod_metric.containers {
            let cpu_usage = Qty::from_str(&container.usage.cpu).map_err(|source| {
                Error::ResourceQtyParseError {
                    location: location.clone(),
                    kind: "cpu".to_string(),
                    input: container.usage.cpu.clone(),
                    source,
                }
            })?;
            let memory_usage = Qty::from_str(&container.usage.memory).map_err(|source| {
                Error::ResourceQtyParseError {
                    location: location.clone(),
                    kind: "memory".to_string(),
                    input: container.usage.memory.clone(),
                    source,
                }
            })?;
            let cpu_percentage = capacity
                .and_then(|c| c.cpu.as_ref())
                .map(|c| cpu_usage.calc_percentage(c))
                .unwrap_or(f32::NAN);
            let memory_percentage = capacity
                .and_then(|c| c.memory.as_ref())
                .map(|c| memory_usage.calc_percentage(c))
                .unwrap_or(f32::NAN);
            rows.push(ContainerUsage {
                node_name: node_name.clone(),
                pod_name: key.1.clone(),
                container_name: container.name,
                cpu_usage,
                cpu_percentage,
                memory_usage,
                memory_percentage,
            });
        }
    }
    Ok(rows)
}

#[instrument(skip(client))]
pub async fn collect_node_usage(client: kube::Client) -> Result<Vec<NodeUsage>, Error> {
    let api_nodes: Api<Node> = Api::all(client.clone());
    let nodes = api_nodes
        .list(&ListParams::default())
        .await
        .map_err(|source| Error::KubeError {
            context: "list nodes".to_string(),
            source,
        })?;
    let capacities = extract_capacities(&nodes)?;

    let api_node_metrics: Api<metrics::NodeMetrics> = Api::all(client.clone());
    let node_metrics = api_node_metrics
        .list(&ListParams::default())
        .await
        .map_err(|source| Error::KubeError {
            context: "list nodemetrics, maybe Metrics API not available".to_string(),
            source,
        })?;

    let api_pods: Api<Pod> = Api::all(client);
    let mut pod_counts: HashMap<String, usize> = HashMap::new();
    for node_metric in &node_metrics.items {
        if let Some(node_name) = &node_metric.metadata.name {
            let params = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
            match api_pods.list(&params).await {
                Ok(pods) => {
                    pod_counts.insert(node_name.clone(), pods.items.len());
                }
                Err(err) => warn!(
                    ?err,
                    node = node_name.as_str(),
                    "failed to list the pods of node"
                ),
            }
        }
    }

    extract_usage_from_node_metrics(node_metrics, &capacities, &pod_counts)
}

#[instrument(skip(client))]
pub async fn collect_pod_usage(
    client: kube::Client,
    namespace: &Option<String>,
) -> Result<Vec<ContainerUsage>, Error> {
    let api_pod_metrics: Api<metrics::PodMetrics> = if let Some(ns) = namespace {
        Api::namespaced(client.clone(), ns)
    } else {
        Api::all(client.clone())
    };
    let pod_metrics = api_pod_metrics
        .list(&ListParams::default())
        .await
        .map_err(|source| Error::KubeError {
            context: "list podmetrics, maybe Metrics API not available".to_string(),
            source,
        })?;

    let api_pods: Api<Pod> = if let Some(ns) = namespace {
        Api::namespaced(client.clone(), ns)
    } else {
        Api::all(client.clone())
    };
    let pods = api_pods
        .list(&ListParams::default())
        .await
        .map_err(|source| Error::KubeError {
            context: "list pods".to_string(),
            source,
        })?;
    let node_names = extract_node_names(&pods);

    let api_nodes: Api<Node> = Api::all(client);
    let nodes = api_nodes
        .list(&ListParams::default())
        .await
        .map_err(|source| Error::KubeError {
            context: "list nodes".to_string(),
            source,
        })?;
    let capacities = extract_capacities(&nodes)?;

    extract_usage_from_pod_metrics(pod_metrics, &node_names, &capacities)
}

#[derive(Debug, Eq, PartialEq, ValueEnum, Clone)]
#[allow(non_camel_case_types)]
pub enum Entity {
    pods,
    nodes,
}

#[derive(Debug, Eq, PartialEq, ValueEnum, Clone)]
#[allow(non_camel_case_types)]
pub enum Output {
    table,
    csv,
}

#[derive(Parser, Debug)]
#[command(
    version, about,
    after_help(env!("CARGO_PKG_HOMEPAGE")),
    propagate_version = true
)]
pub struct CliOpts {
    /// The name of the kubeconfig context to use
    #[arg(long, value_parser)]
    pub context: Option<String>,

    /// Show only pods from this namespace
    #[arg(short, long, value_parser)]
    pub namespace: Option<String>,

    /// Report usage of pods (one row per container) or of nodes
    #[arg(short, long, value_enum, ignore_case = true, value_parser)]
    pub entity: Entity,

    /// Output format
    #[arg(
        short,
        long,
        value_enum,
        ignore_case = true,
        default_value = "table",
        value_parser
    )]
    pub output: Output,
}

pub async fn refresh_kube_config(cli_opts: &CliOpts) -> Result<(), Error> {
    //HACK force refresh token by calling "kubectl cluster-info before loading configuration"
    use std::process::Command;
    let mut cmd = Command::new("kubectl");
    cmd.arg("cluster-info");
    if let Some(ref context) = cli_opts.context {
        cmd.arg("--context").arg(context);
    }
    let output = cmd.output().map_err(|source| Error::CmdError {
        cmd: "kubectl cluster-info".to_owned(),
        output: None,
        source: Some(source),
    })?;
    if !output.status.success() {
        return Err(Error::CmdError {
            cmd: "kubectl cluster-info".to_owned(),
            output: Some(output),
            source: None,
        });
    }
    Ok(())
}

pub async fn new_client(cli_opts: &CliOpts) -> Result<kube::Client, Error> {
    refresh_kube_config(cli_opts).await?;
    let client_config = match cli_opts.context {
        Some(ref context) => kube::Config::from_kubeconfig(&kube::config::KubeConfigOptions {
            context: Some(context.clone()),
            ..Default::default()
        })
        .await
        .map_err(|source| Error::KubeConfigError {
            context: "create the kube client config".to_string(),
            source,
        })?,
        None => kube::Config::infer()
            .await
            .map_err(|source| Error::KubeInferConfigError {
                context: "create the kube client config".to_string(),
                source,
            })?,
    };
    info!(cluster_url = client_config.cluster_url.to_string().as_str());
    kube::Client::try_from(client_config).map_err(|source| Error::KubeError {
        context: "create the kube client".to_string(),
        source,
    })
}

#[instrument]
pub async fn do_main(cli_opts: &CliOpts) -> Result<(), Error> {
    let client = new_client(cli_opts).await?;
    let pod_usage = match cli_opts.entity {
        Entity::nodes => {
            let rows = match collect_node_usage(client.clone()).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(?err, "failed to collect node usage, empty report");
                    vec![]
                }
            };
            match &cli_opts.output {
                Output::table => display_node_usage_with_prettytable(&rows),
                Output::csv => display_node_usage_as_csv(&rows),
            }
            // pie charts are drawn from pod usage whatever the entity
            match collect_pod_usage(client.clone(), &cli_opts.namespace).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(?err, "failed to collect pod usage for the charts");
                    vec![]
                }
            }
        }
        Entity::pods => {
            let rows = match collect_pod_usage(client.clone(), &cli_opts.namespace).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(?err, "failed to collect pod usage, empty report");
                    vec![]
                }
            };
            match &cli_opts.output {
                Output::table => display_pod_usage_with_prettytable(&rows),
                Output::csv => display_pod_usage_as_csv(&rows),
            }
            rows
        }
    };
    render_charts(&pod_usage, cli_opts.namespace.as_deref().unwrap_or_default());
    Ok(())
}

#[cfg(not(feature = "chart"))]
pub fn render_charts(_usage: &[ContainerUsage], _namespace: &str) {
    warn!("feature 'chart' not enabled");
}

#[cfg(feature = "chart")]
pub fn render_charts(usage: &[ContainerUsage], namespace: &str) {
    if let Err(err) = chart::render_usage_pies(usage, namespace) {
        warn!(?err, "failed to render the usage pie charts");
    }
    if let Err(err) = chart::render_demo_charts() {
        warn!(?err, "failed to render the demo charts");
    }
}

fn format_percentage(value: f32) -> String {
    if value.is_finite() {
        format!("{value:.1}%")
    } else {
        "__".to_string()
    }
}

pub fn display_pod_usage_as_csv(data: &[ContainerUsage]) {
    println!("Date,Node,Pod,Container,CPU(m),%CPU,Memory(MiB),%Memory");
    let datetime = Utc::now().to_rfc3339();
    for row in data {
        let cells = vec![
            datetime.clone(),
            row.node_name.clone().unwrap_or_default(),
            row.pod_name.clone(),
            row.container_name.clone(),
            format!("{:.0}", row.cpu_usage.to_milli()),
            format_percentage(row.cpu_percentage),
            format!("{:.2}", row.memory_usage.to_mib()),
            format_percentage(row.memory_percentage),
        ];
        println!("{}", &cells.iter().join(","));
    }
}

pub fn display_node_usage_as_csv(data: &[NodeUsage]) {
    println!("Date,Node,CPU,CPU Used,%CPU,Memory,Memory Used,%Memory,Pods");
    let empty = "".to_string();
    let datetime = Utc::now().to_rfc3339();
    for row in data {
        let cells = vec![
            datetime.clone(),
            row.node_name.clone(),
            row.cpu_capacity
                .as_ref()
                .map(|qty| format!("{:.2}", f64::from(qty)))
                .unwrap_or_else(|| empty.clone()),
            format!("{:.2}", f64::from(&row.cpu_usage)),
            format_percentage(row.cpu_percentage()),
            row.memory_capacity
                .as_ref()
                .map(|qty| format!("{:.0}", f64::from(qty)))
                .unwrap_or_else(|| empty.clone()),
            format!("{:.0}", f64::from(&row.memory_usage)),
            format_percentage(row.memory_percentage()),
            row.pod_count.to_string(),
        ];
        println!("{}", &cells.iter().join(","));
    }
    if !data.is_empty() {
        let total = sum_node_usage(data);
        let cells = vec![
            datetime,
            "(total)".to_string(),
            format!("{:.2}", f64::from(&total.cpu_capacity)),
            format!("{:.2}", f64::from(&total.cpu_usage)),
            format_percentage(total.cpu_percentage()),
            format!("{:.0}", f64::from(&total.memory_capacity)),
            format!("{:.0}", f64::from(&total.memory_usage)),
            format_percentage(total.memory_percentage()),
            total.pod_count.to_string(),
        ];
        println!("{}", &cells.iter().join(","));
    }
}

#[cfg(not(feature = "prettytable"))]
pub fn display_pod_usage_with_prettytable(_data: &[ContainerUsage]) {
    warn!("feature 'prettytable' not enabled");
}

#[cfg(not(feature = "prettytable"))]
pub fn display_node_usage_with_prettytable(_data: &[NodeUsage]) {
    warn!("feature 'prettytable' not enabled");
}

#[cfg(feature = "prettytable")]
fn new_table() -> Table {
    let mut table = Table::new();
    let format = format::FormatBuilder::new()
        .separators(&[], format::LineSeparator::new('-', '+', '+', '+'))
        .padding(1, 1)
        .build();
    table.set_format(format);
    table
}

#[cfg(feature = "prettytable")]
fn percentage_style(percentage: f32) -> &'static str {
    if !percentage.is_finite() {
        "r"
    } else if percentage >= 90.0 {
        "rFr"
    } else if percentage >= 75.0 {
        "rFy"
    } else {
        "rFg"
    }
}

#[cfg(feature = "prettytable")]
fn make_qty_cell(oqty: Option<&Qty>, style: &str) -> Cell {
    let txt = match oqty {
        None => "__".to_string(),
        Some(qty) => format!("{}", qty.adjust_scale()),
    };
    Cell::new(&txt).style_spec(style)
}

#[cfg(feature = "prettytable")]
pub fn display_pod_usage_with_prettytable(data: &[ContainerUsage]) {
    let mut table = new_table();
    table.set_titles(
        row![bl->"Node", bl->"Pod", bl->"Container", br->"CPU", br->"%CPU", br->"Memory", br->"%Memory"],
    );
    for row in data {
        let style = percentage_style(row.cpu_percentage.max(row.memory_percentage));
        table.add_row(Row::new(vec![
            Cell::new(row.node_name.as_deref().unwrap_or("__")),
            Cell::new(&row.pod_name),
            Cell::new(&row.container_name),
            Cell::new(&format!("{:.0}m", row.cpu_usage.to_milli())).style_spec(style),
            Cell::new(&format_percentage(row.cpu_percentage)).style_spec(style),
            Cell::new(&format!("{:.1}Mi", row.memory_usage.to_mib())).style_spec(style),
            Cell::new(&format_percentage(row.memory_percentage)).style_spec(style),
        ]));
    }
    table.printstd();
}

#[cfg(feature = "prettytable")]
pub fn display_node_usage_with_prettytable(data: &[NodeUsage]) {
    let mut table = new_table();
    table.set_titles(
        row![bl->"Node", br->"CPU", br->"CPU Used", br->"%CPU", br->"Memory", br->"Memory Used", br->"%Memory", br->"Pods"],
    );
    for row in data {
        let style = percentage_style(row.cpu_percentage().max(row.memory_percentage()));
        table.add_row(Row::new(vec![
            Cell::new(&row.node_name),
            make_qty_cell(row.cpu_capacity.as_ref(), style),
            make_qty_cell(Some(&row.cpu_usage), style),
            Cell::new(&format_percentage(row.cpu_percentage())).style_spec(style),
            make_qty_cell(row.memory_capacity.as_ref(), style),
            make_qty_cell(Some(&row.memory_usage), style),
            Cell::new(&format_percentage(row.memory_percentage())).style_spec(style),
            Cell::new(&row.pod_count.to_string()).style_spec(style),
        ]));
    }
    if !data.is_empty() {
        let total = sum_node_usage(data);
        table.add_row(Row::new(vec![
            Cell::new("(total)").style_spec("b"),
            make_qty_cell(Some(&total.cpu_capacity), "br"),
            make_qty_cell(Some(&total.cpu_usage), "br"),
            Cell::new(&format_percentage(total.cpu_percentage())).style_spec("br"),
            make_qty_cell(Some(&total.memory_capacity), "br"),
            make_qty_cell(Some(&total.memory_usage), "br"),
            Cell::new(&format_percentage(total.memory_percentage())).style_spec("br"),
            Cell::new(&total.pod_count.to_string()).style_spec("br"),
        ]));
    }
    table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn node_list() -> ObjectList<Node> {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "NodeList",
            "metadata": {},
            "items": [
                {
                    "metadata": { "name": "node1" },
                    "status": { "capacity": { "cpu": "2", "memory": "8Gi" } }
                },
                {
                    "metadata": { "name": "node2" },
                    "status": { "capacity": { "cpu": "4", "memory": "16Gi" } }
                },
                {
                    "metadata": { "name": "node3" }
                }
            ]
        }))
        .expect("node list fixture")
    }

    fn pod_list() -> ObjectList<Pod> {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": {},
            "items": [
                {
                    "metadata": { "name": "web-1", "namespace": "default" },
                    "spec": { "nodeName": "node1", "containers": [{ "name": "nginx" }] }
                },
                {
                    "metadata": { "name": "db-1", "namespace": "default" },
                    "spec": { "nodeName": "node2", "containers": [{ "name": "postgres" }] }
                },
                {
                    "metadata": { "name": "pending-1", "namespace": "default" },
                    "spec": { "containers": [{ "name": "app" }] }
                }
            ]
        }))
        .expect("pod list fixture")
    }

    fn pod_metrics_list() -> ObjectList<metrics::PodMetrics> {
        serde_json::from_value(json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "PodMetricsList",
            "metadata": {},
            "items": [
                {
                    "metadata": { "name": "web-1", "namespace": "default" },
                    "timestamp": "2023-05-03T10:00:00Z",
                    "window": "30s",
                    "containers": [
                        { "name": "nginx", "usage": { "cpu": "250m", "memory": "512Mi" } },
                        { "name": "sidecar", "usage": { "cpu": "100m", "memory": "256Mi" } }
                    ]
                },
                {
                    "metadata": { "name": "orphan-1", "namespace": "default" },
                    "timestamp": "2023-05-03T10:00:00Z",
                    "window": "30s",
                    "containers": [
                        { "name": "app", "usage": { "cpu": "50m", "memory": "128Mi" } }
                    ]
                }
            ]
        }))
        .expect("pod metrics fixture")
    }

    fn node_metrics_list() -> ObjectList<metrics::NodeMetrics> {
        serde_json::from_value(json!({
            "apiVersion": "metrics.k8s.io/v1beta1",
            "kind": "NodeMetricsList",
            "metadata": {},
            "items": [
                {
                    "metadata": { "name": "node1" },
                    "timestamp": "2023-05-03T10:00:00Z",
                    "window": "10s",
                    "usage": { "cpu": "500m", "memory": "2Gi" }
                },
                {
                    "metadata": { "name": "ghost" },
                    "timestamp": "2023-05-03T10:00:00Z",
                    "window": "10s",
                    "usage": { "cpu": "250m", "memory": "1Gi" }
                }
            ]
        }))
        .expect("node metrics fixture")
    }

    #[test]
    fn test_extract_capacities() -> anyhow::Result<()> {
        let capacities = extract_capacities(&node_list())?;
        assert_eq!(capacities.len(), 3);
        assert_eq!(
            capacities.get("node1").and_then(|c| c.cpu.clone()),
            Some(Qty::from_str("2")?)
        );
        assert_eq!(
            capacities.get("node2").and_then(|c| c.memory.clone()),
            Some(Qty::from_str("16Gi")?)
        );
        assert_eq!(capacities.get("node3").and_then(|c| c.cpu.clone()), None);
        Ok(())
    }

    #[test]
    fn test_extract_node_names() {
        let node_names = extract_node_names(&pod_list());
        assert_eq!(node_names.len(), 2);
        assert_eq!(
            node_names.get(&("default".to_string(), "web-1".to_string())),
            Some(&"node1".to_string())
        );
        assert_eq!(
            node_names.get(&("default".to_string(), "pending-1".to_string())),
            None
        );
    }

    #[test]
    fn test_extract_usage_from_pod_metrics() -> anyhow::Result<()> {
        let node_names = extract_node_names(&pod_list());
        let capacities = extract_capacities(&node_list())?;
        let rows = extract_usage_from_pod_metrics(pod_metrics_list(), &node_names, &capacities)?;
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].node_name.as_deref(), Some("node1"));
        assert_eq!(rows[0].pod_name, "web-1");
        assert_eq!(rows[0].container_name, "nginx");
        assert_eq!(rows[0].cpu_usage.to_milli(), 250.0);
        assert_eq!(rows[0].cpu_percentage, 12.5);
        assert_eq!(rows[0].memory_usage.to_mib(), 512.0);
        assert_eq!(rows[0].memory_percentage, 6.25);

        assert_eq!(rows[1].container_name, "sidecar");
        assert_eq!(rows[1].cpu_percentage, 5.0);
        assert_eq!(rows[1].memory_percentage, 3.125);

        // the pod is unknown to the pod list: no node, no percentages
        assert_eq!(rows[2].node_name, None);
        assert_eq!(rows[2].cpu_usage.to_milli(), 50.0);
        assert!(rows[2].cpu_percentage.is_nan());
        assert!(rows[2].memory_percentage.is_nan());
        Ok(())
    }

    #[test]
    fn test_extract_usage_from_node_metrics() -> anyhow::Result<()> {
        let capacities = extract_capacities(&node_list())?;
        let pod_counts = HashMap::from([("node1".to_string(), 12usize)]);
        let rows = extract_usage_from_node_metrics(node_metrics_list(), &capacities, &pod_counts)?;
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].node_name, "node1");
        assert_eq!(rows[0].cpu_percentage(), 25.0);
        assert_eq!(rows[0].memory_percentage(), 25.0);
        assert_eq!(rows[0].pod_count, 12);

        // metrics for a node the node list doesn't know
        assert_eq!(rows[1].node_name, "ghost");
        assert_eq!(rows[1].cpu_capacity, None);
        assert!(rows[1].cpu_percentage().is_nan());
        assert_eq!(rows[1].pod_count, 0);
        Ok(())
    }

    #[test]
    fn test_sum_node_usage() -> anyhow::Result<()> {
        let capacities = extract_capacities(&node_list())?;
        let pod_counts = HashMap::from([("node1".to_string(), 12usize)]);
        let rows = extract_usage_from_node_metrics(node_metrics_list(), &capacities, &pod_counts)?;
        let total = sum_node_usage(&rows);
        // "ghost" contributes usage but no capacity
        assert_eq!(total.cpu_capacity, Qty::from_str("2")?);
        assert_eq!(total.cpu_usage, Qty::from_str("750m")?);
        assert_eq!(total.cpu_percentage(), 37.5);
        assert_eq!(total.memory_capacity, Qty::from_str("8Gi")?);
        assert_eq!(total.memory_usage, Qty::from_str("3Gi")?);
        assert_eq!(total.memory_percentage(), 37.5);
        assert_eq!(total.pod_count, 12);
        Ok(())
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(12.5), "12.5%");
        assert_eq!(format_percentage(0.0), "0.0%");
        assert_eq!(format_percentage(f32::NAN), "__");
    }
}
