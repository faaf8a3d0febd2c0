use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_ICON: &str = "⚙️";
pub const DEFAULT_CATEGORY: &str = "other";

/// Architecture description as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureGraph {
    #[serde(default)]
    pub nodes: Vec<ArchitectureNode>,
    #[serde(default)]
    pub edges: Vec<ArchitectureEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureNode {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureEdge {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl ArchitectureGraph {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Accepts either a bare `{nodes, edges}` object or one nested under
    /// `architecture` / `data.architecture`.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        let nested = value
            .pointer("/data/architecture")
            .or_else(|| value.get("architecture"))
            .filter(|inner| inner.get("nodes").is_some())
            .cloned();
        serde_json::from_value(nested.unwrap_or(value))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStyle {
    pub background: &'static str,
    pub border: &'static str,
    pub text: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub icon: &'static str,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub category: String,
    pub service_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    pub position: Point,
    pub data: NodeData,
    pub style: NodeStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub stroke: &'static str,
}

/// Node and edge arrays shaped for the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

const EDGE_STROKE: &str = "#64748b";

const OTHER_STYLE: NodeStyle = NodeStyle {
    background: "#f1f5f9",
    border: "#94a3b8",
    text: "#1e293b",
};

pub fn category_style(category: &str) -> NodeStyle {
    match category.trim().to_ascii_lowercase().as_str() {
        "compute" => NodeStyle {
            background: "#dbeafe",
            border: "#3b82f6",
            text: "#1e3a8a",
        },
        "database" | "data" => NodeStyle {
            background: "#dcfce7",
            border: "#22c55e",
            text: "#14532d",
        },
        "storage" => NodeStyle {
            background: "#fef9c3",
            border: "#eab308",
            text: "#713f12",
        },
        "networking" | "network" => NodeStyle {
            background: "#e0e7ff",
            border: "#6366f1",
            text: "#312e81",
        },
        "security" => NodeStyle {
            background: "#fee2e2",
            border: "#ef4444",
            text: "#7f1d1d",
        },
        "messaging" | "integration" => NodeStyle {
            background: "#ffedd5",
            border: "#f97316",
            text: "#7c2d12",
        },
        "analytics" => NodeStyle {
            background: "#f3e8ff",
            border: "#a855f7",
            text: "#581c87",
        },
        "monitoring" | "observability" => NodeStyle {
            background: "#ccfbf1",
            border: "#14b8a6",
            text: "#134e4a",
        },
        "ml" | "ai" => NodeStyle {
            background: "#fce7f3",
            border: "#ec4899",
            text: "#831843",
        },
        "frontend" | "client" => NodeStyle {
            background: "#cffafe",
            border: "#06b6d4",
            text: "#164e63",
        },
        _ => OTHER_STYLE,
    }
}

pub fn type_icon(kind: &str) -> &'static str {
    match kind.trim().to_ascii_lowercase().as_str() {
        "compute" | "vm" | "server" => "🖥️",
        "kubernetes" | "container_orchestration" => "☸️",
        "container" | "container_service" => "📦",
        "serverless" | "serverless_compute" | "function" | "lambda" => "λ",
        "database" | "relational_database" | "sql" => "🗄️",
        "nosql" | "nosql_database" => "📄",
        "cache" => "⚡",
        "storage" | "object_storage" | "bucket" => "🪣",
        "block_storage" | "disk" | "volume" => "💽",
        "cdn" => "🌐",
        "load_balancer" | "loadbalancer" => "⚖️",
        "api_gateway" | "gateway" => "🚪",
        "dns" => "🧭",
        "queue" | "message_queue" => "📬",
        "event_bus" | "events" => "📣",
        "auth" | "identity" => "🔐",
        "secrets" | "secrets_manager" => "🔑",
        "waf" | "firewall" => "🛡️",
        "vpc" | "network" => "🕸️",
        "monitoring" => "📈",
        "logging" | "logs" => "📜",
        "analytics" | "data_warehouse" => "📊",
        "search" => "🔎",
        "ml" | "ml_platform" => "🧠",
        "client" | "user" | "frontend" => "👤",
        _ => DEFAULT_ICON,
    }
}

/// Converts backend nodes and edges into renderer-ready form.
///
/// Unknown or missing categories and types degrade to the default style and
/// icon. Every node starts at the origin until the layout assigns it a
/// position.
pub fn convert_to_flow_format(nodes: &[ArchitectureNode], edges: &[ArchitectureEdge]) -> FlowGraph {
    let flow_nodes = nodes
        .iter()
        .map(|node| {
            let category = node
                .category
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(DEFAULT_CATEGORY);
            let kind = node.kind.as_deref().unwrap_or_default();
            let label = node
                .label
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(node.id.as_str());

            FlowNode {
                id: node.id.clone(),
                position: Point::ORIGIN,
                data: NodeData {
                    icon: type_icon(kind),
                    label: label.to_string(),
                    role: node.role.clone().filter(|role| !role.trim().is_empty()),
                    category: category.to_ascii_lowercase(),
                    service_type: node.kind.clone(),
                },
                style: category_style(category),
            }
        })
        .collect();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let flow_edges = edges
        .iter()
        .map(|edge| {
            let base = format!("e-{}-{}", edge.from, edge.to);
            let count = seen.entry(base.clone()).or_insert(0);
            let id = if *count == 0 {
                base
            } else {
                format!("{base}-{count}")
            };
            *count += 1;

            FlowEdge {
                id,
                source: edge.from.clone(),
                target: edge.to.clone(),
                label: edge.label.clone().filter(|label| !label.trim().is_empty()),
                stroke: EDGE_STROKE,
            }
        })
        .collect();

    FlowGraph {
        nodes: flow_nodes,
        edges: flow_edges,
    }
}

impl From<&ArchitectureGraph> for FlowGraph {
    fn from(graph: &ArchitectureGraph) -> Self {
        convert_to_flow_format(&graph.nodes, &graph.edges)
    }
}
