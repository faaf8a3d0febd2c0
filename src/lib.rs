pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod layout;
pub mod metadata;
pub mod poll;
pub mod reconcile;
pub mod render;
pub mod report;
#[cfg(feature = "server")]
pub mod serve;
pub mod utils;

pub use api::ApiClient;
pub use config::Settings;
pub use error::{ApiError, ConfigError, Error, ExportError, ReportError, Result};
pub use export::{Bounds, ExportFrame, Screenshot, capture_screenshot, download_diagram};
pub use graph::{
    ArchitectureEdge, ArchitectureGraph, ArchitectureNode, FlowEdge, FlowGraph, FlowNode, Point,
    convert_to_flow_format,
};
pub use layout::{LaidOutGraph, LayoutConfig, RankDir, layout_graph};
pub use metadata::{ServiceMetadata, canonical_service_id, get_service_metadata};
pub use poll::{CancelToken, PollOutcome, poll_until};
pub use reconcile::{ReconcileAction, ReconcileResponse, Service, apply_reconcile};
pub use render::{DiagramRenderer, Interaction, Viewport};
pub use report::{ReportInput, build_report};
