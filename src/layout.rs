use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::str::FromStr;

use crate::graph::{FlowGraph, Point};

pub const NODE_WIDTH: f32 = 200.0;
pub const NODE_HEIGHT: f32 = 80.0;
pub const NODE_SEP: f32 = 60.0;
pub const RANK_SEP: f32 = 120.0;

const ORDERING_SWEEPS: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankDir {
    #[default]
    #[serde(rename = "LR")]
    LeftRight,
    #[serde(rename = "TB")]
    TopBottom,
    #[serde(rename = "RL")]
    RightLeft,
    #[serde(rename = "BT")]
    BottomTop,
}

impl RankDir {
    fn is_horizontal(self) -> bool {
        matches!(self, RankDir::LeftRight | RankDir::RightLeft)
    }

    fn is_reversed(self) -> bool {
        matches!(self, RankDir::RightLeft | RankDir::BottomTop)
    }
}

impl FromStr for RankDir {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LR" => Ok(RankDir::LeftRight),
            "TB" | "TD" => Ok(RankDir::TopBottom),
            "RL" => Ok(RankDir::RightLeft),
            "BT" => Ok(RankDir::BottomTop),
            other => Err(format!(
                "unsupported rank direction '{other}'; supported values are LR, TB, RL, BT"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub rank_dir: RankDir,
    pub node_width: f32,
    pub node_height: f32,
    pub node_sep: f32,
    pub rank_sep: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            rank_dir: RankDir::LeftRight,
            node_width: NODE_WIDTH,
            node_height: NODE_HEIGHT,
            node_sep: NODE_SEP,
            rank_sep: RANK_SEP,
        }
    }
}

/// A flow graph whose node positions are the top-left corners of fixed-size
/// boxes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaidOutGraph {
    pub graph: FlowGraph,
    pub node_width: f32,
    pub node_height: f32,
    pub rank_dir: RankDir,
}

impl LaidOutGraph {
    pub fn node_center(&self, id: &str) -> Option<Point> {
        self.graph.node(id).map(|node| Point {
            x: node.position.x + self.node_width / 2.0,
            y: node.position.y + self.node_height / 2.0,
        })
    }
}

/// Places every node of `flow` with a layered left-to-right (by default)
/// layout. The whole layout is recomputed on every call.
pub fn layout_graph(flow: &FlowGraph, config: &LayoutConfig) -> LaidOutGraph {
    let order: Vec<&str> = flow.nodes.iter().map(|node| node.id.as_str()).collect();
    let known: HashSet<&str> = order.iter().copied().collect();

    let mut links: Vec<(&str, &str)> = Vec::new();
    for edge in &flow.edges {
        let (from, to) = (edge.source.as_str(), edge.target.as_str());
        if from == to || !known.contains(from) || !known.contains(to) {
            continue;
        }
        links.push((from, to));
    }

    if links.len() != flow.edges.len() {
        log::debug!(
            dropped = flow.edges.len() - links.len();
            "ignoring dangling or self-referencing edges during layout"
        );
    }

    let ranks = assign_ranks(&order, &links);
    let layers = order_layers(&order, &links, &ranks);
    let anchors = assign_coordinates(&layers, config);

    let mut graph = flow.clone();
    for node in &mut graph.nodes {
        let anchor = anchors.get(node.id.as_str()).copied().unwrap_or(Point::ORIGIN);
        node.position = Point {
            x: anchor.x - config.node_width / 2.0,
            y: anchor.y - config.node_height / 2.0,
        };
    }

    LaidOutGraph {
        graph,
        node_width: config.node_width,
        node_height: config.node_height,
        rank_dir: config.rank_dir,
    }
}

/// Longest-path ranking from the sources. Nodes stuck on a cycle are ranked
/// one past their deepest already-ranked parent.
fn assign_ranks<'a>(order: &[&'a str], links: &[(&'a str, &'a str)]) -> HashMap<&'a str, usize> {
    let mut ranks: HashMap<&str, usize> = order.iter().map(|id| (*id, 0_usize)).collect();
    let mut indegree: HashMap<&str, usize> = order.iter().map(|id| (*id, 0_usize)).collect();

    for (_, to) in links {
        *indegree.entry(*to).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = order
        .iter()
        .copied()
        .filter(|id| indegree.get(id).copied().unwrap_or(0) == 0)
        .collect();
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(node_id) = queue.pop_front() {
        visited.insert(node_id);
        let node_rank = ranks.get(node_id).copied().unwrap_or(0);

        for (_, target) in links.iter().filter(|(from, _)| *from == node_id) {
            let entry = ranks.entry(*target).or_insert(0);
            *entry = (*entry).max(node_rank + 1);

            if let Some(degree) = indegree.get_mut(target) {
                if *degree > 0 {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*target);
                    }
                }
            }
        }
    }

    if visited.len() != order.len() {
        for id in order {
            if visited.contains(id) {
                continue;
            }
            let parent_rank = links
                .iter()
                .filter(|(from, to)| to == id && visited.contains(from))
                .filter_map(|(from, _)| ranks.get(from).map(|rank| rank + 1))
                .max()
                .unwrap_or(0);
            ranks.insert(*id, parent_rank);
            visited.insert(*id);
        }
    }

    ranks
}

/// Groups nodes by rank and reduces crossings with barycenter sweeps.
fn order_layers<'a>(
    order: &[&'a str],
    links: &[(&'a str, &'a str)],
    ranks: &HashMap<&'a str, usize>,
) -> Vec<Vec<&'a str>> {
    let mut layers_map: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for id in order {
        let rank = ranks.get(id).copied().unwrap_or(0);
        layers_map.entry(rank).or_default().push(*id);
    }
    let mut layers: Vec<Vec<&str>> = layers_map.into_values().collect();

    for sweep in 0..ORDERING_SWEEPS {
        let downward = sweep % 2 == 0;
        let indices: Vec<usize> = if downward {
            (1..layers.len()).collect()
        } else {
            (0..layers.len().saturating_sub(1)).rev().collect()
        };

        for idx in indices {
            let reference_idx = if downward { idx - 1 } else { idx + 1 };
            let reference: HashMap<&str, usize> = layers[reference_idx]
                .iter()
                .enumerate()
                .map(|(pos, id)| (*id, pos))
                .collect();

            let current = &layers[idx];
            let mut keyed: Vec<(f32, usize, &str)> = current
                .iter()
                .enumerate()
                .map(|(pos, id)| {
                    let neighbours: Vec<usize> = links
                        .iter()
                        .filter_map(|(from, to)| {
                            if to == id {
                                reference.get(from).copied()
                            } else if from == id {
                                reference.get(to).copied()
                            } else {
                                None
                            }
                        })
                        .collect();
                    let barycenter = if neighbours.is_empty() {
                        pos as f32
                    } else {
                        neighbours.iter().sum::<usize>() as f32 / neighbours.len() as f32
                    };
                    (barycenter, pos, *id)
                })
                .collect();

            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            layers[idx] = keyed.into_iter().map(|(_, _, id)| id).collect();
        }
    }

    layers
}

fn assign_coordinates<'a>(layers: &[Vec<&'a str>], config: &LayoutConfig) -> HashMap<&'a str, Point> {
    let mut anchors = HashMap::new();
    if layers.is_empty() {
        return anchors;
    }

    let horizontal = config.rank_dir.is_horizontal();
    let (rank_extent, cross_extent) = if horizontal {
        (config.node_width, config.node_height)
    } else {
        (config.node_height, config.node_width)
    };

    let rank_step = rank_extent + config.rank_sep;
    let cross_step = cross_extent + config.node_sep;
    let widest = layers.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let cross_span = cross_step * (widest - 1) as f32;
    let rank_count = layers.len();

    for (idx, layer) in layers.iter().enumerate() {
        let rank_index = if config.rank_dir.is_reversed() {
            rank_count - 1 - idx
        } else {
            idx
        };
        let main = rank_extent / 2.0 + rank_index as f32 * rank_step;

        let layer_span = cross_step * layer.len().saturating_sub(1) as f32;
        let start = cross_extent / 2.0 + (cross_span - layer_span) / 2.0;

        for (pos, id) in layer.iter().enumerate() {
            let cross = start + pos as f32 * cross_step;
            let point = if horizontal {
                Point { x: main, y: cross }
            } else {
                Point { x: cross, y: main }
            };
            anchors.insert(*id, point);
        }
    }

    anchors
}
