use extract::EntityType;
use graph::GraphModel;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;
use tracing::debug;

use crate::style::{type_color, StyleOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Hard cap on force iterations.
    pub iterations: usize,
    /// Stop early once no node moves further than this (in ideal-edge-length units).
    pub convergence_threshold: f64,
    pub seed: u64,
    /// Coordinates are rescaled into `[-scale, scale]`.
    pub scale: f64,
    /// Curvature added per extra edge between the same two entities.
    pub curvature_step: f64,
    pub self_loop_radius: f64,
    pub style: StyleOptions,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            iterations: 50,
            convergence_threshold: 1e-3,
            seed: 42,
            scale: 1.0,
            curvature_step: 0.2,
            self_loop_radius: 0.1,
            style: StyleOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeLayout {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub position: Point,
    pub color: &'static str,
    pub size: f64,
    pub component: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeLayout {
    pub source_id: String,
    pub target_id: String,
    pub label: String,
    pub weight: usize,
    /// Signed bend relative to the source->target direction. 0 draws a straight line.
    pub curvature: f64,
    /// Quadratic Bezier control point.
    pub control: Point,
    /// Point on the curve at t = 0.5, where the label goes.
    pub midpoint: Point,
    pub width: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutResult {
    pub nodes: IndexMap<String, NodeLayout>,
    pub edges: Vec<EdgeLayout>,
    pub iterations: usize,
    pub converged: bool,
}

impl LayoutResult {
    pub fn position(&self, id: &str) -> Option<Point> {
        self.nodes.get(id).map(|node| node.position)
    }
}

/// Deterministic force-directed placement.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    options: LayoutOptions,
}

impl LayoutEngine {
    pub fn new(options: LayoutOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    pub fn layout(&self, graph: &GraphModel) -> LayoutResult {
        let n = graph.entity_count();
        let (positions, iterations, converged) = match n {
            0 => (Vec::new(), 0, true),
            1 => (vec![Point::default()], 0, true),
            _ if graph.relationships().iter().all(|r| r.is_self_loop()) => {
                (self.circle(n), 0, true)
            }
            _ => self.force_directed(graph),
        };

        debug!(nodes = n, iterations, converged, "Layout computed");

        let analytics = graph.analytics();
        let nodes = graph
            .entities()
            .zip(&positions)
            .map(|(entity, &position)| {
                let degree = analytics.degree.get(&entity.id).copied().unwrap_or(0);
                let node = NodeLayout {
                    id: entity.id.clone(),
                    label: entity.label.clone(),
                    entity_type: entity.entity_type,
                    position,
                    color: type_color(entity.entity_type),
                    size: self.options.style.node_size(degree),
                    component: analytics.component_of(&entity.id).unwrap_or(0),
                };
                (entity.id.clone(), node)
            })
            .collect();

        LayoutResult {
            nodes,
            edges: self.route_edges(graph, &positions),
            iterations,
            converged,
        }
    }

    /// Evenly spaced on a circle; distinct angles mean distinct points.
    fn circle(&self, n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| {
                let angle = TAU * i as f64 / n as f64;
                Point::new(self.options.scale * angle.cos(), self.options.scale * angle.sin())
            })
            .collect()
    }

    /// Fruchterman-Reingold with an ideal edge length of 1, then rescaled.
    fn force_directed(&self, graph: &GraphModel) -> (Vec<Point>, usize, bool) {
        let n = graph.entity_count();
        let side = (n as f64).sqrt();

        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let mut positions: Vec<Point> = (0..n)
            .map(|_| Point::new((rng.r#gen::<f64>() - 0.5) * side, (rng.r#gen::<f64>() - 0.5) * side))
            .collect();

        // Symmetric attraction weights; self-loops exert no force.
        let mut springs: HashMap<(usize, usize), f64> = HashMap::new();
        for rel in graph.relationships() {
            let (Some(a), Some(b)) = (graph.entity_index(&rel.source_id), graph.entity_index(&rel.target_id)) else {
                continue;
            };
            if a != b {
                *springs.entry((a.min(b), a.max(b))).or_insert(0.0) += rel.weight as f64;
            }
        }
        let mut springs: Vec<((usize, usize), f64)> = springs.into_iter().collect();
        springs.sort_by(|x, y| x.0.cmp(&y.0));

        let initial_temperature = side / 10.0;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.options.iterations {
            let temperature =
                initial_temperature * (1.0 - iterations as f64 / self.options.iterations as f64);
            let mut displacement = vec![Point::default(); n];

            for i in 0..n {
                for j in (i + 1)..n {
                    let (dx, dy, d) = separation(&positions, i, j);
                    let force = 1.0 / d;
                    displacement[i].x += dx / d * force;
                    displacement[i].y += dy / d * force;
                    displacement[j].x -= dx / d * force;
                    displacement[j].y -= dy / d * force;
                }
            }

            for &((i, j), weight) in &springs {
                let (dx, dy, d) = separation(&positions, i, j);
                let force = weight * d * d;
                displacement[i].x -= dx / d * force;
                displacement[i].y -= dy / d * force;
                displacement[j].x += dx / d * force;
                displacement[j].y += dy / d * force;
            }

            let mut max_move: f64 = 0.0;
            for (pos, disp) in positions.iter_mut().zip(&displacement) {
                let length = disp.x.hypot(disp.y);
                if length > 0.0 {
                    let step = length.min(temperature);
                    pos.x += disp.x / length * step;
                    pos.y += disp.y / length * step;
                    max_move = max_move.max(step);
                }
            }

            iterations += 1;
            if max_move < self.options.convergence_threshold {
                converged = true;
                break;
            }
        }

        rescale(&mut positions, self.options.scale);
        (positions, iterations, converged)
    }

    fn route_edges(&self, graph: &GraphModel, positions: &[Point]) -> Vec<EdgeLayout> {
        // Edges grouped by unordered entity pair, in relationship order.
        let mut groups: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        let mut endpoints = Vec::with_capacity(graph.relationship_count());
        for (idx, rel) in graph.relationships().iter().enumerate() {
            let a = graph.entity_index(&rel.source_id).unwrap_or(0);
            let b = graph.entity_index(&rel.target_id).unwrap_or(0);
            groups.entry((a.min(b), a.max(b))).or_default().push(idx);
            endpoints.push((a, b));
        }

        let mut curvature = vec![0.0; graph.relationship_count()];
        // 1-based position of each self-loop among the loops on its node
        let mut loop_rank = vec![0usize; graph.relationship_count()];
        for (&(lo, hi), members) in &groups {
            let m = members.len();
            for (slot, &idx) in members.iter().enumerate() {
                curvature[idx] = if lo == hi {
                    loop_rank[idx] = slot + 1;
                    self.options.curvature_step * (slot + 1) as f64
                } else {
                    let offset = (slot as f64 - (m - 1) as f64 / 2.0) * self.options.curvature_step;
                    // Offsets are laid out in the lo->hi frame; a reversed edge's normal points the other way.
                    if endpoints[idx].0 == lo { offset } else { -offset }
                };
            }
        }

        graph
            .relationships()
            .iter()
            .zip(endpoints)
            .zip(curvature.into_iter().zip(loop_rank))
            .map(|((rel, (a, b)), (curvature, rank))| {
                let (source, target) = (positions[a], positions[b]);
                let (control, midpoint) = if a == b {
                    let reach = self.options.self_loop_radius * rank as f64;
                    let top = Point::new(source.x, source.y + 2.0 * reach);
                    (top, Point::new(source.x, source.y + reach * 1.5))
                } else {
                    bend(source, target, curvature)
                };

                EdgeLayout {
                    source_id: rel.source_id.clone(),
                    target_id: rel.target_id.clone(),
                    label: rel.label.clone(),
                    weight: rel.weight,
                    curvature,
                    control,
                    midpoint,
                    width: self.options.style.edge_width(rel.weight),
                }
            })
            .collect()
    }
}

/// Vector from j to i and its length, never zero.
fn separation(positions: &[Point], i: usize, j: usize) -> (f64, f64, f64) {
    let mut dx = positions[i].x - positions[j].x;
    let mut dy = positions[i].y - positions[j].y;
    if dx.hypot(dy) < 1e-9 {
        // Coincident nodes: push apart along a direction fixed by their indices.
        let angle = (i * 31 + j * 17) as f64;
        dx = 1e-3 * angle.cos();
        dy = 1e-3 * angle.sin();
    }
    (dx, dy, dx.hypot(dy))
}

/// Control point and curve midpoint for a quadratic Bezier bent by `curvature`.
fn bend(source: Point, target: Point, curvature: f64) -> (Point, Point) {
    let mid = Point::new((source.x + target.x) / 2.0, (source.y + target.y) / 2.0);
    let (dx, dy) = (target.x - source.x, target.y - source.y);
    // Normal scaled by edge length: (-dy, dx).
    let control = Point::new(mid.x - dy * curvature, mid.y + dx * curvature);
    let midpoint = Point::new((mid.x + control.x) / 2.0, (mid.y + control.y) / 2.0);
    (control, midpoint)
}

/// Center on the mean and scale so the largest coordinate magnitude is `scale`.
fn rescale(positions: &mut [Point], scale: f64) {
    let n = positions.len() as f64;
    let cx = positions.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = positions.iter().map(|p| p.y).sum::<f64>() / n;

    let mut extent: f64 = 0.0;
    for p in positions.iter_mut() {
        p.x -= cx;
        p.y -= cy;
        extent = extent.max(p.x.abs()).max(p.y.abs());
    }

    if extent > 0.0 {
        for p in positions.iter_mut() {
            p.x *= scale / extent;
            p.y *= scale / extent;
        }
    }
}
