//! C7 (schedule half): turns a set of "just changed" seed vertices into a
//! topological recomputation order over their transitive consumers, via
//! Kahn's algorithm, and reports any strongly-connected components that
//! remain as detected cycles.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::DependencyGraph;
use crate::vertex::VertexId;

pub struct Layer {
    pub vertices: Vec<VertexId>,
}

pub struct Schedule {
    pub layers: Vec<Layer>,
    pub cycles: Vec<Vec<VertexId>>,
}

/// A vertex's tie-break key: (sheet, col, row) for addressed vertices so
/// evaluation order is deterministic (4.4); range/matrix-less vertices sort
/// after every addressed one, by id.
fn sort_key(graph: &DependencyGraph, id: VertexId) -> (u8, u32, u32, u32, u32) {
    match graph.vertex(id).and_then(|v| v.addr) {
        Some(addr) => (0, addr.sheet, addr.col(), addr.row(), id.0),
        None => (1, 0, 0, 0, id.0),
    }
}

/// Computes every vertex reachable from `seeds` by following `dependents`
/// edges (the consumer closure that must be recomputed).
fn reachable_closure(graph: &DependencyGraph, seeds: &[VertexId]) -> FxHashSet<VertexId> {
    let mut seen: FxHashSet<VertexId> = seeds.iter().copied().collect();
    let mut stack: Vec<VertexId> = seeds.to_vec();
    while let Some(id) = stack.pop() {
        let Some(v) = graph.vertex(id) else { continue };
        for &dep in &v.dependents {
            if seen.insert(dep) {
                stack.push(dep);
            }
        }
    }
    seen
}

pub fn build_schedule(graph: &DependencyGraph, seeds: &[VertexId]) -> Schedule {
    let reachable = reachable_closure(graph, seeds);
    let mut in_degree: FxHashMap<VertexId, usize> = FxHashMap::default();
    for &id in &reachable {
        let v = graph.vertex(id).expect("reachable vertex must exist");
        let deg = v.depends_on.iter().filter(|p| reachable.contains(p)).count();
        in_degree.insert(id, deg);
    }

    let mut layers = Vec::new();
    let mut ready: Vec<VertexId> = in_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut scheduled: FxHashSet<VertexId> = FxHashSet::default();

    while !ready.is_empty() {
        ready.sort_by_key(|&id| sort_key(graph, id));
        let this_layer = std::mem::take(&mut ready);
        for &id in &this_layer {
            scheduled.insert(id);
        }
        for &id in &this_layer {
            let v = graph.vertex(id).expect("scheduled vertex must exist");
            for &consumer in &v.dependents {
                if !reachable.contains(&consumer) || scheduled.contains(&consumer) {
                    continue;
                }
                let deg = in_degree.get_mut(&consumer).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push(consumer);
                }
            }
        }
        layers.push(Layer {
            vertices: this_layer,
        });
    }

    let remaining: Vec<VertexId> = reachable
        .iter()
        .copied()
        .filter(|id| !scheduled.contains(id))
        .collect();
    let cycles = if remaining.is_empty() {
        Vec::new()
    } else {
        tarjan_sccs(graph, &remaining)
    };

    Schedule { layers, cycles }
}

/// Tarjan's SCC algorithm restricted to `nodes`, following `depends_on`
/// edges that stay inside `nodes`. Every SCC returned has size > 1, or size
/// 1 with a self-loop — both are genuine cycles; the unscheduled-but-acyclic
/// case cannot occur once Kahn's algorithm has exhausted all in-degree-0
/// vertices.
fn tarjan_sccs(graph: &DependencyGraph, nodes: &[VertexId]) -> Vec<Vec<VertexId>> {
    struct State<'g> {
        graph: &'g DependencyGraph,
        in_set: FxHashSet<VertexId>,
        index: FxHashMap<VertexId, usize>,
        low: FxHashMap<VertexId, usize>,
        on_stack: FxHashSet<VertexId>,
        stack: Vec<VertexId>,
        counter: usize,
        out: Vec<Vec<VertexId>>,
    }

    fn strongconnect(s: &mut State, v: VertexId) {
        s.index.insert(v, s.counter);
        s.low.insert(v, s.counter);
        s.counter += 1;
        s.stack.push(v);
        s.on_stack.insert(v);

        let producers: Vec<VertexId> = s
            .graph
            .vertex(v)
            .map(|vert| {
                vert.depends_on
                    .iter()
                    .copied()
                    .filter(|p| s.in_set.contains(p))
                    .collect()
            })
            .unwrap_or_default();

        for w in producers {
            if !s.index.contains_key(&w) {
                strongconnect(s, w);
                let wl = s.low[&w];
                let vl = s.low[&v];
                s.low.insert(v, vl.min(wl));
            } else if s.on_stack.contains(&w) {
                let wi = s.index[&w];
                let vl = s.low[&v];
                s.low.insert(v, vl.min(wi));
            }
        }

        if s.low[&v] == s.index[&v] {
            let mut component = Vec::new();
            loop {
                let w = s.stack.pop().unwrap();
                s.on_stack.remove(&w);
                component.push(w);
                if w == v {
                    break;
                }
            }
            s.out.push(component);
        }
    }

    let mut state = State {
        graph,
        in_set: nodes.iter().copied().collect(),
        index: FxHashMap::default(),
        low: FxHashMap::default(),
        on_stack: FxHashSet::default(),
        stack: Vec::new(),
        counter: 0,
        out: Vec::new(),
    };
    for &n in nodes {
        if !state.index.contains_key(&n) {
            strongconnect(&mut state, n);
        }
    }
    state.out
}
