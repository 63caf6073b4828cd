//! Hierarchical density clustering over cosine distance.
//!
//! The procedure:
//!
//! 1. core distance of a point = distance to its `min_samples`-th nearest
//!    neighbour (the point itself counts as the first);
//! 2. mutual reachability `max(core(a), core(b), d(a, b))`;
//! 3. minimum spanning tree of the mutual reachability graph (Prim);
//! 4. single-linkage hierarchy from the sorted tree edges;
//! 5. condensed tree: a split only creates new clusters when both sides
//!    hold at least `min_cluster_size` points, otherwise the smaller side
//!    falls out of the current cluster;
//! 6. excess-of-mass selection of the most stable clusters. The root is
//!    never selected, so a corpus without internal structure is all noise.
//!
//! Distances are computed on the fly; memory stays linear in the number of
//! points while time is quadratic.

use crate::embedding::cosine_similarity;

/// Minimum lambda denominator, so identical points do not yield infinite density.
const MIN_DISTANCE: f64 = 1e-9;

/// Density parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DensityParams {
    /// Smallest group of points that may form a cluster. At least 2.
    pub min_cluster_size: usize,
    /// Neighbourhood size for core distances. At least 1.
    pub min_samples: usize,
}

impl Default for DensityParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 10,
            min_samples: 10,
        }
    }
}

fn distance(a: &[f32], b: &[f32]) -> f64 {
    (1.0 - cosine_similarity(a, b) as f64).clamp(0.0, 2.0)
}

/// Cluster `points`; returns one label per point, `None` for noise.
///
/// Labels are dense `0..k` in order of first appearance among the points.
pub fn cluster(points: &[Vec<f32>], params: DensityParams) -> Vec<Option<usize>> {
    let n = points.len();
    let min_cluster_size = params.min_cluster_size.max(2);
    if n < min_cluster_size {
        return vec![None; n];
    }

    let core = core_distances(points, params.min_samples.max(1));
    let edges = minimum_spanning_tree(points, &core);
    let dendrogram = single_linkage(n, edges);
    let condensed = condense(n, &dendrogram, min_cluster_size);
    let selected = select_clusters(&condensed.clusters);
    label_points(&condensed, &selected)
}

fn core_distances(points: &[Vec<f32>], min_samples: usize) -> Vec<f64> {
    let neighbours = min_samples - 1;
    if neighbours == 0 {
        return vec![0.0; points.len()];
    }
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut d: Vec<f64> = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| distance(p, q))
                .collect();
            if d.is_empty() {
                return 0.0;
            }
            let k = neighbours.min(d.len()) - 1;
            let (_, kth, _) = d.select_nth_unstable_by(k, |a, b| a.total_cmp(b));
            *kth
        })
        .collect()
}

/// Prim's algorithm on the dense mutual reachability graph.
fn minimum_spanning_tree(points: &[Vec<f32>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = None;
        let mut next_weight = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = distance(&points[current], &points[j])
                .max(core[current])
                .max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                parent[j] = current;
            }
            if next.is_none() || best[j] < next_weight {
                next = Some(j);
                next_weight = best[j];
            }
        }
        let Some(j) = next else { break };
        in_tree[j] = true;
        edges.push((parent[j], j, best[j]));
        current = j;
    }
    edges
}

/// Internal node of the single-linkage hierarchy. Node ids `< n` are points.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

struct Dendrogram {
    merges: Vec<Merge>,
}

impl Dendrogram {
    fn size(&self, n: usize, node: usize) -> usize {
        if node < n {
            1
        } else {
            self.merges[node - n].size
        }
    }

    fn leaves(&self, n: usize, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if id < n {
                out.push(id);
            } else {
                let m = self.merges[id - n];
                stack.push(m.right);
                stack.push(m.left);
            }
        }
        out
    }
}

fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Dendrogram {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut parent: Vec<usize> = (0..n).collect();
    let mut node_of: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (a, b, d) in edges {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra == rb {
            continue;
        }
        let (left, right) = (node_of[ra], node_of[rb]);
        let size_of = |node: usize, merges: &[Merge]| {
            if node < n {
                1
            } else {
                merges[node - n].size
            }
        };
        let size = size_of(left, &merges) + size_of(right, &merges);
        merges.push(Merge {
            left,
            right,
            distance: d,
            size,
        });
        parent[rb] = ra;
        node_of[ra] = n + merges.len() - 1;
    }

    Dendrogram { merges }
}

#[derive(Debug, Clone)]
struct CondensedCluster {
    parent: Option<usize>,
    birth: f64,
    stability: f64,
    children: Vec<usize>,
}

struct Condensed {
    clusters: Vec<CondensedCluster>,
    /// Cluster each point fell out of.
    fell_from: Vec<usize>,
}

fn lambda(distance: f64) -> f64 {
    1.0 / distance.max(MIN_DISTANCE)
}

fn condense(n: usize, tree: &Dendrogram, min_cluster_size: usize) -> Condensed {
    let mut clusters = vec![CondensedCluster {
        parent: None,
        birth: 0.0,
        stability: 0.0,
        children: Vec::new(),
    }];
    let mut fell_from = vec![0usize; n];

    let Some(root) = (n + tree.merges.len()).checked_sub(1).filter(|r| *r >= n) else {
        return Condensed {
            clusters,
            fell_from,
        };
    };

    let mut stack = vec![(root, 0usize)];
    while let Some((node, cid)) = stack.pop() {
        if node < n {
            fell_from[node] = cid;
            continue;
        }
        let merge = tree.merges[node - n];
        let lam = lambda(merge.distance);
        let birth = clusters[cid].birth;
        let (left, right) = (merge.left, merge.right);
        let (ls, rs) = (tree.size(n, left), tree.size(n, right));
        let big_left = ls >= min_cluster_size;
        let big_right = rs >= min_cluster_size;

        match (big_left, big_right) {
            (true, true) => {
                clusters[cid].stability += (lam - birth) * (ls + rs) as f64;
                for child in [left, right] {
                    let id = clusters.len();
                    clusters.push(CondensedCluster {
                        parent: Some(cid),
                        birth: lam,
                        stability: 0.0,
                        children: Vec::new(),
                    });
                    clusters[cid].children.push(id);
                    stack.push((child, id));
                }
            }
            (true, false) | (false, true) => {
                let (keep, drop, dropped) = if big_left {
                    (left, right, rs)
                } else {
                    (right, left, ls)
                };
                clusters[cid].stability += (lam - birth) * dropped as f64;
                for p in tree.leaves(n, drop) {
                    fell_from[p] = cid;
                }
                stack.push((keep, cid));
            }
            (false, false) => {
                clusters[cid].stability += (lam - birth) * (ls + rs) as f64;
                for p in tree.leaves(n, node) {
                    fell_from[p] = cid;
                }
            }
        }
    }

    Condensed {
        clusters,
        fell_from,
    }
}

/// Excess-of-mass selection. Cluster 0 (the root) is never selected.
fn select_clusters(clusters: &[CondensedCluster]) -> Vec<bool> {
    let mut selected = vec![false; clusters.len()];
    let mut subtree = vec![0.0f64; clusters.len()];

    // Children are always created after their parent.
    for cid in (1..clusters.len()).rev() {
        let c = &clusters[cid];
        let children_sum: f64 = c.children.iter().map(|ch| subtree[*ch]).sum();
        if c.children.is_empty() || c.stability >= children_sum {
            selected[cid] = true;
            subtree[cid] = c.stability;
            let mut stack = c.children.clone();
            while let Some(d) = stack.pop() {
                selected[d] = false;
                stack.extend(clusters[d].children.iter().copied());
            }
        } else {
            subtree[cid] = children_sum;
        }
    }
    selected
}

fn label_points(condensed: &Condensed, selected: &[bool]) -> Vec<Option<usize>> {
    let mut dense: Vec<Option<usize>> = vec![None; condensed.clusters.len()];
    let mut next = 0;

    condensed
        .fell_from
        .iter()
        .map(|&start| {
            let mut cursor = Some(start);
            while let Some(cid) = cursor {
                if selected[cid] {
                    let label = *dense[cid].get_or_insert_with(|| {
                        next += 1;
                        next - 1
                    });
                    return Some(label);
                }
                cursor = condensed.clusters[cid].parent;
            }
            None
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(min_cluster_size: usize, min_samples: usize) -> DensityParams {
        DensityParams {
            min_cluster_size,
            min_samples,
        }
    }

    fn two_groups() -> Vec<Vec<f32>> {
        let mut points = Vec::new();
        for i in 0..5 {
            points.push(vec![1.0, 0.2 + 0.01 * i as f32, 0.0]);
        }
        for i in 0..5 {
            points.push(vec![0.2 + 0.01 * i as f32, 1.0, 0.0]);
        }
        points
    }

    #[test]
    fn too_few_points_are_all_noise() {
        let points = vec![vec![1.0, 0.0], vec![0.99, 0.01], vec![1.0, 0.001]];
        assert_eq!(cluster(&points, params(10, 10)), vec![None, None, None]);
    }

    #[test]
    fn separates_two_dense_groups() {
        let labels = cluster(&two_groups(), params(3, 3));
        assert!(labels.iter().all(Option::is_some));
        assert!(labels[..5].iter().all(|l| *l == Some(0)));
        assert!(labels[5..].iter().all(|l| *l == Some(1)));
    }

    #[test]
    fn isolated_point_is_noise() {
        let mut points = two_groups();
        points.push(vec![0.0, 0.0, 1.0]);
        let labels = cluster(&points, params(3, 3));
        assert_eq!(labels[10], None);
        assert_eq!(labels[0], Some(0));
        assert_eq!(labels[9], Some(1));
    }

    #[test]
    fn single_blob_without_substructure_is_noise() {
        let points: Vec<Vec<f32>> = (0..4).map(|i| vec![1.0, 0.01 * i as f32]).collect();
        let labels = cluster(&points, params(3, 2));
        assert!(labels.iter().all(Option::is_none));
    }

    #[test]
    fn identical_points_do_not_overflow() {
        let mut points = vec![vec![1.0, 0.0]; 4];
        points.extend(vec![vec![0.0, 1.0]; 4]);
        let labels = cluster(&points, params(2, 2));
        assert_eq!(labels[0], labels[3]);
        assert_eq!(labels[4], labels[7]);
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn clustering_is_deterministic() {
        let points = two_groups();
        let first = cluster(&points, params(3, 3));
        for _ in 0..3 {
            assert_eq!(cluster(&points, params(3, 3)), first);
        }
    }
}
